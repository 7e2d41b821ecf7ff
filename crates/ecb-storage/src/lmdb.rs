//! LMDB backing store.
//!
//! Every key lives in a single named database. A transaction maps onto one
//! LMDB write transaction, so a batch either commits as a whole or is
//! aborted when the transaction is dropped.

use std::{
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
};

use heed::{
    Database, Env, EnvOpenOptions,
    types::{Bytes, Str},
};

use crate::{
    PrimitiveStorage,
    buffer::{Mutation, step_counter},
    config::LmdbConfig,
    error::{StorageError, StorageResult},
};

/// A [`PrimitiveStorage`] persisted to an LMDB environment.
pub struct LmdbStorage {
    env: Env,
    db: Database<Str, Bytes>,
    closed: AtomicBool,
}

impl LmdbStorage {
    /// Open or create the environment described by `config`.
    ///
    /// # Errors
    /// Returns an error if the directory or environment cannot be created.
    ///
    /// # Safety
    /// heed requires that an environment is not opened twice in the same
    /// process with different options.
    #[allow(unsafe_code)]
    pub fn open(config: &LmdbConfig) -> StorageResult<Self> {
        std::fs::create_dir_all(&config.path)?;

        // SAFETY: one environment per directory per process
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(config.map_size)
                .max_dbs(1)
                .open(&config.path)?
        };

        let mut wtxn = env.write_txn()?;
        let db = env.create_database(&mut wtxn, Some("ecb"))?;
        wtxn.commit()?;

        tracing::debug!("opened lmdb store at {}", config.path.display());
        Ok(Self {
            env,
            db,
            closed: AtomicBool::new(false),
        })
    }

    /// Open at `path` with the default map size.
    ///
    /// # Errors
    /// See [`LmdbStorage::open`].
    pub fn open_path(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open(&LmdbConfig::default().with_path(path.as_ref()))
    }

    fn check_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

impl PrimitiveStorage for LmdbStorage {
    fn get_bytes(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.check_open()?;
        let rtxn = self.env.read_txn()?;
        let Some(bytes) = self.db.get(&rtxn, key)? else {
            return Err(StorageError::not_found(key));
        };
        Ok(bytes.to_vec())
    }

    fn execute(&self, mutations: Vec<Mutation>) -> StorageResult<()> {
        self.check_open()?;
        let count = mutations.len();

        // Dropping `wtxn` on an early return aborts the whole batch.
        let mut wtxn = self.env.write_txn()?;
        for mutation in mutations {
            match mutation {
                Mutation::Set { key, value } => {
                    self.db.put(&mut wtxn, &key, &value)?;
                }
                Mutation::Delete { key } => {
                    self.db.delete(&mut wtxn, &key)?;
                }
                Mutation::Incr { key } => {
                    let next = step_counter(&key, self.db.get(&wtxn, &key)?, 1)?;
                    self.db.put(&mut wtxn, &key, &next)?;
                }
                Mutation::Decr { key } => {
                    let next = step_counter(&key, self.db.get(&wtxn, &key)?, -1)?;
                    self.db.put(&mut wtxn, &key, &next)?;
                }
            }
        }
        wtxn.commit()?;

        tracing::trace!("committed {count} mutations");
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        self.check_open()?;
        let rtxn = self.env.read_txn()?;
        let mut keys = Vec::new();
        for entry in self.db.iter(&rtxn)? {
            let (key, _) = entry?;
            keys.push(key.to_owned());
        }
        Ok(keys)
    }

    fn clear(&self) -> StorageResult<()> {
        self.check_open()?;
        let mut wtxn = self.env.write_txn()?;
        self.db.clear(&mut wtxn)?;
        wtxn.commit()?;
        Ok(())
    }

    fn close(&self) -> StorageResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.env.force_sync()?;
        tracing::debug!("closed lmdb store");
        Ok(())
    }
}
