//! In-memory backing store.
//!
//! Keeps every key in an ordered map behind a `parking_lot::RwLock`. A
//! transaction stages its writes in a side table and only publishes them
//! once every mutation has been applied successfully, so a failing batch
//! leaves the map untouched.

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicBool, Ordering},
};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::{
    PrimitiveStorage,
    buffer::{Mutation, step_counter},
    error::{StorageError, StorageResult},
};

/// A [`PrimitiveStorage`] that lives entirely in process memory.
#[derive(Default)]
pub struct MemoryStorage {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
    /// Fail the next `execute` call before applying anything.
    fail_next: AtomicBool,
    closed: AtomicBool,
}

impl MemoryStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next transaction fail as if the backend had gone away.
    pub fn fail_next_transaction(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Copy of the full contents, for inspection.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.data.read().clone()
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    fn check_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

/// Step a counter, reading through the staged writes of this transaction.
fn step_staged(
    data: &BTreeMap<String, Vec<u8>>,
    staged: &FxHashMap<String, Option<Vec<u8>>>,
    key: &str,
    delta: i64,
) -> StorageResult<Vec<u8>> {
    let current = match staged.get(key) {
        Some(value) => value.as_deref(),
        None => data.get(key).map(Vec::as_slice),
    };
    step_counter(key, current, delta)
}

impl PrimitiveStorage for MemoryStorage {
    fn get_bytes(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.check_open()?;
        let value = self.data.read().get(key).cloned();
        tracing::trace!("get {key}: {}", if value.is_some() { "hit" } else { "miss" });
        value.ok_or_else(|| StorageError::not_found(key))
    }

    fn execute(&self, mutations: Vec<Mutation>) -> StorageResult<()> {
        self.check_open()?;
        let mut data = self.data.write();

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Backend("injected transaction failure".to_owned()));
        }

        // Latest staged value per key; `None` marks a delete.
        let mut staged: FxHashMap<String, Option<Vec<u8>>> = FxHashMap::default();

        for mutation in mutations {
            match mutation {
                Mutation::Set { key, value } => {
                    staged.insert(key, Some(value));
                }
                Mutation::Delete { key } => {
                    staged.insert(key, None);
                }
                Mutation::Incr { key } => {
                    let next = step_staged(&data, &staged, &key, 1)?;
                    staged.insert(key, Some(next));
                }
                Mutation::Decr { key } => {
                    let next = step_staged(&data, &staged, &key, -1)?;
                    staged.insert(key, Some(next));
                }
            }
        }

        let count = staged.len();
        for (key, value) in staged {
            match value {
                Some(value) => {
                    data.insert(key, value);
                }
                None => {
                    data.remove(&key);
                }
            }
        }

        tracing::trace!("committed {count} keys");
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        self.check_open()?;
        Ok(self.data.read().keys().cloned().collect())
    }

    fn clear(&self) -> StorageResult<()> {
        self.check_open()?;
        self.data.write().clear();
        Ok(())
    }

    fn close(&self) -> StorageResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys;

    #[test]
    fn test_counters_read_through_staged_writes() {
        let store = MemoryStorage::new();
        let mut pipe = store.start_transaction();
        pipe.set(keys::END_TICK, 5u64).incr(keys::END_TICK).incr(keys::START_TICK);
        pipe.end_transaction().unwrap();

        assert_eq!(store.get_u64(keys::END_TICK).unwrap(), 6);
        assert_eq!(store.get_u64(keys::START_TICK).unwrap(), 1);
    }

    #[test]
    fn test_failed_transaction_applies_nothing() {
        let store = MemoryStorage::new();
        store.set("a", 1u64).unwrap();

        let mut pipe = store.start_transaction();
        pipe.set("b", 2u64).delete("a").set("bad", "x").incr("bad");
        assert!(pipe.end_transaction().is_err());
        assert_eq!(store.snapshot().len(), 1);
        assert_eq!(store.get_u64("a").unwrap(), 1);

        store.fail_next_transaction();
        assert!(store.set("b", 2u64).is_err());
        assert!(store.get_bytes("b").unwrap_err().is_missing_key());

        store.set("b", 2u64).unwrap();
        assert_eq!(store.get_u64("b").unwrap(), 2);
    }

    #[test]
    fn test_closed_store_rejects_access() {
        let store = MemoryStorage::new();
        store.close().unwrap();
        assert!(matches!(store.get_bytes("a"), Err(StorageError::Closed)));
        assert!(store.close().is_ok());
    }
}
