//! Buffered store commands and the transaction pipeline.
//!
//! A [`Pipeline`] collects [`Mutation`]s without touching the store. Calling
//! [`Pipeline::end_transaction`] hands the whole batch to the backend, which
//! applies every mutation or none of them.

use crate::{
    PrimitiveStorage,
    error::{StorageError, StorageResult},
};

/// A value that can be written to the store.
///
/// Scalars are stored as decimal text so that counters written here can be
/// read back by any client of the same key layout.
pub trait StoreValue {
    /// Encode into stored bytes.
    fn into_store_bytes(self) -> Vec<u8>;
}

macro_rules! impl_store_value_display {
    ($($t:ty),+) => {
        $(
            impl StoreValue for $t {
                fn into_store_bytes(self) -> Vec<u8> {
                    self.to_string().into_bytes()
                }
            }
        )+
    };
}

impl_store_value_display!(u32, u64, i64, isize, f32, f64, bool);

impl StoreValue for Vec<u8> {
    fn into_store_bytes(self) -> Vec<u8> {
        self
    }
}

impl StoreValue for &[u8] {
    fn into_store_bytes(self) -> Vec<u8> {
        self.to_vec()
    }
}

impl StoreValue for String {
    fn into_store_bytes(self) -> Vec<u8> {
        self.into_bytes()
    }
}

impl StoreValue for &str {
    fn into_store_bytes(self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

/// A mutation to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Insert or overwrite a key.
    Set { key: String, value: Vec<u8> },
    /// Remove a key. Removing an absent key is not an error.
    Delete { key: String },
    /// Add one to an integer key, treating absent as zero.
    Incr { key: String },
    /// Subtract one from an integer key, treating absent as zero.
    Decr { key: String },
}

impl Mutation {
    /// Create a Set mutation.
    #[inline]
    pub fn set(key: impl Into<String>, value: impl StoreValue) -> Self {
        Self::Set {
            key: key.into(),
            value: value.into_store_bytes(),
        }
    }

    /// Create a Delete mutation.
    #[inline]
    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }

    /// Create an Incr mutation.
    #[inline]
    pub fn incr(key: impl Into<String>) -> Self {
        Self::Incr { key: key.into() }
    }

    /// Create a Decr mutation.
    #[inline]
    pub fn decr(key: impl Into<String>) -> Self {
        Self::Decr { key: key.into() }
    }

    /// Get the key for this mutation.
    #[inline]
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Set { key, .. }
            | Self::Delete { key }
            | Self::Incr { key }
            | Self::Decr { key } => key,
        }
    }
}

/// Apply a counter step to the current stored value.
pub fn step_counter(key: &str, current: Option<&[u8]>, delta: i64) -> StorageResult<Vec<u8>> {
    let current = match current {
        None => 0,
        Some(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|text| text.parse::<i64>().ok())
            .ok_or_else(|| StorageError::InvalidValue {
                key: key.to_owned(),
                expected: "integer",
            })?,
    };

    let next = current
        .checked_add(delta)
        .ok_or_else(|| StorageError::InvalidValue {
            key: key.to_owned(),
            expected: "integer in range",
        })?;
    Ok(next.into_store_bytes())
}

/// A transaction-scoped handle buffering commands for atomic execution.
#[must_use = "a pipeline does nothing until end_transaction is called"]
pub struct Pipeline<'a, S: PrimitiveStorage + ?Sized> {
    storage: &'a S,
    mutations: Vec<Mutation>,
}

impl<'a, S: PrimitiveStorage + ?Sized> Pipeline<'a, S> {
    /// Start an empty pipeline against `storage`.
    pub fn new(storage: &'a S) -> Self {
        Self {
            storage,
            mutations: Vec::new(),
        }
    }

    /// Queue a write.
    pub fn set(&mut self, key: impl Into<String>, value: impl StoreValue) -> &mut Self {
        self.push(Mutation::set(key, value))
    }

    /// Queue a delete.
    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Mutation::delete(key))
    }

    /// Queue an increment.
    pub fn incr(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Mutation::incr(key))
    }

    /// Queue a decrement.
    pub fn decr(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Mutation::decr(key))
    }

    /// Queue an arbitrary mutation.
    pub fn push(&mut self, mutation: Mutation) -> &mut Self {
        self.mutations.push(mutation);
        self
    }

    /// Queued mutations, in order.
    #[must_use]
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// Number of queued mutations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Execute every queued mutation atomically.
    pub fn end_transaction(self) -> StorageResult<()> {
        if self.mutations.is_empty() {
            return Ok(());
        }
        tracing::trace!("executing pipeline with {} mutations", self.mutations.len());
        self.storage.execute(self.mutations)
    }
}
