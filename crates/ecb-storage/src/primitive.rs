//! The backing-store contract.
//!
//! Any transactional key-value store can back the command buffer as long
//! as it implements [`PrimitiveStorage`]: point reads of raw bytes,
//! atomic execution of a batch of [`Mutation`]s, and key enumeration.
//! Typed scalar accessors are layered on top as provided methods.

use std::str::FromStr;

use crate::{
    buffer::{Mutation, Pipeline, StoreValue},
    error::{StorageError, StorageResult},
};

fn parse<T: FromStr>(key: &str, bytes: &[u8], expected: &'static str) -> StorageResult<T> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| text.trim().parse().ok())
        .ok_or_else(|| StorageError::InvalidValue {
            key: key.to_owned(),
            expected,
        })
}

/// A transactional key-value store.
pub trait PrimitiveStorage: Send + Sync {
    /// Read the raw bytes at `key`.
    ///
    /// Returns [`StorageError::NotFound`] when the key is absent.
    fn get_bytes(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Apply every mutation, in order, as one atomic unit.
    ///
    /// On error the store must be left exactly as it was.
    fn execute(&self, mutations: Vec<Mutation>) -> StorageResult<()>;

    /// All keys currently in the store.
    fn keys(&self) -> StorageResult<Vec<String>>;

    /// Remove every key.
    fn clear(&self) -> StorageResult<()>;

    /// Flush and release the store. Closing twice is not an error.
    fn close(&self) -> StorageResult<()>;

    /// Read an unsigned integer.
    fn get_u64(&self, key: &str) -> StorageResult<u64> {
        parse(key, &self.get_bytes(key)?, "u64")
    }

    /// Read a signed 64-bit integer.
    fn get_i64(&self, key: &str) -> StorageResult<i64> {
        parse(key, &self.get_bytes(key)?, "i64")
    }

    /// Read a platform-width integer.
    fn get_int(&self, key: &str) -> StorageResult<isize> {
        parse(key, &self.get_bytes(key)?, "int")
    }

    /// Read a 64-bit float.
    fn get_f64(&self, key: &str) -> StorageResult<f64> {
        parse(key, &self.get_bytes(key)?, "f64")
    }

    /// Read a 32-bit float.
    fn get_f32(&self, key: &str) -> StorageResult<f32> {
        parse(key, &self.get_bytes(key)?, "f32")
    }

    /// Read a boolean. Accepts `true`/`false` and `1`/`0`.
    fn get_bool(&self, key: &str) -> StorageResult<bool> {
        let bytes = self.get_bytes(key)?;
        match bytes.as_slice() {
            b"1" => Ok(true),
            b"0" => Ok(false),
            other => parse(key, other, "bool"),
        }
    }

    /// Write a single key.
    fn set(&self, key: &str, value: impl StoreValue) -> StorageResult<()>
    where
        Self: Sized,
    {
        self.execute(vec![Mutation::set(key, value)])
    }

    /// Increment an integer key, treating absent as zero.
    fn incr(&self, key: &str) -> StorageResult<()> {
        self.execute(vec![Mutation::incr(key)])
    }

    /// Decrement an integer key, treating absent as zero.
    fn decr(&self, key: &str) -> StorageResult<()> {
        self.execute(vec![Mutation::decr(key)])
    }

    /// Delete a key.
    fn delete(&self, key: &str) -> StorageResult<()> {
        self.execute(vec![Mutation::delete(key)])
    }

    /// Begin buffering commands for one atomic transaction.
    fn start_transaction(&self) -> Pipeline<'_, Self> {
        Pipeline::new(self)
    }
}
