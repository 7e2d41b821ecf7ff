//! Entity identifiers and the pending id allocator.
//!
//! Entity ids are never reused. The next free id lives in the backing
//! store; [`EntityIdCounter`] loads it once and then hands out ids purely
//! in memory, tracking how many are pending until the tick commits.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A unique identifier for an entity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Create an entity ID from a raw value.
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allocator for entity ids with a one-shot load and an in-memory delta.
///
/// ```text
///   saved (from store)      pending
///   ┌───────────────┐ ┌───────────────┐
///   0 .. saved-1      saved .. saved+pending-1     <- next id = saved + pending
/// ```
///
/// `discard` forgets the delta and the loaded value, so the same ids are
/// issued again after a rollback. `commit` folds the delta into `saved`.
#[derive(Debug, Default, Clone)]
pub struct EntityIdCounter {
    saved: u64,
    pending: u64,
    loaded: bool,
}

impl EntityIdCounter {
    /// Create an unloaded counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the saved value has been loaded.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Allocate the next id, calling `load` first if the counter is not loaded.
    pub fn next_with<E>(&mut self, load: impl FnOnce() -> Result<u64, E>) -> Result<EntityId, E> {
        if !self.loaded {
            self.saved = load()?;
            self.pending = 0;
            self.loaded = true;
        }

        let id = EntityId(self.saved + self.pending);
        self.pending += 1;
        Ok(id)
    }

    /// Number of ids allocated since the last commit or discard.
    #[must_use]
    pub const fn pending(&self) -> u64 {
        self.pending
    }

    /// The value the store should hold after commit, if anything changed.
    #[must_use]
    pub const fn next_to_persist(&self) -> Option<u64> {
        if self.pending == 0 {
            None
        } else {
            Some(self.saved + self.pending)
        }
    }

    /// Fold pending ids into the saved value.
    pub fn commit(&mut self) {
        self.saved += self.pending;
        self.pending = 0;
    }

    /// Drop pending ids and force a reload on next allocation.
    pub fn discard(&mut self) {
        self.pending = 0;
        self.loaded = false;
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    fn load(value: u64) -> impl FnOnce() -> Result<u64, Infallible> {
        move || Ok(value)
    }

    #[test]
    fn test_counter_loads_once() {
        let mut counter = EntityIdCounter::new();
        let mut loads = 0;

        for expected in 5..8 {
            let id = counter
                .next_with(|| {
                    loads += 1;
                    Ok::<_, Infallible>(5)
                })
                .unwrap();
            assert_eq!(id.as_raw(), expected);
        }

        assert_eq!(loads, 1);
        assert_eq!(counter.pending(), 3);
        assert_eq!(counter.next_to_persist(), Some(8));
    }

    #[test]
    fn test_discard_reissues_ids() {
        let mut counter = EntityIdCounter::new();
        let first = counter.next_with(load(10)).unwrap();
        counter.discard();

        assert!(!counter.is_loaded());
        assert_eq!(counter.next_to_persist(), None);
        assert_eq!(counter.next_with(load(10)).unwrap(), first);
    }

    #[test]
    fn test_commit_advances_saved() {
        let mut counter = EntityIdCounter::new();
        counter.next_with(load(0)).unwrap();
        counter.next_with(load(0)).unwrap();
        counter.commit();

        assert_eq!(counter.pending(), 0);
        assert_eq!(counter.next_to_persist(), None);
        assert_eq!(counter.next_with(load(99)).unwrap().as_raw(), 2);
    }

    #[test]
    fn test_load_error_leaves_counter_unloaded() {
        let mut counter = EntityIdCounter::new();
        let result = counter.next_with(|| Err("store down"));

        assert_eq!(result, Err("store down"));
        assert!(!counter.is_loaded());
    }
}
