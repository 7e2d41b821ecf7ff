//! Archetype index - stable ids for canonical component sets.
//!
//! An archetype represents a unique combination of component types. The
//! index maps each canonical (sorted, duplicate-free) component set to an
//! [`ArchetypeId`]. Ids are dense and assigned in creation order; once an
//! id is durable it is never reassigned.
//!
//! ```text
//! {Bar, Foo} ──canonicalize──► [1, 2] ──archetype_map──► ArchetypeId(0)
//! {Foo, Bar} ──canonicalize──► [1, 2] ──────────────────┘
//! ```
//!
//! Newly created ids stay *pending* until [`ArchetypeIndex::commit_pending`].
//! [`ArchetypeIndex::rollback_pending`] forgets them again.

use std::{collections::BTreeMap, fmt};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{
    component::ComponentId,
    entity::EntityId,
    error::{EcsError, EcsResult},
};

/// Unique identifier for an archetype.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    /// Create an archetype ID from a raw value.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArchetypeId({})", self.0)
    }
}

impl fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A canonical component set.
pub type ComponentSet = SmallVec<[ComponentId; 8]>;

/// Persisted form of the index: archetype id to its component ids.
pub type ArchetypeTable = BTreeMap<ArchetypeId, Vec<ComponentId>>;

/// Sort a component set and reject duplicates and empty sets.
pub fn canonicalize(ids: &[ComponentId]) -> EcsResult<ComponentSet> {
    if ids.is_empty() {
        return Err(EcsError::EmptyComponentSet);
    }

    let mut set: ComponentSet = ids.iter().copied().collect();
    set.sort_unstable();

    if let Some(pair) = set.windows(2).find(|pair| pair[0] == pair[1]) {
        return Err(EcsError::DuplicateComponent(pair[0]));
    }

    Ok(set)
}

/// Where an entity was before its first move in the current tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// The entity did not exist at the last commit.
    Created,
    /// The entity lived in this archetype at the last commit.
    Archetype(ArchetypeId),
}

/// Index of all known archetypes.
#[derive(Clone, Default)]
pub struct ArchetypeIndex {
    /// Component sets indexed by archetype id.
    archetypes: Vec<ComponentSet>,
    /// Canonical component set to archetype.
    archetype_map: HashMap<ComponentSet, ArchetypeId>,
    /// Ids created since the last commit, in creation order.
    pending: Vec<ArchetypeId>,
}

impl ArchetypeIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the index from a persisted table.
    ///
    /// The table must describe a dense id range starting at 0.
    pub fn from_table(table: &ArchetypeTable) -> EcsResult<Self> {
        let mut index = Self::new();

        for (expected, (&id, components)) in (0u32..).zip(table) {
            if id.as_raw() != expected {
                return Err(EcsError::SparseArchetypeTable {
                    expected,
                    found: id.as_raw(),
                });
            }
            let set = canonicalize(components)?;
            index.archetype_map.insert(set.clone(), id);
            index.archetypes.push(set);
        }

        Ok(index)
    }

    /// Snapshot the index for persistence.
    #[must_use]
    pub fn to_table(&self) -> ArchetypeTable {
        self.iter()
            .map(|(id, components)| (id, components.to_vec()))
            .collect()
    }

    /// Find the archetype for a component set, creating a pending one if absent.
    pub fn get_or_create(&mut self, ids: &[ComponentId]) -> EcsResult<ArchetypeId> {
        let set = canonicalize(ids)?;
        if let Some(&id) = self.archetype_map.get(&set) {
            return Ok(id);
        }

        let id = ArchetypeId(self.archetypes.len() as u32);
        self.archetype_map.insert(set.clone(), id);
        self.archetypes.push(set);
        self.pending.push(id);

        tracing::debug!("archetype created: {id:?} components={ids:?}");
        Ok(id)
    }

    /// Find the archetype for a component set.
    pub fn find(&self, ids: &[ComponentId]) -> EcsResult<ArchetypeId> {
        let set = canonicalize(ids)?;
        self.archetype_map
            .get(&set)
            .copied()
            .ok_or(EcsError::ArchetypeNotFound)
    }

    /// Get the sorted component ids of an archetype.
    pub fn components(&self, id: ArchetypeId) -> EcsResult<&[ComponentId]> {
        self.archetypes
            .get(id.as_raw() as usize)
            .map(SmallVec::as_slice)
            .ok_or(EcsError::UnknownArchetype(id))
    }

    /// Check whether an archetype id exists.
    #[must_use]
    pub fn contains(&self, id: ArchetypeId) -> bool {
        (id.as_raw() as usize) < self.archetypes.len()
    }

    /// Iterate over all archetypes in id order.
    pub fn iter(&self) -> impl Iterator<Item = (ArchetypeId, &[ComponentId])> {
        (0u32..)
            .zip(&self.archetypes)
            .map(|(id, set)| (ArchetypeId(id), set.as_slice()))
    }

    /// Number of archetypes, pending included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    /// Whether the index has no archetypes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    /// Archetypes created since the last commit.
    #[must_use]
    pub fn pending(&self) -> &[ArchetypeId] {
        &self.pending
    }

    /// Mark all pending archetypes as durable.
    pub fn commit_pending(&mut self) {
        self.pending.clear();
    }

    /// Forget every archetype created since the last commit.
    pub fn rollback_pending(&mut self) {
        let Some(&first) = self.pending.first() else {
            return;
        };

        for set in self.archetypes.drain(first.as_raw() as usize..) {
            self.archetype_map.remove(&set);
        }
        tracing::debug!("rolled back {} pending archetypes", self.pending.len());
        self.pending.clear();
    }
}

impl fmt::Debug for ArchetypeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchetypeIndex")
            .field("archetypes", &self.archetypes)
            .field("pending", &self.pending)
            .finish()
    }
}

/// Entities currently in one archetype, with a dirty flag.
///
/// Removal swaps with the last element, so order is not preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveEntities {
    ids: Vec<EntityId>,
    modified: bool,
}

impl ActiveEntities {
    /// Wrap a list loaded from the store. Starts clean.
    #[must_use]
    pub fn new(ids: Vec<EntityId>) -> Self {
        Self {
            ids,
            modified: false,
        }
    }

    /// The entity ids.
    #[must_use]
    pub fn ids(&self) -> &[EntityId] {
        &self.ids
    }

    /// Whether the list must be rewritten at commit.
    #[must_use]
    pub const fn is_modified(&self) -> bool {
        self.modified
    }

    /// Append an entity.
    pub fn push(&mut self, id: EntityId) {
        self.ids.push(id);
        self.modified = true;
    }

    /// Remove an entity by swapping it with the last element.
    pub fn swap_remove(&mut self, id: EntityId) -> EcsResult<()> {
        let index = self
            .ids
            .iter()
            .position(|&other| other == id)
            .ok_or(EcsError::EntityNotActive(id.as_raw()))?;
        self.ids.swap_remove(index);
        self.modified = true;
        Ok(())
    }

    /// Clear the dirty flag after the list has been persisted.
    pub fn mark_clean(&mut self) {
        self.modified = false;
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
