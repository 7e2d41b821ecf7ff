//! The tick-scoped command buffer.
//!
//! Every mutation made during a tick lands in an in-memory overlay and is
//! readable immediately. Nothing reaches the store until the overlay is
//! flushed as a single pipeline by [`CommandBuffer::finalize_tick`].
//!
//! # Rollback
//!
//! The first time an entity changes archetype in a tick, the archetype it
//! came from is recorded in `origins` (or [`Origin::Created`] for entities
//! born this tick). [`CommandBuffer::discard_pending`] walks that map to put
//! every entity back exactly one hop, then drops the overlay, the id
//! allocation delta and every archetype that was never persisted.
//!
//! ```text
//!   committed ──create/move/set──▶ overlay ──finalize──▶ committed'
//!       ▲                             │
//!       └────────── discard ──────────┘
//! ```

use std::{collections::hash_map::Entry, sync::Arc};

use ecb_ecs::{
    ActiveEntities, ArchetypeId, ArchetypeIndex, ComponentId, ComponentRegistry, ComponentSet,
    ComponentValue, EcsError, EntityId, EntityIdCounter, Origin,
};
use ecb_query::ComponentFilter;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    PrimitiveStorage,
    buffer::Pipeline,
    error::{OptionalExt, StorageError, StorageResult},
    keys::{self, ComponentKey},
    persisted,
    reader::{Reader, Writer},
};

/// In-memory overlay of uncommitted entity and component changes.
///
/// Single-writer: one tick drives the buffer at a time.
pub struct CommandBuffer<S: PrimitiveStorage> {
    storage: Arc<S>,
    registry: Arc<ComponentRegistry>,

    /// Component values written or read this tick.
    values: FxHashMap<ComponentKey, Box<dyn ComponentValue>>,
    /// Component keys to delete at commit.
    to_delete: FxHashSet<ComponentKey>,

    /// Active entity sets loaded so far.
    active: FxHashMap<ArchetypeId, ActiveEntities>,
    entity_ids: EntityIdCounter,
    /// Current archetype of every entity touched so far.
    entity_archetype: FxHashMap<EntityId, ArchetypeId>,
    /// Archetype of each moved entity at the last commit.
    origins: FxHashMap<EntityId, Origin>,

    archetypes: ArchetypeIndex,
}

impl<S: PrimitiveStorage> CommandBuffer<S> {
    /// Create a buffer, loading the persisted archetype table.
    pub fn new(storage: Arc<S>, registry: Arc<ComponentRegistry>) -> StorageResult<Self> {
        let archetypes = persisted::load_archetypes(&*storage, &registry)?;
        Ok(Self::with_archetypes(storage, registry, archetypes))
    }

    pub(crate) fn with_archetypes(
        storage: Arc<S>,
        registry: Arc<ComponentRegistry>,
        archetypes: ArchetypeIndex,
    ) -> Self {
        Self {
            storage,
            registry,
            values: FxHashMap::default(),
            to_delete: FxHashSet::default(),
            active: FxHashMap::default(),
            entity_ids: EntityIdCounter::new(),
            entity_archetype: FxHashMap::default(),
            origins: FxHashMap::default(),
            archetypes,
        }
    }

    /// The backing store.
    #[must_use]
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// The archetype index, pending archetypes included.
    #[must_use]
    pub fn archetypes(&self) -> &ArchetypeIndex {
        &self.archetypes
    }

    /// Whether anything is waiting to be committed.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.values.is_empty()
            || !self.to_delete.is_empty()
            || !self.origins.is_empty()
            || self.entity_ids.pending() > 0
            || !self.archetypes.pending().is_empty()
            || self.active.values().any(ActiveEntities::is_modified)
    }

    // ==================== Lookups ====================

    fn archetype_of(&mut self, entity: EntityId) -> StorageResult<ArchetypeId> {
        if let Some(&archetype) = self.entity_archetype.get(&entity) {
            return Ok(archetype);
        }
        // Moved this tick but no longer mapped: removed.
        if self.origins.contains_key(&entity) {
            return Err(StorageError::EntityDoesNotExist(entity));
        }

        let archetype = persisted::load_entity_archetype(&*self.storage, entity)?;
        self.entity_archetype.insert(entity, archetype);
        Ok(archetype)
    }

    fn active_mut(&mut self, archetype: ArchetypeId) -> StorageResult<&mut ActiveEntities> {
        match self.active.entry(archetype) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let ids = persisted::load_active_entities(&*self.storage, archetype)?;
                Ok(entry.insert(ActiveEntities::new(ids)))
            }
        }
    }

    /// Resolve the archetype of `entity`, checking it carries `component`.
    fn require_component(
        &mut self,
        component: ComponentId,
        entity: EntityId,
    ) -> StorageResult<ArchetypeId> {
        let name = self.registry.metadata(component)?.name();
        let archetype = self.archetype_of(entity)?;
        if self
            .archetypes
            .components(archetype)?
            .binary_search(&component)
            .is_err()
        {
            return Err(StorageError::ComponentNotOnEntity { component: name, entity });
        }
        Ok(archetype)
    }

    fn move_entity(
        &mut self,
        entity: EntityId,
        from: ArchetypeId,
        to: ArchetypeId,
    ) -> StorageResult<()> {
        // Load both sets up front so a failed read leaves nothing half-moved.
        self.active_mut(from)?;
        self.active_mut(to)?;

        self.active_mut(from)?.swap_remove(entity)?;
        self.active_mut(to)?.push(entity);
        self.origins.entry(entity).or_insert(Origin::Archetype(from));
        self.entity_archetype.insert(entity, to);
        Ok(())
    }

    // ==================== Commit ====================

    fn build_pipeline(&self) -> StorageResult<Pipeline<'_, S>> {
        let mut pipe = self.storage.start_transaction();

        for key in &self.to_delete {
            pipe.delete(key.store_key());
        }
        for (key, value) in &self.values {
            let bytes = self.registry.metadata(key.component)?.encode(&**value)?;
            pipe.set(key.store_key(), bytes);
        }

        if let Some(next) = self.entity_ids.next_to_persist() {
            pipe.set(keys::NEXT_ENTITY_ID, next);
        }
        if !self.archetypes.pending().is_empty() {
            pipe.set(
                keys::ARCHETYPE_TABLE,
                serde_json::to_vec(&self.archetypes.to_table())?,
            );
        }

        for (&entity, &origin) in &self.origins {
            let key = keys::archetype_for_entity(entity);
            match self.entity_archetype.get(&entity) {
                None => {
                    pipe.delete(key);
                }
                Some(&current) if origin == Origin::Archetype(current) => {}
                Some(&current) => {
                    pipe.set(key, current.as_raw());
                }
            }
        }

        for (&archetype, active) in &self.active {
            if active.is_modified() {
                pipe.set(
                    keys::active_entities(archetype),
                    serde_json::to_vec(active.ids())?,
                );
            }
        }

        Ok(pipe)
    }

    fn mark_committed(&mut self) {
        self.values.clear();
        self.to_delete.clear();
        self.origins.clear();
        for active in self.active.values_mut() {
            active.mark_clean();
        }
        self.entity_ids.commit();
        self.archetypes.commit_pending();
    }

    /// Flush the overlay plus whatever `extra` queues, as one transaction.
    ///
    /// On failure the overlay is discarded and the store is unchanged.
    pub(crate) fn commit_with(
        &mut self,
        extra: impl FnOnce(&mut Pipeline<'_, S>),
    ) -> StorageResult<()> {
        let result = self.build_pipeline().and_then(|mut pipe| {
            extra(&mut pipe);
            pipe.end_transaction()
        });

        match result {
            Ok(()) => {
                self.mark_committed();
                Ok(())
            }
            Err(err) => {
                tracing::warn!("commit failed, discarding pending changes: {err}");
                self.discard_pending();
                Err(err)
            }
        }
    }

    /// Flush pending changes without touching the tick counters.
    pub fn commit_pending(&mut self) -> StorageResult<()> {
        self.commit_with(|_| {})
    }

    /// Flush pending changes and advance the end-of-tick counter atomically.
    ///
    /// Does not look at the start-of-tick counter; the tick controller
    /// checks that a tick is in flight before calling this.
    pub fn finalize_tick(&mut self) -> StorageResult<()> {
        let span = tracing::debug_span!("ecb.tick.finalize", ops = tracing::field::Empty);
        let _enter = span.enter();

        self.commit_with(|pipe| {
            pipe.incr(keys::END_TICK);
            span.record("ops", pipe.len());
        })?;

        tracing::debug!("tick finalized");
        Ok(())
    }

    /// Drop every uncommitted change.
    ///
    /// Afterwards every read reproduces the state of the last commit, and
    /// the same entity ids are issued again.
    pub fn discard_pending(&mut self) {
        for (entity, origin) in self.origins.drain() {
            match origin {
                Origin::Created => {
                    self.entity_archetype.remove(&entity);
                }
                Origin::Archetype(archetype) => {
                    self.entity_archetype.insert(entity, archetype);
                }
            }
        }

        self.values.clear();
        self.to_delete.clear();
        self.active.clear();
        self.entity_ids.discard();
        self.archetypes.rollback_pending();

        tracing::debug!("discarded pending changes");
    }

    /// Close the backing store.
    pub fn close(&self) -> StorageResult<()> {
        self.storage.close()
    }
}

impl<S: PrimitiveStorage> Reader for CommandBuffer<S> {
    fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    fn get_component_for_entity(
        &mut self,
        component: ComponentId,
        entity: EntityId,
    ) -> StorageResult<Box<dyn ComponentValue>> {
        let key = ComponentKey::new(component, entity);
        if let Some(value) = self.values.get(&key) {
            return Ok(value.clone_value());
        }

        self.require_component(component, entity)?;

        let registry = Arc::clone(&self.registry);
        let metadata = registry.metadata(component)?;
        let value = if self.to_delete.contains(&key) {
            metadata.default_value()
        } else {
            match self.storage.get_bytes(&key.store_key()).optional()? {
                Some(bytes) => metadata.decode(&bytes)?,
                None => metadata.default_value(),
            }
        };

        self.values.insert(key, value.clone_value());
        Ok(value)
    }

    fn get_component_for_entity_raw_json(
        &mut self,
        component: ComponentId,
        entity: EntityId,
    ) -> StorageResult<Vec<u8>> {
        let value = self.get_component_for_entity(component, entity)?;
        Ok(self.registry.metadata(component)?.encode(&*value)?)
    }

    fn get_component_types_for_entity(
        &mut self,
        entity: EntityId,
    ) -> StorageResult<Vec<ComponentId>> {
        let archetype = self.archetype_of(entity)?;
        Ok(self.archetypes.components(archetype)?.to_vec())
    }

    fn get_component_types_for_arch_id(
        &mut self,
        archetype: ArchetypeId,
    ) -> StorageResult<Vec<ComponentId>> {
        Ok(self.archetypes.components(archetype)?.to_vec())
    }

    fn get_arch_id_for_components(
        &mut self,
        components: &[ComponentId],
    ) -> StorageResult<ArchetypeId> {
        Ok(self.archetypes.find(components)?)
    }

    fn get_entities_for_arch_id(&mut self, archetype: ArchetypeId) -> StorageResult<Vec<EntityId>> {
        if !self.archetypes.contains(archetype) {
            return Err(EcsError::UnknownArchetype(archetype).into());
        }
        Ok(self.active_mut(archetype)?.ids().to_vec())
    }

    fn find_archetypes(&mut self, filter: &ComponentFilter) -> StorageResult<Vec<ArchetypeId>> {
        let mut out = Vec::new();
        for (archetype, components) in self.archetypes.iter() {
            if filter.matches(&self.registry.names(components)?) {
                out.push(archetype);
            }
        }
        Ok(out)
    }

    fn archetype_count(&mut self) -> StorageResult<usize> {
        Ok(self.archetypes.len())
    }
}

impl<S: PrimitiveStorage> Writer for CommandBuffer<S> {
    fn create_many_entities(
        &mut self,
        count: usize,
        components: &[&dyn ComponentValue],
    ) -> StorageResult<Vec<EntityId>> {
        let mut ids = ComponentSet::new();
        for value in components {
            ids.push(self.registry.id_by_name(value.component_name())?);
        }
        let archetype = self.archetypes.get_or_create(&ids)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        self.active_mut(archetype)?;

        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            let entity = self
                .entity_ids
                .next_with(|| persisted::load_next_entity_id(&*self.storage))?;

            self.active_mut(archetype)?.push(entity);
            self.entity_archetype.insert(entity, archetype);
            self.origins.insert(entity, Origin::Created);
            for (&component, value) in ids.iter().zip(components) {
                self.values
                    .insert(ComponentKey::new(component, entity), value.clone_value());
            }
            created.push(entity);
        }

        tracing::trace!("created {count} entities in {archetype:?}");
        Ok(created)
    }

    fn set_component_for_entity(
        &mut self,
        entity: EntityId,
        value: &dyn ComponentValue,
    ) -> StorageResult<()> {
        let component = self.registry.id_by_name(value.component_name())?;
        self.require_component(component, entity)?;

        let key = ComponentKey::new(component, entity);
        self.to_delete.remove(&key);
        self.values.insert(key, value.clone_value());
        Ok(())
    }

    fn add_component_to_entity(
        &mut self,
        component: ComponentId,
        entity: EntityId,
    ) -> StorageResult<()> {
        let name = self.registry.metadata(component)?.name();
        let from = self.archetype_of(entity)?;

        let current = self.archetypes.components(from)?;
        if current.contains(&component) {
            return Err(StorageError::ComponentAlreadyOnEntity { component: name, entity });
        }
        let mut next = ComponentSet::from_slice(current);
        next.push(component);

        let to = self.archetypes.get_or_create(&next)?;
        self.move_entity(entity, from, to)
    }

    fn remove_component_from_entity(
        &mut self,
        component: ComponentId,
        entity: EntityId,
    ) -> StorageResult<()> {
        let name = self.registry.metadata(component)?.name();
        let from = self.archetype_of(entity)?;

        let current = self.archetypes.components(from)?;
        if !current.contains(&component) {
            return Err(StorageError::ComponentNotOnEntity { component: name, entity });
        }
        if current.len() == 1 {
            return Err(StorageError::EntityMustHaveAtLeastOneComponent(entity));
        }
        let next: ComponentSet = current.iter().copied().filter(|&c| c != component).collect();

        let to = self.archetypes.get_or_create(&next)?;
        self.move_entity(entity, from, to)?;

        let key = ComponentKey::new(component, entity);
        self.values.remove(&key);
        self.to_delete.insert(key);
        Ok(())
    }

    fn remove_entity(&mut self, entity: EntityId) -> StorageResult<()> {
        let archetype = self.archetype_of(entity)?;
        self.active_mut(archetype)?.swap_remove(entity)?;
        self.origins.entry(entity).or_insert(Origin::Archetype(archetype));
        self.entity_archetype.remove(&entity);

        let components = ComponentSet::from_slice(self.archetypes.components(archetype)?);
        for component in components {
            let key = ComponentKey::new(component, entity);
            self.values.remove(&key);
            self.to_delete.insert(key);
        }

        tracing::trace!("removed entity {entity}");
        Ok(())
    }
}

impl<S: PrimitiveStorage> std::fmt::Debug for CommandBuffer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("values", &self.values.len())
            .field("to_delete", &self.to_delete.len())
            .field("moved", &self.origins.len())
            .field("pending_ids", &self.entity_ids.pending())
            .field("archetypes", &self.archetypes.len())
            .finish_non_exhaustive()
    }
}
