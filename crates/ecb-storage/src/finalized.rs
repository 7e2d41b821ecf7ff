//! Committed-only view of the store.
//!
//! [`FinalizedState`] reads straight from the backing store and never sees
//! the command buffer, so it only ever observes fully finalized ticks. The
//! archetype table is cached but reloaded whenever an id is missing, since
//! new archetypes may have been committed since the last load.

use std::{collections::BTreeMap, sync::Arc};

use ecb_ecs::{
    ArchetypeId, ArchetypeIndex, ComponentId, ComponentMetadata, ComponentRegistry,
    ComponentValue, EcsError, EntityId,
};
use ecb_query::ComponentFilter;
use parking_lot::RwLock;

use crate::{
    PrimitiveStorage,
    error::{OptionalExt, StorageError, StorageResult},
    keys::{self, ComponentKey},
    persisted,
    reader::Reader,
};

/// Read-only access to the last finalized tick.
pub struct FinalizedState<S: PrimitiveStorage> {
    storage: Arc<S>,
    registry: Arc<ComponentRegistry>,
    archetypes: RwLock<ArchetypeIndex>,
}

impl<S: PrimitiveStorage> FinalizedState<S> {
    /// Create a reader, loading the persisted archetype table.
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
            archetypes: RwLock::new(archetypes),
        }
    }

    /// Registry used for decoding.
    #[must_use]
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Replace the cached archetype table with the stored one.
    pub fn reload_archetypes(&self) -> StorageResult<()> {
        let index = persisted::load_archetypes(&*self.storage, &self.registry)?;
        *self.archetypes.write() = index;
        Ok(())
    }

    fn components_of(&self, archetype: ArchetypeId) -> StorageResult<Vec<ComponentId>> {
        let cached = self
            .archetypes
            .read()
            .components(archetype)
            .map(<[ComponentId]>::to_vec);
        if let Ok(components) = cached {
            return Ok(components);
        }
        self.reload_archetypes()?;
        Ok(self.archetypes.read().components(archetype)?.to_vec())
    }

    fn metadata_on_entity(
        &self,
        component: ComponentId,
        entity: EntityId,
    ) -> StorageResult<&ComponentMetadata> {
        let metadata = self.registry.metadata(component)?;
        let components = self.get_component_types_for_entity(entity)?;
        if components.binary_search(&component).is_err() {
            return Err(StorageError::ComponentNotOnEntity {
                component: metadata.name(),
                entity,
            });
        }
        Ok(metadata)
    }

    /// Committed value of a component on an entity.
    pub fn get_component_for_entity(
        &self,
        component: ComponentId,
        entity: EntityId,
    ) -> StorageResult<Box<dyn ComponentValue>> {
        let metadata = self.metadata_on_entity(component, entity)?;
        let key = ComponentKey::new(component, entity).store_key();
        match self.storage.get_bytes(&key).optional()? {
            Some(bytes) => Ok(metadata.decode(&bytes)?),
            None => Ok(metadata.default_value()),
        }
    }

    /// Committed value of a component on an entity, as stored.
    pub fn get_component_for_entity_raw_json(
        &self,
        component: ComponentId,
        entity: EntityId,
    ) -> StorageResult<Vec<u8>> {
        let metadata = self.metadata_on_entity(component, entity)?;
        let key = ComponentKey::new(component, entity).store_key();
        match self.storage.get_bytes(&key).optional()? {
            Some(bytes) => Ok(bytes),
            None => Ok(metadata.encode(&*metadata.default_value())?),
        }
    }

    /// Every committed component on an entity, keyed by name.
    pub fn get_all_components_for_entity_raw_json(
        &self,
        entity: EntityId,
    ) -> StorageResult<BTreeMap<&'static str, Vec<u8>>> {
        let mut out = BTreeMap::new();
        for component in self.get_component_types_for_entity(entity)? {
            let name = self.registry.metadata(component)?.name();
            out.insert(name, self.get_component_for_entity_raw_json(component, entity)?);
        }
        Ok(out)
    }

    /// Sorted component ids of a committed entity.
    pub fn get_component_types_for_entity(&self, entity: EntityId) -> StorageResult<Vec<ComponentId>> {
        let archetype = persisted::load_entity_archetype(&*self.storage, entity)?;
        self.components_of(archetype)
    }

    /// Sorted component ids of a committed archetype.
    pub fn get_component_types_for_arch_id(
        &self,
        archetype: ArchetypeId,
    ) -> StorageResult<Vec<ComponentId>> {
        self.components_of(archetype)
    }

    /// Archetype of a committed component set.
    pub fn get_arch_id_for_components(
        &self,
        components: &[ComponentId],
    ) -> StorageResult<ArchetypeId> {
        let cached = self.archetypes.read().find(components);
        if let Ok(id) = cached {
            return Ok(id);
        }
        self.reload_archetypes()?;
        Ok(self.archetypes.read().find(components)?)
    }

    /// Committed entities of an archetype.
    pub fn get_entities_for_arch_id(&self, archetype: ArchetypeId) -> StorageResult<Vec<EntityId>> {
        if !self.archetypes.read().contains(archetype) {
            self.reload_archetypes()?;
            if !self.archetypes.read().contains(archetype) {
                return Err(EcsError::UnknownArchetype(archetype).into());
            }
        }
        persisted::load_active_entities(&*self.storage, archetype)
    }

    /// Committed archetypes matching `filter`.
    pub fn find_archetypes(&self, filter: &ComponentFilter) -> StorageResult<Vec<ArchetypeId>> {
        self.reload_archetypes()?;
        let archetypes = self.archetypes.read();

        let mut out = Vec::new();
        for (archetype, components) in archetypes.iter() {
            if filter.matches(&self.registry.names(components)?) {
                out.push(archetype);
            }
        }
        Ok(out)
    }

    /// Number of committed archetypes.
    pub fn archetype_count(&self) -> StorageResult<usize> {
        self.reload_archetypes()?;
        Ok(self.archetypes.read().len())
    }

    /// Committed entities in every archetype matching `filter`.
    pub fn search(&self, filter: &ComponentFilter) -> StorageResult<Vec<EntityId>> {
        let mut out = Vec::new();
        for archetype in self.find_archetypes(filter)? {
            out.extend(persisted::load_active_entities(&*self.storage, archetype)?);
        }
        Ok(out)
    }

    /// Number of the last finalized tick, or -1 if none has been finalized.
    pub fn get_last_finalized_tick(&self) -> StorageResult<i64> {
        let end = self.storage.get_i64(keys::END_TICK).optional()?;
        Ok(end.map_or(-1, |end| end - 1))
    }
}

impl<S: PrimitiveStorage> Reader for FinalizedState<S> {
    fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    fn get_component_for_entity(
        &mut self,
        component: ComponentId,
        entity: EntityId,
    ) -> StorageResult<Box<dyn ComponentValue>> {
        Self::get_component_for_entity(self, component, entity)
    }

    fn get_component_for_entity_raw_json(
        &mut self,
        component: ComponentId,
        entity: EntityId,
    ) -> StorageResult<Vec<u8>> {
        Self::get_component_for_entity_raw_json(self, component, entity)
    }

    fn get_component_types_for_entity(
        &mut self,
        entity: EntityId,
    ) -> StorageResult<Vec<ComponentId>> {
        Self::get_component_types_for_entity(self, entity)
    }

    fn get_component_types_for_arch_id(
        &mut self,
        archetype: ArchetypeId,
    ) -> StorageResult<Vec<ComponentId>> {
        Self::get_component_types_for_arch_id(self, archetype)
    }

    fn get_arch_id_for_components(
        &mut self,
        components: &[ComponentId],
    ) -> StorageResult<ArchetypeId> {
        Self::get_arch_id_for_components(self, components)
    }

    fn get_entities_for_arch_id(&mut self, archetype: ArchetypeId) -> StorageResult<Vec<EntityId>> {
        Self::get_entities_for_arch_id(self, archetype)
    }

    fn find_archetypes(&mut self, filter: &ComponentFilter) -> StorageResult<Vec<ArchetypeId>> {
        Self::find_archetypes(self, filter)
    }

    fn archetype_count(&mut self) -> StorageResult<usize> {
        Self::archetype_count(self)
    }
}
