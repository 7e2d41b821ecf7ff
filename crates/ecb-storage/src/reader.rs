//! Read and write contracts consumed by the simulation loop.

use std::collections::BTreeMap;

use ecb_ecs::{
    ArchetypeId, Component, ComponentId, ComponentRegistry, ComponentValue, EcsError, EntityId,
};
use ecb_query::ComponentFilter;

use crate::error::{StorageError, StorageResult};

/// Component, entity and archetype lookups.
///
/// Methods take `&mut self` because the command buffer caches what it reads.
pub trait Reader {
    /// Registry the reader decodes with.
    fn registry(&self) -> &ComponentRegistry;

    /// Decoded value of a component on an entity.
    ///
    /// A component that has never been written reads as its registered default.
    fn get_component_for_entity(
        &mut self,
        component: ComponentId,
        entity: EntityId,
    ) -> StorageResult<Box<dyn ComponentValue>>;

    /// Encoded value of a component on an entity.
    fn get_component_for_entity_raw_json(
        &mut self,
        component: ComponentId,
        entity: EntityId,
    ) -> StorageResult<Vec<u8>>;

    /// Sorted component ids currently on an entity.
    fn get_component_types_for_entity(&mut self, entity: EntityId)
    -> StorageResult<Vec<ComponentId>>;

    /// Sorted component ids of an archetype.
    fn get_component_types_for_arch_id(
        &mut self,
        archetype: ArchetypeId,
    ) -> StorageResult<Vec<ComponentId>>;

    /// Archetype of a component set, in any order.
    fn get_arch_id_for_components(
        &mut self,
        components: &[ComponentId],
    ) -> StorageResult<ArchetypeId>;

    /// Entities currently in an archetype.
    fn get_entities_for_arch_id(&mut self, archetype: ArchetypeId) -> StorageResult<Vec<EntityId>>;

    /// Archetypes whose component set satisfies `filter`, in id order.
    fn find_archetypes(&mut self, filter: &ComponentFilter) -> StorageResult<Vec<ArchetypeId>>;

    /// Number of known archetypes.
    fn archetype_count(&mut self) -> StorageResult<usize>;

    /// Every component on an entity, keyed by component name.
    fn get_all_components_for_entity_raw_json(
        &mut self,
        entity: EntityId,
    ) -> StorageResult<BTreeMap<&'static str, Vec<u8>>> {
        let mut out = BTreeMap::new();
        for id in self.get_component_types_for_entity(entity)? {
            let bytes = self.get_component_for_entity_raw_json(id, entity)?;
            let name = self.registry().metadata(id)?.name();
            out.insert(name, bytes);
        }
        Ok(out)
    }

    /// Entities in every archetype matching `filter`.
    ///
    /// Archetypes are visited in id order; entities in active-set order.
    fn search(&mut self, filter: &ComponentFilter) -> StorageResult<Vec<EntityId>> {
        let mut out = Vec::new();
        for archetype in self.find_archetypes(filter)? {
            out.extend(self.get_entities_for_arch_id(archetype)?);
        }
        Ok(out)
    }
}

/// Entity and component mutation.
pub trait Writer: Reader {
    /// Create `count` entities carrying `components`.
    ///
    /// Each value is written as the initial value of its component on every
    /// new entity; the component set of the archetype is the set of names.
    fn create_many_entities(
        &mut self,
        count: usize,
        components: &[&dyn ComponentValue],
    ) -> StorageResult<Vec<EntityId>>;

    /// Create a single entity.
    fn create_entity(&mut self, components: &[&dyn ComponentValue]) -> StorageResult<EntityId> {
        let ids = self.create_many_entities(1, components)?;
        ids.first()
            .copied()
            .ok_or_else(|| StorageError::Backend("no entity id allocated".to_owned()))
    }

    /// Overwrite a component the entity already carries.
    fn set_component_for_entity(
        &mut self,
        entity: EntityId,
        value: &dyn ComponentValue,
    ) -> StorageResult<()>;

    /// Attach a component, moving the entity to a new archetype.
    fn add_component_to_entity(
        &mut self,
        component: ComponentId,
        entity: EntityId,
    ) -> StorageResult<()>;

    /// Detach a component, moving the entity to a new archetype.
    fn remove_component_from_entity(
        &mut self,
        component: ComponentId,
        entity: EntityId,
    ) -> StorageResult<()>;

    /// Destroy an entity and schedule all of its values for deletion.
    fn remove_entity(&mut self, entity: EntityId) -> StorageResult<()>;
}

/// Typed helpers over [`Reader`].
pub trait ReaderExt: Reader {
    /// Read a component by type.
    fn get_component<T: Component>(&mut self, entity: EntityId) -> StorageResult<T> {
        let id = self.registry().id_of::<T>()?;
        let value = self.get_component_for_entity(id, entity)?;
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| {
                StorageError::Ecs(EcsError::ComponentTypeMismatch {
                    expected: T::NAME,
                    actual: value.component_name(),
                })
            })
    }
}

impl<R: Reader + ?Sized> ReaderExt for R {}

/// Typed helpers over [`Writer`].
pub trait WriterExt: Writer {
    /// Overwrite a component by value.
    fn set_component<T: Component>(&mut self, entity: EntityId, value: T) -> StorageResult<()> {
        self.set_component_for_entity(entity, &value)
    }

    /// Attach a component by type.
    fn add_component<T: Component>(&mut self, entity: EntityId) -> StorageResult<()> {
        let id = self.registry().id_of::<T>()?;
        self.add_component_to_entity(id, entity)
    }

    /// Detach a component by type.
    fn remove_component<T: Component>(&mut self, entity: EntityId) -> StorageResult<()> {
        let id = self.registry().id_of::<T>()?;
        self.remove_component_from_entity(id, entity)
    }
}

impl<W: Writer + ?Sized> WriterExt for W {}
