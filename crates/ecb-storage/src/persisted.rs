//! Loaders for committed state.
//!
//! Shared by the command buffer (read-through on cache miss) and the
//! finalized reader (which never caches entity data).

use ecb_ecs::{ArchetypeId, ArchetypeIndex, ArchetypeTable, ComponentRegistry, EntityId};

use crate::{
    PrimitiveStorage,
    error::{OptionalExt, StorageError, StorageResult},
    keys,
};

/// Load the archetype table, checking every component id is registered.
pub fn load_archetypes<S: PrimitiveStorage + ?Sized>(
    storage: &S,
    registry: &ComponentRegistry,
) -> StorageResult<ArchetypeIndex> {
    let Some(bytes) = storage.get_bytes(keys::ARCHETYPE_TABLE).optional()? else {
        return Ok(ArchetypeIndex::new());
    };

    let table: ArchetypeTable = serde_json::from_slice(&bytes)?;
    for components in table.values() {
        for &id in components {
            if registry.get(id).is_none() {
                return Err(StorageError::ComponentMismatchWithSavedState(id));
            }
        }
    }

    let index = ArchetypeIndex::from_table(&table)?;
    tracing::debug!("loaded {} archetypes", index.len());
    Ok(index)
}

/// Load the committed active entity list of an archetype.
pub fn load_active_entities<S: PrimitiveStorage + ?Sized>(
    storage: &S,
    archetype: ArchetypeId,
) -> StorageResult<Vec<EntityId>> {
    match storage.get_bytes(&keys::active_entities(archetype)).optional()? {
        Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
        None => Ok(Vec::new()),
    }
}

/// Load the committed archetype of an entity.
pub fn load_entity_archetype<S: PrimitiveStorage + ?Sized>(
    storage: &S,
    entity: EntityId,
) -> StorageResult<ArchetypeId> {
    let key = keys::archetype_for_entity(entity);
    let Some(raw) = storage.get_int(&key).optional()? else {
        return Err(StorageError::EntityDoesNotExist(entity));
    };
    u32::try_from(raw)
        .map(ArchetypeId::from_raw)
        .map_err(|_| StorageError::InvalidValue {
            key,
            expected: "archetype id",
        })
}

/// Load the next unassigned entity id.
pub fn load_next_entity_id<S: PrimitiveStorage + ?Sized>(storage: &S) -> StorageResult<u64> {
    Ok(storage.get_u64(keys::NEXT_ENTITY_ID).optional()?.unwrap_or(0))
}
