#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_fields_in_debug)]

//! ECB ECS - identities and indices for the entity command buffer.
//!
//! This crate holds the pieces of the ECS data model that are independent of
//! any backing store:
//!
//! - **Component**: a serializable type registered under a unique name
//! - **ComponentRegistry**: assigns [`ComponentId`]s and per-type descriptors
//! - **Archetype**: the canonical set of components an entity carries
//! - **ArchetypeIndex**: maps canonical sets to stable [`ArchetypeId`]s
//! - **EntityIdCounter**: lazily loaded, never-reused entity id allocator
//!
//! The command buffer in `ecb-storage` composes these with a key-value store.

mod archetype;
mod component;
mod entity;
mod error;

pub use archetype::{
    ActiveEntities, ArchetypeId, ArchetypeIndex, ArchetypeTable, ComponentSet, Origin,
    canonicalize,
};
pub use component::{
    Component, ComponentId, ComponentMetadata, ComponentRegistry, ComponentValue, shape_of,
};
pub use entity::{EntityId, EntityIdCounter};
pub use error::{EcsError, EcsResult};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{ArchetypeId, Component, ComponentId, ComponentValue, EntityId};
}
