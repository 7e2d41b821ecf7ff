//! ECS error types.

use thiserror::Error;

use crate::{ArchetypeId, ComponentId};

/// Error type for registry and archetype operations.
#[derive(Debug, Error)]
pub enum EcsError {
    /// The registry was locked before this registration.
    #[error("unable to register component {name:?}: registry is locked")]
    RegistryLocked { name: &'static str },

    /// Two components were registered under one name.
    #[error("component {name:?} is already registered")]
    DuplicateName { name: &'static str },

    /// No component with this name has been registered.
    #[error("component {name:?} is not registered")]
    ComponentNotRegistered { name: String },

    /// No component with this id has been registered.
    #[error("component id {0:?} is not registered")]
    UnknownComponentId(ComponentId),

    /// A value of one component type was handed to another component's descriptor.
    #[error("expected a value of component {expected:?}, got {actual:?}")]
    ComponentTypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// A component set listed the same component twice.
    #[error("duplicate components not allowed: {0:?}")]
    DuplicateComponent(ComponentId),

    /// A component set was empty.
    #[error("must provide at least 1 component")]
    EmptyComponentSet,

    /// No archetype has been assigned to this component set.
    #[error("archetype for components not found")]
    ArchetypeNotFound,

    /// The archetype id is not known to the index.
    #[error("archetype {0:?} does not exist")]
    UnknownArchetype(ArchetypeId),

    /// A persisted archetype table does not describe a dense id range.
    #[error("archetype table is not dense: expected id {expected}, found {found}")]
    SparseArchetypeTable { expected: u32, found: u32 },

    /// An entity id was not present in an active-entity list.
    #[error("entity {0} is not in the active set")]
    EntityNotActive(u64),

    /// Component payload could not be encoded or decoded.
    #[error("component codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl EcsError {
    /// Whether this error reports a missing thing rather than misuse.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ComponentNotRegistered { .. }
                | Self::UnknownComponentId(_)
                | Self::ArchetypeNotFound
                | Self::UnknownArchetype(_)
                | Self::EntityNotActive(_)
        )
    }
}

/// Result type for ECS operations.
pub type EcsResult<T> = Result<T, EcsError>;
