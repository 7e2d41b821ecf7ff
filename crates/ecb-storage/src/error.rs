//! Storage error types.

use ecb_ecs::{ComponentId, EcsError, EntityId};
use thiserror::Error;

/// Stable classification of errors, for callers deciding what is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Something looked up does not exist. Safe to report to a user.
    NotFound,
    /// The caller asked for something the data model forbids.
    InvariantViolation,
    /// The backing store failed. The tick in flight cannot continue.
    Store,
    /// Stored bytes could not be encoded or decoded.
    Codec,
    /// Registration or initialization was used out of order.
    Lifecycle,
    /// Interrupted-tick recovery cannot proceed.
    Recovery,
}

/// Storage error type.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The key is absent from the backing store.
    #[error("key not found: {key}")]
    NotFound { key: String },

    /// Entity not found.
    #[error("entity {0} does not exist")]
    EntityDoesNotExist(EntityId),

    /// The entity does not carry this component.
    #[error("component {component:?} is not on entity {entity}")]
    ComponentNotOnEntity {
        component: &'static str,
        entity: EntityId,
    },

    /// The entity already carries this component.
    #[error("component {component:?} is already on entity {entity}")]
    ComponentAlreadyOnEntity {
        component: &'static str,
        entity: EntityId,
    },

    /// Removing the component would leave the entity empty.
    #[error("entity {0} must have at least one component")]
    EntityMustHaveAtLeastOneComponent(EntityId),

    /// Entity operations were attempted before `init`.
    #[error("state is not initialized")]
    NotInitialized,

    /// `init` or registration was attempted after `init`.
    #[error("state is already initialized")]
    AlreadyInitialized,

    /// A component's schema differs from the one saved by a previous run.
    #[error("component {name:?} does not match the schema saved in storage")]
    ComponentSchemaMismatch { name: &'static str },

    /// The saved archetype table references an unregistered component.
    #[error("saved state references unregistered component {0:?}")]
    ComponentMismatchWithSavedState(ComponentId),

    /// A stored scalar could not be parsed.
    #[error("value at {key} is not a valid {expected}")]
    InvalidValue { key: String, expected: &'static str },

    /// Registry or archetype error.
    #[error(transparent)]
    Ecs(#[from] EcsError),

    /// JSON codec error.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// LMDB error.
    #[error("lmdb error: {0}")]
    Lmdb(#[from] heed::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend failure.
    #[error("store error: {0}")]
    Backend(String),

    /// The store has been closed.
    #[error("storage is closed")]
    Closed,
}

impl StorageError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. }
            | Self::EntityDoesNotExist(_)
            | Self::ComponentNotOnEntity { .. } => ErrorKind::NotFound,
            Self::ComponentAlreadyOnEntity { .. } | Self::EntityMustHaveAtLeastOneComponent(_) => {
                ErrorKind::InvariantViolation
            }
            Self::NotInitialized
            | Self::AlreadyInitialized
            | Self::ComponentSchemaMismatch { .. }
            | Self::ComponentMismatchWithSavedState(_) => ErrorKind::Lifecycle,
            Self::InvalidValue { .. } | Self::Codec(_) => ErrorKind::Codec,
            Self::Ecs(err) => match err {
                EcsError::Codec(_) => ErrorKind::Codec,
                EcsError::RegistryLocked { .. } | EcsError::DuplicateName { .. } => {
                    ErrorKind::Lifecycle
                }
                other if other.is_not_found() => ErrorKind::NotFound,
                _ => ErrorKind::InvariantViolation,
            },
            Self::Lmdb(_) | Self::Io(_) | Self::Backend(_) | Self::Closed => ErrorKind::Store,
        }
    }

    /// Whether the key was simply absent from the store.
    #[must_use]
    pub const fn is_missing_key(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub(crate) fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Turn an absent key into `None`.
pub trait OptionalExt<T> {
    /// Map [`StorageError::NotFound`] to `Ok(None)`.
    fn optional(self) -> StorageResult<Option<T>>;
}

impl<T> OptionalExt<T> for StorageResult<T> {
    fn optional(self) -> StorageResult<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_missing_key() => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let id = EntityId::from_raw(1);
        assert_eq!(StorageError::EntityDoesNotExist(id).kind(), ErrorKind::NotFound);
        assert_eq!(
            StorageError::EntityMustHaveAtLeastOneComponent(id).kind(),
            ErrorKind::InvariantViolation
        );
        assert_eq!(
            StorageError::from(EcsError::DuplicateComponent(ComponentId::from_raw(1))).kind(),
            ErrorKind::InvariantViolation
        );
        assert_eq!(
            StorageError::from(EcsError::ArchetypeNotFound).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(StorageError::Backend("down".into()).kind(), ErrorKind::Store);
    }

    #[test]
    fn test_optional() {
        let missing: StorageResult<u8> = Err(StorageError::not_found("k"));
        assert!(missing.optional().unwrap().is_none());

        let failed: StorageResult<u8> = Err(StorageError::Closed);
        assert!(failed.optional().is_err());
    }
}
