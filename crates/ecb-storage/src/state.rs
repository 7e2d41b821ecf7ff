//! Registration and initialization lifecycle.
//!
//! A [`GameState`] starts out accepting component registrations. `init`
//! loads the archetype table, persists component schemas, locks the
//! registry and only then hands out the command buffer and the finalized
//! reader.

use std::sync::Arc;

use ecb_ecs::{Component, ComponentId, ComponentMetadata, ComponentRegistry};

use crate::{
    PrimitiveStorage,
    command_buffer::CommandBuffer,
    error::{OptionalExt, StorageError, StorageResult},
    finalized::FinalizedState,
    keys, persisted,
};

enum Phase<S: PrimitiveStorage> {
    Registering(ComponentRegistry),
    Ready(Box<Ready<S>>),
}

struct Ready<S: PrimitiveStorage> {
    registry: Arc<ComponentRegistry>,
    buffer: CommandBuffer<S>,
    finalized: Arc<FinalizedState<S>>,
}

/// Entry point owning the store, the registry and, once initialized, the
/// command buffer and the finalized reader.
pub struct GameState<S: PrimitiveStorage> {
    storage: Arc<S>,
    phase: Phase<S>,
}

impl<S: PrimitiveStorage> GameState<S> {
    /// Create a state in the registration phase.
    pub fn new(storage: S) -> Self {
        Self::from_shared(Arc::new(storage))
    }

    /// Create a state over a store that is shared with other owners.
    pub fn from_shared(storage: Arc<S>) -> Self {
        Self {
            storage,
            phase: Phase::Registering(ComponentRegistry::new()),
        }
    }

    /// Register a component using `T::default()` as its zero value.
    pub fn register_component<T: Component>(&mut self) -> StorageResult<ComponentId> {
        self.register_component_with_default(T::default())
    }

    /// Register a component with an explicit zero value.
    ///
    /// Fails if a previous run saved a different schema under the same name.
    pub fn register_component_with_default<T: Component>(
        &mut self,
        default: T,
    ) -> StorageResult<ComponentId> {
        let Phase::Registering(registry) = &mut self.phase else {
            return Err(StorageError::AlreadyInitialized);
        };

        let candidate = ComponentMetadata::with_default(ComponentId::from_raw(0), default.clone())?;
        let stored = self
            .storage
            .get_bytes(&keys::component_schema(T::NAME))
            .optional()?;
        if let Some(stored) = stored
            && !candidate.schema_matches(&stored)
        {
            return Err(StorageError::ComponentSchemaMismatch { name: T::NAME });
        }

        let id = registry.register_with_default(default)?;
        tracing::debug!("registered component {} as {id:?}", T::NAME);
        Ok(id)
    }

    /// Finish registration and make the state usable.
    pub fn init(&mut self) -> StorageResult<()> {
        let Phase::Registering(registry) = &mut self.phase else {
            return Err(StorageError::AlreadyInitialized);
        };

        let archetypes = persisted::load_archetypes(&*self.storage, registry)?;

        let mut pipe = self.storage.start_transaction();
        for metadata in registry.iter() {
            pipe.set(keys::component_schema(metadata.name()), metadata.schema());
        }
        pipe.end_transaction()?;

        registry.lock();
        let registry = Arc::new(std::mem::take(registry));

        let finalized = Arc::new(FinalizedState::with_archetypes(
            Arc::clone(&self.storage),
            Arc::clone(&registry),
            archetypes.clone(),
        ));
        let buffer = CommandBuffer::with_archetypes(
            Arc::clone(&self.storage),
            Arc::clone(&registry),
            archetypes,
        );

        tracing::info!(
            "state initialized with {} components and {} archetypes",
            registry.len(),
            buffer.archetypes().len()
        );
        self.phase = Phase::Ready(Box::new(Ready {
            registry,
            buffer,
            finalized,
        }));
        Ok(())
    }

    /// Whether `init` has completed.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        matches!(self.phase, Phase::Ready(_))
    }

    /// The component registry.
    #[must_use]
    pub fn registry(&self) -> &ComponentRegistry {
        match &self.phase {
            Phase::Registering(registry) => registry,
            Phase::Ready(ready) => &ready.registry,
        }
    }

    /// The command buffer for the tick in progress.
    pub fn ecb(&mut self) -> StorageResult<&mut CommandBuffer<S>> {
        match &mut self.phase {
            Phase::Ready(ready) => Ok(&mut ready.buffer),
            Phase::Registering(_) => Err(StorageError::NotInitialized),
        }
    }

    /// Shared handle to the committed-only reader.
    pub fn finalized(&self) -> StorageResult<Arc<FinalizedState<S>>> {
        match &self.phase {
            Phase::Ready(ready) => Ok(Arc::clone(&ready.finalized)),
            Phase::Registering(_) => Err(StorageError::NotInitialized),
        }
    }

    /// The backing store.
    #[must_use]
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Close the backing store.
    pub fn close(&self) -> StorageResult<()> {
        self.storage.close()
    }
}
