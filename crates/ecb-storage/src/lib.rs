//! Transactional entity-component storage over a key-value store.
//!
//! This crate layers entities, archetypes and components on top of any store
//! implementing [`PrimitiveStorage`]. Mutations made during a tick collect in
//! a [`CommandBuffer`] and reach the store as one atomic pipeline when the
//! tick is finalized; a [`FinalizedState`] reads only what has been committed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  GameState                                                          │
//! │    - Registers components, persists schemas, locks the registry     │
//! └─────────────────────────────────────────────────────────────────────┘
//!                │                                   │
//!                ▼                                   ▼
//! ┌──────────────────────────────┐   ┌──────────────────────────────────┐
//! │  CommandBuffer (Writer)      │   │  FinalizedState (Reader)         │
//! │    - In-memory overlay       │   │    - Store reads only            │
//! │    - Origins for rollback    │   │    - Archetype table on demand   │
//! │    - One pipeline per tick   │   │                                  │
//! └──────────────────────────────┘   └──────────────────────────────────┘
//!                │                                   │
//!                ▼                                   ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  PrimitiveStorage (MemoryStorage, LmdbStorage)                      │
//! │    - ECB:* keys, decimal scalars, JSON structures                   │
//! │    - Pipeline executes all-or-nothing                               │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use ecb_storage::{GameState, MemoryStorage, ReaderExt, Writer, WriterExt};
//!
//! let mut state = GameState::new(MemoryStorage::new());
//! state.register_component::<Health>()?;
//! state.init()?;
//!
//! let ecb = state.ecb()?;
//! let player = ecb.create_entity(&[&Health { hp: 20 }])?;
//! ecb.set_component(player, Health { hp: 19 })?;
//! ecb.finalize_tick()?;
//!
//! let committed = state.finalized()?.get_component_for_entity(health_id, player)?;
//! ```

mod buffer;
mod command_buffer;
mod config;
mod error;
mod finalized;
pub mod keys;
mod lmdb;
mod memory;
mod persisted;
mod primitive;
mod reader;
mod state;

pub use buffer::{Mutation, Pipeline, StoreValue};
pub use command_buffer::CommandBuffer;
pub use config::{DEFAULT_DATA_DIR, DEFAULT_MAP_SIZE_MB, LmdbConfig};
pub use error::{ErrorKind, OptionalExt, StorageError, StorageResult};
pub use finalized::FinalizedState;
pub use keys::ComponentKey;
pub use lmdb::LmdbStorage;
pub use memory::MemoryStorage;
pub use primitive::PrimitiveStorage;
pub use reader::{Reader, ReaderExt, Writer, WriterExt};
pub use state::GameState;
