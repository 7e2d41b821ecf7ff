//! Tick controller for the ECB state store.
//!
//! A tick is one simulation step whose writes reach the store atomically or
//! not at all. Before any game logic runs, the transactions the tick will
//! execute are persisted together with the start counter, so a crash at any
//! point can be resumed by replaying the same transactions.
//!
//! # Tick Execution Model
//!
//! ```text
//! Tick N:
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Phase 1: Drain the TxPool (immutable TxQueue snapshot)     │
//! │  Phase 2: Persist pending record + START-TICK (atomic)      │
//! │  Phase 3: Run the system against the CommandBuffer          │
//! │  Phase 4: Flush buffer + END-TICK (atomic)                  │
//! └─────────────────────────────────────────────────────────────┘
//!
//! Restart with START-TICK > END-TICK:
//!   recover() rebuilds the TxQueue from the pending record and
//!   the runner re-executes tick N from Phase 3.
//! ```

mod controller;
mod error;
mod message;
mod pending;
mod pool;
mod runner;
pub mod telemetry;
mod transaction;

pub use controller::TickStorage;
pub use error::{TickError, TickResult};
pub use message::{MessageType, MessageTypeId};
pub use pool::{TxData, TxPool, TxQueue};
pub use runner::{TickConfig, TickRunner};
pub use transaction::{SignedTransaction, TxHash};
