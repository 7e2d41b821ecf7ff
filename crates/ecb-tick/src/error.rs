//! Tick error types.

use ecb_storage::{ErrorKind, StorageError};
use thiserror::Error;

use crate::message::MessageTypeId;

/// Tick controller error type.
#[derive(Debug, Error)]
pub enum TickError {
    /// Error from the state store.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Recovery was requested but no pending-transaction record exists.
    #[error("no pending transactions recorded; cannot recover the interrupted tick")]
    NoPendingTransactions,

    /// A new tick was started while the previous one is unfinalized.
    #[error("tick {start} was started but not finalized (end = {end}); recover first")]
    TickInFlight { start: u64, end: u64 },

    /// A tick was finalized without being started.
    #[error("no tick in flight (start = {start}, end = {end}); nothing to finalize")]
    NoTickInFlight { start: u64, end: u64 },

    /// A pending record names a message type that is not registered.
    #[error("unknown message type {0}")]
    UnknownMessageType(MessageTypeId),

    /// A message payload did not match its registered type.
    #[error("failed to decode {name} message: {source}")]
    Decode {
        name: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// JSON codec error.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The system run during a tick failed.
    #[error("system failed: {0}")]
    System(Box<dyn std::error::Error + Send + Sync>),
}

impl TickError {
    /// Wrap an error raised by game logic.
    pub fn system(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::System(err.into())
    }

    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(err) => err.kind(),
            Self::NoPendingTransactions
            | Self::TickInFlight { .. }
            | Self::NoTickInFlight { .. }
            | Self::UnknownMessageType(_) => ErrorKind::Recovery,
            Self::Decode { .. } | Self::Codec(_) => ErrorKind::Codec,
            Self::System(_) => ErrorKind::InvariantViolation,
        }
    }
}

/// Result type for tick operations.
pub type TickResult<T> = Result<T, TickError>;
