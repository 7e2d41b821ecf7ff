//! Message descriptors.
//!
//! Messages sit in the pool as JSON values. A [`MessageType`] pins each
//! message id to a concrete Rust type so payloads are validated on the way
//! into the pending record and again on the way out of recovery.

use std::fmt;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::{TickError, TickResult};

/// Identifier of a registered message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageTypeId(u32);

impl MessageTypeId {
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MessageTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Normalize = fn(Value) -> serde_json::Result<Value>;

fn normalize<T: Serialize + DeserializeOwned>(value: Value) -> serde_json::Result<Value> {
    let typed: T = serde_json::from_value(value)?;
    serde_json::to_value(typed)
}

/// Descriptor binding a message id and name to its payload type.
#[derive(Clone, Copy)]
pub struct MessageType {
    id: MessageTypeId,
    name: &'static str,
    normalize: Normalize,
}

impl MessageType {
    /// Describe message `id` whose payload is a `T`.
    #[must_use]
    pub fn of<T: Serialize + DeserializeOwned>(id: MessageTypeId, name: &'static str) -> Self {
        Self {
            id,
            name,
            normalize: normalize::<T>,
        }
    }

    #[must_use]
    pub const fn id(&self) -> MessageTypeId {
        self.id
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Check that `msg` is a valid payload, returning its canonical form.
    pub fn normalize(&self, msg: Value) -> TickResult<Value> {
        (self.normalize)(msg).map_err(|source| TickError::Decode {
            name: self.name,
            source,
        })
    }

    /// Encode a payload to bytes.
    pub fn encode(&self, msg: &Value) -> TickResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.normalize(msg.clone())?)?)
    }

    /// Decode bytes into a payload.
    pub fn decode(&self, bytes: &[u8]) -> TickResult<Value> {
        let value = serde_json::from_slice(bytes).map_err(|source| TickError::Decode {
            name: self.name,
            source,
        })?;
        self.normalize(value)
    }
}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageType")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
