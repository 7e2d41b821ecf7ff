//! Signed transaction envelope.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Hex hash identifying a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(String);

impl TxHash {
    /// Wrap a hash string.
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    /// The hash as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TxHash {
    fn from(hash: &str) -> Self {
        Self::new(hash)
    }
}

impl From<String> for TxHash {
    fn from(hash: String) -> Self {
        Self(hash)
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero(salt: &u16) -> bool {
    *salt == 0
}

/// A transaction as submitted by a persona.
///
/// The hash travels out of band: it is not part of the serialized
/// envelope, so anything persisting a transaction stores it separately.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransaction {
    pub persona_tag: String,
    pub namespace: String,
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
    /// Optional extra input for hash uniqueness.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub salt: u16,
    /// Hex encoded signature.
    pub signature: String,
    pub body: serde_json::Value,
    #[serde(skip)]
    pub hash: TxHash,
}

impl SignedTransaction {
    /// Attach the transaction hash.
    #[must_use]
    pub fn with_hash(mut self, hash: impl Into<TxHash>) -> Self {
        self.hash = hash.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_layout() {
        let tx = SignedTransaction {
            persona_tag: "jeff".into(),
            namespace: "world".into(),
            timestamp: 1_700_000_000_000,
            salt: 0,
            signature: "0xabc".into(),
            body: serde_json::json!({"x": 1}),
            hash: TxHash::new("0x01"),
        };

        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "personaTag": "jeff",
                "namespace": "world",
                "timestamp": 1_700_000_000_000_i64,
                "signature": "0xabc",
                "body": {"x": 1},
            })
        );

        let back: SignedTransaction = serde_json::from_value(json).unwrap();
        assert_eq!(back.hash, TxHash::default());
        assert_eq!(back.with_hash("0x01"), tx);
    }

    #[test]
    fn test_salt_serialized_when_set() {
        let tx = SignedTransaction {
            salt: 7,
            ..SignedTransaction::default()
        };
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["salt"], 7);
    }
}
