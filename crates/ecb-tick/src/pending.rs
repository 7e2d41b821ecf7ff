//! Pending-transaction records.
//!
//! Before a tick runs, every transaction it will execute is written under
//! `ECB:PENDING-TRANSACTIONS` as a JSON array. The envelope's hash is not
//! part of its serialized form, so each record carries it alongside.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{TickError, TickResult},
    message::{MessageType, MessageTypeId},
    pool::TxQueue,
    transaction::{SignedTransaction, TxHash},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransaction {
    pub type_id: MessageTypeId,
    pub tx_hash: TxHash,
    pub data: Value,
    pub tx: SignedTransaction,
}

fn lookup(messages: &[MessageType], id: MessageTypeId) -> TickResult<&MessageType> {
    messages
        .iter()
        .find(|message| message.id() == id)
        .ok_or(TickError::UnknownMessageType(id))
}

/// Serialize every transaction in `queue`.
pub fn encode(messages: &[MessageType], queue: &TxQueue) -> TickResult<Vec<u8>> {
    let mut records = Vec::with_capacity(queue.len());
    for (type_id, tx) in queue.iter() {
        let message = lookup(messages, type_id)?;
        records.push(PendingTransaction {
            type_id,
            tx_hash: tx.tx_hash.clone(),
            data: message.normalize(tx.msg.clone())?,
            tx: (*tx.tx).clone(),
        });
    }
    Ok(serde_json::to_vec(&records)?)
}

/// Rebuild the queue a pending record was written from.
pub fn decode(messages: &[MessageType], bytes: &[u8]) -> TickResult<TxQueue> {
    let records: Vec<PendingTransaction> = serde_json::from_slice(bytes)?;

    let mut queue = TxQueue::new();
    for record in records {
        let message = lookup(messages, record.type_id)?;
        let msg = message.normalize(record.data)?;
        queue.add_transaction(record.type_id, msg, record.tx.with_hash(record.tx_hash));
    }
    Ok(queue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize)]
    struct Move {
        dx: i32,
    }

    fn messages() -> Vec<MessageType> {
        vec![MessageType::of::<Move>(MessageTypeId::from_raw(1), "move")]
    }

    #[test]
    fn test_record_layout() {
        let mut queue = TxQueue::new();
        queue.add_transaction(
            MessageTypeId::from_raw(1),
            serde_json::json!({"dx": 2}),
            SignedTransaction::default().with_hash("0xaa"),
        );

        let bytes = encode(&messages(), &queue).unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json[0]["typeId"], 1);
        assert_eq!(json[0]["txHash"], "0xaa");
        assert_eq!(json[0]["data"], serde_json::json!({"dx": 2}));
        assert!(json[0]["tx"].get("hash").is_none());

        let back = decode(&messages(), &bytes).unwrap();
        assert_eq!(back.hashes(), vec![TxHash::new("0xaa")]);
        assert_eq!(
            back.for_message(MessageTypeId::from_raw(1))[0].tx.hash,
            TxHash::new("0xaa")
        );
    }

    #[test]
    fn test_unknown_message_type() {
        let mut queue = TxQueue::new();
        queue.add_transaction(
            MessageTypeId::from_raw(7),
            Value::Null,
            SignedTransaction::default(),
        );
        assert!(matches!(
            encode(&messages(), &queue),
            Err(TickError::UnknownMessageType(id)) if id.raw() == 7
        ));

        let record = br#"[{"typeId":7,"txHash":"x","data":null,"tx":{"personaTag":"","namespace":"","timestamp":0,"signature":"","body":null}}]"#;
        assert!(matches!(
            decode(&messages(), record),
            Err(TickError::UnknownMessageType(_))
        ));
    }
}
