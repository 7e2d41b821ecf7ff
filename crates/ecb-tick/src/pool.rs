//! Transaction pool.
//!
//! Request handlers push into a shared [`TxPool`] while a tick runs; at the
//! start of the next tick the runner drains it into a [`TxQueue`], an
//! immutable snapshot that the tick executes and the pending record
//! persists.

use std::{collections::BTreeMap, sync::Arc};

use parking_lot::Mutex;
use serde_json::Value;

use crate::{
    message::MessageTypeId,
    transaction::{SignedTransaction, TxHash},
};

/// One queued message with its envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct TxData {
    pub msg: Value,
    pub tx_hash: TxHash,
    pub tx: Arc<SignedTransaction>,
}

impl TxData {
    /// Decode the message into its payload type.
    pub fn msg_as<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.msg.clone())
    }
}

/// Transactions grouped by message type, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct TxQueue {
    by_type: BTreeMap<MessageTypeId, Vec<TxData>>,
    len: usize,
}

impl TxQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message, returning its hash.
    pub fn add_transaction(
        &mut self,
        type_id: MessageTypeId,
        msg: Value,
        tx: SignedTransaction,
    ) -> TxHash {
        let tx_hash = tx.hash.clone();
        self.by_type.entry(type_id).or_default().push(TxData {
            msg,
            tx_hash: tx_hash.clone(),
            tx: Arc::new(tx),
        });
        self.len += 1;
        tx_hash
    }

    /// Queued transactions of one message type.
    #[must_use]
    pub fn for_message(&self, type_id: MessageTypeId) -> &[TxData] {
        self.by_type
            .get(&type_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Total number of queued transactions.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Every transaction, ordered by message type then arrival.
    pub fn iter(&self) -> impl Iterator<Item = (MessageTypeId, &TxData)> + '_ {
        self.by_type
            .iter()
            .flat_map(|(id, txs)| txs.iter().map(move |tx| (*id, tx)))
    }

    /// Move every transaction of `other` to the back of this queue.
    pub fn append(&mut self, other: Self) {
        for (type_id, mut txs) in other.by_type {
            self.len += txs.len();
            self.by_type.entry(type_id).or_default().append(&mut txs);
        }
    }

    /// Hashes of every transaction, in [`iter`](Self::iter) order.
    pub fn hashes(&self) -> Vec<TxHash> {
        self.iter().map(|(_, tx)| tx.tx_hash.clone()).collect()
    }
}

/// Thread-safe pool that producers append to between ticks.
#[derive(Debug, Default)]
pub struct TxPool {
    queue: Mutex<TxQueue>,
}

impl TxPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message, returning its hash.
    pub fn add_transaction(
        &self,
        type_id: MessageTypeId,
        msg: Value,
        tx: SignedTransaction,
    ) -> TxHash {
        self.queue.lock().add_transaction(type_id, msg, tx)
    }

    /// Copy of the queued transactions of one message type.
    pub fn for_message(&self, type_id: MessageTypeId) -> Vec<TxData> {
        self.queue.lock().for_message(type_id).to_vec()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Take every queued transaction, leaving the pool empty.
    pub fn copy_transactions(&self) -> TxQueue {
        std::mem::take(&mut *self.queue.lock())
    }

    /// Put a drained queue back ahead of anything queued since.
    pub fn requeue(&self, mut queue: TxQueue) {
        let mut current = self.queue.lock();
        queue.append(std::mem::take(&mut *current));
        *current = queue;
    }
}
