//! Tick controller.
//!
//! Two persisted counters track progress: `start` counts ticks begun and
//! `end` counts ticks finalized. `start == end` means the last tick
//! committed; `start == end + 1` means a tick was interrupted and must be
//! recovered before new work is accepted.
//!
//! ```text
//!            start_next_tick                 finalize_tick
//!  (n, n) ─────────────────────▶ (n+1, n) ─────────────────▶ (n+1, n+1)
//!                                   │  ▲
//!                           crash / │  │ recover
//!                           failure ▼  │
//!                               (n+1, n)
//! ```

use ecb_storage::{CommandBuffer, OptionalExt, PrimitiveStorage, keys};
use tracing::info;

use crate::{
    error::{TickError, TickResult},
    message::MessageType,
    pending,
    pool::TxQueue,
};

/// Tick-level operations over the state store.
pub trait TickStorage {
    /// `(start, end)` counters. Absent counters read as zero.
    fn get_tick_numbers(&self) -> TickResult<(u64, u64)>;

    /// Persist `queue` as the pending record and advance `start`, atomically.
    fn start_next_tick(&mut self, messages: &[MessageType], queue: &TxQueue) -> TickResult<()>;

    /// Commit every buffered change and advance `end`, atomically.
    ///
    /// Only valid while a tick is in flight (`start == end + 1`).
    fn finalize_tick(&mut self) -> TickResult<()>;

    /// Rebuild the transactions of the interrupted tick.
    fn recover(&mut self, messages: &[MessageType]) -> TickResult<TxQueue>;
}

impl<S: PrimitiveStorage> TickStorage for CommandBuffer<S> {
    fn get_tick_numbers(&self) -> TickResult<(u64, u64)> {
        let storage = self.storage();
        let start = storage.get_u64(keys::START_TICK).optional()?.unwrap_or(0);
        let end = storage.get_u64(keys::END_TICK).optional()?.unwrap_or(0);
        Ok((start, end))
    }

    fn start_next_tick(&mut self, messages: &[MessageType], queue: &TxQueue) -> TickResult<()> {
        let (start, end) = self.get_tick_numbers()?;
        if start > end {
            return Err(TickError::TickInFlight { start, end });
        }

        let record = pending::encode(messages, queue)?;
        let mut pipe = self.storage().start_transaction();
        pipe.set(keys::PENDING_TRANSACTIONS, record)
            .incr(keys::START_TICK);
        pipe.end_transaction()?;

        info!("tick {start} started with {} transactions", queue.len());
        Ok(())
    }

    fn finalize_tick(&mut self) -> TickResult<()> {
        let (start, end) = self.get_tick_numbers()?;
        if start != end + 1 {
            return Err(TickError::NoTickInFlight { start, end });
        }
        CommandBuffer::finalize_tick(self)?;
        info!("tick {end} finalized");
        Ok(())
    }

    fn recover(&mut self, messages: &[MessageType]) -> TickResult<TxQueue> {
        let record = self
            .storage()
            .get_bytes(keys::PENDING_TRANSACTIONS)
            .optional()?
            .ok_or(TickError::NoPendingTransactions)?;
        let queue = pending::decode(messages, &record)?;

        self.discard_pending();
        let (start, _) = self.get_tick_numbers()?;
        info!(
            "recovered {} transactions for tick {}",
            queue.len(),
            start.saturating_sub(1)
        );
        Ok(queue)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ecb_storage::MemoryStorage;
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::{message::MessageTypeId, transaction::SignedTransaction};

    #[derive(Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    fn buffer() -> CommandBuffer<MemoryStorage> {
        CommandBuffer::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(ecb_ecs::ComponentRegistry::new()),
        )
        .unwrap()
    }

    fn ping() -> MessageType {
        MessageType::of::<Ping>(MessageTypeId::from_raw(1), "ping")
    }

    #[test]
    fn test_counters_default_to_zero() {
        assert_eq!(buffer().get_tick_numbers().unwrap(), (0, 0));
    }

    #[test]
    fn test_start_then_finalize() {
        let mut ecb = buffer();
        ecb.start_next_tick(&[ping()], &TxQueue::new()).unwrap();
        assert_eq!(ecb.get_tick_numbers().unwrap(), (1, 0));

        TickStorage::finalize_tick(&mut ecb).unwrap();
        assert_eq!(ecb.get_tick_numbers().unwrap(), (1, 1));
    }

    #[test]
    fn test_start_refused_while_in_flight() {
        let mut ecb = buffer();
        ecb.start_next_tick(&[ping()], &TxQueue::new()).unwrap();
        let err = ecb.start_next_tick(&[ping()], &TxQueue::new()).unwrap_err();
        assert!(matches!(err, TickError::TickInFlight { start: 1, end: 0 }));
    }

    #[test]
    fn test_finalize_refused_while_idle() {
        let mut ecb = buffer();
        let err = TickStorage::finalize_tick(&mut ecb).unwrap_err();
        assert!(matches!(err, TickError::NoTickInFlight { start: 0, end: 0 }));
        assert_eq!(ecb.get_tick_numbers().unwrap(), (0, 0));

        ecb.start_next_tick(&[ping()], &TxQueue::new()).unwrap();
        TickStorage::finalize_tick(&mut ecb).unwrap();
        let err = TickStorage::finalize_tick(&mut ecb).unwrap_err();
        assert!(matches!(err, TickError::NoTickInFlight { start: 1, end: 1 }));
        assert_eq!(ecb.get_tick_numbers().unwrap(), (1, 1));
    }

    #[test]
    fn test_recover_without_record() {
        let err = buffer().recover(&[ping()]).unwrap_err();
        assert!(matches!(err, TickError::NoPendingTransactions));
        assert_eq!(err.kind(), ecb_storage::ErrorKind::Recovery);
    }

    #[test]
    fn test_recover_matches_submitted() {
        let mut queue = TxQueue::new();
        for (n, hash) in [(1, "0x1"), (2, "0x2")] {
            queue.add_transaction(
                MessageTypeId::from_raw(1),
                serde_json::json!({ "n": n }),
                SignedTransaction::default().with_hash(hash),
            );
        }

        let mut ecb = buffer();
        ecb.start_next_tick(&[ping()], &queue).unwrap();

        let recovered = ecb.recover(&[ping()]).unwrap();
        assert_eq!(recovered.len(), queue.len());
        assert_eq!(recovered.hashes(), queue.hashes());
        assert_eq!(
            recovered.for_message(MessageTypeId::from_raw(1))[1].msg,
            serde_json::json!({ "n": 2 })
        );
    }
}
