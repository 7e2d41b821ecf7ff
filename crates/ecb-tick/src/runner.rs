//! Drives ticks end to end.

use std::sync::Arc;

use ecb_storage::{CommandBuffer, GameState, PrimitiveStorage};
use tracing::{info, warn};

use crate::{
    controller::TickStorage,
    error::TickResult,
    message::MessageType,
    pool::{TxPool, TxQueue},
};

/// Runner settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickConfig {
    /// Recover an interrupted tick as soon as the runner opens.
    pub recover_on_start: bool,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            recover_on_start: true,
        }
    }
}

impl TickConfig {
    /// Read settings from the environment.
    ///
    /// `ECB_TICK_RECOVER_ON_START` accepts `true`/`false`, `yes`/`no`, `on`/`off` or
    /// `1`/`0`, in any case. Anything else keeps the default.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let recover_on_start = match std::env::var("ECB_TICK_RECOVER_ON_START") {
            Ok(raw) => parse_flag(&raw).unwrap_or_else(|| {
                warn!(
                    "ignoring ECB_TICK_RECOVER_ON_START={raw:?}, using {}",
                    defaults.recover_on_start
                );
                defaults.recover_on_start
            }),
            Err(_) => defaults.recover_on_start,
        };
        Self { recover_on_start }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Owns the game state and the transaction pool and runs one tick at a time.
pub struct TickRunner<S: PrimitiveStorage> {
    state: GameState<S>,
    pool: Arc<TxPool>,
    messages: Vec<MessageType>,
    recovered: Option<TxQueue>,
}

impl<S: PrimitiveStorage> TickRunner<S> {
    /// Wrap an initialized state.
    pub fn open(
        state: GameState<S>,
        messages: Vec<MessageType>,
        config: TickConfig,
    ) -> TickResult<Self> {
        let mut runner = Self {
            state,
            pool: Arc::new(TxPool::new()),
            messages,
            recovered: None,
        };
        // Fails early if the state was never initialized.
        runner.state.ecb()?;
        if config.recover_on_start {
            runner.recover_if_needed()?;
        }
        Ok(runner)
    }

    /// Handle producers push transactions into.
    #[must_use]
    pub fn pool(&self) -> Arc<TxPool> {
        Arc::clone(&self.pool)
    }

    #[must_use]
    pub const fn state(&self) -> &GameState<S> {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut GameState<S> {
        &mut self.state
    }

    #[must_use]
    pub fn messages(&self) -> &[MessageType] {
        &self.messages
    }

    /// `(start, end)` tick counters.
    pub fn tick_numbers(&mut self) -> TickResult<(u64, u64)> {
        self.state.ecb()?.get_tick_numbers()
    }

    /// Whether a tick was started but never finalized.
    pub fn needs_recovery(&mut self) -> TickResult<bool> {
        let (start, end) = self.tick_numbers()?;
        Ok(start > end)
    }

    /// Reload the interrupted tick's transactions, if there is one.
    ///
    /// The next call to [`tick`](Self::tick) re-runs them.
    pub fn recover_if_needed(&mut self) -> TickResult<bool> {
        let ecb = self.state.ecb()?;
        let (start, end) = ecb.get_tick_numbers()?;
        if start <= end {
            return Ok(false);
        }

        warn!("tick {end} was started but not finalized, recovering");
        self.recovered = Some(ecb.recover(&self.messages)?);
        Ok(true)
    }

    /// Run one tick and return its number.
    ///
    /// Drains the pool, records it as pending, runs `system` against the
    /// command buffer and finalizes. If `system` fails its changes are
    /// discarded and the tick stays in flight; the next call re-runs it with
    /// the same transactions.
    pub fn tick<F>(&mut self, system: F) -> TickResult<u64>
    where
        F: FnOnce(&mut CommandBuffer<S>, &TxQueue) -> TickResult<()>,
    {
        let ecb = self.state.ecb()?;
        let (start, end) = ecb.get_tick_numbers()?;

        let queue = if start > end {
            match self.recovered.take() {
                Some(queue) => queue,
                None => ecb.recover(&self.messages)?,
            }
        } else {
            let queue = self.pool.copy_transactions();
            if let Err(err) = ecb.start_next_tick(&self.messages, &queue) {
                self.pool.requeue(queue);
                return Err(err);
            }
            queue
        };

        if let Err(err) = system(&mut *ecb, &queue) {
            warn!("system failed during tick {end}, discarding its changes: {err}");
            ecb.discard_pending();
            return Err(err);
        }

        TickStorage::finalize_tick(ecb)?;
        info!("tick {end} complete");
        Ok(end)
    }

    /// Give back the state.
    pub fn into_state(self) -> GameState<S> {
        self.state
    }
}
