//! Sampling clock that throttles full stack captures
//!
//! Full captures are expensive, so a background thread advances a tick counter
//! once per period and each call site may take at most one full capture per
//! tick. A site is *armed* while the current tick is newer than the last tick
//! it captured on.
//!
//! The clock is started once when the agent attaches and never stopped: the
//! thread is detached and ends with the process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::AgentError;

/// Tick value a site has never captured on
pub const NEVER_CAPTURED: u64 = 0;

/// Periodic sampling clock
#[derive(Debug)]
pub struct Metronome {
    tick: AtomicU64,
    period: Duration,
}

impl Metronome {
    /// Create a clock that is armed for its first tick
    pub fn new(period: Duration) -> Self {
        Self {
            tick: AtomicU64::new(NEVER_CAPTURED + 1),
            period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Current tick
    pub fn current(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    /// Advance to the next tick, re-arming every site
    pub fn advance(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Try to claim the current tick for a site
    ///
    /// `last` is the site's last captured tick. Returns `true` for exactly one
    /// caller per site per tick; concurrent callers racing on the same site
    /// see `false` once one of them has won.
    pub fn try_claim(&self, last: &AtomicU64) -> bool {
        let now = self.current();
        let seen = last.load(Ordering::Acquire);
        if seen >= now {
            return false;
        }
        last.compare_exchange(seen, now, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Spawn the detached ticking thread
    pub fn start(self: &Arc<Self>) -> Result<(), AgentError> {
        let metronome = Arc::clone(self);
        thread::Builder::new()
            .name("type-pollution-metronome".into())
            .spawn(move || loop {
                thread::sleep(metronome.period);
                metronome.advance();
            })
            .map_err(|source| AgentError::Spawn {
                name: "metronome",
                source,
            })?;

        tracing::debug!(period_ms = self.period.as_millis() as u64, "metronome started");
        Ok(())
    }
}
