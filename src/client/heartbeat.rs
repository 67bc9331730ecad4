//! Heartbeat monitor.
//!
//! While the link is Connected a ping is written every interval. Each tick
//! is a one-shot timer carrying a generation number; the tick re-arms the
//! next one. Disarming cancels the armed timer and bumps the generation, so
//! a tick that was already on its way is rejected by [`accept_tick`].
//!
//! [`accept_tick`]: HeartbeatMonitor::accept_tick

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::identifiers::TimerId;
use crate::timer::{Scheduler, TimerCallback};

// ============================================================================
// HeartbeatMonitor
// ============================================================================

/// Periodic keepalive driven by a [`Scheduler`].
#[derive(Debug)]
pub(crate) struct HeartbeatMonitor {
    interval: Duration,
    armed: Option<(TimerId, u64)>,
    generation: u64,
}

impl HeartbeatMonitor {
    /// Creates a stopped monitor. A zero interval never arms.
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            armed: None,
            generation: 0,
        }
    }

    /// Arms the next tick.
    ///
    /// `tick` builds the timer callback from the tick's generation. Any
    /// previously armed tick is cancelled first.
    pub(crate) fn arm<F>(&mut self, scheduler: &dyn Scheduler, tick: F)
    where
        F: FnOnce(u64) -> TimerCallback,
    {
        if self.interval.is_zero() {
            return;
        }

        self.disarm(scheduler);
        let generation = self.generation;
        let id = scheduler.schedule(self.interval, tick(generation));
        self.armed = Some((id, generation));
    }

    /// Cancels the armed tick, if any, and invalidates in-flight ticks.
    pub(crate) fn disarm(&mut self, scheduler: &dyn Scheduler) {
        if let Some((id, _)) = self.armed.take() {
            scheduler.cancel(id);
        }
        self.generation = self.generation.wrapping_add(1);
    }

    /// Claims a fired tick. Returns `false` for stale generations.
    pub(crate) fn accept_tick(&mut self, generation: u64) -> bool {
        match self.armed {
            Some((_, armed)) if armed == generation => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
