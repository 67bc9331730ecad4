//! Timer scheduling.
//!
//! The connection manager never sleeps on its own. Reconnect backoff,
//! heartbeat ticks and request timeouts are all armed on an injected
//! [`Scheduler`], so the core can run against a simulated clock.
//!
//! # Implementations
//!
//! | Type | Description |
//! |------|-------------|
//! | [`TokioScheduler`] | Spawns a sleeping tokio task per timer |
//! | [`ManualScheduler`] | Simulated clock advanced explicitly |
//!
//! # Contract
//!
//! - `schedule` never runs the callback synchronously.
//! - After `cancel(id)` returns, the callback for `id` does not start.
//! - Callbacks may schedule or cancel other timers.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::identifiers::TimerId;

// ============================================================================
// Submodules
// ============================================================================

/// Simulated clock.
pub mod manual;

/// Tokio-backed scheduler.
pub mod runtime;

// ============================================================================
// Re-exports
// ============================================================================

pub use manual::ManualScheduler;
pub use runtime::TokioScheduler;

// ============================================================================
// Types
// ============================================================================

/// One-shot timer callback.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

// ============================================================================
// Scheduler
// ============================================================================

/// Schedule-after-delay and cancel.
pub trait Scheduler: Send + Sync + 'static {
    /// Arms a one-shot timer and returns its id.
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerId;

    /// Cancels a timer. Unknown or already fired ids are ignored.
    fn cancel(&self, id: TimerId);
}
