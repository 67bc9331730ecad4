//! Tokio-backed [`Scheduler`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::TimerId;

use super::{Scheduler, TimerCallback};

// ============================================================================
// Types
// ============================================================================

/// Armed timers by id.
type TimerMap = FxHashMap<TimerId, JoinHandle<()>>;

// ============================================================================
// TokioScheduler
// ============================================================================

/// Runs each timer as a sleeping task on a tokio runtime.
///
/// A timer fires only if it is still present in the map when its sleep
/// ends; `cancel` removes the entry and aborts the task, so a cancelled
/// timer never reaches its callback.
pub struct TokioScheduler {
    /// Runtime that owns the timer tasks.
    handle: Handle,
    /// Armed timers (shared with the tasks).
    timers: Arc<Mutex<TimerMap>>,
}

impl TokioScheduler {
    /// Creates a scheduler spawning onto `handle`.
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            timers: Arc::new(Mutex::new(TimerMap::default())),
        }
    }

    /// Creates a scheduler on the runtime of the calling context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when called outside a tokio runtime.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| Error::config(format!("No tokio runtime available: {e}")))
    }

    /// Returns the number of armed timers.
    #[inline]
    #[must_use]
    pub fn active(&self) -> usize {
        self.timers.lock().len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerId {
        let id = TimerId::next();
        let timers = Arc::clone(&self.timers);

        // Insert before the task can observe the map.
        let mut guard = self.timers.lock();
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let armed = timers.lock().remove(&id).is_some();
            if armed {
                trace!(%id, "Timer fired");
                callback();
            }
        });
        guard.insert(id, task);

        id
    }

    fn cancel(&self, id: TimerId) {
        if let Some(task) = self.timers.lock().remove(&id) {
            task.abort();
            trace!(%id, "Timer cancelled");
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, task) in self.timers.lock().drain() {
            task.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
