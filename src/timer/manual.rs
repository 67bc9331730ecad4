//! Simulated clock.
//!
//! [`ManualScheduler`] keeps timers in deadline order and fires them only
//! when the test advances time. Timers sharing a deadline fire in the
//! order they were armed.
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::time::Duration;
//! use realtime_link::timer::{ManualScheduler, Scheduler};
//!
//! let clock = ManualScheduler::new();
//! let fired = Arc::new(AtomicBool::new(false));
//! let flag = Arc::clone(&fired);
//! clock.schedule(Duration::from_millis(50), Box::new(move || flag.store(true, Ordering::SeqCst)));
//!
//! clock.advance(Duration::from_millis(49));
//! assert!(!fired.load(Ordering::SeqCst));
//! clock.advance(Duration::from_millis(1));
//! assert!(fired.load(Ordering::SeqCst));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::identifiers::TimerId;

use super::{Scheduler, TimerCallback};

// ============================================================================
// ManualScheduler
// ============================================================================

#[derive(Default)]
struct ClockState {
    /// Elapsed simulated time.
    now: Duration,
    /// Armed timers ordered by (deadline, arm order).
    queue: BTreeMap<(Duration, TimerId), TimerCallback>,
    /// Deadline lookup for cancellation.
    deadlines: FxHashMap<TimerId, Duration>,
}

/// Scheduler driven by explicit [`advance`](Self::advance) calls.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ClockState>,
}

impl ManualScheduler {
    /// Creates a clock at time zero with no timers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the simulated time elapsed since creation.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Returns the number of armed timers.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Returns the earliest armed deadline, if any.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.state.lock().queue.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Moves time forward by `by`, firing every timer that comes due.
    ///
    /// Callbacks run without the clock lock held and may arm new timers;
    /// those fire within the same call if their deadline is reached.
    /// Returns the number of callbacks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.state.lock().now + by;
        let mut fired = 0;

        loop {
            let callback = {
                let mut state = self.state.lock();
                let due = match state.queue.keys().next() {
                    Some(&(deadline, id)) if deadline <= target => (deadline, id),
                    _ => break,
                };
                state.deadlines.remove(&due.1);
                state.now = due.0;
                state.queue.remove(&due)
            };

            if let Some(callback) = callback {
                callback();
                fired += 1;
            }
        }

        self.state.lock().now = target;
        fired
    }

    /// Advances straight to the next deadline and fires what is due there.
    ///
    /// Returns `false` if no timer is armed.
    pub fn fire_next(&self) -> bool {
        let Some(deadline) = self.next_deadline() else {
            return false;
        };
        let now = self.now();
        self.advance(deadline.saturating_sub(now));
        true
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerId {
        let id = TimerId::next();
        let mut state = self.state.lock();
        let deadline = state.now + delay;
        state.queue.insert((deadline, id), callback);
        state.deadlines.insert(id, deadline);
        id
    }

    fn cancel(&self, id: TimerId) {
        let mut state = self.state.lock();
        if let Some(deadline) = state.deadlines.remove(&id) {
            state.queue.remove(&(deadline, id));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> TimerCallback {
        let log = Arc::clone(log);
        Box::new(move || log.lock().push(name))
    }

    #[test]
    fn test_fires_in_deadline_order() {
        let clock = ManualScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        clock.schedule(Duration::from_millis(30), recorder(&log, "late"));
        clock.schedule(Duration::from_millis(10), recorder(&log, "early"));
        clock.schedule(Duration::from_millis(10), recorder(&log, "early-second"));

        assert_eq!(clock.advance(Duration::from_millis(100)), 3);
        assert_eq!(*log.lock(), vec!["early", "early-second", "late"]);
        assert_eq!(clock.now(), Duration::from_millis(100));
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let clock = ManualScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let id = clock.schedule(Duration::from_millis(10), recorder(&log, "cancelled"));
        clock.cancel(id);

        assert_eq!(clock.pending(), 0);
        assert_eq!(clock.advance(Duration::from_secs(1)), 0);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_callback_can_rearm() {
        let clock = Arc::new(ManualScheduler::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner_clock = Arc::clone(&clock);
        let inner_log = Arc::clone(&log);
        clock.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                inner_log.lock().push("first");
                inner_clock.schedule(Duration::from_millis(10), recorder(&inner_log, "second"));
            }),
        );

        clock.advance(Duration::from_millis(15));
        assert_eq!(*log.lock(), vec!["first"]);
        clock.advance(Duration::from_millis(5));
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_fire_next_jumps_to_deadline() {
        let clock = ManualScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        clock.schedule(Duration::from_millis(250), recorder(&log, "tick"));

        assert!(clock.fire_next());
        assert_eq!(clock.now(), Duration::from_millis(250));
        assert!(!clock.fire_next());
    }
}
