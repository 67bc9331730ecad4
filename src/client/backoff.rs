//! Reconnect backoff.
//!
//! `delay(attempt) = min(base × factor^attempt, max)`. Pure and
//! deterministic; the scheduler decides when the delay elapses.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use super::ConnectionOptions;

// ============================================================================
// BackoffSchedule
// ============================================================================

/// Exponential delay between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffSchedule {
    base: Duration,
    max: Duration,
    factor: f64,
}

impl BackoffSchedule {
    /// Creates a schedule.
    ///
    /// A `max` below `base` is raised to `base`; a factor below 1 (or NaN)
    /// is treated as 1, so delays never shrink.
    #[must_use]
    pub fn new(base: Duration, max: Duration, factor: f64) -> Self {
        let factor = if factor >= 1.0 { factor } else { 1.0 };
        Self {
            base,
            max: max.max(base),
            factor,
        }
    }

    /// Creates the schedule configured in `options`.
    #[must_use]
    pub fn from_options(options: &ConnectionOptions) -> Self {
        Self::new(
            options.reconnect_delay(),
            options.max_reconnect_delay(),
            options.backoff_factor,
        )
    }

    /// Delay before reconnect attempt number `attempt` (0-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.base.as_millis() as f64 * self.factor.powi(exponent);
        let capped = scaled.min(self.max.as_millis() as f64);

        Duration::from_millis(capped as u64).clamp(self.base, self.max)
    }

    /// Initial delay.
    #[inline]
    #[must_use]
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Delay ceiling.
    #[inline]
    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }
}

// ============================================================================
// Tests
// ============================================================================
