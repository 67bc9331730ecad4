//! Builder pattern for manager configuration.
//!
//! Provides a fluent API for configuring and creating [`ConnectionManager`]
//! instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use realtime_link::ConnectionManager;
//!
//! # async fn example() -> realtime_link::Result<()> {
//! let link = ConnectionManager::builder()
//!     .endpoint("wss://feeds.example.com/ws")
//!     .reconnect_delay(Duration::from_millis(500))
//!     .max_reconnect_attempts(20)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::timer::{Scheduler, TokioScheduler};
use crate::transport::{Transport, WebSocketTransport};

use super::manager::ConnectionManager;
use super::options::ConnectionOptions;

// ============================================================================
// ConnectionManagerBuilder
// ============================================================================

/// Builder for configuring a [`ConnectionManager`].
///
/// Use [`ConnectionManager::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct ConnectionManagerBuilder {
    options: ConnectionOptions,
    transport: Option<Arc<dyn Transport>>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl fmt::Debug for ConnectionManagerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManagerBuilder")
            .field("options", &self.options)
            .field("custom_transport", &self.transport.is_some())
            .field("custom_scheduler", &self.scheduler.is_some())
            .finish()
    }
}

// ============================================================================
// ConnectionManagerBuilder Implementation
// ============================================================================

impl ConnectionManagerBuilder {
    /// Creates a builder with default options and no endpoint.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the service endpoint (`ws://` or `wss://`).
    #[inline]
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.options.endpoint = endpoint.into();
        self
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the initial reconnect delay.
    #[inline]
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.options = self.options.with_reconnect_delay(delay);
        self
    }

    /// Sets the maximum reconnect delay.
    #[inline]
    #[must_use]
    pub fn max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.options = self.options.with_max_reconnect_delay(delay);
        self
    }

    /// Sets the backoff growth factor.
    #[inline]
    #[must_use]
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.options = self.options.with_backoff_factor(factor);
        self
    }

    /// Limits consecutive reconnect attempts.
    #[inline]
    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.options = self.options.with_max_reconnect_attempts(attempts);
        self
    }

    /// Sets the heartbeat interval. `Duration::ZERO` disables heartbeats.
    #[inline]
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.options = self.options.with_heartbeat_interval(interval);
        self
    }

    /// Sets the timeout used by `request_default`.
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_request_timeout(timeout);
        self
    }

    /// Uses a custom transport instead of [`WebSocketTransport`].
    #[inline]
    #[must_use]
    pub fn transport<T: Transport>(mut self, transport: Arc<T>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Uses a custom scheduler instead of [`TokioScheduler`].
    #[inline]
    #[must_use]
    pub fn scheduler<S: Scheduler>(mut self, scheduler: Arc<S>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Builds the manager with validation.
    ///
    /// The default transport and scheduler bind to the current tokio
    /// runtime; supplying both allows building outside one.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`](crate::Error::Config) if the options are invalid
    /// - [`Error::Config`](crate::Error::Config) if a default collaborator
    ///   is needed outside a tokio runtime
    pub fn build(self) -> Result<ConnectionManager> {
        let endpoint = self.options.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(WebSocketTransport::current()?),
        };

        let scheduler: Arc<dyn Scheduler> = match self.scheduler {
            Some(scheduler) => scheduler,
            None => Arc::new(TokioScheduler::current()?),
        };

        Ok(ConnectionManager::from_parts(
            endpoint,
            self.options,
            transport,
            scheduler,
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::Error;
    use crate::timer::ManualScheduler;

    #[test]
    fn test_new_creates_empty_builder() {
        let builder = ConnectionManagerBuilder::new();
        assert!(builder.options.endpoint.is_empty());
        assert!(builder.transport.is_none());
        assert!(builder.scheduler.is_none());
    }

    #[test]
    fn test_setters_update_options() {
        let builder = ConnectionManagerBuilder::new()
            .endpoint("ws://localhost:9")
            .reconnect_delay(Duration::from_millis(200))
            .max_reconnect_delay(Duration::from_secs(2))
            .backoff_factor(3.0)
            .max_reconnect_attempts(4)
            .heartbeat_interval(Duration::from_secs(5))
            .request_timeout(Duration::from_secs(1));

        assert_eq!(builder.options.endpoint, "ws://localhost:9");
        assert_eq!(builder.options.reconnect_delay_ms, 200);
        assert_eq!(builder.options.max_reconnect_delay_ms, 2000);
        assert_eq!(builder.options.backoff_factor, 3.0);
        assert_eq!(builder.options.max_reconnect_attempts, Some(4));
        assert_eq!(builder.options.heartbeat_interval_ms, 5000);
        assert_eq!(builder.options.request_timeout_ms, 1000);
    }

    #[test]
    fn test_build_fails_without_endpoint() {
        let result = ConnectionManagerBuilder::new()
            .scheduler(Arc::new(ManualScheduler::new()))
            .build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_build_fails_outside_runtime_without_collaborators() {
        let result = ConnectionManagerBuilder::new()
            .endpoint("ws://localhost:9")
            .build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_build_inside_runtime() {
        let link = ConnectionManagerBuilder::new()
            .endpoint("ws://localhost:9/feed")
            .build()
            .expect("build");
        assert_eq!(link.endpoint().as_str(), "ws://localhost:9/feed");
    }

    #[test]
    fn test_builder_is_clone() {
        let builder = ConnectionManagerBuilder::new().endpoint("ws://a");
        let cloned = builder.clone();
        assert_eq!(cloned.options.endpoint, "ws://a");
    }
}
