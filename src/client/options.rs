//! Connection options.
//!
//! Static configuration for a [`ConnectionManager`](super::ConnectionManager).
//! Credentials are not part of it; they are passed to `connect()` per session.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use realtime_link::ConnectionOptions;
//!
//! let options = ConnectionOptions::new("wss://feeds.example.com/ws")
//!     .with_reconnect_delay(Duration::from_millis(500))
//!     .with_max_reconnect_attempts(10)
//!     .with_heartbeat_interval(Duration::from_secs(15));
//!
//! assert!(options.validate().is_ok());
//! ```
//!
//! Options also deserialize from JSON with defaults for every missing key:
//!
//! ```
//! use realtime_link::ConnectionOptions;
//!
//! let options: ConnectionOptions =
//!     serde_json::from_str(r#"{ "endpoint": "ws://localhost:8080", "backoff_factor": 1.5 }"#).unwrap();
//! assert_eq!(options.reconnect_delay_ms, 1000);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Defaults
// ============================================================================

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_max_reconnect_delay_ms() -> u64 {
    30_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

// ============================================================================
// ConnectionOptions
// ============================================================================

/// Recognized connection options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Service endpoint (`ws://` or `wss://`).
    pub endpoint: String,

    /// Delay before the first reconnect attempt.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Upper bound for the backoff delay.
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    /// Multiplier applied per failed attempt.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Give up after this many consecutive attempts. `None` retries forever.
    #[serde(default)]
    pub max_reconnect_attempts: Option<u32>,

    /// Keepalive ping interval while connected. `0` disables heartbeats.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Timeout used by `request_default`.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_reconnect_attempts: None,
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionOptions {
    /// Creates options for `endpoint` with default timings.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Sets the endpoint.
    #[inline]
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the initial reconnect delay.
    #[inline]
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Sets the maximum reconnect delay.
    #[inline]
    #[must_use]
    pub fn with_max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.max_reconnect_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Sets the backoff growth factor.
    #[inline]
    #[must_use]
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Limits consecutive reconnect attempts.
    #[inline]
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    /// Retries forever.
    #[inline]
    #[must_use]
    pub fn with_unlimited_reconnects(mut self) -> Self {
        self.max_reconnect_attempts = None;
        self
    }

    /// Sets the heartbeat interval. `Duration::ZERO` disables heartbeats.
    #[inline]
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Sets the default request timeout.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl ConnectionOptions {
    /// Initial reconnect delay.
    #[inline]
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Maximum reconnect delay.
    #[inline]
    #[must_use]
    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }

    /// Heartbeat interval (zero when disabled).
    #[inline]
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Default request timeout.
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ConnectionOptions {
    /// Validates the options and returns the parsed endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the endpoint is missing, unparsable or
    /// not `ws`/`wss`, if a delay is zero, if the maximum delay is below the
    /// initial delay, or if the backoff factor is below 1.
    pub fn validate(&self) -> Result<Url> {
        if self.endpoint.is_empty() {
            return Err(Error::config(
                "Endpoint is required. Use .endpoint() to set it.\n\
                 Example: ConnectionManager::builder().endpoint(\"wss://host/ws\")",
            ));
        }

        let url = Url::parse(&self.endpoint)
            .map_err(|e| Error::config(format!("Invalid endpoint '{}': {e}", self.endpoint)))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "Endpoint scheme must be ws or wss, got '{}'",
                url.scheme()
            )));
        }

        if self.reconnect_delay_ms == 0 {
            return Err(Error::config("reconnect_delay_ms must be positive"));
        }

        if self.max_reconnect_delay_ms < self.reconnect_delay_ms {
            return Err(Error::config(format!(
                "max_reconnect_delay_ms ({}) is below reconnect_delay_ms ({})",
                self.max_reconnect_delay_ms, self.reconnect_delay_ms
            )));
        }

        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(Error::config(format!(
                "backoff_factor must be a finite number >= 1, got {}",
                self.backoff_factor
            )));
        }

        if self.request_timeout_ms == 0 {
            return Err(Error::config("request_timeout_ms must be positive"));
        }

        Ok(url)
    }
}

// ============================================================================
// Tests
// ============================================================================
