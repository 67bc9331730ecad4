//! Connection state.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::transport::Credential;

// ============================================================================
// ConnectionState
// ============================================================================

/// Link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection and no attempt in progress.
    #[default]
    Disconnected,
    /// An attempt is in progress.
    Connecting,
    /// The link is live.
    Connected,
}

impl ConnectionState {
    /// Returns `true` when Connected.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self == Self::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

// ============================================================================
// Connection
// ============================================================================

/// The single connection record, reused across reconnects.
#[derive(Debug, Default)]
pub(crate) struct Connection {
    pub(crate) state: ConnectionState,
    /// Consecutive reconnect attempts since the last successful open.
    pub(crate) attempt_count: u32,
    /// Credential from the last `connect()`; reused by reconnects.
    pub(crate) credential: Credential,
    pub(crate) identity: String,
    pub(crate) last_error: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disconnected() {
        let connection = Connection::default();
        assert_eq!(connection.state, ConnectionState::Disconnected);
        assert_eq!(connection.attempt_count, 0);
        assert!(connection.last_error.is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Disconnected.is_connected());
    }
}
