//! Transport layer.
//!
//! The connection manager owns exactly one transport handle at a time and
//! reaches the wire only through it. Transports report what happens on the
//! wire by calling back into a [`TransportSink`].
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐   open(target, sink)   ┌──────────────────────┐
//! │ ConnectionManager  │───────────────────────►│ Transport            │
//! │                    │◄───────────────────────│  → TransportHandle   │
//! │                    │   opened / message /   │    send / close      │
//! │                    │   closed / error       │                      │
//! └────────────────────┘      (TransportSink)   └──────────────────────┘
//! ```
//!
//! # Contract
//!
//! - `open` must not call the sink before it returns; events are delivered
//!   later from the transport's own task.
//! - A sink belongs to one attempt. Events from a superseded attempt are
//!   ignored by the manager, so transports need not filter them.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `websocket` | tokio-tungstenite client transport |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Weak;

use url::Url;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket client transport.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use websocket::WebSocketTransport;

// ============================================================================
// CloseCode
// ============================================================================

/// WebSocket-style close code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// Normal closure.
    pub const NORMAL: Self = Self(1000);
    /// Endpoint going away.
    pub const GOING_AWAY: Self = Self(1001);
    /// Closed without a status code.
    pub const NO_STATUS: Self = Self(1005);
    /// Dropped without a close frame.
    pub const ABNORMAL: Self = Self(1006);

    /// Returns `true` for a normal (1000) closure.
    #[inline]
    #[must_use]
    pub fn is_normal(&self) -> bool {
        *self == Self::NORMAL
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Credential
// ============================================================================

/// Opaque access token attached to the connection.
///
/// `Debug` never prints the token.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wraps a token.
    #[inline]
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    #[inline]
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns `true` if no token is set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0.is_empty() {
            "Credential(<empty>)"
        } else {
            "Credential(***)"
        })
    }
}

impl From<String> for Credential {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for Credential {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

// ============================================================================
// OpenTarget
// ============================================================================

/// Everything a transport needs to open one connection.
#[derive(Debug, Clone)]
pub struct OpenTarget {
    /// Service endpoint.
    pub endpoint: Url,
    /// Access token.
    pub credential: Credential,
    /// Client identity (user id, session name).
    pub identity: String,
}

// ============================================================================
// Transport Traits
// ============================================================================

/// Factory for connections.
pub trait Transport: Send + Sync + 'static {
    /// Starts opening a connection and returns its handle immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt cannot even be started; the manager
    /// treats this like a failed attempt.
    fn open(&self, target: &OpenTarget, sink: TransportSink) -> Result<Box<dyn TransportHandle>>;
}

/// Write side of one connection.
pub trait TransportHandle: Send + Sync {
    /// Writes one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be handed to the connection.
    fn send(&self, frame: &str) -> Result<()>;

    /// Closes the connection. No sink events follow a local close.
    fn close(&self, code: CloseCode, reason: &str);
}

// ============================================================================
// TransportSink
// ============================================================================

/// Receiver of transport events, implemented by the connection manager.
pub(crate) trait SinkTarget: Send + Sync {
    fn on_open(&self, epoch: u64);
    fn on_message(&self, epoch: u64, text: &str);
    fn on_close(&self, epoch: u64, code: CloseCode, reason: String);
    fn on_error(&self, epoch: u64, message: String);
    fn on_send_failed(&self, epoch: u64, message: String);
}

/// Callback endpoint handed to a transport for one connection attempt.
///
/// Cheap to clone. Calls after the manager is dropped are no-ops.
#[derive(Clone)]
pub struct TransportSink {
    target: Weak<dyn SinkTarget>,
    epoch: u64,
}

impl TransportSink {
    pub(crate) fn new(target: Weak<dyn SinkTarget>, epoch: u64) -> Self {
        Self { target, epoch }
    }

    /// The connection is open.
    pub fn opened(&self) {
        if let Some(target) = self.target.upgrade() {
            target.on_open(self.epoch);
        }
    }

    /// A text frame arrived.
    pub fn message(&self, text: &str) {
        if let Some(target) = self.target.upgrade() {
            target.on_message(self.epoch, text);
        }
    }

    /// The remote end closed or the connection dropped.
    pub fn closed(&self, code: CloseCode, reason: impl Into<String>) {
        if let Some(target) = self.target.upgrade() {
            target.on_close(self.epoch, code, reason.into());
        }
    }

    /// The transport hit an error. Does not by itself close the connection.
    pub fn error(&self, message: impl Into<String>) {
        if let Some(target) = self.target.upgrade() {
            target.on_error(self.epoch, message.into());
        }
    }

    /// A frame already accepted by [`TransportHandle::send`] could not be
    /// written. The frame is lost.
    pub fn send_failed(&self, message: impl Into<String>) {
        if let Some(target) = self.target.upgrade() {
            target.on_send_failed(self.epoch, message.into());
        }
    }
}

impl fmt::Debug for TransportSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSink")
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
