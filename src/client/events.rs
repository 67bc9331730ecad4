//! Lifecycle events.
//!
//! Listeners subscribe to one [`EventKind`] and receive every
//! [`LifecycleEvent`] of that kind. Emission happens after the manager has
//! released its internal lock; each listener runs isolated, so a panicking
//! listener is logged and the remaining listeners still run.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::warn;

use crate::identifiers::ListenerId;
use crate::transport::CloseCode;

// ============================================================================
// EventKind
// ============================================================================

/// Lifecycle event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A connection attempt started.
    Connecting,
    /// The connection is live.
    Connected,
    /// The connection closed.
    Disconnected,
    /// A reconnect attempt was scheduled.
    Reconnecting,
    /// Automatic reconnection gave up.
    ReconnectFailed,
    /// A transport, remote or handler error.
    Error,
    /// A named service event arrived.
    Message,
    /// An inbound frame could not be classified.
    ParseError,
    /// A write to the transport failed.
    SendError,
}

impl EventKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Connecting,
        Self::Connected,
        Self::Disconnected,
        Self::Reconnecting,
        Self::ReconnectFailed,
        Self::Error,
        Self::Message,
        Self::ParseError,
        Self::SendError,
    ];

    /// Event name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::ReconnectFailed => "reconnectFailed",
            Self::Error => "error",
            Self::Message => "message",
            Self::ParseError => "parseError",
            Self::SendError => "sendError",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ConnectionError
// ============================================================================

/// Origin of an `error` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The transport reported a failure.
    Transport,
    /// The service sent an error notice.
    Remote,
    /// A channel handler panicked.
    Handler,
}

/// Payload of an `error` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionError {
    /// Where the error came from.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
}

impl ConnectionError {
    /// Creates an error payload.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns `true` if the link may recover on its own.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.kind == ErrorKind::Transport
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

// ============================================================================
// LifecycleEvent
// ============================================================================

/// An event emitted by the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// A connection attempt started.
    Connecting {
        /// Reconnect attempts made before this one (0 for a fresh connect).
        attempt: u32,
    },

    /// The connection is live.
    Connected,

    /// The connection closed.
    Disconnected {
        /// Close code, if the transport reported one.
        code: Option<CloseCode>,
        /// Close reason.
        reason: String,
        /// `true` if caused by `disconnect()`.
        manual: bool,
    },

    /// A reconnect attempt was scheduled.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },

    /// Automatic reconnection gave up.
    ReconnectFailed {
        /// Attempts made.
        attempts: u32,
    },

    /// A transport, remote or handler error.
    Error(ConnectionError),

    /// A named service event.
    Message {
        /// Event name.
        event: String,
        /// Event payload.
        data: Value,
    },

    /// An inbound frame could not be classified.
    ParseError {
        /// Raw frame text.
        raw: String,
        /// Why classification failed.
        message: String,
    },

    /// A write to the transport failed.
    SendError {
        /// Transport error text.
        message: String,
    },
}

impl LifecycleEvent {
    /// Returns the kind listeners subscribe to.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connecting { .. } => EventKind::Connecting,
            Self::Connected => EventKind::Connected,
            Self::Disconnected { .. } => EventKind::Disconnected,
            Self::Reconnecting { .. } => EventKind::Reconnecting,
            Self::ReconnectFailed { .. } => EventKind::ReconnectFailed,
            Self::Error(_) => EventKind::Error,
            Self::Message { .. } => EventKind::Message,
            Self::ParseError { .. } => EventKind::ParseError,
            Self::SendError { .. } => EventKind::SendError,
        }
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// Lifecycle listener callback.
pub type Listener = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Kind → registered listeners, in registration order.
#[derive(Default)]
pub(crate) struct EventBus {
    listeners: RwLock<FxHashMap<EventKind, Vec<(ListenerId, Listener)>>>,
}

impl EventBus {
    pub(crate) fn on(&self, kind: EventKind, listener: Listener) -> ListenerId {
        let id = ListenerId::next();
        self.listeners
            .write()
            .entry(kind)
            .or_default()
            .push((id, listener));
        id
    }

    pub(crate) fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(registered) = listeners.get_mut(&kind) else {
            return false;
        };

        let before = registered.len();
        registered.retain(|(listener_id, _)| *listener_id != id);
        let removed = registered.len() != before;

        if registered.is_empty() {
            listeners.remove(&kind);
        }
        removed
    }

    /// Calls every listener of the event's kind.
    ///
    /// The listener list is snapshotted first, so listeners may call
    /// `on`/`off` without deadlocking.
    pub(crate) fn emit(&self, event: &LifecycleEvent) {
        let kind = event.kind();
        let snapshot: Vec<Listener> = match self.listeners.read().get(&kind) {
            Some(registered) => registered.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return,
        };

        for listener in snapshot {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(event))) {
                warn!(event = %kind, panic = %panic_message(&*panic), "Lifecycle listener panicked");
            }
        }
    }

    pub(crate) fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.read().get(&kind).map_or(0, Vec::len)
    }
}

/// Extracts the message of a caught panic.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter(hits: &Arc<AtomicUsize>) -> Listener {
        let hits = Arc::clone(hits);
        Arc::new(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(EventKind::ReconnectFailed.to_string(), "reconnectFailed");
        assert_eq!(EventKind::ParseError.as_str(), "parseError");
        assert_eq!(EventKind::ALL.len(), 9);
    }

    #[test]
    fn test_emit_reaches_matching_kind_only() {
        let bus = EventBus::default();
        let connected = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));
        bus.on(EventKind::Connected, counter(&connected));
        bus.on(EventKind::Error, counter(&errors));

        bus.emit(&LifecycleEvent::Connected);
        bus.emit(&LifecycleEvent::Connected);

        assert_eq!(connected.load(Ordering::SeqCst), 2);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_off_removes_listener() {
        let bus = EventBus::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let id = bus.on(EventKind::Connected, counter(&hits));

        assert!(bus.off(EventKind::Connected, id));
        assert!(!bus.off(EventKind::Connected, id));
        bus.emit(&LifecycleEvent::Connected);

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(bus.listener_count(EventKind::Connected), 0);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let bus = EventBus::default();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.on(EventKind::Connected, Arc::new(|_| panic!("listener bug")));
        bus.on(EventKind::Connected, counter(&hits));

        bus.emit(&LifecycleEvent::Connected);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_may_register_during_emit() {
        let bus = Arc::new(EventBus::default());
        let inner = Arc::clone(&bus);
        bus.on(
            EventKind::Connected,
            Arc::new(move |_| {
                inner.on(EventKind::Connected, Arc::new(|_| {}));
            }),
        );

        bus.emit(&LifecycleEvent::Connected);
        assert_eq!(bus.listener_count(EventKind::Connected), 2);
    }

    #[test]
    fn test_event_kind_mapping() {
        let event = LifecycleEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_secs(1),
        };
        assert_eq!(event.kind(), EventKind::Reconnecting);
        assert_eq!(
            LifecycleEvent::Error(ConnectionError::new(ErrorKind::Remote, "x")).kind(),
            EventKind::Error
        );
    }

    #[test]
    fn test_panic_message() {
        let caught = catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(&*caught), "boom");
    }
}
