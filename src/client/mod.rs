//! Resilient connection client.
//!
//! This module contains the [`ConnectionManager`] and the pieces it is
//! built from.
//!
//! # Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ConnectionManager`] | Connection state machine and public API |
//! | [`BackoffSchedule`] | Reconnect delay computation |
//! | `HeartbeatMonitor` | Periodic ping while connected |
//! | [`OutboundQueue`] | Sends held while offline |
//! | [`SubscriptionRegistry`] | Channel → handlers |
//! | `RequestCorrelator` | Request id → pending request |
//! | `EventBus` | Lifecycle listeners |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | [`ConnectionManagerBuilder`] |
//! | `options` | [`ConnectionOptions`] |
//! | `events` | [`LifecycleEvent`], [`EventKind`] |
//! | `state` | [`ConnectionState`] |

// ============================================================================
// Submodules
// ============================================================================

/// Reconnect backoff.
pub mod backoff;

/// Manager builder.
pub mod builder;

/// Request correlation.
pub mod correlator;

/// Lifecycle events.
pub mod events;

/// Heartbeat monitor.
mod heartbeat;

/// Connection manager.
pub mod manager;

/// Connection options.
pub mod options;

/// Outbound queue.
pub mod queue;

/// Connection state.
pub mod state;

/// Channel subscriptions.
pub mod subscriptions;

// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::BackoffSchedule;
pub use builder::ConnectionManagerBuilder;
pub use correlator::PendingResponse;
pub use events::{ConnectionError, ErrorKind, EventKind, LifecycleEvent, Listener};
pub use manager::{ConnectionManager, Subscription};
pub use options::ConnectionOptions;
pub use queue::{OutboundQueue, QueuedMessage};
pub use state::ConnectionState;
pub use subscriptions::{ChannelHandler, SubscriptionRegistry};
