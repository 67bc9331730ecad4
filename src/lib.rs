//! Realtime Link - Resilient multiplexed real-time channel client.
//!
//! This library keeps one logical connection open to a remote real-time
//! service and recovers from disconnection transparently.
//!
//! # Architecture
//!
//! One duplex connection carries everything:
//!
//! - **Channels**: Named subscriptions; each channel has any number of local handlers
//! - **Requests**: Tagged envelopes correlated with their responses by id
//! - **Sends**: Fire-and-forget payloads, queued while offline
//!
//! Key design principles:
//!
//! - Exactly one transport connection per [`ConnectionManager`]
//! - Exponential reconnect backoff with an optional attempt limit
//! - One subscribe directive per channel, reissued after every reconnect
//! - Timers run on an injected [`Scheduler`](timer::Scheduler), so the whole
//!   state machine can be driven by a simulated clock
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use realtime_link::{ConnectionManager, EventKind, Result};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let link = ConnectionManager::builder()
//!         .endpoint("wss://feeds.example.com/ws")
//!         .max_reconnect_attempts(10)
//!         .build()?;
//!
//!     link.on(EventKind::Reconnecting, |event| println!("{event:?}"));
//!     let _ticks = link.subscribe("ticks:BTC", |data| println!("tick {data}"));
//!
//!     link.connect("access-token", "desk-7");
//!     link.wait_connected(Duration::from_secs(5)).await?;
//!
//!     link.send(json!({ "note": "hello" }));
//!     let quote = link.request("quote", json!({ "symbol": "BTC" }), Duration::from_secs(2))?.await?;
//!     println!("Quote: {quote}");
//!
//!     link.disconnect();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`ConnectionManager`], options, lifecycle events |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire envelopes |
//! | [`timer`] | Scheduler abstraction |
//! | [`transport`] | Transport abstraction and WebSocket implementation |

// ============================================================================
// Modules
// ============================================================================

/// Connection manager and its components.
///
/// Use [`ConnectionManager::builder()`] to create a configured manager.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Wire protocol envelopes.
pub mod protocol;

/// Timer scheduling.
///
/// Injected into the manager so tests can run on a simulated clock.
pub mod timer;

/// Transport layer.
///
/// The WebSocket transport and the traits custom transports implement.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{
    BackoffSchedule, ConnectionError, ConnectionManager, ConnectionManagerBuilder,
    ConnectionOptions, ConnectionState, ErrorKind, EventKind, LifecycleEvent, PendingResponse,
    Subscription,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{HandlerId, ListenerId, RequestId, TimerId};

// Transport types
pub use transport::{CloseCode, Credential};
