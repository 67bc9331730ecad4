//! Wire protocol envelopes.
//!
//! This module defines the message format exchanged with the remote
//! service over the single multiplexed connection.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `subscribe` / `unsubscribe` | Local → Remote | Channel membership |
//! | `ping` | Local → Remote | Heartbeat probe |
//! | `send` | Local → Remote | Fire-and-forget payload |
//! | `request` | Local → Remote | Correlated request |
//! | `pong` | Remote → Local | Heartbeat answer |
//! | `error` | Remote → Local | Service error notice |
//! | channel data | Remote → Local | Subscription payload |
//! | event | Remote → Local | Named service event |
//! | response | Remote → Local | Answer carrying `requestId` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `inbound` | Frame classification |
//! | `outbound` | Envelope serialization |

// ============================================================================
// Submodules
// ============================================================================

/// Inbound frame classification.
pub mod inbound;

/// Outbound envelope types.
pub mod outbound;

// ============================================================================
// Re-exports
// ============================================================================

pub use inbound::Inbound;
pub use outbound::Outbound;
