//! Type-safe identifiers.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! | Type | Backing | Scope |
//! |------|---------|-------|
//! | [`RequestId`] | UUID v4 | Wire: correlates a request with its response |
//! | [`HandlerId`] | `u64` | Local: one channel handler |
//! | [`ListenerId`] | `u64` | Local: one lifecycle listener |
//! | [`TimerId`] | `u64` | Local: one scheduled timer |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// RequestId
// ============================================================================

/// Identifier correlating a request envelope with its response.
///
/// Random v4 UUIDs are unique for the process lifetime with overwhelming
/// probability, so no registry of issued ids is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generates a fresh random request ID.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a request ID from its wire form.
    ///
    /// Returns `None` if `value` is not a UUID.
    #[inline]
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value).ok().map(Self)
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// Local counters
// ============================================================================

macro_rules! local_id {
    ($(#[$meta:meta])* $name:ident, $counter:ident) => {
        static $counter: AtomicU64 = AtomicU64::new(1);

        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Allocates the next process-unique ID.
            #[inline]
            #[must_use]
            pub fn next() -> Self {
                Self($counter.fetch_add(1, Ordering::Relaxed))
            }

            /// Returns the raw value.
            #[inline]
            #[must_use]
            pub const fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

local_id!(
    /// Identifies one handler registered on a channel.
    HandlerId,
    NEXT_HANDLER_ID
);

local_id!(
    /// Identifies one lifecycle listener.
    ListenerId,
    NEXT_LISTENER_ID
);

local_id!(
    /// Identifies one timer armed on a [`Scheduler`](crate::timer::Scheduler).
    TimerId,
    NEXT_TIMER_ID
);

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_unique() {
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_request_id_parse() {
        let id = RequestId::generate();
        assert_eq!(RequestId::parse(&id.to_string()), Some(id));
        assert_eq!(RequestId::parse("not-a-uuid"), None);
    }

    #[test]
    fn test_request_id_serializes_as_string() {
        let id = RequestId::generate();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{id}\""));
    }

    #[test]
    fn test_local_ids_increase() {
        let first = HandlerId::next();
        let second = HandlerId::next();
        assert!(second > first);
        assert_ne!(TimerId::next(), TimerId::next());
    }
}
