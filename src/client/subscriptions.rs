//! Channel subscription registry.
//!
//! Maps each channel to its handler set. A channel entry exists exactly
//! while it has at least one handler; replay after reconnect therefore
//! yields each live channel once, however many handlers it has.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::identifiers::HandlerId;

// ============================================================================
// Types
// ============================================================================

/// Callback receiving channel data.
pub type ChannelHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handlers of one channel (unordered).
type HandlerSet = FxHashMap<HandlerId, ChannelHandler>;

/// Outcome of removing a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Channel or handler was not registered.
    NotFound,
    /// Handler removed; others remain on the channel.
    Removed,
    /// Last handler removed; the channel entry is gone.
    ChannelEmptied,
}

// ============================================================================
// SubscriptionRegistry
// ============================================================================

/// Channel → handler set.
#[derive(Default)]
pub struct SubscriptionRegistry {
    channels: FxHashMap<String, HandlerSet>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler and returns its id.
    ///
    /// The flag is `true` when this is the channel's first handler.
    pub fn add(&mut self, channel: &str, handler: ChannelHandler) -> (HandlerId, bool) {
        let id = HandlerId::next();
        let handlers = self.channels.entry(channel.to_string()).or_default();
        let first = handlers.is_empty();
        handlers.insert(id, handler);
        (id, first)
    }

    /// Removes a handler, dropping the channel entry when it empties.
    pub fn remove(&mut self, channel: &str, id: HandlerId) -> Removal {
        let Some(handlers) = self.channels.get_mut(channel) else {
            return Removal::NotFound;
        };

        if handlers.remove(&id).is_none() {
            return Removal::NotFound;
        }

        if handlers.is_empty() {
            self.channels.remove(channel);
            Removal::ChannelEmptied
        } else {
            Removal::Removed
        }
    }

    /// Snapshot of a channel's handlers, for dispatch outside any lock.
    #[must_use]
    pub fn handlers(&self, channel: &str) -> Vec<ChannelHandler> {
        self.channels
            .get(channel)
            .map(|handlers| handlers.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Distinct channels with at least one handler.
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    /// Returns `true` if the channel has handlers.
    #[inline]
    #[must_use]
    pub fn contains(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    /// Number of live channels.
    #[inline]
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of handlers on a channel.
    #[inline]
    #[must_use]
    pub fn handler_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, FxHashMap::len)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> ChannelHandler {
        Arc::new(|_| {})
    }

    #[test]
    fn test_first_handler_flag() {
        let mut registry = SubscriptionRegistry::new();
        let (_, first) = registry.add("trades", noop());
        let (_, second) = registry.add("trades", noop());
        let (_, other) = registry.add("news", noop());

        assert!(first);
        assert!(!second);
        assert!(other);
        assert_eq!(registry.handler_count("trades"), 2);
    }

    #[test]
    fn test_entry_survives_until_last_handler() {
        let mut registry = SubscriptionRegistry::new();
        let (h1, _) = registry.add("A", noop());
        let (h2, _) = registry.add("A", noop());

        assert_eq!(registry.remove("A", h1), Removal::Removed);
        assert!(registry.contains("A"));

        assert_eq!(registry.remove("A", h2), Removal::ChannelEmptied);
        assert!(!registry.contains("A"));
        assert_eq!(registry.channel_count(), 0);
    }

    #[test]
    fn test_remove_unknown() {
        let mut registry = SubscriptionRegistry::new();
        let (id, _) = registry.add("A", noop());

        assert_eq!(registry.remove("B", id), Removal::NotFound);
        assert_eq!(registry.remove("A", HandlerId::next()), Removal::NotFound);
        assert_eq!(registry.remove("A", id), Removal::ChannelEmptied);
        assert_eq!(registry.remove("A", id), Removal::NotFound);
    }

    #[test]
    fn test_channels_are_distinct() {
        let mut registry = SubscriptionRegistry::new();
        for _ in 0..3 {
            registry.add("A", noop());
        }
        registry.add("B", noop());

        let mut channels: Vec<&str> = registry.channels().collect();
        channels.sort_unstable();
        assert_eq!(channels, vec!["A", "B"]);
    }

    #[test]
    fn test_handlers_snapshot() {
        let mut registry = SubscriptionRegistry::new();
        registry.add("A", noop());
        registry.add("A", noop());

        assert_eq!(registry.handlers("A").len(), 2);
        assert!(registry.handlers("missing").is_empty());
    }
}
