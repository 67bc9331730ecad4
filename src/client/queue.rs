//! Outbound queue.
//!
//! Holds `send` and `request` envelopes issued while the link is not
//! Connected. Flushing drains from the head in enqueue order and stops at
//! the first failed write, leaving that message and everything behind it
//! queued. The queue has no size bound or TTL.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::error::Error;
use crate::identifiers::RequestId;
use crate::protocol::Outbound;

// ============================================================================
// QueuedMessage
// ============================================================================

/// An envelope waiting for a live connection.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    /// Envelope to write.
    pub envelope: Outbound,
    /// When the envelope was queued.
    pub enqueued_at: Instant,
}

impl QueuedMessage {
    /// Time spent in the queue so far.
    #[inline]
    #[must_use]
    pub fn age(&self) -> Duration {
        self.enqueued_at.elapsed()
    }
}

// ============================================================================
// FlushOutcome
// ============================================================================

/// Result of one flush pass.
#[derive(Debug)]
pub struct FlushOutcome {
    /// Messages written.
    pub sent: usize,
    /// Write error that stopped the pass, if any.
    pub error: Option<Error>,
}

// ============================================================================
// OutboundQueue
// ============================================================================

/// FIFO of [`QueuedMessage`].
#[derive(Debug, Default)]
pub struct OutboundQueue {
    items: VecDeque<QueuedMessage>,
}

impl OutboundQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an envelope.
    pub fn push(&mut self, envelope: Outbound) {
        self.items.push_back(QueuedMessage {
            envelope,
            enqueued_at: Instant::now(),
        });
    }

    /// Number of queued envelopes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates queued messages from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &QueuedMessage> {
        self.items.iter()
    }

    /// Drops the queued envelope of a request, if it was never written.
    ///
    /// Returns `true` if one was removed.
    pub fn remove_request(&mut self, id: RequestId) -> bool {
        let before = self.items.len();
        self.items.retain(|m| {
            !matches!(&m.envelope, Outbound::Request { request_id, .. } if *request_id == id)
        });
        self.items.len() != before
    }

    /// Writes queued envelopes in order until one fails.
    ///
    /// The failed message goes back to the head of the queue.
    pub fn flush<F>(&mut self, mut write: F) -> FlushOutcome
    where
        F: FnMut(&Outbound) -> Result<(), Error>,
    {
        let mut sent = 0;

        while let Some(message) = self.items.pop_front() {
            if let Err(e) = write(&message.envelope) {
                self.items.push_front(message);
                return FlushOutcome {
                    sent,
                    error: Some(e),
                };
            }
            sent += 1;
        }

        FlushOutcome { sent, error: None }
    }
}

// ============================================================================
// Tests
// ============================================================================
