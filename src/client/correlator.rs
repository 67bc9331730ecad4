//! Request/response correlation.
//!
//! Each outstanding request owns one entry keyed by its [`RequestId`]. The
//! first of {matching response, timeout, disconnect} removes the entry and
//! completes the caller's [`PendingResponse`]; anything arriving later finds
//! no entry and is dropped.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::identifiers::{RequestId, TimerId};

// ============================================================================
// PendingRequest
// ============================================================================

/// An outstanding request.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    created_at: Instant,
    timeout: Duration,
    timer: TimerId,
    reply: oneshot::Sender<Result<Value>>,
}

impl PendingRequest {
    pub(crate) fn new(timeout: Duration, timer: TimerId, reply: oneshot::Sender<Result<Value>>) -> Self {
        Self {
            created_at: Instant::now(),
            timeout,
            timer,
            reply,
        }
    }

    /// Timeout timer armed for this request.
    pub(crate) fn timer(&self) -> TimerId {
        self.timer
    }

    /// Configured timeout.
    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wall time since the request was issued.
    pub(crate) fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Delivers the outcome. A dropped caller is ignored.
    pub(crate) fn complete(self, result: Result<Value>) {
        let _ = self.reply.send(result);
    }
}

// ============================================================================
// RequestCorrelator
// ============================================================================

/// Request id → [`PendingRequest`].
#[derive(Debug, Default)]
pub(crate) struct RequestCorrelator {
    pending: FxHashMap<RequestId, PendingRequest>,
}

impl RequestCorrelator {
    pub(crate) fn insert(&mut self, id: RequestId, request: PendingRequest) {
        self.pending.insert(id, request);
    }

    /// Removes and returns the entry for `id`, if still outstanding.
    pub(crate) fn take(&mut self, id: RequestId) -> Option<PendingRequest> {
        self.pending.remove(&id)
    }

    /// Removes every outstanding entry.
    pub(crate) fn drain(&mut self) -> Vec<(RequestId, PendingRequest)> {
        self.pending.drain().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

// ============================================================================
// PendingResponse
// ============================================================================

/// Future returned by [`ConnectionManager::request`](super::ConnectionManager::request).
///
/// Resolves to the response `data`, or fails with
/// [`Error::Remote`], [`Error::RequestTimeout`] or [`Error::ConnectionClosed`].
#[derive(Debug)]
#[must_use = "the response is lost unless the future is awaited"]
pub struct PendingResponse {
    id: RequestId,
    rx: oneshot::Receiver<Result<Value>>,
}

impl PendingResponse {
    pub(crate) fn new(id: RequestId, rx: oneshot::Receiver<Result<Value>>) -> Self {
        Self { id, rx }
    }

    /// Correlation id of the request.
    #[inline]
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }
}

impl Future for PendingResponse {
    type Output = Result<Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::ConnectionClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio_test::{assert_pending, assert_ready, task};

    fn pending(timeout_ms: u64) -> (PendingRequest, oneshot::Receiver<Result<Value>>) {
        let (tx, rx) = oneshot::channel();
        (
            PendingRequest::new(Duration::from_millis(timeout_ms), TimerId::next(), tx),
            rx,
        )
    }

    #[test]
    fn test_take_is_single_shot() {
        let mut correlator = RequestCorrelator::default();
        let id = RequestId::generate();
        let (request, _rx) = pending(50);
        correlator.insert(id, request);

        assert_eq!(correlator.len(), 1);
        assert!(correlator.take(id).is_some());
        assert!(correlator.take(id).is_none());
        assert_eq!(correlator.len(), 0);
    }

    #[test]
    fn test_response_future_resolves() {
        let id = RequestId::generate();
        let (request, rx) = pending(50);
        let mut response = task::spawn(PendingResponse::new(id, rx));

        assert_pending!(response.poll());
        request.complete(Ok(json!({ "ok": true })));

        let result = assert_ready!(response.poll());
        assert_eq!(result.expect("success"), json!({ "ok": true }));
    }

    #[test]
    fn test_dropped_entry_reports_closed() {
        let id = RequestId::generate();
        let (request, rx) = pending(50);
        let mut response = task::spawn(PendingResponse::new(id, rx));
        drop(request);

        let result = assert_ready!(response.poll());
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_drain_empties() {
        let mut correlator = RequestCorrelator::default();
        for _ in 0..3 {
            let (request, _rx) = pending(10);
            correlator.insert(RequestId::generate(), request);
        }

        assert_eq!(correlator.drain().len(), 3);
        assert_eq!(correlator.len(), 0);
    }
}
