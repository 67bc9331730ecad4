//! Connection manager.
//!
//! [`ConnectionManager`] keeps one logical link open to the remote service,
//! multiplexing channel subscriptions and correlated requests over a single
//! transport connection and reconnecting with exponential backoff when the
//! connection drops.
//!
//! # State Machine
//!
//! ```text
//!                connect()              opened
//! Disconnected ───────────► Connecting ─────────► Connected
//!      ▲  ▲                     │                     │
//!      │  └── error / close ────┘                     │
//!      │      (reconnect scheduled)                   │
//!      └──────────── close / disconnect() ────────────┘
//! ```
//!
//! # Callback Discipline
//!
//! Transport events and timers arrive on runtime threads. All state lives
//! behind one mutex; user callbacks (channel handlers and lifecycle
//! listeners) are collected while the lock is held and invoked after it is
//! released, so they may call back into the manager freely.
//!
//! Every transport callback carries the epoch of the attempt that produced
//! it, and every timer carries a token. Both are re-checked before acting,
//! so stale callbacks are no-ops.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::mem;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{HandlerId, ListenerId, RequestId, TimerId};
use crate::protocol::{Inbound, Outbound};
use crate::timer::{Scheduler, TimerCallback};
use crate::transport::{
    CloseCode, Credential, OpenTarget, SinkTarget, Transport, TransportHandle, TransportSink,
};

use super::backoff::BackoffSchedule;
use super::builder::ConnectionManagerBuilder;
use super::correlator::{PendingRequest, PendingResponse, RequestCorrelator};
use super::events::{
    ConnectionError, ErrorKind, EventBus, EventKind, LifecycleEvent, panic_message,
};
use super::heartbeat::HeartbeatMonitor;
use super::options::ConnectionOptions;
use super::queue::OutboundQueue;
use super::state::{Connection, ConnectionState};
use super::subscriptions::{ChannelHandler, Removal, SubscriptionRegistry};

// ============================================================================
// Constants
// ============================================================================

/// Close reason sent by `disconnect()`.
const CLIENT_DISCONNECT_REASON: &str = "Client disconnect";

// ============================================================================
// Effects
// ============================================================================

/// One channel payload and the handlers it goes to.
struct Delivery {
    channel: String,
    data: Value,
    handlers: Vec<ChannelHandler>,
}

/// User callbacks collected under the lock, run after it is released.
#[derive(Default)]
struct Effects {
    events: Vec<LifecycleEvent>,
    deliveries: Vec<Delivery>,
}

impl Effects {
    fn emit(&mut self, event: LifecycleEvent) {
        self.events.push(event);
    }
}

// ============================================================================
// Inner
// ============================================================================

/// Mutable state guarded by [`Shared::inner`].
struct Inner {
    connection: Connection,
    /// Incremented whenever the current attempt is superseded.
    epoch: u64,
    handle: Option<Box<dyn TransportHandle>>,
    /// Set by `disconnect()`; suppresses auto-reconnect.
    manual: bool,
    /// `reconnectFailed` already emitted for this run of attempts.
    exhausted: bool,
    reconnect: Option<(TimerId, u64)>,
    reconnect_token: u64,
    heartbeat: HeartbeatMonitor,
    queue: OutboundQueue,
    subscriptions: SubscriptionRegistry,
    correlator: RequestCorrelator,
}

impl Inner {
    fn new(heartbeat_interval: Duration) -> Self {
        Self {
            connection: Connection::default(),
            epoch: 0,
            handle: None,
            manual: false,
            exhausted: false,
            reconnect: None,
            reconnect_token: 0,
            heartbeat: HeartbeatMonitor::new(heartbeat_interval),
            queue: OutboundQueue::new(),
            subscriptions: SubscriptionRegistry::new(),
            correlator: RequestCorrelator::default(),
        }
    }

    /// The single write path. Fails with [`Error::NotConnected`] unless live.
    fn write(&self, envelope: &Outbound) -> Result<()> {
        match (&self.handle, self.connection.state) {
            (Some(handle), ConnectionState::Connected) => {
                let frame = envelope.encode()?;
                handle.send(&frame)?;
                trace!(kind = envelope.kind(), "Envelope written");
                Ok(())
            }
            _ => Err(Error::NotConnected),
        }
    }
}

// ============================================================================
// Shared
// ============================================================================

/// State shared between the manager, its transport sink and its timers.
pub(crate) struct Shared {
    endpoint: Url,
    options: ConnectionOptions,
    backoff: BackoffSchedule,
    transport: Arc<dyn Transport>,
    scheduler: Arc<dyn Scheduler>,
    events: EventBus,
    state_tx: watch::Sender<ConnectionState>,
    inner: Mutex<Inner>,
    weak_self: Weak<Shared>,
}

impl Shared {
    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    /// Runs collected callbacks. Must be called without the lock held.
    fn dispatch(&self, effects: Effects) {
        for event in &effects.events {
            self.events.emit(event);
        }

        for delivery in effects.deliveries {
            for handler in delivery.handlers {
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(&delivery.data))) {
                    let message = format!(
                        "Handler for channel '{}' panicked: {}",
                        delivery.channel,
                        panic_message(&*panic)
                    );
                    warn!(channel = %delivery.channel, "{message}");
                    self.events.emit(&LifecycleEvent::Error(ConnectionError::new(
                        ErrorKind::Handler,
                        message,
                    )));
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    fn set_state(&self, inner: &mut Inner, state: ConnectionState) {
        let from = inner.connection.state;
        inner.connection.state = state;
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if from != state {
            trace!(%from, to = %state, "State transition");
        }
    }

    /// Starts a new attempt with the stored credential and identity.
    fn open(&self, inner: &mut Inner, effects: &mut Effects) {
        inner.epoch = inner.epoch.wrapping_add(1);
        let epoch = inner.epoch;
        let attempt = inner.connection.attempt_count;

        self.set_state(inner, ConnectionState::Connecting);
        effects.emit(LifecycleEvent::Connecting { attempt });

        let target = OpenTarget {
            endpoint: self.endpoint.clone(),
            credential: inner.connection.credential.clone(),
            identity: inner.connection.identity.clone(),
        };
        let weak: Weak<dyn SinkTarget> = self.weak_self.clone();
        let sink = TransportSink::new(weak, epoch);

        debug!(epoch, attempt, endpoint = %self.endpoint, "Opening connection");

        match self.transport.open(&target, sink) {
            Ok(handle) => inner.handle = Some(handle),
            Err(e) => {
                warn!(error = %e, "Transport failed to start");
                let message = e.to_string();
                inner.connection.last_error = Some(message.clone());
                effects.emit(LifecycleEvent::Error(ConnectionError::new(
                    ErrorKind::Transport,
                    message.clone(),
                )));
                self.abandon_attempt(inner, message, effects);
            }
        }
    }

    /// Gives up on the current attempt and schedules the next one.
    fn abandon_attempt(&self, inner: &mut Inner, reason: String, effects: &mut Effects) {
        if let Some(handle) = inner.handle.take() {
            handle.close(CloseCode::ABNORMAL, "Attempt abandoned");
        }
        inner.epoch = inner.epoch.wrapping_add(1);

        self.set_state(inner, ConnectionState::Disconnected);
        effects.emit(LifecycleEvent::Disconnected {
            code: None,
            reason,
            manual: false,
        });
        self.schedule_reconnect(inner, effects);
    }

    fn schedule_reconnect(&self, inner: &mut Inner, effects: &mut Effects) {
        if inner.manual {
            return;
        }

        let attempts = inner.connection.attempt_count;
        if let Some(max) = self.options.max_reconnect_attempts
            && attempts >= max
        {
            if !inner.exhausted {
                inner.exhausted = true;
                inner.connection.last_error = Some(Error::reconnect_exhausted(attempts).to_string());
                warn!(attempts, "Reconnect attempts exhausted");
                effects.emit(LifecycleEvent::ReconnectFailed { attempts });
            }
            return;
        }

        self.cancel_reconnect(inner);

        let delay = self.backoff.delay(attempts);
        inner.connection.attempt_count = attempts.saturating_add(1);
        inner.reconnect_token = inner.reconnect_token.wrapping_add(1);
        let token = inner.reconnect_token;

        let weak = self.weak_self.clone();
        let id = self.scheduler.schedule(
            delay,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.on_reconnect_timer(token);
                }
            }),
        );
        inner.reconnect = Some((id, token));

        let attempt = inner.connection.attempt_count;
        info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
        effects.emit(LifecycleEvent::Reconnecting { attempt, delay });
    }

    fn cancel_reconnect(&self, inner: &mut Inner) {
        if let Some((id, _)) = inner.reconnect.take() {
            self.scheduler.cancel(id);
            trace!(%id, "Reconnect timer cancelled");
        }
    }

    fn on_reconnect_timer(&self, token: u64) {
        let mut effects = Effects::default();
        {
            let mut inner = self.inner.lock();
            match inner.reconnect {
                Some((_, armed)) if armed == token => inner.reconnect = None,
                _ => {
                    trace!(token, "Ignoring stale reconnect timer");
                    return;
                }
            }

            if inner.manual || inner.connection.state != ConnectionState::Disconnected {
                return;
            }

            self.open(&mut inner, &mut effects);
        }
        self.dispatch(effects);
    }

    // ------------------------------------------------------------------------
    // Heartbeat
    // ------------------------------------------------------------------------

    fn start_heartbeat(&self, inner: &mut Inner) {
        let weak = self.weak_self.clone();
        inner
            .heartbeat
            .arm(&*self.scheduler, move |generation| -> TimerCallback {
                Box::new(move || {
                    if let Some(shared) = weak.upgrade() {
                        shared.on_heartbeat(generation);
                    }
                })
            });
    }

    fn on_heartbeat(&self, generation: u64) {
        let mut effects = Effects::default();
        {
            let mut inner = self.inner.lock();
            if !inner.heartbeat.accept_tick(generation)
                || inner.connection.state != ConnectionState::Connected
            {
                return;
            }

            match inner.write(&Outbound::Ping) {
                Ok(()) => trace!("Ping sent"),
                Err(e) => {
                    debug!(error = %e, "Ping failed");
                    effects.emit(LifecycleEvent::SendError {
                        message: e.to_string(),
                    });
                }
            }

            self.start_heartbeat(&mut inner);
        }
        self.dispatch(effects);
    }

    // ------------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------------

    /// Writes queued envelopes in order, stopping at the first failure.
    fn flush_queue(&self, inner: &mut Inner, effects: &mut Effects) {
        if inner.queue.is_empty() {
            return;
        }

        let mut queue = mem::take(&mut inner.queue);
        let outcome = queue.flush(|envelope| inner.write(envelope));
        inner.queue = queue;

        debug!(
            sent = outcome.sent,
            remaining = inner.queue.len(),
            "Outbound queue flushed"
        );

        if let Some(e) = outcome.error
            && !matches!(e, Error::NotConnected)
        {
            warn!(error = %e, "Queue flush halted");
            effects.emit(LifecycleEvent::SendError {
                message: e.to_string(),
            });
        }
    }

    /// Writes an envelope now, or queues it behind earlier envelopes.
    ///
    /// Returns `true` if the envelope reached the transport.
    fn transmit_or_queue(&self, inner: &mut Inner, envelope: Outbound, effects: &mut Effects) -> bool {
        if !inner.queue.is_empty() && inner.connection.state == ConnectionState::Connected {
            self.flush_queue(inner, effects);
        }

        if !inner.queue.is_empty() {
            inner.queue.push(envelope);
            return false;
        }

        match inner.write(&envelope) {
            Ok(()) => true,
            Err(Error::NotConnected) => {
                inner.queue.push(envelope);
                trace!(queued = inner.queue.len(), "Queued while offline");
                false
            }
            Err(e @ Error::Json(_)) => {
                warn!(error = %e, "Dropping unserializable envelope");
                effects.emit(LifecycleEvent::SendError {
                    message: e.to_string(),
                });
                false
            }
            Err(e) => {
                warn!(error = %e, "Write failed, envelope queued");
                inner.queue.push(envelope);
                effects.emit(LifecycleEvent::SendError {
                    message: e.to_string(),
                });
                false
            }
        }
    }

    /// Writes a subscribe or unsubscribe directive if live.
    ///
    /// Offline directives are dropped: the registry replay on open covers them.
    fn write_directive(&self, inner: &Inner, directive: &Outbound, effects: &mut Effects) {
        match inner.write(directive) {
            Ok(()) => debug!(kind = directive.kind(), "Directive sent"),
            Err(Error::NotConnected) => trace!(kind = directive.kind(), "Directive deferred"),
            Err(e) => {
                warn!(error = %e, kind = directive.kind(), "Directive write failed");
                effects.emit(LifecycleEvent::SendError {
                    message: e.to_string(),
                });
            }
        }
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    fn on_request_timeout(&self, id: RequestId) {
        let pending = {
            let mut inner = self.inner.lock();
            let pending = inner.correlator.take(id);
            if pending.is_some() {
                inner.queue.remove_request(id);
            }
            pending
        };

        if let Some(pending) = pending {
            let timeout_ms = pending.timeout().as_millis() as u64;
            debug!(%id, timeout_ms, "Request timed out");
            pending.complete(Err(Error::request_timeout(id, timeout_ms)));
        }
    }
}

// ============================================================================
// Transport Events
// ============================================================================

impl SinkTarget for Shared {
    fn on_open(&self, epoch: u64) {
        let mut effects = Effects::default();
        {
            let mut inner = self.inner.lock();
            if epoch != inner.epoch || inner.connection.state != ConnectionState::Connecting {
                trace!(epoch, "Ignoring stale open");
                return;
            }

            self.set_state(&mut inner, ConnectionState::Connected);
            inner.connection.attempt_count = 0;
            inner.exhausted = false;
            info!(endpoint = %self.endpoint, "Connected");
            effects.emit(LifecycleEvent::Connected);

            self.start_heartbeat(&mut inner);
            self.flush_queue(&mut inner, &mut effects);

            let directives: Vec<Outbound> = inner
                .subscriptions
                .channels()
                .map(Outbound::subscribe)
                .collect();
            if !directives.is_empty() {
                debug!(channels = directives.len(), "Resubscribing");
            }
            for directive in &directives {
                self.write_directive(&inner, directive, &mut effects);
            }
        }
        self.dispatch(effects);
    }

    fn on_message(&self, epoch: u64, text: &str) {
        let parsed = Inbound::parse(text);

        let mut effects = Effects::default();
        {
            let mut inner = self.inner.lock();
            if epoch != inner.epoch {
                trace!(epoch, "Ignoring frame from stale connection");
                return;
            }

            match parsed {
                Err(e) => {
                    debug!(error = %e, "Unparseable frame");
                    effects.emit(LifecycleEvent::ParseError {
                        raw: text.to_string(),
                        message: e.to_string(),
                    });
                }

                Ok(Inbound::Pong) => trace!("Pong received"),

                Ok(Inbound::Error { message }) => {
                    warn!(%message, "Service reported an error");
                    effects.emit(LifecycleEvent::Error(ConnectionError::new(
                        ErrorKind::Remote,
                        message,
                    )));
                }

                Ok(Inbound::Channel { channel, data }) => {
                    let handlers = inner.subscriptions.handlers(&channel);
                    if handlers.is_empty() {
                        trace!(%channel, "No handlers for channel");
                    } else {
                        effects.deliveries.push(Delivery {
                            channel,
                            data,
                            handlers,
                        });
                    }
                }

                Ok(Inbound::Event { event, data }) => {
                    effects.emit(LifecycleEvent::Message { event, data });
                }

                Ok(Inbound::Response { request_id, result }) => {
                    match inner.correlator.take(request_id) {
                        Some(pending) => {
                            self.scheduler.cancel(pending.timer());
                            trace!(
                                %request_id,
                                elapsed_ms = pending.elapsed().as_millis() as u64,
                                "Response correlated"
                            );
                            pending.complete(result.map_err(Error::remote));
                        }
                        None => {
                            debug!(%request_id, "Response for unknown or settled request");
                        }
                    }
                }

                Ok(Inbound::ForeignResponse { request_id }) => {
                    debug!(%request_id, "Response with foreign request id dropped");
                }
            }
        }
        self.dispatch(effects);
    }

    fn on_close(&self, epoch: u64, code: CloseCode, reason: String) {
        let mut effects = Effects::default();
        {
            let mut inner = self.inner.lock();
            if epoch != inner.epoch {
                trace!(epoch, "Ignoring close from stale connection");
                return;
            }

            inner.handle = None;
            inner.epoch = inner.epoch.wrapping_add(1);
            inner.heartbeat.disarm(&*self.scheduler);
            self.set_state(&mut inner, ConnectionState::Disconnected);

            effects.emit(LifecycleEvent::Disconnected {
                code: Some(code),
                reason: reason.clone(),
                manual: false,
            });

            if code.is_normal() {
                info!(%reason, "Connection closed normally by remote");
            } else {
                warn!(%code, %reason, "Connection closed abnormally");
                inner.connection.last_error =
                    Some(format!("Connection closed abnormally ({code}): {reason}"));
                self.schedule_reconnect(&mut inner, &mut effects);
            }
        }
        self.dispatch(effects);
    }

    fn on_error(&self, epoch: u64, message: String) {
        let mut effects = Effects::default();
        {
            let mut inner = self.inner.lock();
            if epoch != inner.epoch {
                trace!(epoch, "Ignoring error from stale connection");
                return;
            }

            warn!(%message, state = %inner.connection.state, "Transport error");
            inner.connection.last_error = Some(message.clone());
            effects.emit(LifecycleEvent::Error(ConnectionError::new(
                ErrorKind::Transport,
                message.clone(),
            )));

            if inner.connection.state == ConnectionState::Connecting {
                self.abandon_attempt(&mut inner, message, &mut effects);
            }
        }
        self.dispatch(effects);
    }

    fn on_send_failed(&self, epoch: u64, message: String) {
        {
            let inner = self.inner.lock();
            if epoch != inner.epoch {
                trace!(epoch, "Ignoring write failure from stale connection");
                return;
            }
        }

        warn!(%message, "Accepted frame was not written");
        let mut effects = Effects::default();
        effects.emit(LifecycleEvent::SendError { message });
        self.dispatch(effects);
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();

        if let Some((id, _)) = inner.reconnect.take() {
            self.scheduler.cancel(id);
        }
        inner.heartbeat.disarm(&*self.scheduler);

        for (_, pending) in inner.correlator.drain() {
            self.scheduler.cancel(pending.timer());
            pending.complete(Err(Error::ConnectionClosed));
        }

        if let Some(handle) = inner.handle.take() {
            handle.close(CloseCode::GOING_AWAY, "Client dropped");
        }
    }
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Resilient multiplexed link to a real-time service.
///
/// Cheap to clone; clones share the same connection.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use realtime_link::{ConnectionManager, Result};
/// use serde_json::json;
///
/// # async fn example() -> Result<()> {
/// let link = ConnectionManager::builder()
///     .endpoint("wss://feeds.example.com/ws")
///     .build()?;
///
/// let _trades = link.subscribe("trades", |data| println!("trade: {data}"));
/// link.connect("token", "desk-7");
/// link.wait_connected(Duration::from_secs(5)).await?;
///
/// let quote = link.request("quote", json!({ "symbol": "BTC" }), Duration::from_secs(2))?.await?;
/// println!("{quote}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.shared.endpoint.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ConnectionManager - Construction
// ============================================================================

impl ConnectionManager {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> ConnectionManagerBuilder {
        ConnectionManagerBuilder::new()
    }

    /// Assembles a manager from validated parts.
    pub(crate) fn from_parts(
        endpoint: Url,
        options: ConnectionOptions,
        transport: Arc<dyn Transport>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let backoff = BackoffSchedule::from_options(&options);
        let heartbeat_interval = options.heartbeat_interval();

        let shared = Arc::new_cyclic(|weak| Shared {
            endpoint,
            options,
            backoff,
            transport,
            scheduler,
            events: EventBus::default(),
            state_tx,
            inner: Mutex::new(Inner::new(heartbeat_interval)),
            weak_self: weak.clone(),
        });

        Self { shared }
    }
}

// ============================================================================
// ConnectionManager - Lifecycle
// ============================================================================

impl ConnectionManager {
    /// Opens the link.
    ///
    /// No-op while Connecting or Connected. Otherwise clears a previous
    /// manual disconnect, cancels a pending reconnect, resets the attempt
    /// counter and starts a fresh attempt. The outcome is reported through
    /// lifecycle events and [`wait_connected`](Self::wait_connected).
    pub fn connect(&self, credential: impl Into<Credential>, identity: impl Into<String>) {
        let mut effects = Effects::default();
        {
            let mut inner = self.shared.inner.lock();
            if inner.connection.state != ConnectionState::Disconnected {
                debug!(state = %inner.connection.state, "connect() ignored, attempt already active");
                return;
            }

            inner.manual = false;
            inner.exhausted = false;
            inner.connection.attempt_count = 0;
            inner.connection.credential = credential.into();
            inner.connection.identity = identity.into();
            self.shared.cancel_reconnect(&mut inner);

            self.shared.open(&mut inner, &mut effects);
        }
        self.shared.dispatch(effects);
    }

    /// Closes the link with code 1000 and stops reconnecting.
    ///
    /// Outstanding requests fail with [`Error::ConnectionClosed`].
    /// Subscriptions and queued sends are kept for the next `connect()`.
    pub fn disconnect(&self) {
        let mut effects = Effects::default();
        let failed = {
            let mut inner = self.shared.inner.lock();
            inner.manual = true;
            self.shared.cancel_reconnect(&mut inner);
            inner.heartbeat.disarm(&*self.shared.scheduler);

            if let Some(handle) = inner.handle.take() {
                handle.close(CloseCode::NORMAL, CLIENT_DISCONNECT_REASON);
            }
            inner.epoch = inner.epoch.wrapping_add(1);
            self.shared.set_state(&mut inner, ConnectionState::Disconnected);

            let failed = inner.correlator.drain();
            for (id, pending) in &failed {
                self.shared.scheduler.cancel(pending.timer());
                inner.queue.remove_request(*id);
            }

            info!(failed_requests = failed.len(), "Disconnected by client");
            effects.emit(LifecycleEvent::Disconnected {
                code: Some(CloseCode::NORMAL),
                reason: CLIENT_DISCONNECT_REASON.to_string(),
                manual: true,
            });
            failed
        };

        for (_, pending) in failed {
            pending.complete(Err(Error::ConnectionClosed));
        }
        self.shared.dispatch(effects);
    }

    /// Waits until the link is Connected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionTimeout`] if not Connected within `wait`.
    pub async fn wait_connected(&self, wait: Duration) -> Result<()> {
        let mut rx = self.shared.state_tx.subscribe();
        match timeout(wait, rx.wait_for(ConnectionState::is_connected)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => Err(Error::connection_timeout(wait.as_millis() as u64)),
        }
    }

    /// Receiver observing every state transition.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }
}

// ============================================================================
// ConnectionManager - Messaging
// ============================================================================

impl ConnectionManager {
    /// Sends a fire-and-forget payload.
    ///
    /// Returns `true` if it was written now. Otherwise it is queued and
    /// written, in order, once the link is live.
    pub fn send(&self, payload: Value) -> bool {
        let mut effects = Effects::default();
        let sent = {
            let mut inner = self.shared.inner.lock();
            self.shared
                .transmit_or_queue(&mut inner, Outbound::send(payload), &mut effects)
        };
        self.shared.dispatch(effects);
        sent
    }

    /// Registers a handler for a channel.
    ///
    /// A subscribe directive is written only for the channel's first
    /// handler, and only while Connected; otherwise it goes out when the
    /// link opens. Dropping the returned [`Subscription`] keeps the handler
    /// registered.
    pub fn subscribe<F>(&self, channel: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let channel = channel.into();
        let mut effects = Effects::default();
        let id = {
            let mut inner = self.shared.inner.lock();
            let (id, first) = inner.subscriptions.add(&channel, Arc::new(handler));
            if first {
                self.shared
                    .write_directive(&inner, &Outbound::subscribe(&channel), &mut effects);
            }
            id
        };
        self.shared.dispatch(effects);

        Subscription {
            shared: Arc::downgrade(&self.shared),
            channel,
            id,
        }
    }

    /// Removes one handler from a channel.
    ///
    /// When the last handler goes, the channel is dropped and an
    /// unsubscribe directive is written if Connected. Returns `false` if
    /// the handler was not registered.
    pub fn unsubscribe(&self, channel: &str, id: HandlerId) -> bool {
        let mut effects = Effects::default();
        let removed = {
            let mut inner = self.shared.inner.lock();
            match inner.subscriptions.remove(channel, id) {
                Removal::NotFound => false,
                Removal::Removed => true,
                Removal::ChannelEmptied => {
                    self.shared
                        .write_directive(&inner, &Outbound::unsubscribe(channel), &mut effects);
                    true
                }
            }
        };
        self.shared.dispatch(effects);
        removed
    }

    /// Issues a correlated request.
    ///
    /// The envelope is written now or queued like [`send`](Self::send). The
    /// returned future resolves with the response data, or fails with
    /// [`Error::Remote`], [`Error::RequestTimeout`] or
    /// [`Error::ConnectionClosed`], whichever happens first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a zero timeout or an empty
    /// request type.
    pub fn request(
        &self,
        request_type: impl Into<String>,
        payload: Value,
        wait: Duration,
    ) -> Result<PendingResponse> {
        if wait.is_zero() {
            return Err(Error::invalid_argument("Request timeout must be positive"));
        }

        let request_type = request_type.into();
        if request_type.is_empty() {
            return Err(Error::invalid_argument("Request type must not be empty"));
        }

        let id = RequestId::generate();
        let (reply_tx, reply_rx) = oneshot::channel();
        let weak = Arc::downgrade(&self.shared);

        let mut effects = Effects::default();
        {
            let mut inner = self.shared.inner.lock();
            let timer = self.shared.scheduler.schedule(
                wait,
                Box::new(move || {
                    if let Some(shared) = weak.upgrade() {
                        shared.on_request_timeout(id);
                    }
                }),
            );
            inner
                .correlator
                .insert(id, PendingRequest::new(wait, timer, reply_tx));

            let sent = self.shared.transmit_or_queue(
                &mut inner,
                Outbound::request(request_type, id, payload),
                &mut effects,
            );
            debug!(%id, sent, timeout_ms = wait.as_millis() as u64, "Request issued");
        }
        self.shared.dispatch(effects);

        Ok(PendingResponse::new(id, reply_rx))
    }

    /// Issues a request with the configured default timeout.
    ///
    /// # Errors
    ///
    /// Same as [`request`](Self::request).
    pub fn request_default(
        &self,
        request_type: impl Into<String>,
        payload: Value,
    ) -> Result<PendingResponse> {
        self.request(request_type, payload, self.shared.options.request_timeout())
    }
}

// ============================================================================
// ConnectionManager - Lifecycle Listeners
// ============================================================================

impl ConnectionManager {
    /// Registers a lifecycle listener for one event kind.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.shared.events.on(kind, Arc::new(listener))
    }

    /// Removes a lifecycle listener. Returns `false` if it was not registered.
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        self.shared.events.off(kind, id)
    }
}

// ============================================================================
// ConnectionManager - Accessors
// ============================================================================

impl ConnectionManager {
    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().connection.state
    }

    /// Returns `true` while Connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Consecutive reconnect attempts since the last successful open.
    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        self.shared.inner.lock().connection.attempt_count
    }

    /// Latest connection-level error message.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.shared.inner.lock().connection.last_error.clone()
    }

    /// Envelopes waiting for a live link.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.shared.inner.lock().queue.len()
    }

    /// Outstanding requests.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.shared.inner.lock().correlator.len()
    }

    /// Channels with at least one handler.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.shared.inner.lock().subscriptions.channel_count()
    }

    /// Handlers registered on `channel`.
    #[must_use]
    pub fn handler_count(&self, channel: &str) -> usize {
        self.shared.inner.lock().subscriptions.handler_count(channel)
    }

    /// Listeners registered for `kind`.
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.shared.events.listener_count(kind)
    }

    /// Validated endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.shared.endpoint
    }

    /// Options the manager was built with.
    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.shared.options
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Handle to one registered channel handler.
pub struct Subscription {
    shared: Weak<Shared>,
    channel: String,
    id: HandlerId,
}

impl Subscription {
    /// Handler id, usable with [`ConnectionManager::unsubscribe`].
    #[inline]
    #[must_use]
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Channel name.
    #[inline]
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Removes the handler. Returns `false` if it was already removed or
    /// the manager is gone.
    pub fn unsubscribe(self) -> bool {
        match self.shared.upgrade() {
            Some(shared) => ConnectionManager { shared }.unsubscribe(&self.channel, self.id),
            None => false,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
