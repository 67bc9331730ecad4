#![allow(dead_code)]
//! Shared fixtures for integration tests.
//!
//! [`ScriptedTransport`] stands in for the network: each `open` records an
//! attempt, and the test decides when that attempt opens, receives frames,
//! drops or fails. Timers run on a [`ManualScheduler`], so nothing here
//! waits on wall-clock time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use realtime_link::timer::ManualScheduler;
use realtime_link::transport::{OpenTarget, Transport, TransportHandle, TransportSink};
use realtime_link::{
    CloseCode, ConnectionManager, ConnectionOptions, Error, EventKind, LifecycleEvent, Result,
};

// ============================================================================
// ScriptedTransport
// ============================================================================

/// Transport driven entirely by the test.
#[derive(Default)]
pub struct ScriptedTransport {
    attempts: Mutex<Vec<(OpenTarget, TransportSink)>>,
    frames: Arc<Mutex<Vec<String>>>,
    closes: Arc<Mutex<Vec<(CloseCode, String)>>>,
    fail_writes: Arc<AtomicBool>,
    refuse_open: AtomicBool,
}

struct ScriptedHandle {
    frames: Arc<Mutex<Vec<String>>>,
    closes: Arc<Mutex<Vec<(CloseCode, String)>>>,
    fail_writes: Arc<AtomicBool>,
}

impl TransportHandle for ScriptedHandle {
    fn send(&self, frame: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::connection("write refused by test"));
        }
        self.frames.lock().push(frame.to_string());
        Ok(())
    }

    fn close(&self, code: CloseCode, reason: &str) {
        self.closes.lock().push((code, reason.to_string()));
    }
}

impl Transport for ScriptedTransport {
    fn open(&self, target: &OpenTarget, sink: TransportSink) -> Result<Box<dyn TransportHandle>> {
        if self.refuse_open.load(Ordering::SeqCst) {
            return Err(Error::connection("open refused by test"));
        }

        self.attempts.lock().push((target.clone(), sink));
        Ok(Box::new(ScriptedHandle {
            frames: Arc::clone(&self.frames),
            closes: Arc::clone(&self.closes),
            fail_writes: Arc::clone(&self.fail_writes),
        }))
    }
}

impl ScriptedTransport {
    /// Sink of the most recent attempt, cloned so no lock is held while
    /// the manager runs.
    fn latest(&self) -> TransportSink {
        self.attempts
            .lock()
            .last()
            .map(|(_, sink)| sink.clone())
            .expect("no connection attempt was made")
    }

    /// Sink of attempt `n` (0-based).
    pub fn sink(&self, n: usize) -> TransportSink {
        self.attempts.lock()[n].1.clone()
    }

    /// Number of `open` calls that were accepted.
    pub fn opens(&self) -> usize {
        self.attempts.lock().len()
    }

    /// Target of attempt `n` (0-based).
    pub fn target(&self, n: usize) -> OpenTarget {
        self.attempts.lock()[n].0.clone()
    }

    /// Completes the latest attempt.
    pub fn accept(&self) {
        self.latest().opened();
    }

    /// Delivers an inbound frame on the latest attempt.
    pub fn push(&self, text: &str) {
        self.latest().message(text);
    }

    /// Drops the latest attempt with `code`.
    pub fn drop_connection(&self, code: CloseCode) {
        self.latest().closed(code, "dropped by test");
    }

    /// Reports a transport error on the latest attempt.
    pub fn fail(&self, message: &str) {
        self.latest().error(message);
    }

    /// Reports that an accepted frame was lost on the latest attempt.
    pub fn lose_write(&self, message: &str) {
        self.latest().send_failed(message);
    }

    /// Makes every handle's `send` fail (or succeed again).
    pub fn set_write_failure(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes `open` fail synchronously (or succeed again).
    pub fn set_refuse_open(&self, refuse: bool) {
        self.refuse_open.store(refuse, Ordering::SeqCst);
    }

    /// Every written frame, parsed.
    pub fn frames(&self) -> Vec<Value> {
        self.frames
            .lock()
            .iter()
            .map(|f| serde_json::from_str(f).expect("client wrote invalid JSON"))
            .collect()
    }

    /// Written frames of one envelope type.
    pub fn frames_of(&self, kind: &str) -> Vec<Value> {
        self.frames()
            .into_iter()
            .filter(|f| f["type"] == kind)
            .collect()
    }

    /// Number of written frames of one envelope type.
    pub fn count(&self, kind: &str) -> usize {
        self.frames_of(kind).len()
    }

    /// Forgets written frames.
    pub fn clear_frames(&self) {
        self.frames.lock().clear();
    }

    /// Local closes issued by the manager.
    pub fn closes(&self) -> Vec<(CloseCode, String)> {
        self.closes.lock().clone()
    }
}

// ============================================================================
// EventLog
// ============================================================================

/// Records every lifecycle event in emission order.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
}

impl EventLog {
    /// Registers a listener for every event kind on `link`.
    pub fn attach(link: &ConnectionManager) -> Self {
        let log = Self::default();
        for kind in EventKind::ALL {
            let events = Arc::clone(&log.events);
            link.on(kind, move |event| events.lock().push(event.clone()));
        }
        log
    }

    pub fn all(&self) -> Vec<LifecycleEvent> {
        self.events.lock().clone()
    }

    pub fn of(&self, kind: EventKind) -> Vec<LifecycleEvent> {
        self.all().into_iter().filter(|e| e.kind() == kind).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.of(kind).len()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.all().iter().map(LifecycleEvent::kind).collect()
    }

    /// Delays of every `reconnecting` event, in milliseconds.
    pub fn reconnect_delays_ms(&self) -> Vec<u64> {
        self.all()
            .iter()
            .filter_map(|e| match e {
                LifecycleEvent::Reconnecting { delay, .. } => Some(delay.as_millis() as u64),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A manager wired to a scripted transport and a simulated clock.
pub struct Harness {
    pub link: ConnectionManager,
    pub transport: Arc<ScriptedTransport>,
    pub clock: Arc<ManualScheduler>,
    pub events: EventLog,
}

impl Harness {
    /// Builds a harness with `options`.
    pub fn new(options: ConnectionOptions) -> Self {
        let transport = Arc::new(ScriptedTransport::default());
        let clock = Arc::new(ManualScheduler::new());

        let link = ConnectionManager::builder()
            .options(options)
            .transport(Arc::clone(&transport))
            .scheduler(Arc::clone(&clock))
            .build()
            .expect("harness options are valid");
        let events = EventLog::attach(&link);

        Self {
            link,
            transport,
            clock,
            events,
        }
    }

    /// Connects and completes the first attempt.
    pub fn connected(options: ConnectionOptions) -> Self {
        let harness = Self::new(options);
        harness.link.connect("token-1", "desk-7");
        harness.transport.accept();
        harness
    }

    /// Advances the simulated clock.
    pub fn advance(&self, by: Duration) -> usize {
        self.clock.advance(by)
    }
}

/// Options with heartbeats disabled so frame counts stay predictable.
pub fn quiet_options() -> ConnectionOptions {
    ConnectionOptions::new("ws://feeds.test/ws").with_heartbeat_interval(Duration::ZERO)
}

/// Installs a tracing subscriber honoring `RUST_LOG`. Safe to call twice.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
