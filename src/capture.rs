//! Background capture loop.
//!
//! One dedicated thread owns the protocol engine and does all transport I/O,
//! decoding and state tracking. The only shared state is the shutdown flag,
//! checked once per poll and again inside the reconnect loop; every blocking
//! call underneath is bounded by a timeout, so a stop request is observed
//! within one read timeout (or one reconnect interval).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use stenograph_transport::protocol::timing;
use stenograph_transport::{open_transport, BoxedTransport, TransportKind};
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::engine::{PollOutcome, ProtocolEngine};
use crate::error::CaptureError;
use crate::keychart::Stroke;
use crate::realtime::{Detection, RealtimeDetector};

/// Link state as seen from the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Backlog exhausted; strokes are delivered as they happen
    Realtime,
}

/// Lifecycle of the capture loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Connected, thread about to start
    Ready,
    Polling,
    Reconnecting,
    /// Stopped on request; transport released
    Stopped,
    /// Could not start (no writer)
    Error,
}

/// Everything the capture loop reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Stroke(Stroke),
    Connection(ConnectionState),
    Capture(CaptureState),
}

/// Receiver of decoded strokes and state changes
///
/// Called from the capture thread; implementations must not block it for
/// long.
pub trait StrokeSink: Send + 'static {
    fn stroke(&self, stroke: Stroke);

    fn connection_changed(&self, _state: ConnectionState) {}

    fn capture_changed(&self, _state: CaptureState) {}
}

impl StrokeSink for broadcast::Sender<CaptureEvent> {
    fn stroke(&self, stroke: Stroke) {
        // No receivers is fine
        let _ = self.send(CaptureEvent::Stroke(stroke));
    }

    fn connection_changed(&self, state: ConnectionState) {
        let _ = self.send(CaptureEvent::Connection(state));
    }

    fn capture_changed(&self, state: CaptureState) {
        let _ = self.send(CaptureEvent::Capture(state));
    }
}

impl StrokeSink for mpsc::Sender<CaptureEvent> {
    fn stroke(&self, stroke: Stroke) {
        let _ = self.send(CaptureEvent::Stroke(stroke));
    }

    fn connection_changed(&self, state: ConnectionState) {
        let _ = self.send(CaptureEvent::Connection(state));
    }

    fn capture_changed(&self, state: CaptureState) {
        let _ = self.send(CaptureEvent::Capture(state));
    }
}

/// Timing knobs for the capture loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTimings {
    /// Bound on each blocking response read
    pub read_timeout: Duration,
    /// Pause between reconnect attempts
    pub reconnect_interval: Duration,
    /// Pause after an unclassified transport error
    pub error_backoff: Duration,
}

impl Default for CaptureTimings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(timing::READ_TIMEOUT_MS),
            reconnect_interval: Duration::from_millis(timing::RECONNECT_INTERVAL_MS),
            error_backoff: Duration::from_millis(timing::ERROR_BACKOFF_MS),
        }
    }
}

// ---------------------------------------------------------------------------
// StenoCapture — handle to the running loop
// ---------------------------------------------------------------------------

/// Handle to a running capture thread; stops it on drop
pub struct StenoCapture {
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl StenoCapture {
    /// Connect to the writer and start capturing on a background thread
    ///
    /// # Errors
    /// [`CaptureError::DeviceNotFound`] if the initial connect fails; the
    /// sink is told `CaptureState::Error` and no thread is started.
    pub fn start<S: StrokeSink>(
        transport: BoxedTransport,
        timings: CaptureTimings,
        sink: S,
    ) -> Result<Self, CaptureError> {
        let mut engine = ProtocolEngine::new(transport, timings.read_timeout);

        sink.connection_changed(ConnectionState::Connecting);
        if !engine.connect() {
            warn!("Stenograph machine not found");
            sink.connection_changed(ConnectionState::Disconnected);
            sink.capture_changed(CaptureState::Error);
            return Err(CaptureError::DeviceNotFound);
        }
        info!("Connected to Stenograph writer via {} transport", engine.transport_kind());
        sink.connection_changed(ConnectionState::Connected);
        sink.capture_changed(CaptureState::Ready);

        let shutdown = Arc::new(AtomicBool::new(false));
        let mut capture = CaptureLoop {
            engine,
            detector: RealtimeDetector::new(),
            sink,
            shutdown: shutdown.clone(),
            timings,
            connection: ConnectionState::Connected,
        };

        let thread = std::thread::Builder::new()
            .name("steno-capture".into())
            .spawn(move || capture.run())
            .map_err(CaptureError::Spawn)?;

        Ok(Self {
            shutdown,
            thread: Some(thread),
        })
    }

    /// Open the selected backend and [`start`](Self::start) capturing on it
    ///
    /// # Errors
    /// [`CaptureError::Transport`] if the backend cannot be created here,
    /// otherwise as for `start`.
    pub fn open<S: StrokeSink>(
        kind: TransportKind,
        timings: CaptureTimings,
        sink: S,
    ) -> Result<Self, CaptureError> {
        let transport = open_transport(kind)?;
        Self::start(transport, timings, sink)
    }

    /// Whether the capture thread is still running
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signal cancellation and wait for the thread to release the transport
    ///
    /// Returns within one read timeout or reconnect interval. Idempotent.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Capture thread panicked");
            }
        }
    }
}

impl Drop for StenoCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// CaptureLoop — runs on the capture thread
// ---------------------------------------------------------------------------

struct CaptureLoop<S: StrokeSink> {
    engine: ProtocolEngine,
    detector: RealtimeDetector,
    sink: S,
    shutdown: Arc<AtomicBool>,
    timings: CaptureTimings,
    connection: ConnectionState,
}

impl<S: StrokeSink> CaptureLoop<S> {
    fn run(&mut self) {
        debug!("Capture thread started");
        self.sink.capture_changed(CaptureState::Polling);

        while !self.cancelled() {
            match self.engine.poll() {
                Ok(outcome) => self.handle(outcome),
                Err(e) if e.is_device_removed() => {
                    warn!("Stenograph machine disconnected, reconnecting…");
                    if self.reconnect() {
                        warn!("Stenograph reconnected.");
                    }
                }
                Err(e) => {
                    debug!("Poll failed: {}", e);
                    std::thread::sleep(self.timings.error_backoff);
                }
            }
        }

        self.engine.disconnect();
        self.set_connection(ConnectionState::Disconnected);
        self.sink.capture_changed(CaptureState::Stopped);
        debug!(
            "Capture thread exiting (seq {}, offset {})",
            self.engine.sequence(),
            self.engine.file_offset()
        );
    }

    fn cancelled(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn handle(&mut self, outcome: PollOutcome) {
        match outcome {
            PollOutcome::Payload(payload) => self.feed(&payload),
            PollOutcome::Empty => self.feed(&[]),
            // Already logged by the engine; nothing to deliver
            PollOutcome::Stale | PollOutcome::NoResponse | PollOutcome::DeviceError { .. } => {}
        }
    }

    fn feed(&mut self, payload: &[u8]) {
        match self.detector.observe(payload) {
            Detection::Backlog => trace!("Skipping {} backlog bytes", payload.len()),
            Detection::CaughtUp => {
                info!("Stenograph writer is realtime");
                self.set_connection(ConnectionState::Realtime);
            }
            Detection::Idle => {}
            Detection::Live(bytes) => {
                if let Some(stroke) = Stroke::from_payload(bytes) {
                    debug!("Stroke: {}", stroke);
                    self.sink.stroke(stroke);
                }
            }
        }
    }

    /// Retry `connect` every reconnect interval until it works or we are stopped
    ///
    /// Sequence number and file offset are kept, so the writer resumes its log
    /// where this client left off.
    fn reconnect(&mut self) -> bool {
        self.engine.disconnect();
        self.set_connection(ConnectionState::Disconnected);
        self.sink.capture_changed(CaptureState::Reconnecting);
        self.set_connection(ConnectionState::Connecting);

        loop {
            if self.engine.connect() {
                self.set_connection(ConnectionState::Connected);
                self.sink.capture_changed(CaptureState::Polling);
                return true;
            }
            if self.cancelled() {
                break;
            }
            std::thread::sleep(self.timings.reconnect_interval);
            if self.cancelled() {
                break;
            }
        }

        self.set_connection(ConnectionState::Disconnected);
        false
    }

    fn set_connection(&mut self, state: ConnectionState) {
        if self.connection != state {
            self.connection = state;
            self.sink.connection_changed(state);
        }
    }
}
