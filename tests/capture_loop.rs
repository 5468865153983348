//! Integration tests for the capture loop.
//!
//! These drive `StenoCapture` end to end against a scripted transport:
//! connection loss and recovery, cancellation latency, and delivery through
//! the broadcast sink.

use std::sync::mpsc;
use std::time::{Duration, Instant};

use steno_driver::transport::{MockReply, MockTransport, StenoTransport, TransportError};
use steno_driver::{
    CaptureError, CaptureEvent, CaptureState, CaptureTimings, ConnectionState, StenoCapture,
    TransportKind,
};
use tokio::sync::broadcast;

const READ_TIMEOUT: Duration = Duration::from_millis(200);
const RECONNECT_INTERVAL: Duration = Duration::from_millis(40);

fn timings() -> CaptureTimings {
    CaptureTimings {
        read_timeout: READ_TIMEOUT,
        reconnect_interval: RECONNECT_INTERVAL,
        error_backoff: Duration::from_millis(5),
    }
}

fn mock() -> MockTransport {
    let mock = MockTransport::new();
    mock.set_idle(Duration::from_millis(2));
    mock
}

/// Collect events until `pred` matches one, failing after a few seconds
fn wait_for_event(
    rx: &mpsc::Receiver<CaptureEvent>,
    seen: &mut Vec<CaptureEvent>,
    pred: impl Fn(&CaptureEvent) -> bool,
) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        let event = rx
            .recv_timeout(left)
            .unwrap_or_else(|_| panic!("timed out; events so far: {seen:?}"));
        let done = pred(&event);
        seen.push(event);
        if done {
            return;
        }
    }
}

// ── Reconnection ──

#[test]
fn reconnects_after_removal_without_resetting_cursors() {
    let mock = mock();
    // initial connect, then three failed retries before the writer is back
    mock.script_connects([true, false, false, false, true]);
    mock.push_replies([
        MockReply::Payload(vec![0x3F; 8]), // backlog
        MockReply::Payload(vec![]),        // caught up
        MockReply::Disconnect,
        MockReply::Payload(vec![0b000001, 0, 0, 0]),
    ]);

    let (tx, rx) = mpsc::channel();
    let mut capture = StenoCapture::start(Box::new(mock.clone()), timings(), tx).unwrap();

    let mut seen = Vec::new();
    wait_for_event(&rx, &mut seen, |e| matches!(e, CaptureEvent::Stroke(_)));
    capture.stop();

    // Retries are spaced by the reconnect interval
    let attempts = mock.connect_attempts();
    assert_eq!(attempts.len(), 5);
    for pair in attempts[1..].windows(2) {
        assert!(pair[1] - pair[0] >= RECONNECT_INTERVAL);
    }

    // Polling resumes right after the successful connect, with cursors intact
    let requests = mock.requests();
    assert!(requests.len() >= 4);
    assert_eq!(requests[3].sequence(), 4);
    assert_eq!(requests[3].file_offset(), 8);

    assert!(seen.contains(&CaptureEvent::Capture(CaptureState::Reconnecting)));
    let stroke = seen
        .iter()
        .find_map(|e| match e {
            CaptureEvent::Stroke(s) => Some(s.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(stroke.keys(), ["P-"]);

    // Realtime was reached once and is not re-entered after reconnecting
    let realtime_count = seen
        .iter()
        .filter(|e| **e == CaptureEvent::Connection(ConnectionState::Realtime))
        .count();
    assert_eq!(realtime_count, 1);
}

#[test]
fn stop_during_reconnect_returns_promptly() {
    let mock = mock();
    mock.script_connects(std::iter::once(true).chain(std::iter::repeat(false).take(1000)));
    mock.push_reply(MockReply::Disconnect);

    let (tx, rx) = mpsc::channel();
    let mut capture = StenoCapture::start(Box::new(mock.clone()), timings(), tx).unwrap();

    let mut seen = Vec::new();
    wait_for_event(&rx, &mut seen, |e| {
        *e == CaptureEvent::Capture(CaptureState::Reconnecting)
    });

    let started = Instant::now();
    capture.stop();
    assert!(started.elapsed() < RECONNECT_INTERVAL + Duration::from_millis(500));
    assert!(!mock.is_connected());

    seen.extend(rx.try_iter());
    assert_eq!(
        seen.last(),
        Some(&CaptureEvent::Capture(CaptureState::Stopped))
    );
}

// ── Cancellation ──

#[test]
fn stop_during_blocked_read_is_bounded_by_read_timeout() {
    let mock = mock();
    mock.push_replies([MockReply::Block, MockReply::Block, MockReply::Block]);

    let (tx, _rx) = mpsc::channel();
    let mut capture = StenoCapture::start(Box::new(mock.clone()), timings(), tx).unwrap();

    // Let the thread get stuck in the first read
    std::thread::sleep(Duration::from_millis(50));
    let started = Instant::now();
    capture.stop();
    let waited = started.elapsed();

    assert!(waited <= READ_TIMEOUT + Duration::from_millis(300), "waited {waited:?}");
    assert!(!capture.is_running());
    assert!(!mock.is_connected());
    // No further request after the shutdown flag was seen
    assert!(mock.requests().len() <= 2);
}

#[test]
fn dropping_the_handle_stops_capture() {
    let mock = mock();
    let (tx, rx) = mpsc::channel();
    let capture = StenoCapture::start(Box::new(mock.clone()), timings(), tx).unwrap();
    drop(capture);

    assert!(!mock.is_connected());
    let events: Vec<_> = rx.try_iter().collect();
    assert_eq!(
        events.last(),
        Some(&CaptureEvent::Capture(CaptureState::Stopped))
    );
}

// ── Startup ──

#[test]
fn missing_writer_fails_start() {
    let mock = mock();
    mock.script_connects([false]);
    let (tx, mut rx) = broadcast::channel(16);

    let Err(err) = StenoCapture::start(Box::new(mock.clone()), timings(), tx) else {
        panic!("capture started without a writer");
    };
    assert!(matches!(err, CaptureError::DeviceNotFound));
    assert_eq!(err.to_string(), "Stenograph machine not found");
    assert_eq!(mock.connect_attempts().len(), 1);

    let mut last = None;
    while let Ok(event) = rx.try_recv() {
        last = Some(event);
    }
    assert_eq!(last, Some(CaptureEvent::Capture(CaptureState::Error)));
}

// ── Broadcast sink ──

#[test]
fn broadcast_receivers_get_strokes_in_order() {
    let mock = mock();
    mock.push_replies([
        MockReply::Payload(vec![]),
        MockReply::Payload(vec![0b000001, 0, 0, 0]),
        MockReply::Timeout,
        MockReply::Payload(vec![0, 0, 0, 0b000001]),
    ]);
    let (tx, mut rx) = broadcast::channel(64);
    let mut capture = StenoCapture::start(Box::new(mock.clone()), timings(), tx).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut strokes = Vec::new();
    while strokes.len() < 2 && Instant::now() < deadline {
        match rx.try_recv() {
            Ok(CaptureEvent::Stroke(stroke)) => strokes.push(stroke.to_string()),
            Ok(_) => {}
            Err(_) => std::thread::sleep(Duration::from_millis(5)),
        }
    }
    capture.stop();

    assert_eq!(strokes, vec!["P-", "-Z"]);
}

#[cfg(not(windows))]
#[test]
fn opening_raw_backend_off_windows_is_transport_error() {
    let (tx, _rx) = mpsc::channel();
    let Err(err) = StenoCapture::open(TransportKind::Raw, timings(), tx) else {
        panic!("raw backend opened off Windows");
    };
    assert!(matches!(
        err,
        CaptureError::Transport(TransportError::Unsupported(_))
    ));
}
