//! Scripted in-memory transport
//!
//! Plays back queued replies instead of talking to hardware. Clones share
//! state, so a test can hand one clone to the capture thread and keep another
//! to script replies and inspect the requests that were sent.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::TransportError;
use crate::protocol::{action, encode_response, PacketHeader, HEADER_BYTES};
use crate::types::TransportKind;
use crate::StenoTransport;

/// One scripted outcome of `receive_response`
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Correlated READ response carrying this payload (empty = caught up)
    Payload(Vec<u8>),
    /// Response to an older request: wrong sequence number, `claimed`
    /// payload bytes announced in the header, `payload` actually delivered
    Stale { claimed: u32, payload: Vec<u8> },
    /// Correlated response with a non-READ action code
    DeviceError(u8),
    /// Exact bytes, delivered as-is (junk, short packets, lost sync)
    Raw(Vec<u8>),
    /// Nothing arrives before the read timeout
    Timeout,
    /// Block for the full read timeout, then time out
    Block,
    /// The writer is unplugged
    Disconnect,
    /// Unclassified I/O failure
    Fail,
}

#[derive(Default)]
struct MockState {
    connected: bool,
    connect_script: VecDeque<bool>,
    connect_attempts: Vec<Instant>,
    replies: VecDeque<MockReply>,
    requests: Vec<PacketHeader>,
    receives: usize,
    disconnects: usize,
    idle: Duration,
}

/// Scripted transport for tests and dry runs
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a disconnected mock whose connects succeed until scripted otherwise
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue results for upcoming `connect` calls (unscripted calls succeed)
    pub fn script_connects(&self, results: impl IntoIterator<Item = bool>) {
        self.state.lock().connect_script.extend(results);
    }

    /// Queue one reply
    pub fn push_reply(&self, reply: MockReply) {
        self.state.lock().replies.push_back(reply);
    }

    /// Queue several replies
    pub fn push_replies(&self, replies: impl IntoIterator<Item = MockReply>) {
        self.state.lock().replies.extend(replies);
    }

    /// Sleep this long on reads once the script is exhausted
    pub fn set_idle(&self, idle: Duration) {
        self.state.lock().idle = idle;
    }

    /// Every request header written so far
    pub fn requests(&self) -> Vec<PacketHeader> {
        self.state.lock().requests.clone()
    }

    /// Timestamps of every connect attempt
    pub fn connect_attempts(&self) -> Vec<Instant> {
        self.state.lock().connect_attempts.clone()
    }

    /// Number of `receive_response` calls made
    pub fn receives(&self) -> usize {
        self.state.lock().receives
    }

    /// Number of `disconnect` calls made
    pub fn disconnects(&self) -> usize {
        self.state.lock().disconnects
    }

    /// Replies not yet consumed
    pub fn pending_replies(&self) -> usize {
        self.state.lock().replies.len()
    }

    fn outstanding(state: &MockState) -> u32 {
        state.requests.last().map(|h| h.sequence()).unwrap_or(0)
    }
}

impl StenoTransport for MockTransport {
    fn connect(&mut self) -> bool {
        let mut state = self.state.lock();
        state.connect_attempts.push(Instant::now());
        let ok = state.connect_script.pop_front().unwrap_or(true);
        state.connected = ok;
        ok
    }

    fn disconnect(&mut self) {
        let mut state = self.state.lock();
        state.connected = false;
        state.disconnects += 1;
    }

    fn send_request(&mut self, header: &PacketHeader) -> Result<usize, TransportError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Ok(0);
        }
        state.requests.push(*header);
        Ok(HEADER_BYTES)
    }

    fn receive_response(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let (reply, idle) = {
            let mut state = self.state.lock();
            if !state.connected {
                return Err(TransportError::NotConnected);
            }
            state.receives += 1;
            (state.replies.pop_front(), state.idle)
        };

        let reply = match reply {
            Some(reply) => reply,
            None => {
                std::thread::sleep(idle);
                return Ok(None);
            }
        };

        let mut state = self.state.lock();
        let sequence = Self::outstanding(&state);
        let packet = match reply {
            MockReply::Payload(payload) => encode_response(sequence, action::READ, 0, &payload),
            MockReply::Stale { claimed, payload } => {
                let mut packet = encode_response(sequence.wrapping_sub(1), action::READ, 0, &payload);
                packet[8..12].copy_from_slice(&claimed.to_le_bytes());
                packet
            }
            MockReply::DeviceError(code) => encode_response(sequence, code, 0, &[]),
            MockReply::Raw(bytes) => bytes,
            MockReply::Timeout => return Ok(None),
            MockReply::Block => {
                drop(state);
                std::thread::sleep(timeout);
                return Ok(None);
            }
            MockReply::Disconnect => {
                state.connected = false;
                return Err(TransportError::Disconnected);
            }
            MockReply::Fail => {
                return Err(TransportError::Io(std::io::Error::other("scripted failure")));
            }
        };

        if packet.len() < HEADER_BYTES {
            return Ok(None);
        }
        Ok(Some(packet))
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Bulk
    }
}
