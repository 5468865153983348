//! Request/response cycle against the writer's steno log.
//!
//! Each poll sends one READ request stamped with a fresh sequence number and
//! the current file offset, then reads its response. Only a response echoing
//! that sequence number may advance the offset; anything else is left behind.

use std::time::Duration;

use stenograph_transport::protocol::{self, action, PacketHeader, HEADER_BYTES};
use stenograph_transport::{BoxedTransport, TransportError, TransportKind};
use tracing::{debug, trace};

/// How far behind the writer's answers may be and still be skipped within one poll
const MAX_LATE_RESPONSES: u32 = 4;

/// Result of one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Steno bytes that followed the previous offset
    Payload(Vec<u8>),
    /// Writer has nothing beyond the current offset
    Empty,
    /// Response did not belong to the request just sent; discarded
    Stale,
    /// Read timed out or came back short
    NoResponse,
    /// Correlated response carrying a non-READ action code
    DeviceError { action: u8 },
}

/// Owns the transport plus the sequence and offset cursors
pub struct ProtocolEngine {
    transport: BoxedTransport,
    request: PacketHeader,
    sequence: u32,
    file_offset: u32,
    read_timeout: Duration,
}

impl ProtocolEngine {
    pub fn new(transport: BoxedTransport, read_timeout: Duration) -> Self {
        Self {
            transport,
            request: PacketHeader::read_request(),
            sequence: 0,
            file_offset: 0,
            read_timeout,
        }
    }

    /// Connect the transport; cursors are left untouched
    pub fn connect(&mut self) -> bool {
        self.transport.connect()
    }

    pub fn disconnect(&mut self) {
        self.transport.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Sequence number of the most recent request (0 before the first poll)
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Steno bytes consumed so far
    pub fn file_offset(&self) -> u32 {
        self.file_offset
    }

    /// Run one request/response cycle
    ///
    /// A complete answer to one of the last few requests means the writer is
    /// running behind; it is discarded and the read repeated so the answer to
    /// the current request is not left in the pipe for the next poll.
    ///
    /// # Errors
    /// [`TransportError::NotConnected`] when the request could not be written,
    /// otherwise whatever the transport reported. Removal of the device is
    /// signalled by [`TransportError::is_device_removed`].
    pub fn poll(&mut self) -> Result<PollOutcome, TransportError> {
        self.sequence = self.sequence.wrapping_add(1);
        self.request.stamp(self.sequence, self.file_offset);
        trace!("READ seq={} offset={}", self.sequence, self.file_offset);

        if self.transport.send_request(&self.request)? == 0 {
            return Err(TransportError::NotConnected);
        }

        let mut late_reads = 0;
        loop {
            let Some(response) = self.transport.receive_response(self.read_timeout)? else {
                return Ok(if late_reads == 0 {
                    PollOutcome::NoResponse
                } else {
                    PollOutcome::Stale
                });
            };
            let Some(header) = PacketHeader::parse(&response) else {
                debug!("Discarding {}-byte response without header", response.len());
                return Ok(PollOutcome::Stale);
            };

            if header.is_synced() && header.sequence() == self.sequence {
                return Ok(self.accept(&header, &response));
            }

            debug!(
                "Discarding stale response: seq {} (expected {}), sync {}",
                header.sequence(),
                self.sequence,
                header.is_synced()
            );
            if self.drain(&header, response.len())?
                || !self.is_late(&header)
                || late_reads == MAX_LATE_RESPONSES
            {
                return Ok(PollOutcome::Stale);
            }
            late_reads += 1;
            debug!("Writer is behind, reading again for seq {}", self.sequence);
        }
    }

    /// Take a response correlated with the outstanding request
    fn accept(&mut self, header: &PacketHeader, response: &[u8]) -> PollOutcome {
        if header.action() != action::READ {
            debug!(
                "Writer answered seq {} with action 0x{:02X} ({})",
                self.sequence,
                header.action(),
                action::name(header.action())
            );
            return PollOutcome::DeviceError {
                action: header.action(),
            };
        }

        let payload = protocol::payload(response);
        self.file_offset = self.file_offset.wrapping_add(payload.len() as u32);
        if payload.is_empty() {
            PollOutcome::Empty
        } else {
            trace!("{} steno bytes, offset now {}", payload.len(), self.file_offset);
            PollOutcome::Payload(payload.to_vec())
        }
    }

    /// Synced answer to one of the last few requests
    fn is_late(&self, header: &PacketHeader) -> bool {
        let behind = self.sequence.wrapping_sub(header.sequence());
        header.is_synced() && (1..=MAX_LATE_RESPONSES).contains(&behind)
    }

    /// Read once more if a stale header announced payload that has not arrived
    ///
    /// Returns whether a body was outstanding.
    fn drain(&mut self, header: &PacketHeader, received: usize) -> Result<bool, TransportError> {
        let delivered = received.saturating_sub(HEADER_BYTES);
        if !header.is_synced() || header.data_length() as usize <= delivered {
            return Ok(false);
        }
        match self.transport.receive_response(self.read_timeout) {
            Ok(Some(junk)) => debug!("Drained {} bytes of stale response body", junk.len()),
            Ok(None) => {}
            Err(e) if e.is_device_removed() => return Err(e),
            Err(e) => debug!("Ignoring error while draining stale response: {}", e),
        }
        Ok(true)
    }
}
