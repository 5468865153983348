//! Protocol constants and packet codec for Stenograph writer communication
//!
//! Every exchange is a 32-byte header, optionally followed by steno payload.
//! The host sends a read request carrying a sequence number and a file offset
//! into the writer's internal steno log; the writer answers with the same
//! header echoed back plus whatever log bytes follow that offset.

use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Size of the fixed packet header
pub const HEADER_BYTES: usize = 32;

/// Sync marker at the start of every packet ("SG")
pub const SYNC: [u8; 2] = *b"SG";

/// Byte count requested from the writer on each read
pub const REQUESTED_BYTES: u32 = 8;

/// Largest payload the raw-handle backend reads per response
pub const MAX_PAYLOAD_BYTES: usize = 1024;

/// Bulk-IN buffer size
pub const BULK_READ_BYTES: usize = 128;

/// Raw-handle read size (header plus maximum payload)
pub const RAW_READ_BYTES: usize = HEADER_BYTES + MAX_PAYLOAD_BYTES;

/// Bytes of a payload that carry one live stroke
pub const STROKE_BYTES: usize = 4;

/// Action codes (byte 6 of the header)
pub mod action {
    /// Read steno log bytes starting at the file offset
    pub const READ: u8 = 0x13;

    /// Get human-readable name for an action byte
    pub fn name(action: u8) -> &'static str {
        match action {
            READ => "READ",
            _ => "UNKNOWN",
        }
    }
}

/// Communication timing constants
pub mod timing {
    /// Blocking read timeout for a response (ms)
    pub const READ_TIMEOUT_MS: u64 = 3000;
    /// Bulk-OUT write timeout (ms)
    pub const WRITE_TIMEOUT_MS: u64 = 1000;
    /// Interval between reconnect attempts (ms)
    pub const RECONNECT_INTERVAL_MS: u64 = 500;
    /// Pause after an unclassified transport error (ms)
    pub const ERROR_BACKOFF_MS: u64 = 100;
}

/// Device identification constants
pub mod device {
    /// Stenograph USB vendor ID
    pub const VENDOR_ID: u16 = 0x112B;

    /// Device-interface class of the Stenograph USB writer driver
    pub const WRITER_INTERFACE_CLASS: u128 = 0xc5682e20_8059_604a_b761_77c4de9d5dbf;
}

/// Fixed 32-byte packet header (all integers little-endian)
///
/// Used both for outgoing requests and for decoding responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct PacketHeader {
    sync: [u8; 2],
    sequence: U32,
    action: u8,
    _reserved: u8,
    data_length: U32,
    file_offset: U32,
    byte_count: U32,
    param3: U32,
    param4: U32,
    param5: U32,
}

const _: () = assert!(std::mem::size_of::<PacketHeader>() == HEADER_BYTES);

impl PacketHeader {
    /// Read-request template: sync, READ action, fixed byte count, zero cursors
    pub fn read_request() -> Self {
        Self {
            sync: SYNC,
            sequence: U32::new(0),
            action: action::READ,
            _reserved: 0,
            data_length: U32::new(0),
            file_offset: U32::new(0),
            byte_count: U32::new(REQUESTED_BYTES),
            param3: U32::new(0),
            param4: U32::new(0),
            param5: U32::new(0),
        }
    }

    /// Response header as the writer would send it
    pub fn response(sequence: u32, action: u8, data_length: u32, file_offset: u32) -> Self {
        let mut header = Self::read_request();
        header.sequence.set(sequence);
        header.action = action;
        header.data_length.set(data_length);
        header.file_offset.set(file_offset);
        header
    }

    /// Decode the header at the start of `bytes`
    ///
    /// Returns `None` if fewer than [`HEADER_BYTES`] bytes are available.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        Self::read_from_prefix(bytes).ok().map(|(header, _)| header)
    }

    /// Stamp the per-request cursors into the header
    pub fn stamp(&mut self, sequence: u32, file_offset: u32) {
        self.sequence.set(sequence);
        self.file_offset.set(file_offset);
    }

    /// Whether the sync marker is intact
    pub fn is_synced(&self) -> bool {
        self.sync == SYNC
    }

    /// Correlation id echoed by the writer
    pub fn sequence(&self) -> u32 {
        self.sequence.get()
    }

    /// Action code; `action::READ` unless the writer reports an error
    pub fn action(&self) -> u8 {
        self.action
    }

    /// Payload bytes following the header
    pub fn data_length(&self) -> u32 {
        self.data_length.get()
    }

    /// Cursor into the writer's steno log
    pub fn file_offset(&self) -> u32 {
        self.file_offset.get()
    }

    /// Bytes requested per read
    pub fn byte_count(&self) -> u32 {
        self.byte_count.get()
    }

    /// Bytes a raw-handle write covers: header plus declared payload
    pub fn wire_len(&self) -> usize {
        HEADER_BYTES + self.data_length.get() as usize
    }
}

/// Build a complete response packet (header followed by payload)
pub fn encode_response(sequence: u32, action: u8, file_offset: u32, payload: &[u8]) -> Vec<u8> {
    let header = PacketHeader::response(sequence, action, payload.len() as u32, file_offset);
    let mut buf = Vec::with_capacity(HEADER_BYTES + payload.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Payload bytes following the header (empty for short packets)
pub fn payload(packet: &[u8]) -> &[u8] {
    packet.get(HEADER_BYTES..).unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_request_layout() {
        let mut header = PacketHeader::read_request();
        header.stamp(0x0403_0201, 0x0807_0605);
        let bytes = header.as_bytes();

        assert_eq!(bytes.len(), HEADER_BYTES);
        assert_eq!(&bytes[0..2], b"SG");
        assert_eq!(&bytes[2..6], &[0x01, 0x02, 0x03, 0x04]); // sequence, LE
        assert_eq!(bytes[6], action::READ);
        assert_eq!(bytes[7], 0); // reserved
        assert_eq!(&bytes[8..12], &[0, 0, 0, 0]); // no request payload
        assert_eq!(&bytes[12..16], &[0x05, 0x06, 0x07, 0x08]); // file offset, LE
        assert_eq!(&bytes[16..20], &[0x08, 0, 0, 0]); // requested bytes
        assert!(bytes[20..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_stamp_overwrites_previous_cursors() {
        let mut header = PacketHeader::read_request();
        header.stamp(7, 100);
        header.stamp(8, 104);
        assert_eq!(header.sequence(), 8);
        assert_eq!(header.file_offset(), 104);
        assert_eq!(header.byte_count(), REQUESTED_BYTES);
    }

    #[test]
    fn test_parse_response() {
        let packet = encode_response(42, action::READ, 12, &[0x01, 0x40, 0x00, 0x00]);
        let header = PacketHeader::parse(&packet).unwrap();

        assert!(header.is_synced());
        assert_eq!(header.sequence(), 42);
        assert_eq!(header.action(), action::READ);
        assert_eq!(header.data_length(), 4);
        assert_eq!(header.file_offset(), 12);
        assert_eq!(payload(&packet), &[0x01, 0x40, 0x00, 0x00]);
    }

    #[test]
    fn test_parse_short_packet() {
        assert!(PacketHeader::parse(&[0x53, 0x47, 0x01]).is_none());
        assert!(PacketHeader::parse(&[0u8; HEADER_BYTES - 1]).is_none());
        assert!(payload(&[0u8; 10]).is_empty());
    }

    #[test]
    fn test_parse_detects_lost_sync() {
        let mut packet = encode_response(1, action::READ, 0, &[]);
        packet[0] = 0;
        let header = PacketHeader::parse(&packet).unwrap();
        assert!(!header.is_synced());
    }

    #[test]
    fn test_wire_len_includes_payload() {
        assert_eq!(PacketHeader::read_request().wire_len(), HEADER_BYTES);
        assert_eq!(PacketHeader::response(1, action::READ, 16, 0).wire_len(), 48);
    }

    #[test]
    fn test_action_names() {
        assert_eq!(action::name(0x13), "READ");
        assert_eq!(action::name(0x06), "UNKNOWN");
    }
}
