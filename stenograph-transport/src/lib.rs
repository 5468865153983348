//! Transport abstraction layer for Stenograph writer communication
//!
//! This crate provides a unified interface for exchanging request/response
//! packets with a Stenograph writer across two transport backends:
//!
//! - Bulk USB (libusb bulk IN/OUT endpoints, any platform)
//! - Raw handle (the vendor's Windows driver, opened by device-interface class)
//!
//! The concrete backend is chosen once, when the transport is opened.

pub mod error;
pub mod mock;
pub mod protocol;
pub mod types;

mod bulk;
mod discovery;
#[cfg(windows)]
mod raw_handle;

pub use bulk::BulkUsbTransport;
pub use discovery::{list_devices, open_transport};
pub use error::TransportError;
pub use mock::{MockReply, MockTransport};
pub use protocol::{PacketHeader, HEADER_BYTES};
#[cfg(windows)]
pub use raw_handle::RawHandleTransport;
pub use types::{DiscoveredDevice, TransportKind};

use std::time::Duration;

/// The core transport trait - both backends implement this
///
/// All calls are blocking and are made from the single capture thread.
/// Errors are split into two classes: transient conditions (timeouts, short
/// reads) surface as `Ok(None)` / [`TransportError::Timeout`], while removal
/// of the device surfaces as [`TransportError::Disconnected`].
pub trait StenoTransport: Send {
    /// Find the writer and acquire the handle/endpoints needed for I/O
    ///
    /// Returns `false` when no writer is present or it cannot be opened;
    /// the reason is logged at debug level and left to the caller to report.
    fn connect(&mut self) -> bool;

    /// Release the handle/endpoints (idempotent)
    fn disconnect(&mut self);

    /// Write a request packet
    ///
    /// # Returns
    /// Bytes written, or `0` when there is no open connection
    fn send_request(&mut self, header: &PacketHeader) -> Result<usize, TransportError>;

    /// Read one response packet, blocking up to `timeout`
    ///
    /// # Returns
    /// `None` on timeout or when fewer than [`HEADER_BYTES`] bytes arrive
    fn receive_response(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError>;

    /// Check if the transport currently holds an open connection
    fn is_connected(&self) -> bool;

    /// Backend identifier
    fn kind(&self) -> TransportKind;
}

/// Type alias for a boxed transport
pub type BoxedTransport = Box<dyn StenoTransport>;
