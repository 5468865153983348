//! Device discovery and backend selection

use tracing::debug;

use crate::bulk::BulkUsbTransport;
use crate::error::TransportError;
use crate::protocol::device;
use crate::types::{DiscoveredDevice, TransportKind};
use crate::BoxedTransport;

/// List writers visible to the selected backend
pub fn list_devices(kind: TransportKind) -> Result<Vec<DiscoveredDevice>, TransportError> {
    match kind.resolve() {
        TransportKind::Raw => list_raw(),
        _ => BulkUsbTransport::list(device::VENDOR_ID),
    }
}

/// Create an unconnected transport for the selected backend
///
/// This is the only place the backend is chosen; everything above works
/// against [`crate::StenoTransport`].
pub fn open_transport(kind: TransportKind) -> Result<BoxedTransport, TransportError> {
    let resolved = kind.resolve();
    debug!("Using {} transport (requested {})", resolved, kind);
    match resolved {
        TransportKind::Raw => open_raw(),
        _ => Ok(Box::new(BulkUsbTransport::new())),
    }
}

#[cfg(windows)]
fn list_raw() -> Result<Vec<DiscoveredDevice>, TransportError> {
    crate::raw_handle::RawHandleTransport::list()
}

#[cfg(not(windows))]
fn list_raw() -> Result<Vec<DiscoveredDevice>, TransportError> {
    Err(raw_unsupported())
}

#[cfg(windows)]
fn open_raw() -> Result<BoxedTransport, TransportError> {
    Ok(Box::new(crate::raw_handle::RawHandleTransport::new()))
}

#[cfg(not(windows))]
fn open_raw() -> Result<BoxedTransport, TransportError> {
    Err(raw_unsupported())
}

#[cfg(not(windows))]
fn raw_unsupported() -> TransportError {
    TransportError::Unsupported("raw handle transport requires the Windows writer driver".into())
}
