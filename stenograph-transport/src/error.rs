//! Transport error types

use thiserror::Error;

/// Errors that can occur during transport operations
#[derive(Error, Debug)]
pub enum TransportError {
    // Common errors
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The writer went away mid-session; the caller must reconnect
    #[error("Device disconnected")]
    Disconnected,

    #[error("Transport is not connected")]
    NotConnected,

    #[error("Communication timeout")]
    Timeout,

    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    // Backend-specific errors
    #[error("USB error: {0}")]
    Usb(rusb::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport not supported on this platform: {0}")]
    Unsupported(String),
}

impl TransportError {
    /// Whether this error ends the session (device unplugged or handle gone)
    pub fn is_device_removed(&self) -> bool {
        matches!(self, Self::Disconnected | Self::NotConnected)
    }
}

impl From<rusb::Error> for TransportError {
    fn from(e: rusb::Error) -> Self {
        match e {
            // ENODEV from libusb
            rusb::Error::NoDevice => TransportError::Disconnected,
            rusb::Error::Timeout => TransportError::Timeout,
            rusb::Error::NotFound => TransportError::DeviceNotFound(e.to_string()),
            other => TransportError::Usb(other),
        }
    }
}
