//! Common types for transport layer

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Transport backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Pick the backend native to this platform
    #[default]
    Auto,
    /// Generic USB bulk transfers through libusb
    Bulk,
    /// Raw OS device handle (Windows writer driver)
    Raw,
}

impl TransportKind {
    /// Resolve `Auto` to a concrete backend for this platform
    pub fn resolve(self) -> Self {
        match self {
            Self::Auto if cfg!(windows) => Self::Raw,
            Self::Auto => Self::Bulk,
            other => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Bulk => "bulk",
            Self::Raw => "raw",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "bulk" | "usb" | "libusb" => Ok(Self::Bulk),
            "raw" | "handle" => Ok(Self::Raw),
            _ => Err(format!(
                "unknown transport: \"{s}\". Use auto, bulk or raw"
            )),
        }
    }
}

/// Writer found during enumeration (not yet opened)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Backend that found the device
    pub kind: TransportKind,
    /// Bus/address for bulk devices, interface path for raw handles
    pub path: String,
    /// USB product ID if known
    pub pid: Option<u16>,
}

impl fmt::Display for DiscoveredDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pid {
            Some(pid) => write!(f, "[{}] {} (pid {:04x})", self.kind, self.path, pid),
            None => write!(f, "[{}] {}", self.kind, self.path),
        }
    }
}
