//! Driver error types

use std::path::PathBuf;

use stenograph_transport::TransportError;
use thiserror::Error;

/// Errors from starting a capture session
#[derive(Error, Debug)]
pub enum CaptureError {
    /// No writer answered the initial connect
    #[error("Stenograph machine not found")]
    DeviceNotFound,

    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The capture thread could not be started
    #[error("Failed to spawn capture thread: {0}")]
    Spawn(std::io::Error),
}

/// Errors from loading or saving configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
