//! Capture configuration
//!
//! Stored as TOML. Every field is optional; a missing file means defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stenograph_transport::protocol::timing;
use stenograph_transport::TransportKind;

use crate::capture::CaptureTimings;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Which backend to open (`auto`, `bulk`, `raw`)
    pub transport: TransportKind,
    /// Bound on each response read
    pub read_timeout_ms: u64,
    /// Pause between reconnect attempts
    pub reconnect_interval_ms: u64,
    /// Pause after an unclassified transport error
    pub error_backoff_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Auto,
            read_timeout_ms: timing::READ_TIMEOUT_MS,
            reconnect_interval_ms: timing::RECONNECT_INTERVAL_MS,
            error_backoff_ms: timing::ERROR_BACKOFF_MS,
        }
    }
}

impl CaptureConfig {
    /// Default config file path (~/.config/stenograph/capture.toml on Linux)
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stenograph")
            .join("capture.toml")
    }

    /// Load config from a file, or return defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save config, creating the parent directory if needed
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, content).map_err(write_err)
    }

    pub fn timings(&self) -> CaptureTimings {
        CaptureTimings {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            reconnect_interval: Duration::from_millis(self.reconnect_interval_ms),
            error_backoff: Duration::from_millis(self.error_backoff_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CaptureConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, CaptureConfig::default());
        assert_eq!(config.timings(), CaptureTimings::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.toml");
        std::fs::write(&path, "transport = \"bulk\"\nread_timeout_ms = 250\n").unwrap();

        let config = CaptureConfig::load(&path).unwrap();
        assert_eq!(config.transport, TransportKind::Bulk);
        assert_eq!(config.read_timeout_ms, 250);
        assert_eq!(config.reconnect_interval_ms, 500);
        assert_eq!(config.timings().read_timeout, Duration::from_millis(250));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("capture.toml");
        let config = CaptureConfig {
            transport: TransportKind::Raw,
            error_backoff_ms: 40,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(CaptureConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn bad_transport_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.toml");
        std::fs::write(&path, "transport = \"serial\"\n").unwrap();
        assert!(matches!(
            CaptureConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn default_path_ends_in_stenograph_dir() {
        let path = CaptureConfig::default_path();
        assert!(path.ends_with("stenograph/capture.toml"));
    }
}
