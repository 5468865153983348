// Stenograph writer USB polling driver - shared library
// Key chart, protocol engine, realtime detection and the capture loop

pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod keychart;
pub mod realtime;

pub use capture::{
    CaptureEvent, CaptureState, CaptureTimings, ConnectionState, StenoCapture, StrokeSink,
};
pub use config::CaptureConfig;
pub use engine::{PollOutcome, ProtocolEngine};
pub use error::{CaptureError, ConfigError};
pub use keychart::{Stroke, KEYS_LAYOUT, STENO_KEY_CHART};
pub use realtime::{Detection, Phase, RealtimeDetector};

pub use stenograph_transport::{self as transport, TransportKind};
