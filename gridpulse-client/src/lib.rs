//! GridPulse client - real-time telemetry acquisition and resilience layer
//!
//! Owns the single upstream feed connection, decodes its wire frames,
//! recovers from failures with bounded exponential backoff and, when the
//! upstream stays silent past a grace window, substitutes a statistically
//! plausible synthetic feed so consumers never observe an empty state.
//!
//! Components, leaf first: [`codec`] (wire frames), [`connection`]
//! (reconnect state machine + fan-out), [`simulator`] (bounded random-walk
//! feed with rolling history), [`orchestrator`] (unified per-device view).

pub mod clock;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod models;
pub mod observers;
pub mod orchestrator;
pub mod settings;
pub mod simulator;
pub mod state;
pub mod transport;

pub use config::ClientConfig;
pub use connection::{ConnectionManager, ConnectionState};
pub use error::{ConfigError, ConnectionError, DecodeError};
pub use models::{DeviceReading, DeviceRecord, DeviceStatus, LiveSample, Metric, ReadingStatus};
pub use orchestrator::{FeedState, TelemetryOrchestrator};
pub use simulator::{DeviceSeed, DeviceSimulator, SimulatorConfig};
