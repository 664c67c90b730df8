//! Error taxonomy for the acquisition layer.
//!
//! Decode and subscriber failures are recovered locally and never cross a
//! component boundary. Connection failures drive the reconnect state machine
//! and surface through the health flag. Configuration errors are the only
//! class returned to the caller as a hard failure.

use thiserror::Error;

/// A wire frame that does not match the fixed grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0:?}")]
    MalformedFrame(String),
}

/// Transport-level failure. Non-fatal until reconnect attempts are exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("transport error: {0}")]
    Transport(String),
}

/// Invalid configuration, rejected synchronously at construction or
/// `set_endpoint` time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid endpoint {0:?}: expected a ws:// or wss:// URL")]
    InvalidEndpoint(String),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: u64 },
}
