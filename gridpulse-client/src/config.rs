//! Client configuration.
//!
//! Validation happens up front: an invalid endpoint or an out-of-range
//! numeric knob is the only error class surfaced to the caller as a hard
//! failure.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8080";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Upstream feed URL. May be overridden by a persisted setting.
    pub endpoint_url: String,
    /// Connect as soon as the orchestrator is constructed.
    pub auto_connect: bool,
    /// Reconnect attempts before the connection manager gives up.
    pub max_reconnect_attempts: u32,
    /// First reconnect delay; grows by 1.5x per attempt.
    pub base_reconnect_delay_ms: u64,
    /// Time without a live sample before the synthetic feed takes over.
    pub fallback_grace_ms: u64,
    /// Synthetic feed update period.
    pub generator_tick_ms: u64,
    /// Per-metric history depth of the synthetic feed.
    pub history_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_ENDPOINT.to_string(),
            auto_connect: true,
            max_reconnect_attempts: 3,
            base_reconnect_delay_ms: 1000,
            fallback_grace_ms: 5000,
            generator_tick_ms: 2000,
            history_capacity: 20,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_endpoint(&self.endpoint_url)?;
        if self.base_reconnect_delay_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "base_reconnect_delay_ms",
                value: 0,
            });
        }
        if self.fallback_grace_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "fallback_grace_ms",
                value: 0,
            });
        }
        if self.generator_tick_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "generator_tick_ms",
                value: 0,
            });
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "history_capacity",
                value: 0,
            });
        }
        Ok(())
    }
}

/// The transport only speaks websockets, so reject anything else early.
pub fn validate_endpoint(url: &str) -> Result<(), ConfigError> {
    if url.starts_with("ws://") || url.starts_with("wss://") {
        let rest = url.split("://").nth(1).unwrap_or("");
        if !rest.is_empty() {
            return Ok(());
        }
    }
    Err(ConfigError::InvalidEndpoint(url.to_string()))
}
