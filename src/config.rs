//! Sensor configuration
//!
//! Deserialized from TOML; every section falls back to documented defaults
//! so a missing section yields a working configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level sensor configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorConfig {
    #[serde(default)]
    pub decoder: DecoderConfig,

    #[serde(default)]
    pub stream: StreamConfig,
}

impl SensorConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: SensorConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }
}

/// Decode pipeline tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Nested IP encapsulations tolerated before an event is raised.
    /// `None` disables the check.
    #[serde(default = "default_max_encapsulations")]
    pub max_encapsulations: Option<u8>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_encapsulations: default_max_encapsulations(),
        }
    }
}

fn default_max_encapsulations() -> Option<u8> {
    Some(4)
}

/// TCP stream tracking tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Idle seconds before a flow is eligible for cleanup.
    #[serde(default = "default_session_timeout")]
    pub session_timeout: u64,

    /// Drop data segments on flows that never completed a handshake.
    #[serde(default)]
    pub require_three_way_handshake: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            session_timeout: default_session_timeout(),
            require_three_way_handshake: false,
        }
    }
}

fn default_session_timeout() -> u64 {
    30
}
