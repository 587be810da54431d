//! Configuration schema for rebroadcast
//!
//! Configuration is stored at `~/.config/rebroadcast/config.toml`

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Replay settings used by the CLI
    pub replay: ReplayConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// Replay settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Number of concurrent consumers attached to the cache
    pub consumers: usize,

    /// Label attached to cache log events
    pub label: String,

    /// Bytes read from the input per producer pull
    pub chunk_size: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            consumers: 2,
            label: "event-stream".to_string(),
            chunk_size: 4096,
        }
    }
}

impl GeneralConfig {
    /// Whether logs should be emitted as JSON lines
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}
