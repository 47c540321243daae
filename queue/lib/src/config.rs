//! Engine configuration.
//!
//! Loaded from TOML, with every field optional:
//!
//! ```toml
//! tick = "50ms"
//! default_speed = "0.5s"
//! max_ticks = 1200
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::duration::Duration;
use crate::error::ConfigError;

/// Default spacing between ticks: one game tick.
const DEFAULT_TICK_SECONDS: f64 = 0.05;

/// Settings for [`Engine`](crate::Engine) and the queues created from scripts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Wall-clock spacing between ticks.
    pub tick: Duration,
    /// Speed given to timed queues whose script does not set one.
    pub default_speed: Duration,
    /// Stop after this many ticks, even if queues remain.
    pub max_ticks: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs_f64(DEFAULT_TICK_SECONDS).unwrap_or_default(),
            default_speed: Duration::ZERO,
            max_ticks: None,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from TOML text.
    ///
    /// ## Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML, unknown keys, or
    /// invalid durations.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML configuration file.
    ///
    /// ## Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, or
    /// [`ConfigError::Parse`] if its content is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    #[must_use]
    pub fn tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    #[must_use]
    pub fn default_speed(mut self, speed: Duration) -> Self {
        self.default_speed = speed;
        self
    }

    #[must_use]
    pub fn max_ticks(mut self, limit: u64) -> Self {
        self.max_ticks = Some(limit);
        self
    }
}
