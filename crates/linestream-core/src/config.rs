//! Stream configuration
//!
//! Loaded from `~/.linestream/config.toml` when present. Durations are in
//! milliseconds; every field has a default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::StreamError;
use crate::request::GrantType;

/// Longer than the server's keep-alive interval, so a healthy stream never stalls
pub const DEFAULT_STALL_TIMEOUT_MS: u64 = 90_000;
pub const DEFAULT_PAUSE_POLL_INTERVAL_MS: u64 = 1_000;
/// How much of an error response body is kept for diagnostics
pub const DEFAULT_MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Maximum wait for any line (message or keep-alive)
    pub stall_timeout_ms: u64,
    /// How often a paused stream re-checks its state
    pub pause_poll_interval_ms: u64,
    /// Access the credentials must grant before a stream may start
    pub required_grant: GrantType,
    pub max_error_body_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stall_timeout_ms: DEFAULT_STALL_TIMEOUT_MS,
            pause_poll_interval_ms: DEFAULT_PAUSE_POLL_INTERVAL_MS,
            required_grant: GrantType::User,
            max_error_body_bytes: DEFAULT_MAX_ERROR_BODY_BYTES,
        }
    }
}

impl StreamConfig {
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }

    pub fn pause_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pause_poll_interval_ms)
    }

    /// Zero is rejected by [`validate`](Self::validate), not clamped
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout_ms = saturating_millis(timeout);
        self
    }

    pub fn with_pause_poll_interval(mut self, interval: Duration) -> Self {
        self.pause_poll_interval_ms = saturating_millis(interval);
        self
    }

    pub fn with_required_grant(mut self, grant: GrantType) -> Self {
        self.required_grant = grant;
        self
    }

    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".linestream").join("config.toml"))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, StreamError> {
        let config: StreamConfig =
            toml::from_str(content).map_err(|e| StreamError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self, StreamError> {
        if !path.exists() {
            debug!("No stream config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| StreamError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded stream config from {:?}", path);
        Ok(config)
    }

    /// Checked on load and again on every `start`
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.stall_timeout_ms == 0 {
            return Err(StreamError::Config(
                "stall_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.pause_poll_interval_ms == 0 {
            return Err(StreamError::Config(
                "pause_poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
