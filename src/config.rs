use crate::transforms::{TransformFactory, TransformPipeline, TransformResult, TransformSpec};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Smallest accepted buffer size in seconds
pub const MIN_BUFFER_SIZE_SECS: f64 = 10.0;
pub const DEFAULT_BUFFER_SIZE_SECS: f64 = 60.0;

/// Engine settings, from defaults or environment variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Retention window of every channel, in seconds
    pub buffer_size_secs: f64,
    /// How often the consumer merges streamer data and runs transforms
    pub poll_interval_ms: u64,
    /// Time a streamer task gets to exit before it is aborted
    pub shutdown_grace_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            buffer_size_secs: DEFAULT_BUFFER_SIZE_SECS,
            poll_interval_ms: 100,
            shutdown_grace_ms: 2000,
        }
    }
}

impl EngineSettings {
    /// Load settings from `SERIESFLOW_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            buffer_size_secs: env_or("SERIESFLOW_BUFFER_SIZE", defaults.buffer_size_secs)?,
            poll_interval_ms: env_or("SERIESFLOW_POLL_INTERVAL_MS", defaults.poll_interval_ms)?,
            shutdown_grace_ms: env_or("SERIESFLOW_SHUTDOWN_GRACE_MS", defaults.shutdown_grace_ms)?,
        }
        .validated())
    }

    /// Clamp values into their accepted ranges
    pub fn validated(mut self) -> Self {
        if !self.buffer_size_secs.is_finite() {
            log::warn!(
                "Invalid buffer size {}, using {}",
                self.buffer_size_secs,
                DEFAULT_BUFFER_SIZE_SECS
            );
            self.buffer_size_secs = DEFAULT_BUFFER_SIZE_SECS;
        } else if self.buffer_size_secs < MIN_BUFFER_SIZE_SECS {
            log::warn!(
                "Buffer size {}s below minimum, using {}s",
                self.buffer_size_secs,
                MIN_BUFFER_SIZE_SECS
            );
            self.buffer_size_secs = MIN_BUFFER_SIZE_SECS;
        }
        self.poll_interval_ms = self.poll_interval_ms.max(1);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{}={}", key, raw))),
        Err(_) => Ok(default),
    }
}

/// Transform chain description, usually loaded from a JSON file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub transforms: Vec<TransformSpec>,
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn build(&self, factory: &TransformFactory) -> TransformResult<TransformPipeline> {
        TransformPipeline::build(factory, &self.transforms)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
