//! Dispatcher configuration

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use streampull_batcher::BatchLimits;

use crate::error::ConfigError;
use crate::protocol::ACK_IDS_BATCH_SIZE;

const DEFAULT_MAX_BATCH_SIZE: usize = 100;
const DEFAULT_MAX_BATCH_LATENCY_MS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Request items collected per dispatch cycle
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Extra wait for more items after the first one of a cycle
    #[serde(default = "default_max_batch_latency_ms")]
    pub max_batch_latency_ms: u64,
    /// Ack ids per outbound request
    #[serde(default = "default_ack_ids_batch_size")]
    pub ack_ids_batch_size: usize,
}

fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

fn default_max_batch_latency_ms() -> u64 {
    DEFAULT_MAX_BATCH_LATENCY_MS
}

fn default_ack_ids_batch_size() -> usize {
    ACK_IDS_BATCH_SIZE
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_batch_latency_ms: DEFAULT_MAX_BATCH_LATENCY_MS,
            ack_ids_batch_size: ACK_IDS_BATCH_SIZE,
        }
    }
}

impl DispatcherConfig {
    /// Load from a YAML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: DispatcherConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read `STREAMPULL_*` variables, defaulting any that are unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            max_batch_size: env_or("STREAMPULL_MAX_BATCH_SIZE", DEFAULT_MAX_BATCH_SIZE)?,
            max_batch_latency_ms: env_or(
                "STREAMPULL_MAX_BATCH_LATENCY_MS",
                DEFAULT_MAX_BATCH_LATENCY_MS,
            )?,
            ack_ids_batch_size: env_or("STREAMPULL_ACK_IDS_BATCH_SIZE", ACK_IDS_BATCH_SIZE)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_size == 0 {
            return Err(ConfigError::Invalid("max_batch_size must be > 0".into()));
        }
        if self.ack_ids_batch_size == 0 {
            return Err(ConfigError::Invalid("ack_ids_batch_size must be > 0".into()));
        }
        Ok(())
    }

    pub fn max_batch_latency(&self) -> Duration {
        Duration::from_millis(self.max_batch_latency_ms)
    }

    pub fn batch_limits(&self) -> BatchLimits {
        BatchLimits {
            max_items: self.max_batch_size,
            max_latency: self.max_batch_latency(),
        }
    }
}

fn env_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Env { name, value }),
        Err(_) => Ok(default),
    }
}
