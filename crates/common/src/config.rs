use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Block size used when nothing else is configured
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Plaintext bytes per segment
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Bound on fetches of required content and on put drains
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Bound on lookups of records that may legitimately be absent,
    ///  e.g. a wrapped key for a principal that was never granted
    #[serde(default)]
    pub probe_timeout_ms: u64,
    /// Outstanding unacknowledged puts before writers block
    #[serde(default = "default_flow_capacity")]
    pub flow_capacity: usize,
    /// How many group hops key resolution follows
    #[serde(default = "default_max_group_depth")]
    pub max_group_depth: usize,
    /// Segments a reader accepts in one version
    #[serde(default = "default_max_segments")]
    pub max_segments: u64,
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_flow_capacity() -> usize {
    64
}

fn default_max_group_depth() -> usize {
    8
}

fn default_max_segments() -> u64 {
    1 << 20
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            timeout_ms: default_timeout_ms(),
            probe_timeout_ms: 0,
            flow_capacity: default_flow_capacity(),
            max_group_depth: default_max_group_depth(),
            max_segments: default_max_segments(),
        }
    }
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn from_toml_str(config_toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(config_toml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load a config file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config_toml = std::fs::read_to_string(path)?;
        Self::from_toml_str(&config_toml)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 {
            return Err(ConfigError::Invalid("block_size must be positive".into()));
        }
        if self.flow_capacity == 0 {
            return Err(ConfigError::Invalid("flow_capacity must be positive".into()));
        }
        if self.max_group_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_group_depth must be positive".into(),
            ));
        }
        if self.max_segments == 0 {
            return Err(ConfigError::Invalid("max_segments must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
