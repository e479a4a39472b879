//! Configuration for the thermostream pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "THERMOSTREAM_DATA_DIR";

/// Main configuration for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base name of the partitioned event log (`{base}:{YYYYMMDD}`)
    pub stream_base: String,

    /// Key of the derived averages log
    pub averages_stream_key: String,

    /// Checkpoint key owned by the aggregating consumer
    pub aggregator_state_key: String,

    /// Checkpoint key owned by the averages consumer
    pub averages_state_key: String,

    /// How long one blocking read may wait
    #[serde(with = "duration_serde")]
    pub block_timeout: Duration,

    /// Approximate cap on the averages log length
    pub averages_maxlen: u64,

    /// Path for storing the embedded store and pipeline stats
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("thermostream");

        Self {
            stream_base: "stream:temps".to_string(),
            averages_stream_key: "stream:averages".to_string(),
            aggregator_state_key: "checkpoint:aggregator".to_string(),
            averages_state_key: "checkpoint:averages".to_string(),
            block_timeout: Duration::from_secs(5),
            averages_maxlen: 50,
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location, applying environment
    /// overrides. A missing file means defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?
        } else {
            Self::default()
        };

        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            config.data_path = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("thermostream")
            .join("config.json")
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Path of the embedded store's persistence file.
    pub fn store_path(&self) -> PathBuf {
        self.data_path.join("store.json")
    }

    /// Path of the persisted pipeline stats.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("stats.json")
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
