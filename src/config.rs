//! Application configuration
//!
//! Everything has a built-in default, so the programs run without any file
//! present. An optional TOML file can override the broker address and the
//! topic names:
//!
//! ```toml
//! [broker]
//! host = "test.mosquitto.org"
//! port = 1883
//!
//! [topics]
//! led_state = "sensor1/ledState"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable naming an alternative config file
pub const CONFIG_ENV: &str = "SENSOR_CONSOLE_CONFIG";
const CONFIG_DIR: &str = "sensor-console";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub keep_alive_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.161".to_string(),
            port: 1883,
            keep_alive_secs: 5,
        }
    }
}

/// Topic names. The cycle time topic keeps its historical spelling because
/// the sensor firmware subscribes to exactly that string.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct TopicConfig {
    pub light: String,
    pub temperature: String,
    pub led_state: String,
    pub cycle_time: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            light: "sensor1/light".to_string(),
            temperature: "sensor1/temperature".to_string(),
            led_state: "sensor1/ledState".to_string(),
            cycle_time: "sensor1/cylceTime".to_string(),
        }
    }
}

impl TopicConfig {
    pub fn subscriptions(&self) -> Vec<String> {
        vec![self.light.clone(), self.temperature.clone()]
    }
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub topics: TopicConfig,
}

impl AppConfig {
    /// Loads the config from `$SENSOR_CONSOLE_CONFIG` or the user config
    /// directory. A missing file means defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(std::env::var(CONFIG_ENV).ok())
    }

    /// [`AppConfig::load`] with the override path passed in
    pub fn load_with(env_override: Option<String>) -> Result<Self, ConfigError> {
        match Self::config_path(env_override) {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No config directory available, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    fn config_path(env_override: Option<String>) -> Option<PathBuf> {
        if let Some(path) = env_override {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|mut dir| {
            dir.push(CONFIG_DIR);
            dir.push(CONFIG_FILE);
            dir
        })
    }
}
