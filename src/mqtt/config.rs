use crate::config::AppConfig;
use std::time::Duration;

/// Options for a single broker session
#[derive(Debug, Clone, PartialEq)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub keep_alive: Duration,
    pub client_id: String,
    pub subbed_topics: Vec<String>,
    pub channel_capacity: usize,
}

impl MqttConfig {
    /// Builds the options for one run. Every run registers with the broker
    /// under a freshly generated client id.
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            host: config.broker.host.clone(),
            port: config.broker.port,
            keep_alive: Duration::from_secs(config.broker.keep_alive_secs),
            client_id: uuid::Uuid::new_v4().to_string(),
            subbed_topics: config.topics.subscriptions(),
            channel_capacity: 100,
        }
    }
}
