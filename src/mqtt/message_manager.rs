/// A publish received from the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttMessage {
    pub topic: String,
    pub content: String,
}

impl MqttMessage {
    /// Decodes the payload as text. Valid UTF-8 is kept byte for byte;
    /// anything else is decoded lossily instead of being dropped.
    pub fn from_publish(topic: impl Into<String>, payload: &[u8]) -> Self {
        MqttMessage {
            topic: topic.into(),
            content: String::from_utf8_lossy(payload).into_owned(),
        }
    }

    /// The console line for this message
    pub fn render(&self) -> String {
        format!("Message received: {}", self.content)
    }
}
