//! # MQTT Integration Module
//!
//! Thin layer over `rumqttc` used by both console programs. The protocol,
//! QoS handshakes and keep-alive are owned by the library; this module only
//! wires connection options, subscriptions, publishing and the delivery of
//! received messages into the rest of the application.
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Connection options derived from the app config
//! ├── message_manager.rs  - Received message representation
//! └── mqtt_handler.rs     - Client handle and event loop driver
//! ```
//!
//! The event loop runs on its own task and forwards every incoming publish
//! over an mpsc channel. There is no reconnect logic: a connection error ends
//! the loop and is reported to the caller.

pub mod config;
pub mod message_manager;
pub mod mqtt_handler;

pub use config::MqttConfig;
pub use message_manager::MqttMessage;
pub use mqtt_handler::{ConnectionState, MqttError, MqttHandle, MqttHandler, Publisher};
