//! Console MQTT clients for a sensor node.
//!
//! `sensor-subscriber` prints what the node publishes; `sensor-console`
//! additionally lets an operator switch the node's LED and set its cycle
//! time.

pub mod app;
pub mod config;
pub mod console;
pub mod control;
pub mod mqtt;
