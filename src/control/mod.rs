//! Operator controls for the sensor node
//!
//! Holds the two values an operator can change from the console: the
//! simulated LED and the measurement cycle time. Both turn into plain ASCII
//! payloads; publishing them is left to the caller.

pub mod cycle_time;
pub mod error;
pub mod led;

pub use cycle_time::CycleTime;
pub use error::ControlError;
pub use led::{led_payload, LedState};
