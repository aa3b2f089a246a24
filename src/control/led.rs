use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const LED_ON: &str = "ON";
pub const LED_OFF: &str = "OFF";

pub fn led_payload(on: bool) -> &'static str {
    if on {
        LED_ON
    } else {
        LED_OFF
    }
}

/// Last known LED state, shared between the input task and anyone else
/// holding a clone. Starts switched off.
#[derive(Clone, Debug, Default)]
pub struct LedState {
    on: Arc<AtomicBool>,
}

impl LedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::Acquire)
    }

    /// Flips the state and returns the new value
    pub fn toggle(&self) -> bool {
        !self.on.fetch_xor(true, Ordering::AcqRel)
    }

    pub fn payload(&self) -> &'static str {
        led_payload(self.is_on())
    }
}
