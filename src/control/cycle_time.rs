use std::fmt;

use super::error::ControlError;

/// Exclusive lower bound in milliseconds
pub const MIN_CYCLE_TIME_MS: u32 = 2000;
/// Exclusive upper bound in milliseconds
pub const MAX_CYCLE_TIME_MS: u32 = 60000;

/// Measurement cycle time of the sensor node, always strictly between
/// [`MIN_CYCLE_TIME_MS`] and [`MAX_CYCLE_TIME_MS`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleTime(u32);

impl CycleTime {
    pub fn validate(value: i64) -> bool {
        value > i64::from(MIN_CYCLE_TIME_MS) && value < i64::from(MAX_CYCLE_TIME_MS)
    }

    pub fn new(value: i64) -> Result<Self, ControlError> {
        if !Self::validate(value) {
            return Err(ControlError::OutOfRange {
                value,
                min: MIN_CYCLE_TIME_MS,
                max: MAX_CYCLE_TIME_MS,
            });
        }
        // in range, fits u32
        Ok(Self(value as u32))
    }

    /// Parses operator input
    pub fn parse(text: &str) -> Result<Self, ControlError> {
        let trimmed = text.trim();
        let value: i64 = trimmed
            .parse()
            .map_err(|_| ControlError::InvalidInput(trimmed.to_string()))?;
        Self::new(value)
    }

    pub fn millis(&self) -> u32 {
        self.0
    }

    /// Decimal ASCII payload as sent to the node
    pub fn payload(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for CycleTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ms", self.0)
    }
}
