//! Error definitions for operator input

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    /// The text is not a well-formed integer
    #[error("Invalid input '{0}': not an integer")]
    InvalidInput(String),

    /// A cycle time outside the accepted open interval
    #[error("Cycle time {value} rejected: must be between {min} and {max} ms")]
    OutOfRange { value: i64, min: u32, max: u32 },
}
