use thiserror::Error;

mod ids;
mod slot;

pub use ids::*;
pub use slot::*;

/// Schema violations found while coercing parsed data into typed values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} {value} out of range, expected {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: usize,
        min: usize,
        max: usize,
    },

    #[error("Empty required field '{field}' at {location}")]
    EmptyRequiredField {
        field: &'static str,
        location: String,
    },

    #[error("Invalid identifier '{input}': {reason}")]
    InvalidIdentifier { input: String, reason: String },

    #[error("Grid for {grid} was normalized as {requested}")]
    KindMismatch {
        grid: ViewKind,
        requested: ViewKind,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
