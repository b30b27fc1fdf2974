//! Error types for parsing operator input and validating scoring settings.

use thiserror::Error;

/// Errors raised while parsing operator-supplied values.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    /// An area letter other than A, B or C.
    #[error("unknown area: '{0}' (expected A, B or C)")]
    UnknownArea(String),

    /// A subject key that is not one of the four exam subjects.
    #[error("unknown subject: '{0}'")]
    UnknownSubject(String),

    /// A course id that is not an integer.
    #[error("invalid course id: '{0}'")]
    InvalidCourseId(String),

    /// A time zone offset not in `±HH:MM` form.
    #[error("invalid tz offset '{0}', expected ±HH:MM (e.g. -05:00)")]
    InvalidTzOffset(String),

    /// A date not in `YYYY-MM-DD` form.
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// Errors raised by inconsistent scoring settings.
#[derive(Debug, Error, PartialEq)]
pub enum ScoringError {
    /// A nivelación threshold outside 0..=1.
    #[error("nivelación threshold for {scope} must be between 0 and 1, got {value}")]
    ThresholdOutOfRange { scope: String, value: f64 },

    /// A negative subject criterion.
    #[error("criterion for {scope} must not be negative, got {value}")]
    NegativeCriterion { scope: String, value: f64 },
}
