//! Structured error types for the prcurve crates.

use thiserror::Error;

/// Unified error type for all curve computations.
///
/// Every variant is raised during validation, before any running state is
/// touched, so a failed call never leaves a half-updated accumulator behind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrCurveError {
    /// Malformed or out-of-range threshold specification
    #[error("invalid threshold spec: {0}")]
    InvalidThresholdSpec(String),

    /// Scores and labels disagree in length or row width
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A label outside the valid range for the task
    #[error("invalid label value: {0}")]
    InvalidLabelValue(String),

    /// A NaN or infinite score
    #[error("invalid score value: {0}")]
    InvalidScoreValue(String),

    /// No samples, or no samples left after removing ignored ones
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// Two running states that cannot be combined
    #[error("incompatible state: {0}")]
    IncompatibleState(String),
}

/// Convenience alias used throughout the prcurve crates.
pub type Result<T> = std::result::Result<T, PrCurveError>;
