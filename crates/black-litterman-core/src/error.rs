use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlackLittermanError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid parameter: {field}: {reason}")]
    InvalidParameter { field: String, reason: String },

    #[error("Invalid view #{index}: {reason}")]
    InvalidView { index: usize, reason: String },

    #[error("Too many views: {count} supplied, at most {max} allowed")]
    TooManyViews { count: usize, max: usize },

    #[error("Calibration failure: view #{view_index} did not converge after {iterations} iterations (relative tilt error: {last_error})")]
    CalibrationNonConvergence {
        view_index: usize,
        iterations: u32,
        last_error: Decimal,
    },

    #[error("Singular matrix in {context}")]
    SingularMatrix { context: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl BlackLittermanError {
    pub(crate) fn dimension(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        BlackLittermanError::DimensionMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }

    pub(crate) fn parameter(field: impl Into<String>, reason: impl Into<String>) -> Self {
        BlackLittermanError::InvalidParameter {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for BlackLittermanError {
    fn from(e: serde_json::Error) -> Self {
        BlackLittermanError::SerializationError(e.to_string())
    }
}
