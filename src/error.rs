//! Error types for the forecasting core

use thiserror::Error;

/// Result type alias for forecasting operations
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Main error type for the forecasting core
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Empty series: segment '{segment}', column '{column}' has no non-missing values")]
    EmptySeries { segment: String, column: String },

    #[error("Transform not fitted: {0}")]
    UnfittedTransform(String),

    #[error("Model not fitted: {0}")]
    UnfittedModel(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Segment not found: {0}")]
    SegmentNotFound(String),

    #[error("Feature not found: segment '{segment}', feature '{feature}'")]
    FeatureNotFound { segment: String, feature: String },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ForecastError {
    /// Shorthand for an [`ForecastError::InvalidParameter`] error
    pub(crate) fn invalid_parameter(
        name: &str,
        value: impl ToString,
        reason: &str,
    ) -> Self {
        ForecastError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<polars::error::PolarsError> for ForecastError {
    fn from(err: polars::error::PolarsError) -> Self {
        ForecastError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ForecastError {
    fn from(err: ndarray::ShapeError) -> Self {
        ForecastError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_segment_and_column() {
        let err = ForecastError::EmptySeries {
            segment: "store_1".to_string(),
            column: "target".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("store_1"));
        assert!(msg.contains("target"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ForecastError = io_err.into();
        assert!(matches!(err, ForecastError::IoError(_)));
    }

    #[test]
    fn test_invalid_parameter_display() {
        let err = ForecastError::invalid_parameter("window", 0, "must be -1 or positive");
        assert_eq!(
            err.to_string(),
            "Invalid parameter: window = 0, must be -1 or positive"
        );
    }
}
