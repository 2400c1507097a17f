//! Error types for intake and processing orchestration

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, StudioError>;

/// Error taxonomy for the processing orchestrator
///
/// `Validation` and `Processing` end the current session in `Failed`.
/// `Usage` is returned when an operation is invoked in a state that does not
/// allow it; session state is left untouched in that case.
#[derive(Error, Debug)]
pub enum StudioError {
    /// Candidate missing, not an image, or otherwise rejected at intake
    #[error("Validation error: {0}")]
    Validation(String),

    /// The background-removal capability failed
    #[error("Processing error: {0}")]
    Processing(String),

    /// Operation invoked in an invalid state (e.g. download while not ready)
    #[error("Usage error: {0}")]
    Usage(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StudioError {
    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new usage error
    pub fn usage<S: Into<String>>(msg: S) -> Self {
        Self::Usage(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Whether this error leaves the session untouched
    #[must_use]
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = StudioError::validation("not an image");
        assert!(matches!(err, StudioError::Validation(_)));

        let err = StudioError::usage("download while idle");
        assert!(err.is_usage());
        assert!(!StudioError::processing("boom").is_usage());
    }

    #[test]
    fn test_error_display() {
        let err = StudioError::invalid_config("empty download filename");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: empty download filename"
        );

        let err = StudioError::validation("Please select a valid image file");
        assert_eq!(
            err.to_string(),
            "Validation error: Please select a valid image file"
        );
    }

    #[test]
    fn test_contextual_errors() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = StudioError::file_io_error("write download", Path::new("/out/a.png"), &io_error);
        let error_string = err.to_string();
        assert!(error_string.contains("write download"));
        assert!(error_string.contains("/out/a.png"));

        let err = StudioError::config_value_error("max_input_bytes", 0, "1..");
        let error_string = err.to_string();
        assert!(error_string.contains("max_input_bytes"));
        assert!(error_string.contains("1.."));
    }
}
