use thiserror::Error;

/// Main error type for the classifier service
#[derive(Error, Debug)]
pub enum FakelensError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Model artifact missing or the requested backend is not compiled in.
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Image errors
    #[error("Image decoding error: {0}")]
    Image(#[from] image::ImageError),

    // Model errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    // Request errors
    #[error("{0}")]
    BadRequest(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FakelensError {
    /// Whether the caller, rather than the service, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, FakelensError::BadRequest(_))
    }
}

/// Result type alias for FakelensError
pub type Result<T> = std::result::Result<T, FakelensError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_bad_request_is_client_error() {
        assert!(FakelensError::BadRequest("No file sent".into()).is_client_error());
        assert!(!FakelensError::ModelUnavailable("missing".into()).is_client_error());
        assert!(!FakelensError::Internal("boom".into()).is_client_error());
    }

    #[test]
    fn test_bad_request_displays_bare_message() {
        let err = FakelensError::BadRequest("No file sent".into());
        assert_eq!(err.to_string(), "No file sent");
    }
}
