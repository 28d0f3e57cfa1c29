//! Error handling for the upload queue

use thiserror::Error;

/// Main error type for the upload queue
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Upload cancelled")]
    Cancelled,

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Upload task panicked: {0}")]
    TaskPanicked(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl UploadError {
    /// Whether this error came from the caller interrupting the upload
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = UploadError::Transfer("connection reset".to_string());
        assert_eq!(err.to_string(), "Transfer failed: connection reset");
        assert!(!err.is_cancelled());
        assert!(UploadError::Cancelled.is_cancelled());
    }
}
