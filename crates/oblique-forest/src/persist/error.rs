//! Persist errors.

use super::schema::FORMAT_VERSION;

/// Errors reading a persisted model.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported format version {0}, this build reads version {FORMAT_VERSION}")]
    UnsupportedVersion(u64),

    /// The document parsed but describes an inconsistent model.
    #[error("validation failed: {0}")]
    Validation(String),
}

/// Errors writing a model.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
