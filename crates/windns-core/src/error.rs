//! Error types for windns
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for windns operations
pub type Result<T> = std::result::Result<T, Error>;

/// Marker the DNS server cmdlets put in their error records when a record does not exist
pub const OBJECT_NOT_FOUND_MARKER: &str = "ObjectNotFound";

/// Core error type for windns
#[derive(Error, Debug)]
pub enum Error {
    /// A declared record is missing a field its type requires, or carries a malformed value.
    /// Raised before any remote call and never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The remote side reported that the addressed record does not exist
    #[error("Record not found: {0}")]
    NotFound(String),

    /// The remote call failed (auth, connectivity, remote script fault)
    #[error("Remote execution failed: {0}")]
    Execution(String),

    /// The lock marker could not be created or waited for
    #[error("Lock acquisition failed: {0}")]
    LockAcquisition(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Identity store errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an execution error
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Create a lock acquisition error
    pub fn lock(msg: impl Into<String>) -> Self {
        Self::LockAcquisition(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Classify the error text of a failed remote call.
    ///
    /// Executors that only see the remote tool's textual output use this to turn an
    /// object-not-found report into [`Error::NotFound`]; everything else is an
    /// [`Error::Execution`] carrying the text verbatim.
    pub fn from_remote_stderr(stderr: impl Into<String>) -> Self {
        let stderr = stderr.into();
        if stderr.contains(OBJECT_NOT_FOUND_MARKER) {
            Self::NotFound(stderr)
        } else {
            Self::Execution(stderr)
        }
    }

    /// Returns `true` for the remote "record does not exist" condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
