//! Error types for migration operations.

use thiserror::Error;

/// Migration-specific errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The token was rejected by a GitLab instance.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A group or project that had to exist was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Group creation was refused because the path is already taken.
    #[error("Group {path} already exists: {message}")]
    GroupConflict {
        /// Path that was requested.
        path: String,
        /// Server message.
        message: String,
    },

    /// API request failed with a non-success status.
    #[error("API request failed ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// The server answered with a body we could not understand.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Transport-level failure (connect, TLS, timeout).
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Every attempt of a rate-limited call got HTTP 429.
    #[error("too many 429 responses from import endpoint after {attempts} attempts")]
    RateLimitExhausted {
        /// Number of attempts made.
        attempts: u32,
    },

    /// The source reported a failed export job.
    #[error("Export of {0} failed on the source instance")]
    ExportFailed(String),

    /// The export job did not finish within the poll bound.
    #[error("Export of {project} still pending after {polls} status checks")]
    ExportTimedOut {
        /// Project path with namespace.
        project: String,
        /// Number of status checks made.
        polls: u32,
    },

    /// The target refused the import request.
    #[error("import failed ({status}): {body}")]
    ImportRejected {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl MigrationError {
    /// Whether this is the typed "already exists" answer to a group creation.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::GroupConflict { .. })
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrationError>;
