//! Error types for Hoard.

use thiserror::Error;

/// Common error type for Hoard.
#[derive(Error, Debug)]
pub enum HoardError {
    /// Malformed or missing input. No state was changed.
    #[error("validation error: {0}")]
    Validation(String),

    /// A path resolved outside the caller's storage root.
    #[error("access denied: path outside sandbox ({0})")]
    SandboxViolation(String),

    /// Unknown session, user or path.
    #[error("{0} not found")]
    NotFound(String),

    /// The caller does not own the resource.
    #[error("access denied: {0}")]
    Forbidden(String),

    /// Completion was attempted before every chunk arrived.
    #[error("upload incomplete: {uploaded} of {total} chunks received")]
    Incomplete {
        /// Number of distinct chunk indices received so far.
        uploaded: u32,
        /// Declared chunk count.
        total: u32,
    },

    /// Chunk index outside the declared bounds.
    #[error("chunk index {index} out of range (total {total})")]
    OutOfRange {
        /// Requested index.
        index: u64,
        /// Number of chunks available.
        total: u64,
    },

    /// A directory was given where a file is required.
    #[error("{0} is a directory")]
    IsDirectory(String),

    /// The staging directory for a session could not be created.
    #[error("failed to create staging area: {0}")]
    StagingCreateFailed(String),

    /// A chunk could not be written to the staging area.
    #[error("failed to store chunk: {0}")]
    ChunkWriteFailed(String),

    /// Chunks could not be assembled into the target file.
    #[error("failed to merge chunks: {0}")]
    MergeFailed(String),

    /// Resource already exists.
    #[error("{0} already exists")]
    Conflict(String),

    /// Database error.
    ///
    /// Errors from sqlx are converted into this variant.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication error.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for HoardError {
    fn from(e: sqlx::Error) -> Self {
        HoardError::Database(e.to_string())
    }
}

/// Result type alias for Hoard operations.
pub type Result<T> = std::result::Result<T, HoardError>;
