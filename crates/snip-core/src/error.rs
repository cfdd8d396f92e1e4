use thiserror::Error;

/// Errors raised while constructing core value types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid short id: {0}")]
    InvalidShortId(String),
    #[error("owner identity is missing")]
    Unauthorized,
}

/// Errors returned by storage backends.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// The short id is already bound to a different URL.
    #[error("short id already exists: {0}")]
    AlreadyExists(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    /// A durable write or read failed.
    #[error("storage i/o failed: {0}")]
    Io(String),
    /// The append log could not be replayed.
    #[error("storage log is corrupted at line {line}: {reason}")]
    Corrupted { line: usize, reason: String },
    #[error("storage operation failed: {0}")]
    Operation(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}
