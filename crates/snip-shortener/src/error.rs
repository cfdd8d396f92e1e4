use snip_core::{CoreError, StorageError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShortenerError>;

#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    /// Every candidate id was rejected or could not be generated.
    #[error("no free short id after {attempts} attempts")]
    IdGenerationExhausted { attempts: u32 },
    #[error("owner identity is missing")]
    Unauthorized,
    #[error("invalid short id: {0}")]
    InvalidShortId(String),
    #[error("delete queue is full")]
    QueueFull,
    #[error("delete worker has stopped")]
    QueueClosed,
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<CoreError> for ShortenerError {
    fn from(value: CoreError) -> Self {
        match value {
            CoreError::InvalidShortId(message) => Self::InvalidShortId(message),
            CoreError::Unauthorized => Self::Unauthorized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snip_core::OwnerId;

    #[test]
    fn blank_owner_maps_to_unauthorized() {
        let err: ShortenerError = OwnerId::new("  ").unwrap_err().into();
        assert!(matches!(err, ShortenerError::Unauthorized));
    }

    #[test]
    fn storage_errors_are_wrapped() {
        let err: ShortenerError = StorageError::Timeout("slow".to_string()).into();
        assert!(matches!(err, ShortenerError::Storage(StorageError::Timeout(_))));
    }
}
