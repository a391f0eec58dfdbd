use std::path::PathBuf;
use telemon_common::error::ModelError;

/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use telemon_common::error::ModelError;
/// use telemon_storage::error::StorageError;
///
/// let err = StorageError::from(ModelError::EmptyId);
/// assert!(err.is_validation());
/// assert!(err.to_string().contains("metric id is empty"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The metric identity or payload is invalid; nothing was written.
    #[error("Storage: invalid metric: {0}")]
    Validation(#[from] ModelError),

    /// Accumulating the counter would overflow a signed 64-bit integer.
    #[error("Storage: counter '{id}' would overflow")]
    CounterOverflow { id: String },

    /// An underlying database error, after any transient retries.
    #[error("Storage: database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Reading or writing the snapshot file failed.
    #[error("Storage: snapshot I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Snapshot (de)serialization failed.
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backend did not answer a health check in time.
    #[error("Storage: health check timed out")]
    PingTimeout,
}

impl StorageError {
    pub fn is_validation(&self) -> bool {
        matches!(self, StorageError::Validation(_))
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
