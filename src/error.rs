//! Error types for the persistence and synchronization layer

use thiserror::Error;

/// Errors raised by the store, the sync service and the scheduler
#[derive(Error, Debug)]
pub enum SyncError {
    /// A referenced repository, branch, conflict index or task does not exist
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Required identity fields are missing or malformed
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("lock poisoned")]
    Poisoned,

    /// Background work requested outside an async runtime
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl SyncError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        SyncError::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        SyncError::Validation(msg.into())
    }

    /// Whether retrying the same operation may succeed (lock contention)
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Storage(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = SyncError::not_found("branch", "r1:main");
        assert_eq!(err.to_string(), "branch not found: r1:main");
        assert!(err.is_not_found());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_busy_is_transient() {
        let err = SyncError::Storage(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ));
        assert!(err.is_transient());
    }
}
