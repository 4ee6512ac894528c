//! Error taxonomy for store operations.

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::storage::reader::ReaderError;
use crate::storage::writer::WriterError;

/// Error returned by store, session and workload operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store committed other batches since the session last synced.
    #[error("commit conflict: session synced at version {expected}, store is at version {actual}")]
    Conflict { expected: u64, actual: u64 },

    /// The durability layer failed.
    #[error("storage error: {0}")]
    Io(String),

    /// A record is malformed or refers to a record that does not exist.
    #[error("invalid record: {0}")]
    Validation(String),

    /// The writer thread has shut down.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Conflict { .. } => "conflict",
            Self::Io(_) => "io",
            Self::Validation(_) => "validation",
            Self::Closed => "closed",
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => Self::Validation(err.to_string()),
            _ => Self::Io(err.to_string()),
        }
    }
}

impl From<ReaderError> for StoreError {
    fn from(err: ReaderError) -> Self {
        match err {
            ReaderError::Database(e) => e.into(),
            ReaderError::PoolCreation(e) => Self::Io(e.to_string()),
        }
    }
}

impl From<WriterError> for StoreError {
    fn from(err: WriterError) -> Self {
        match err {
            WriterError::ChannelClosed => Self::Closed,
            WriterError::Database(e) => e.into(),
            WriterError::Spawn(e) => Self::Io(e.to_string()),
            WriterError::ThreadPanic => Self::Io("writer thread panicked".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_violation_maps_to_validation() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id TEXT PRIMARY KEY); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err = conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err();

        let store_err = StoreError::from(err);
        assert!(matches!(store_err, StoreError::Validation(_)));
        assert_eq!(store_err.kind(), "validation");
    }

    #[test]
    fn test_channel_closed_maps_to_closed() {
        let err = StoreError::from(WriterError::ChannelClosed);
        assert!(matches!(err, StoreError::Closed));
    }
}
