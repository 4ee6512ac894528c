//! Read connection pool for concurrent readers.
//!
//! Uses r2d2 with r2d2_sqlite for pooled read access.
//! SQLite WAL mode allows readers to proceed while the writer commits.

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use std::path::Path;
use thiserror::Error;

use super::schema::{apply_reader_pragmas, count_records, fetch_records, read_version};
use super::store::Snapshot;
use crate::error::StoreError;
use crate::record::{Filter, Order, Record};

/// Error type for reader pool operations.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Failed to create connection pool: {0}")]
    PoolCreation(#[from] r2d2::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Read connection pool for record queries.
///
/// Provides pooled read-only connections for concurrent access.
#[derive(Clone)]
pub struct ReaderPool {
    pool: Pool<SqliteConnectionManager>,
}

impl ReaderPool {
    /// Create a new reader pool for the given database path.
    ///
    /// The database must already exist; the writer creates it.
    pub fn new<P: AsRef<Path>>(db_path: P, max_size: u32) -> Result<Self, ReaderError> {
        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX);

        let pool = Pool::builder()
            .max_size(max_size)
            .connection_customizer(Box::new(ReaderConnectionCustomizer))
            .build(manager)?;

        Ok(Self { pool })
    }

    /// Get a connection from the pool.
    pub fn get(&self) -> Result<PooledConnection<SqliteConnectionManager>, ReaderError> {
        Ok(self.pool.get()?)
    }

    pub fn count(&self, filter: &Filter) -> Result<u64, StoreError> {
        let conn = self.get()?;
        count_records(&conn, filter)
    }

    pub fn fetch(
        &self,
        filter: &Filter,
        order: Order,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, StoreError> {
        let conn = self.get()?;
        fetch_records(&conn, filter, order, offset, limit)
    }

    /// Read the version and a window of records inside one read transaction.
    ///
    /// Both come from the same WAL snapshot, so a concurrent commit is either
    /// fully visible or not visible at all.
    pub fn snapshot(
        &self,
        filter: &Filter,
        order: Order,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Snapshot, StoreError> {
        let mut conn = self.get()?;
        let tx = conn.transaction()?;
        let version = read_version(&tx)?;
        let records = fetch_records(&tx, filter, order, offset, limit)?;
        tx.commit()?;
        Ok(Snapshot { version, records })
    }

    pub fn version(&self) -> Result<u64, StoreError> {
        let conn = self.get()?;
        Ok(read_version(&conn)?)
    }
}

/// Connection customizer that applies reader pragmas.
#[derive(Debug)]
struct ReaderConnectionCustomizer;

impl r2d2::CustomizeConnection<rusqlite::Connection, rusqlite::Error>
    for ReaderConnectionCustomizer
{
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        apply_reader_pragmas(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::{apply_pragmas, initialize_schema, insert_records};
    use chrono::Utc;
    use rusqlite::Connection;
    use tempfile::TempDir;

    #[test]
    fn test_reader_pool_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Create the database first with write connection
        let conn = Connection::open(&db_path).unwrap();
        apply_pragmas(&conn).unwrap();
        initialize_schema(&conn).unwrap();
        insert_records(&conn, &[Record::new(uuid::Uuid::new_v4(), Utc::now())]).unwrap();

        let pool = ReaderPool::new(&db_path, 2).unwrap();

        assert_eq!(pool.count(&Filter::all()).unwrap(), 1);
        let snapshot = pool.snapshot(&Filter::all(), Order::Newest, 0, None).unwrap();
        assert_eq!(snapshot.version, 0);
        assert_eq!(snapshot.records.len(), 1);
    }

    #[test]
    fn test_reader_connections_are_read_only() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let conn = Connection::open(&db_path).unwrap();
        apply_pragmas(&conn).unwrap();
        initialize_schema(&conn).unwrap();

        let pool = ReaderPool::new(&db_path, 1).unwrap();
        let reader = pool.get().unwrap();
        assert!(reader
            .execute("UPDATE store_meta SET version = 9 WHERE id = 1", [])
            .is_err());
    }
}
