//! Test utilities shared by the integration tests.
//!
//! Provides:
//! - Temporary database fixtures
//! - An opened store with its writer thread
//! - Polling helper for asynchronous conditions

#![allow(dead_code)]

use listsync::storage::writer::Writer;
use listsync::{RecordStore, StoreConfig};
use std::path::PathBuf;
use tempfile::TempDir;

/// Test fixture that manages a temporary database directory.
///
/// The directory is automatically cleaned up when the fixture is dropped.
pub struct TestFixture {
    /// Temporary directory for test database
    pub temp_dir: TempDir,
    /// Path to the database file
    pub db_path: PathBuf,
}

impl TestFixture {
    /// Create a new test fixture with a temporary database directory.
    pub fn new() -> Self {
        listsync::observability::tracing::init_test_tracing();
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        Self { temp_dir, db_path }
    }

    /// Open a store on the fixture database.
    pub fn open(&self) -> TestStore {
        let (store, writer) =
            RecordStore::open(&self.db_path, &StoreConfig::default()).expect("failed to open store");
        TestStore { store, writer }
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// An open store plus the writer thread that must be joined on shutdown.
pub struct TestStore {
    pub store: RecordStore,
    pub writer: Writer,
}

impl TestStore {
    /// Stop the writer thread and wait for it.
    pub async fn shutdown(self) {
        self.store.close().await.expect("close failed");
        self.writer.join().expect("writer join failed");
    }
}

/// Wait for a condition to become true with timeout.
///
/// # Returns
///
/// `true` if condition was met, `false` if timeout expired
pub async fn wait_for<F>(timeout: std::time::Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    false
}
