//! The record store: one writer thread, a pool of snapshot readers, and the
//! notifier that connects them.

use chrono::Utc;
use std::path::Path;
use tokio::sync::watch;

use super::reader::ReaderPool;
use super::writer::{Writer, WriterHandle};
use crate::error::StoreError;
use crate::flow::notify::{ChangeNotifier, CommitNotice};
use crate::record::{Filter, Order, Record};

/// Sizing for the store's channels and pools.
#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    /// Capacity of the writer request channel (backpressure on writers)
    pub write_channel_size: usize,
    /// Maximum number of pooled read connections
    pub reader_pool_size: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            write_channel_size: 1000,
            reader_pool_size: 10,
        }
    }
}

/// Records read inside a single read transaction, with the version they reflect.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub version: u64,
    pub records: Vec<Record>,
}

/// Buffered writes applied atomically by [`RecordStore::commit`].
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    /// Version the session synced at. `None` applies unconditionally.
    pub base_version: Option<u64>,
    pub creates: Vec<Record>,
    pub updates: Vec<Record>,
}

impl WriteBatch {
    /// Batch that only creates records.
    pub fn create(records: Vec<Record>) -> Self {
        Self {
            creates: records,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.creates.len() + self.updates.len()
    }

    /// Label used in metrics.
    pub fn kind(&self) -> &'static str {
        match (self.creates.is_empty(), self.updates.is_empty()) {
            (false, true) => "create",
            (true, false) => "update",
            _ => "mixed",
        }
    }

    /// Check every record before anything touches the database.
    pub fn validate(&self) -> Result<(), StoreError> {
        self.creates
            .iter()
            .chain(&self.updates)
            .try_for_each(Record::validate)
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Store version after the commit
    pub version: u64,
    pub created: usize,
    pub updated: usize,
}

impl CommitReceipt {
    pub fn changed(&self) -> usize {
        self.created + self.updated
    }
}

/// Result of a seeding attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// The table was empty and has been populated.
    Seeded { created: usize, version: u64 },
    /// The table already held records; nothing was written.
    AlreadyPopulated { existing: u64 },
}

/// Durable record table shared by write and read sessions.
///
/// Cloning is cheap; all clones talk to the same writer thread and pool.
#[derive(Clone)]
pub struct RecordStore {
    writer: WriterHandle,
    readers: ReaderPool,
    notifier: ChangeNotifier,
}

impl RecordStore {
    /// Open (or create) the store at `db_path`.
    ///
    /// Returns the store and the writer thread owner. Shut down with
    /// [`RecordStore::close`] followed by [`Writer::join`].
    pub fn open<P: AsRef<Path>>(
        db_path: P,
        config: &StoreConfig,
    ) -> Result<(Self, Writer), StoreError> {
        let db_path = db_path.as_ref();
        let notifier = ChangeNotifier::new();

        let writer = Writer::spawn(db_path, notifier.clone(), config.write_channel_size)?;
        let readers = ReaderPool::new(db_path, config.reader_pool_size)?;

        tracing::info!(path = %db_path.display(), "Record store opened");

        Ok((
            Self {
                writer: writer.handle(),
                readers,
                notifier,
            },
            writer,
        ))
    }

    /// Number of records matching `filter`.
    pub fn count(&self, filter: &Filter) -> Result<u64, StoreError> {
        self.readers.count(filter)
    }

    /// Fetch a window of records in a total order.
    pub fn fetch(
        &self,
        filter: &Filter,
        order: Order,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, StoreError> {
        self.readers.fetch(filter, order, offset, limit)
    }

    /// Fetch a window of records together with the version it reflects.
    pub fn snapshot(
        &self,
        filter: &Filter,
        order: Order,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Snapshot, StoreError> {
        self.readers.snapshot(filter, order, offset, limit)
    }

    /// Current committed version.
    pub fn version(&self) -> Result<u64, StoreError> {
        self.readers.version()
    }

    /// Create `count` records with random timestamps in `[epoch, now]`.
    pub async fn create_batch(&self, count: usize) -> Result<CommitReceipt, StoreError> {
        let records = {
            let mut rng = rand::thread_rng();
            let now = Utc::now();
            (0..count).map(|_| Record::random(now, &mut rng)).collect()
        };
        self.commit(WriteBatch::create(records)).await
    }

    /// Apply a batch atomically on the writer thread.
    pub async fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt, StoreError> {
        self.writer.commit(batch).await
    }

    /// Insert `records` iff the table is empty.
    pub async fn seed_if_empty(&self, records: Vec<Record>) -> Result<SeedOutcome, StoreError> {
        self.writer.seed_if_empty(records).await
    }

    /// Receiver of commit notices, with the current notice marked as seen.
    pub fn subscribe(&self) -> watch::Receiver<CommitNotice> {
        self.notifier.subscribe()
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Stop the writer thread after queued requests drain.
    pub async fn close(&self) -> Result<(), StoreError> {
        tracing::info!("Closing record store");
        Ok(self.writer.shutdown().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_batch_and_count() {
        let dir = TempDir::new().unwrap();
        let (store, writer) = RecordStore::open(dir.path().join("test.db"), &StoreConfig::default())
            .unwrap();

        let receipt = store.create_batch(25).await.unwrap();
        assert_eq!(receipt.created, 25);
        assert_eq!(store.count(&Filter::all()).unwrap(), 25);
        assert_eq!(store.version().unwrap(), 1);

        store.close().await.unwrap();
        writer.join().unwrap();
    }

    #[tokio::test]
    async fn test_reopen_keeps_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");

        let (store, writer) = RecordStore::open(&path, &StoreConfig::default()).unwrap();
        store.create_batch(10).await.unwrap();
        store.close().await.unwrap();
        writer.join().unwrap();

        let (store, writer) = RecordStore::open(&path, &StoreConfig::default()).unwrap();
        assert_eq!(store.count(&Filter::all()).unwrap(), 10);
        assert_eq!(store.version().unwrap(), 1);
        store.close().await.unwrap();
        writer.join().unwrap();
    }

    #[test]
    fn test_batch_kind() {
        let record = Record::new(uuid::Uuid::new_v4(), Utc::now());
        assert_eq!(WriteBatch::create(vec![record.clone()]).kind(), "create");
        let update = WriteBatch {
            updates: vec![record],
            ..WriteBatch::default()
        };
        assert_eq!(update.kind(), "update");
        assert_eq!(update.len(), 1);
    }
}
