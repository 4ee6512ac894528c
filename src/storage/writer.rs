//! Dedicated writer thread.
//!
//! The writer owns the only read-write SQLite connection. Requests arrive on
//! a bounded channel and are applied one at a time, each inside its own
//! IMMEDIATE transaction, so batches never interleave and readers only ever
//! see whole batches. Successful commits are published on the
//! [`ChangeNotifier`] after the transaction is durable.

use rusqlite::{Connection, TransactionBehavior};
use std::path::Path;
use std::thread::JoinHandle;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use super::schema::{
    apply_pragmas, bump_version, count_records, initialize_schema, insert_records, read_version,
    update_records,
};
use super::store::{CommitReceipt, SeedOutcome, WriteBatch};
use crate::error::StoreError;
use crate::flow::notify::ChangeNotifier;
use crate::observability::metrics::{record_commit, record_commit_failure};
use crate::record::{Filter, Record};

/// Error type for the writer thread and its channel.
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("writer channel closed")]
    ChannelClosed,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to spawn writer thread: {0}")]
    Spawn(std::io::Error),

    #[error("writer thread panicked")]
    ThreadPanic,
}

/// Request handled by the writer thread.
enum WriteRequest {
    Commit {
        batch: WriteBatch,
        response: oneshot::Sender<Result<CommitReceipt, StoreError>>,
    },
    SeedIfEmpty {
        records: Vec<Record>,
        response: oneshot::Sender<Result<SeedOutcome, StoreError>>,
    },
    Shutdown,
}

/// Owner of the writer thread.
pub struct Writer {
    thread: JoinHandle<()>,
    handle: WriterHandle,
}

impl Writer {
    /// Open the database, create the schema and start the writer thread.
    ///
    /// The schema exists by the time this returns, so read connections can
    /// be opened against the same file right away.
    pub fn spawn<P: AsRef<Path>>(
        db_path: P,
        notifier: ChangeNotifier,
        channel_size: usize,
    ) -> Result<Self, WriterError> {
        let conn = Connection::open(db_path)?;
        apply_pragmas(&conn)?;
        initialize_schema(&conn)?;

        let (tx, rx) = mpsc::channel(channel_size);

        let thread = std::thread::Builder::new()
            .name("listsync-writer".to_string())
            .spawn(move || run_writer(conn, rx, &notifier))
            .map_err(WriterError::Spawn)?;

        Ok(Self {
            thread,
            handle: WriterHandle { tx },
        })
    }

    /// Get a handle for submitting requests.
    pub fn handle(&self) -> WriterHandle {
        self.handle.clone()
    }

    /// Wait for the writer thread to exit.
    ///
    /// Call after [`WriterHandle::shutdown`], otherwise this blocks until
    /// every handle is dropped.
    pub fn join(self) -> Result<(), WriterError> {
        drop(self.handle);
        self.thread.join().map_err(|_| WriterError::ThreadPanic)
    }
}

/// Cloneable handle for submitting requests to the writer thread.
#[derive(Clone, Debug)]
pub struct WriterHandle {
    tx: mpsc::Sender<WriteRequest>,
}

impl std::fmt::Debug for WriteRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Commit { batch, .. } => f
                .debug_struct("Commit")
                .field("creates", &batch.creates.len())
                .field("updates", &batch.updates.len())
                .finish(),
            Self::SeedIfEmpty { records, .. } => f
                .debug_struct("SeedIfEmpty")
                .field("records", &records.len())
                .finish(),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl WriterHandle {
    /// Apply a batch atomically.
    pub async fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt, StoreError> {
        let (response, rx) = oneshot::channel();
        self.tx
            .send(WriteRequest::Commit { batch, response })
            .await
            .map_err(|_| WriterError::ChannelClosed)?;
        rx.await.map_err(|_| WriterError::ChannelClosed)?
    }

    /// Insert `records` only if the table is empty, as one transaction.
    pub async fn seed_if_empty(&self, records: Vec<Record>) -> Result<SeedOutcome, StoreError> {
        let (response, rx) = oneshot::channel();
        self.tx
            .send(WriteRequest::SeedIfEmpty { records, response })
            .await
            .map_err(|_| WriterError::ChannelClosed)?;
        rx.await.map_err(|_| WriterError::ChannelClosed)?
    }

    /// Ask the writer thread to stop after the requests already queued.
    pub async fn shutdown(&self) -> Result<(), WriterError> {
        self.tx
            .send(WriteRequest::Shutdown)
            .await
            .map_err(|_| WriterError::ChannelClosed)
    }
}

fn run_writer(mut conn: Connection, mut rx: mpsc::Receiver<WriteRequest>, notifier: &ChangeNotifier) {
    tracing::debug!("Writer thread started");

    while let Some(request) = rx.blocking_recv() {
        match request {
            WriteRequest::Commit { batch, response } => {
                let started = Instant::now();
                let kind = batch.kind();
                let result = apply_batch(&mut conn, &batch);
                match &result {
                    Ok(receipt) if receipt.changed() > 0 => {
                        record_commit(kind, started.elapsed().as_secs_f64());
                        notifier.notify(receipt.version, receipt.changed());
                        tracing::debug!(
                            version = receipt.version,
                            created = receipt.created,
                            updated = receipt.updated,
                            "Batch committed"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        record_commit_failure(e.kind());
                        tracing::warn!(error = %e, "Batch rejected");
                    }
                }
                // Receiver gone means the caller stopped waiting; the commit stands.
                let _ = response.send(result);
            }
            WriteRequest::SeedIfEmpty { records, response } => {
                let started = Instant::now();
                let result = apply_seed(&mut conn, &records);
                match &result {
                    Ok(SeedOutcome::Seeded { created, version }) if *created > 0 => {
                        record_commit("seed", started.elapsed().as_secs_f64());
                        notifier.notify(*version, *created);
                        tracing::info!(created, version, "Store seeded");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        record_commit_failure(e.kind());
                        tracing::warn!(error = %e, "Seeding failed");
                    }
                }
                let _ = response.send(result);
            }
            WriteRequest::Shutdown => break,
        }
    }

    tracing::debug!("Writer thread stopped");
}

/// Apply one batch inside an IMMEDIATE transaction.
///
/// Any error drops the transaction, which rolls the whole batch back.
fn apply_batch(conn: &mut Connection, batch: &WriteBatch) -> Result<CommitReceipt, StoreError> {
    batch.validate()?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let current = read_version(&tx)?;

    if let Some(expected) = batch.base_version {
        if expected != current {
            return Err(StoreError::Conflict {
                expected,
                actual: current,
            });
        }
    }

    if batch.is_empty() {
        return Ok(CommitReceipt {
            version: current,
            created: 0,
            updated: 0,
        });
    }

    let created = insert_records(&tx, &batch.creates)?;
    let updated = update_records(&tx, &batch.updates)?;
    let version = bump_version(&tx)?;
    tx.commit()?;

    Ok(CommitReceipt {
        version,
        created,
        updated,
    })
}

/// Count-then-create inside one IMMEDIATE transaction.
///
/// The write lock is held from the count to the commit, so two seed requests
/// can never both see an empty table.
fn apply_seed(conn: &mut Connection, records: &[Record]) -> Result<SeedOutcome, StoreError> {
    for record in records {
        record.validate()?;
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let existing = count_records(&tx, &Filter::all())?;
    if existing > 0 {
        return Ok(SeedOutcome::AlreadyPopulated { existing });
    }
    if records.is_empty() {
        return Ok(SeedOutcome::Seeded {
            created: 0,
            version: read_version(&tx)?,
        });
    }

    let created = insert_records(&tx, records)?;
    let version = bump_version(&tx)?;
    tx.commit()?;

    Ok(SeedOutcome::Seeded { created, version })
}
