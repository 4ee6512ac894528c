//! Write session: an isolated working set committed as one unit.
//!
//! Records are loaded as value copies, changed locally, and sent to the
//! writer thread in a single [`WriteBatch`]. Nothing a session changes is
//! visible to readers until the commit succeeds, and a failed commit
//! discards the whole working set.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::record::{Filter, Order, Record};
use crate::storage::{CommitReceipt, RecordStore, SeedOutcome, WriteBatch};

pub struct WriteSession {
    store: RecordStore,
    clock: Arc<dyn Clock>,
    rng: StdRng,
    working: Vec<Record>,
    staged_creates: Vec<Record>,
    base_version: Option<u64>,
}

impl WriteSession {
    /// Session on the system clock with an entropy-seeded generator.
    pub fn new(store: RecordStore) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: RecordStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            rng: StdRng::from_entropy(),
            working: Vec::new(),
            staged_creates: Vec::new(),
            base_version: None,
        }
    }

    /// Use a fixed seed for generated timestamps.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Populate the store with `target` records if, and only if, it is empty.
    ///
    /// A populated store is detected from a pooled read before any records
    /// are generated. The writer repeats the count inside the insert
    /// transaction, so concurrent callers populate the table exactly once.
    #[tracing::instrument(skip(self))]
    pub async fn seed_if_empty(&mut self, target: usize) -> Result<SeedOutcome, StoreError> {
        let existing = self.store.count(&Filter::all())?;
        if existing > 0 {
            tracing::debug!(existing, "Store already populated, skipping seed");
            return Ok(SeedOutcome::AlreadyPopulated { existing });
        }

        let records = {
            let now = self.clock.now();
            (0..target)
                .map(|_| Record::random(now, &mut self.rng))
                .collect()
        };
        let outcome = self.store.seed_if_empty(records).await?;
        if let SeedOutcome::AlreadyPopulated { existing } = outcome {
            tracing::debug!(existing, "Store already populated, skipping seed");
        }
        Ok(outcome)
    }

    /// Load a window of records into the working set, replacing its contents.
    ///
    /// The version observed by the read becomes the base version of the next
    /// commit.
    pub fn load(
        &mut self,
        filter: &Filter,
        order: Order,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<&mut [Record], StoreError> {
        let snapshot = self.store.snapshot(filter, order, offset, limit)?;
        self.base_version = Some(snapshot.version);
        self.working = snapshot.records;
        Ok(&mut self.working)
    }

    /// Buffer `count` new records with random timestamps.
    pub fn stage_create(&mut self, count: usize) -> &[Record] {
        let now = self.clock.now();
        let start = self.staged_creates.len();
        for _ in 0..count {
            self.staged_creates.push(Record::random(now, &mut self.rng));
        }
        &self.staged_creates[start..]
    }

    /// Records loaded and not yet committed.
    pub fn working_set(&self) -> &[Record] {
        &self.working
    }

    /// Drop all buffered changes.
    pub fn discard(&mut self) {
        self.working.clear();
        self.staged_creates.clear();
        self.base_version = None;
    }

    /// Commit the working set and staged creates as one batch.
    ///
    /// Every loaded record is written back. The buffers are emptied whether
    /// or not the commit succeeds; on failure nothing reaches the store.
    pub async fn commit(&mut self) -> Result<CommitReceipt, StoreError> {
        let batch = WriteBatch {
            base_version: self.base_version.take(),
            creates: std::mem::take(&mut self.staged_creates),
            updates: std::mem::take(&mut self.working),
        };
        let size = batch.len();

        match self.store.commit(batch).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                tracing::warn!(error = %e, records = size, "Commit failed, batch discarded");
                Err(e)
            }
        }
    }

    /// Give every record in `[offset, offset + limit)` a new random timestamp
    /// and commit the window as one batch.
    ///
    /// Anything buffered before the call is dropped first.
    #[tracing::instrument(skip(self))]
    pub async fn touch_range(
        &mut self,
        offset: usize,
        limit: usize,
    ) -> Result<CommitReceipt, StoreError> {
        let now = self.clock.now();
        self.discard();
        self.load(&Filter::all(), Order::Newest, offset, Some(limit))?;
        for record in &mut self.working {
            record.randomize(now, &mut self.rng);
        }
        self.commit().await
    }
}
