//! Read session: a live, sectioned view over the store.
//!
//! The view is a set of value copies taken from one read transaction, so it
//! always reflects a whole number of commits. Commit notices arrive through
//! a coalescing watch channel; handlers run one at a time on whatever task
//! drives [`ReadSession::dispatch_next`], typically the task started by
//! [`ReadSession::observe`].

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;
use crate::flow::notify::CommitNotice;
use crate::observability::metrics::record_refresh_failure;
use crate::record::{Filter, Order, Record};
use crate::storage::{RecordStore, Snapshot};

/// Callback run when the store moves past the session's view.
pub type ChangeHandler =
    Box<dyn FnMut(&mut ReadSession, &CommitNotice) -> Result<(), StoreError> + Send>;

/// Records sharing one day key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Section {
    pub key: String,
    pub records: Vec<Record>,
}

/// Sectioned snapshot served to display code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct View {
    /// Store version the view was read at
    pub version: u64,
    pub sections: Vec<Section>,
}

impl View {
    /// Group an ordered snapshot into sections.
    ///
    /// Records arrive sorted by timestamp, so equal day keys are adjacent and
    /// sections come out in the same direction as the records.
    fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut sections: Vec<Section> = Vec::new();
        for record in snapshot.records {
            match sections.last_mut() {
                Some(section) if section.key == record.updated_day() => section.records.push(record),
                _ => sections.push(Section {
                    key: record.updated_day().to_string(),
                    records: vec![record],
                }),
            }
        }
        Self {
            version: snapshot.version,
            sections,
        }
    }

    /// Total number of records across sections.
    pub fn len(&self) -> usize {
        self.sections.iter().map(|s| s.records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// All records in display order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.sections.iter().flat_map(|s| s.records.iter())
    }

    pub fn section(&self, key: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.key == key)
    }
}

pub struct ReadSession {
    store: RecordStore,
    notices: watch::Receiver<CommitNotice>,
    filter: Filter,
    order: Order,
    offset: usize,
    limit: Option<usize>,
    view: View,
    handlers: Vec<ChangeHandler>,
}

impl ReadSession {
    /// Session over every record, newest first.
    pub fn open(store: RecordStore) -> Result<Self, StoreError> {
        Self::with_query(store, Filter::all(), Order::Newest)
    }

    /// Session over the records matching `filter`, in `order`.
    pub fn with_query(store: RecordStore, filter: Filter, order: Order) -> Result<Self, StoreError> {
        // Subscribe before the first read so no commit can slip between them.
        let notices = store.subscribe();
        let mut session = Self {
            store,
            notices,
            filter,
            order,
            offset: 0,
            limit: None,
            view: View::default(),
            handlers: Vec::new(),
        };
        session.refresh()?;
        Ok(session)
    }

    /// Restrict the view to `[offset, offset + limit)` and re-read it.
    pub fn set_window(&mut self, offset: usize, limit: Option<usize>) -> Result<(), StoreError> {
        self.offset = offset;
        self.limit = limit;
        self.refresh()
    }

    /// Snapshot as of the last refresh.
    pub fn current_view(&self) -> &View {
        &self.view
    }

    /// Re-read the view from the store.
    ///
    /// On error the previous view is kept.
    pub fn refresh(&mut self) -> Result<(), StoreError> {
        let snapshot = self
            .store
            .snapshot(&self.filter, self.order, self.offset, self.limit)?;
        self.view = View::from_snapshot(snapshot);
        tracing::trace!(
            version = self.view.version,
            records = self.view.len(),
            "View refreshed"
        );
        Ok(())
    }

    /// Register a handler for commits that move the store past this view.
    ///
    /// Handlers receive the session itself, so calling
    /// [`ReadSession::refresh`] from inside one is fine.
    pub fn on_change<F>(&mut self, handler: F)
    where
        F: FnMut(&mut ReadSession, &CommitNotice) -> Result<(), StoreError> + Send + 'static,
    {
        self.handlers.push(Box::new(handler));
    }

    /// Whether a commit newer than the view has been announced.
    pub fn is_stale(&self) -> bool {
        self.notices.borrow().version > self.view.version
    }

    /// Wait for a notice newer than the current view.
    ///
    /// Notices that piled up while the caller was busy are folded into the
    /// latest one. The session's store keeps the notifier alive, so this
    /// only returns once a newer commit lands.
    pub async fn next_change(&mut self) -> CommitNotice {
        loop {
            if self.notices.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
            let notice = *self.notices.borrow_and_update();
            if notice.version > self.view.version {
                return notice;
            }
        }
    }

    /// Wait for the next change and run every handler for it.
    pub async fn dispatch_next(&mut self) {
        let notice = self.next_change().await;
        self.dispatch(&notice);
    }

    fn dispatch(&mut self, notice: &CommitNotice) {
        let mut handlers = std::mem::take(&mut self.handlers);
        for handler in &mut handlers {
            if let Err(e) = handler(&mut *self, notice) {
                record_refresh_failure();
                tracing::warn!(
                    error = %e,
                    version = notice.version,
                    "Change handler failed, retrying on next notice"
                );
            }
        }
        // Keep handlers registered from inside a handler.
        handlers.append(&mut self.handlers);
        self.handlers = handlers;
    }

    /// Stream of commit notices, starting with the latest one.
    pub fn changes(&self) -> WatchStream<CommitNotice> {
        self.store.notifier().stream()
    }

    /// Drive this session on its own task until `cancel` fires.
    ///
    /// Cancellation is the only way the task ends; it hands the session back.
    pub fn observe(mut self, cancel: CancellationToken) -> JoinHandle<Self> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = self.dispatch_next() => {}
                }
            }
            self
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::WriteSession;
    use crate::storage::{StoreConfig, WriteBatch};
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn open(dir: &TempDir) -> (RecordStore, crate::storage::writer::Writer) {
        RecordStore::open(dir.path().join("test.db"), &StoreConfig::default()).unwrap()
    }

    fn record_on(day: u32, hour: u32) -> Record {
        Record::new(
            Uuid::new_v4(),
            Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_view_groups_by_day_in_record_order() {
        let dir = TempDir::new().unwrap();
        let (store, writer) = open(&dir);
        store
            .commit(WriteBatch::create(vec![
                record_on(1, 3),
                record_on(2, 1),
                record_on(1, 9),
                record_on(3, 0),
            ]))
            .await
            .unwrap();

        let session = ReadSession::open(store.clone()).unwrap();
        let view = session.current_view();
        let keys: Vec<&str> = view.sections.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["2024-01-03", "2024-01-02", "2024-01-01"]);
        assert_eq!(view.section("2024-01-01").unwrap().records.len(), 2);
        assert_eq!(view.len(), 4);
        assert_eq!(view.version, 1);

        let oldest = ReadSession::with_query(store.clone(), Filter::all(), Order::Oldest).unwrap();
        assert_eq!(oldest.current_view().sections[0].key, "2024-01-01");

        store.close().await.unwrap();
        writer.join().unwrap();
    }

    #[tokio::test]
    async fn test_handler_refreshes_after_commit() {
        let dir = TempDir::new().unwrap();
        let (store, writer) = open(&dir);
        let mut session = ReadSession::open(store.clone()).unwrap();
        assert!(session.current_view().is_empty());

        session.on_change(|session, _notice| session.refresh());

        store.create_batch(12).await.unwrap();
        session.dispatch_next().await;

        assert_eq!(session.current_view().len(), 12);
        assert!(!session.is_stale());

        store.close().await.unwrap();
        writer.join().unwrap();
    }

    #[tokio::test]
    async fn test_burst_of_commits_fires_handler_once() {
        let dir = TempDir::new().unwrap();
        let (store, writer) = open(&dir);
        let mut writes = WriteSession::new(store.clone());
        writes.seed_if_empty(30).await.unwrap();

        let mut session = ReadSession::open(store.clone()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        session.on_change(move |session, _notice| {
            counter.fetch_add(1, Ordering::SeqCst);
            session.refresh()
        });

        for i in 0..3 {
            writes.touch_range(i * 10, 10).await.unwrap();
        }
        assert!(session.is_stale());

        session.dispatch_next().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.current_view().version, store.version().unwrap());
        assert!(!session.is_stale());

        store.close().await.unwrap();
        writer.join().unwrap();
    }

    #[tokio::test]
    async fn test_failed_handler_is_retried_on_next_notice() {
        let dir = TempDir::new().unwrap();
        let (store, writer) = open(&dir);
        let mut session = ReadSession::open(store.clone()).unwrap();

        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        session.on_change(move |session, _notice| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(StoreError::Io("simulated read failure".into()));
            }
            session.refresh()
        });

        store.create_batch(5).await.unwrap();
        session.dispatch_next().await;
        assert!(session.current_view().is_empty());
        assert!(session.is_stale());

        store.create_batch(5).await.unwrap();
        session.dispatch_next().await;
        assert_eq!(session.current_view().len(), 10);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        store.close().await.unwrap();
        writer.join().unwrap();
    }

    #[tokio::test]
    async fn test_set_window_pages_the_view() {
        let dir = TempDir::new().unwrap();
        let (store, writer) = open(&dir);
        store.create_batch(20).await.unwrap();

        let mut session = ReadSession::open(store.clone()).unwrap();
        let all: Vec<Record> = session.current_view().records().cloned().collect();

        session.set_window(5, Some(5)).unwrap();
        let page: Vec<Record> = session.current_view().records().cloned().collect();
        assert_eq!(page, all[5..10].to_vec());

        store.close().await.unwrap();
        writer.join().unwrap();
    }

    #[tokio::test]
    async fn test_observe_runs_until_cancelled() {
        let dir = TempDir::new().unwrap();
        let (store, writer) = open(&dir);
        let mut session = ReadSession::open(store.clone()).unwrap();
        let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
        session.on_change(move |session, notice| {
            session.refresh()?;
            let _ = seen_tx.send(notice.version);
            Ok(())
        });

        let cancel = CancellationToken::new();
        let task = session.observe(cancel.clone());

        store.create_batch(3).await.unwrap();
        assert_eq!(seen_rx.recv().await, Some(1));
        store.create_batch(2).await.unwrap();
        assert_eq!(seen_rx.recv().await, Some(2));
        assert!(!task.is_finished());

        cancel.cancel();
        let session = task.await.unwrap();
        assert_eq!(session.current_view().len(), 5);

        store.close().await.unwrap();
        writer.join().unwrap();
    }
}
