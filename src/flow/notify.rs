//! Commit notifications for read sessions.
//!
//! Uses `tokio::sync::watch`, so each subscriber only ever sees the latest
//! notice: a burst of commits wakes a slow reader once, and a wake-up is
//! never lost because the receiver remembers which version it last saw.

use tokio::sync::watch::{self, Receiver, Sender};
use tokio_stream::wrappers::WatchStream;

/// Notice published after the writer commits a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitNotice {
    /// Store version after the commit
    pub version: u64,
    /// Number of records the commit created or updated
    pub changed: usize,
}

/// Broadcasts commit notices from the writer thread to read sessions.
#[derive(Clone, Debug)]
pub struct ChangeNotifier {
    sender: Sender<CommitNotice>,
}

impl ChangeNotifier {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(CommitNotice::default());
        Self { sender }
    }

    /// Subscribe to notices.
    ///
    /// The receiver starts with the current notice marked as seen, so only
    /// commits after this call wake it.
    pub fn subscribe(&self) -> Receiver<CommitNotice> {
        self.sender.subscribe()
    }

    /// Stream of notices, starting with the current one.
    pub fn stream(&self) -> WatchStream<CommitNotice> {
        WatchStream::new(self.sender.subscribe())
    }

    /// Publish a commit.
    ///
    /// Called by the writer thread after a transaction commits. Never blocks
    /// and succeeds even without subscribers.
    ///
    /// # Returns
    ///
    /// The number of receivers that will observe the notice.
    pub fn notify(&self, version: u64, changed: usize) -> usize {
        self.sender.send_replace(CommitNotice { version, changed });
        self.sender.receiver_count()
    }

    /// The most recently published notice.
    pub fn latest(&self) -> CommitNotice {
        *self.sender.borrow()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}
