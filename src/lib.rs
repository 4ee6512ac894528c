//! Listsync: a record store shared by one writer and many live readers.
//!
//! A single writer thread owns the SQLite write connection and commits
//! batches atomically, while read sessions serve sectioned snapshots from a
//! pool of read-only connections and refresh when commits land.
//!
//! # Architecture
//!
//! - **Single writer**: all mutations are serialized on one thread
//! - **Snapshot reads**: SQLite WAL read transactions never observe half a batch
//! - **Coalesced notification**: bursts of commits collapse into one wake-up
//! - **Observable**: tracing and OpenTelemetry metrics
//!
//! # Modules
//!
//! - [`config`]: CLI and environment configuration for the demo binary
//! - [`clock`]: Injectable clock for the scheduled workload
//! - [`demo`]: Wiring of store, sessions and scheduler for the binary
//! - [`error`]: Store error taxonomy
//! - [`flow`]: Change notification between writer and readers
//! - [`observability`]: Metrics and tracing setup
//! - [`record`]: Record value type, filters and orderings
//! - [`scheduler`]: Periodic bulk-update workload
//! - [`session`]: Read and write sessions
//! - [`storage`]: SQLite persistence layer

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,    // session::read::ReadSession is fine
    clippy::must_use_candidate,         // Not all functions need #[must_use]
    clippy::missing_errors_doc,         // Error docs can be verbose
    clippy::missing_panics_doc,         // Panic docs can be verbose
    clippy::needless_raw_string_hashes, // r#""# is fine for SQL
    clippy::cast_possible_truncation,   // SQLite integers are i64
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

pub mod clock;
pub mod config;
pub mod demo;
pub mod error;
pub mod flow;
pub mod observability;
pub mod record;
pub mod scheduler;
pub mod session;
pub mod storage;

pub use error::StoreError;
pub use record::{calendar_day, Filter, Order, Record};
pub use session::{ReadSession, View, WriteSession};
pub use storage::{RecordStore, StoreConfig};

use uuid::Uuid;

/// Generate a new random record identifier.
///
/// # Example
///
/// ```
/// let id = listsync::generate_record_id();
/// assert!(!id.is_nil());
/// ```
#[must_use]
pub fn generate_record_id() -> Uuid {
    Uuid::new_v4()
}
