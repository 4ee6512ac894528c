//! SQLite storage layer for listsync.
//!
//! Provides:
//! - Schema initialization and record queries
//! - Dedicated writer thread with atomic batch commits
//! - Read connection pool for snapshot reads
//! - The `RecordStore` facade tying both sides together

pub mod reader;
pub mod schema;
pub mod store;
pub mod writer;

pub use store::{CommitReceipt, RecordStore, SeedOutcome, Snapshot, StoreConfig, WriteBatch};
