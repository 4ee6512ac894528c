//! Change notification infrastructure.
//!
//! Provides:
//! - Coalescing commit notices for waking read sessions

pub mod notify;

pub use notify::{ChangeNotifier, CommitNotice};
