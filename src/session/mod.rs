//! Read and write sessions over the record store.
//!
//! Sessions never share mutable state: each holds its own value copies of
//! the records it works with.

pub mod read;
pub mod write;

pub use read::{ChangeHandler, ReadSession, Section, View};
pub use write::WriteSession;
