//! Record source implementations for the screen buffer.
//!
//! [`SqliteSource`] serves a syslog table out of SQLite through the
//! `core-query` builder; [`MemorySource`] serves a shared in-memory store
//! (demo mode, tests). Both speak the `core-buffer` source contract and are
//! only ever driven from the fetch thread.

mod memory;
mod sqlite;

pub use memory::{MemorySource, MemoryStore};
pub use sqlite::{SqliteSource, newest_id_at};
