//! hiveindex-storage: persistent backends for HiveIndex.
//!
//! Backends:
//! - [`hiveindex_core::memory::MemoryStore`]: in-memory (dev/testing, no persistence)
//! - [`sqlite`]: SQLite via `sqlx` (embedded, single-file persistence),
//!   together with a SQLite-backed post cache

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqlitePostCache, SqliteStorage};
