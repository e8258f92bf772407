//! Durable key-value storage for the epigraph ingestion gateway.
//!
//! Provides the [`Storage`] capability trait with two engines behind it
//! ([`SqliteStorage`] on disk, [`MemoryStorage`] for tests and ephemeral
//! runs), and the [`FileRegistry`] that persists file records, per-stage
//! ID lists, and per-expert replay checkpoints on top of it.

pub mod backend;
pub mod error;
pub mod memory;
pub mod registry;
pub mod sqlite;

pub use backend::Storage;
pub use error::{Result, StorageError};
pub use memory::MemoryStorage;
pub use registry::FileRegistry;
pub use sqlite::SqliteStorage;
