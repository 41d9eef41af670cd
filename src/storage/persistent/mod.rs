//! Persistent storage backend for leadsweep.
//!
//! This module provides durable, crash-safe lead storage with:
//! - Write-Ahead Logging (WAL) for crash recovery
//! - File locking for single-process access
//! - CRC32 checksums for corruption detection
//! - Snapshot compaction to bound WAL growth
//!
//! # Layout
//!
//! ```text
//! <dir>/
//!   .lock        exclusive lock, holder pid
//!   leads.wal    append-only mutations since the last snapshot
//!   leads.snap   every lead, natural order, as of the last compaction
//! ```

mod codec;
mod file_lock;
mod snapshot;
mod store;
mod wal;

pub use file_lock::FileLock;
pub use snapshot::SnapshotHeader;
pub use store::{CompactionResult, PersistentLeadStore, SNAPSHOT_FILE, WAL_FILE};
pub use wal::{WalEntry, WalEntryKind, WalIterator, WriteAheadLog};

use std::path::Path;

use crate::storage::StorageError;

/// Configuration for persistent storage.
#[derive(Debug, Clone)]
pub struct PersistentConfig {
    /// WAL size that triggers automatic compaction (bytes).
    pub max_wal_size: u64,
    /// Whether to fsync after every write (slower but safer).
    pub sync_on_write: bool,
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            max_wal_size: 16 * 1024 * 1024, // 16 MB
            sync_on_write: true,
        }
    }
}

impl PersistentConfig {
    /// Smallest accepted `max_wal_size`; below this every write would compact.
    pub const MIN_WAL_SIZE: u64 = 4 * 1024;

    /// Validates the configuration.
    ///
    /// # Errors
    /// `BackendError` if `max_wal_size` is below [`Self::MIN_WAL_SIZE`].
    pub fn validate(self) -> Result<Self, StorageError> {
        if self.max_wal_size < Self::MIN_WAL_SIZE {
            return Err(StorageError::BackendError(format!(
                "max_wal_size must be at least {} bytes (got {})",
                Self::MIN_WAL_SIZE,
                self.max_wal_size
            )));
        }
        Ok(self)
    }
}

/// Open or create a persistent lead store at the given path.
///
/// # Errors
/// - If the path cannot be created or accessed
/// - If another process holds the lock
/// - If the snapshot is unreadable
///
/// # Example
/// ```rust,ignore
/// use leadsweep::storage::open_store;
///
/// let store = open_store("./leads.db", None)?;
/// ```
pub fn open_store(
    path: impl AsRef<Path>,
    config: Option<PersistentConfig>,
) -> Result<PersistentLeadStore, StorageError> {
    let cfg = config.unwrap_or_default().validate()?;
    PersistentLeadStore::open(path.as_ref(), cfg)
}
