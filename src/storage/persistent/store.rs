//! Persistent lead store.
//!
//! The store wraps:
//! - An in-memory `LeadIndex` for reads
//! - WAL integration for durable writes
//! - A snapshot file written on compaction

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{debug, info, warn};

use crate::lead::{Lead, LeadId, LeadPatch};
use crate::storage::memory::LeadIndex;
use crate::storage::traits::{LeadStore, StorageError};

use super::file_lock::FileLock;
use super::snapshot;
use super::wal::{WalEntryKind, WriteAheadLog};
use super::PersistentConfig;

/// WAL file name inside the store directory.
pub const WAL_FILE: &str = "leads.wal";

/// Snapshot file name inside the store directory.
pub const SNAPSHOT_FILE: &str = "leads.snap";

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

fn wal_err(e: &std::io::Error) -> StorageError {
    StorageError::BackendError(format!("WAL write failed: {e}"))
}

fn open_err(what: &str, e: &std::io::Error) -> StorageError {
    StorageError::BackendError(format!("failed to {what}: {e}"))
}

/// Result of a compaction pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionResult {
    /// Leads written to the snapshot.
    pub leads_written: usize,
    /// WAL size before compaction (bytes).
    pub wal_size_before: u64,
    /// WAL size after compaction (bytes).
    pub wal_size_after: u64,
}

/// Outcome of replaying the WAL on open.
#[derive(Debug, Clone, Copy, Default)]
struct ReplayStats {
    applied: usize,
    skipped: usize,
    invalid_tail: bool,
}

/// Durable, single-process `LeadStore`.
///
/// Holds an exclusive directory lock for its lifetime.
pub struct PersistentLeadStore {
    dir: PathBuf,
    _lock: FileLock,
    wal: WriteAheadLog,
    index: RwLock<LeadIndex>,
    config: PersistentConfig,
}

impl PersistentLeadStore {
    /// Open or create a store in `dir`.
    ///
    /// Loads the snapshot, replays the WAL on top of it, and compacts right
    /// away if the WAL ended in a torn or corrupt entry so later appends do
    /// not land behind unreadable bytes.
    pub fn open(dir: &Path, config: PersistentConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(dir).map_err(|e| open_err("create store directory", &e))?;

        let lock = FileLock::acquire(dir).map_err(|e| open_err("acquire lock", &e))?;

        let leads = snapshot::read(&dir.join(SNAPSHOT_FILE)).map_err(|e| open_err("read snapshot", &e))?;
        let mut index = LeadIndex::default();
        let from_snapshot = leads.len();
        for lead in leads {
            index.insert(lead);
        }

        let wal = WriteAheadLog::open(&dir.join(WAL_FILE), config.sync_on_write)
            .map_err(|e| open_err("open WAL", &e))?;

        let stats = Self::replay(&wal, &mut index)?;

        let store = Self {
            dir: dir.to_path_buf(),
            _lock: lock,
            wal,
            index: RwLock::new(index),
            config,
        };

        info!(
            dir = %store.dir.display(),
            from_snapshot,
            replayed = stats.applied,
            skipped = stats.skipped,
            "opened lead store"
        );

        if stats.invalid_tail {
            warn!(dir = %store.dir.display(), "WAL had an invalid tail; compacting");
            store.compact()?;
        }

        Ok(store)
    }

    fn replay(wal: &WriteAheadLog, index: &mut LeadIndex) -> Result<ReplayStats, StorageError> {
        let mut iter = wal.iter().map_err(|e| open_err("iterate WAL", &e))?;
        let mut stats = ReplayStats::default();

        for entry_result in iter.by_ref() {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "stopping WAL replay at corrupt entry");
                    stats.invalid_tail = true;
                    break;
                }
            };

            let applied = match entry.kind {
                WalEntryKind::LeadInsert(lead) => {
                    index.insert(lead);
                    true
                }
                WalEntryKind::LeadUpdate(lead) => index.replace(lead),
                WalEntryKind::LeadDelete { id } => index.remove(id),
                WalEntryKind::LeadBulkDelete { ids } => {
                    index.remove_many(&ids);
                    true
                }
            };

            if applied {
                stats.applied += 1;
            } else {
                debug!(sequence = entry.sequence, "WAL entry had no target; skipped");
                stats.skipped += 1;
            }
        }

        let size = wal.size_bytes().map_err(|e| open_err("stat WAL", &e))?;
        if iter.valid_len() < size {
            stats.invalid_tail = true;
        }

        Ok(stats)
    }

    /// The store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Current WAL size in bytes.
    pub fn wal_size(&self) -> Result<u64, StorageError> {
        self.wal.size_bytes().map_err(|e| open_err("stat WAL", &e))
    }

    /// Write every lead to a fresh snapshot and reset the WAL.
    pub fn compact(&self) -> Result<CompactionResult, StorageError> {
        let index = self.index.write().map_err(|_| lock_err("lead.compact"))?;
        self.compact_locked(&index)
    }

    fn compact_locked(&self, index: &LeadIndex) -> Result<CompactionResult, StorageError> {
        let wal_size_before = self.wal_size()?;
        let leads = index.ordered();

        snapshot::write(&self.dir.join(SNAPSHOT_FILE), &leads)
            .map_err(|e| StorageError::BackendError(format!("snapshot write failed: {e}")))?;
        self.wal
            .truncate()
            .map_err(|e| StorageError::BackendError(format!("WAL truncate failed: {e}")))?;

        let result = CompactionResult {
            leads_written: leads.len(),
            wal_size_before,
            wal_size_after: self.wal_size()?,
        };
        info!(
            leads = result.leads_written,
            wal_before = result.wal_size_before,
            wal_after = result.wal_size_after,
            "compacted lead store"
        );
        Ok(result)
    }
}

impl LeadStore for PersistentLeadStore {
    fn insert(&self, lead: Lead) -> Result<(), StorageError> {
        let mut index = self.index.write().map_err(|_| lock_err("lead.insert"))?;
        if index.contains(lead.id) {
            return Err(StorageError::DuplicateKey(format!("lead:{}", lead.id)));
        }
        let entry = WalEntryKind::LeadInsert(lead.clone());
        self.wal.append(entry).map_err(|e| wal_err(&e))?;
        index.insert(lead);
        self.maybe_compact(&index);
        Ok(())
    }

    fn get(&self, id: LeadId) -> Result<Option<Lead>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("lead.get"))?;
        Ok(index.get(id).cloned())
    }

    fn update(&self, id: LeadId, patch: LeadPatch) -> Result<Lead, StorageError> {
        let mut index = self.index.write().map_err(|_| lock_err("lead.update"))?;
        let updated = index.patched(id, patch)?;
        self.wal
            .append(WalEntryKind::LeadUpdate(updated.clone()))
            .map_err(|e| wal_err(&e))?;
        index.replace(updated.clone());
        self.maybe_compact(&index);
        Ok(updated)
    }

    fn trash(&self, id: LeadId, deleted_by: Option<&str>) -> Result<Lead, StorageError> {
        let mut index = self.index.write().map_err(|_| lock_err("lead.trash"))?;
        let updated = index.trashed(id, deleted_by)?;
        self.wal
            .append(WalEntryKind::LeadUpdate(updated.clone()))
            .map_err(|e| wal_err(&e))?;
        index.replace(updated.clone());
        self.maybe_compact(&index);
        Ok(updated)
    }

    fn delete(&self, id: LeadId) -> Result<(), StorageError> {
        let mut index = self.index.write().map_err(|_| lock_err("lead.delete"))?;
        if !index.contains(id) {
            return Err(StorageError::NotFound(id));
        }
        self.wal
            .append(WalEntryKind::LeadDelete { id })
            .map_err(|e| wal_err(&e))?;
        index.remove(id);
        self.maybe_compact(&index);
        Ok(())
    }

    fn find_by_contact(&self, email: &str, phone_number: &str) -> Result<Vec<Lead>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("lead.find_by_contact"))?;
        Ok(index.find_by_contact(email, phone_number))
    }

    fn fetch_all(&self) -> Result<Vec<Lead>, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("lead.fetch_all"))?;
        Ok(index.ordered())
    }

    fn delete_by_ids(&self, ids: &[LeadId]) -> Result<usize, StorageError> {
        let mut index = self.index.write().map_err(|_| lock_err("lead.delete_by_ids"))?;

        // Only ids that still exist are logged; an all-missing request writes nothing.
        let live: Vec<LeadId> = ids.iter().copied().filter(|id| index.contains(*id)).collect();
        if live.is_empty() {
            return Ok(0);
        }

        self.wal
            .append(WalEntryKind::LeadBulkDelete { ids: live.clone() })
            .map_err(|e| wal_err(&e))?;
        let deleted = index.remove_many(&live);
        self.maybe_compact(&index);
        Ok(deleted)
    }

    fn count(&self) -> Result<usize, StorageError> {
        let index = self.index.read().map_err(|_| lock_err("lead.count"))?;
        Ok(index.len())
    }
}

impl PersistentLeadStore {
    fn maybe_compact(&self, index: &LeadIndex) {
        let size = match self.wal.size_bytes() {
            Ok(size) => size,
            Err(e) => {
                warn!(error = %e, "failed to stat WAL");
                return;
            }
        };
        if size <= self.config.max_wal_size {
            return;
        }
        if let Err(e) = self.compact_locked(index) {
            // The write already succeeded; the next write retries compaction.
            warn!(error = %e, "automatic compaction failed");
        }
    }
}
