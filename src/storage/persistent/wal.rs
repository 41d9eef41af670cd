//! Write-Ahead Log (WAL) for crash recovery.
//!
//! The WAL provides durability by:
//! 1. Writing every mutation to an append-only log before applying it
//! 2. Using fsync to ensure data reaches disk
//! 3. Replaying the log on startup to recover state
//!
//! A bulk delete is logged as one entry, so replay applies either the whole
//! id set or none of it.
//!
//! # File Format
//! ```text
//! [MAGIC: 4 bytes][VERSION: 1 byte]
//! [ENTRY 1: codec-encoded WalEntry]
//! [ENTRY 2: codec-encoded WalEntry]
//! ...
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Error as IoError, ErrorKind, Result as IoResult, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::lead::{Lead, LeadId};

use super::codec;

/// A single entry in the write-ahead log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    /// Monotonically increasing sequence number.
    pub sequence: u64,
    /// When this entry was written.
    pub timestamp: DateTime<Utc>,
    /// The operation being logged.
    pub kind: WalEntryKind,
}

/// The type of WAL entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalEntryKind {
    /// New lead appended to the collection.
    LeadInsert(Lead),
    /// Full post-update document (edit or trash).
    LeadUpdate(Lead),
    /// Permanent single delete.
    LeadDelete { id: LeadId },
    /// Bulk delete issued by the sweeper.
    LeadBulkDelete { ids: Vec<LeadId> },
}

struct WalState {
    writer: BufWriter<File>,
    sequence: u64,
}

/// Write-Ahead Log for crash recovery.
///
/// Thread-safe via internal mutex.
pub struct WriteAheadLog {
    path: PathBuf,
    state: Mutex<WalState>,
    sync_on_write: bool,
}

fn poisoned() -> IoError {
    IoError::new(ErrorKind::Other, "poisoned lock: wal")
}

impl WriteAheadLog {
    /// Open or create a WAL file.
    ///
    /// If the file exists, reads the last valid sequence number.
    /// If the file doesn't exist, creates it with the header.
    pub fn open(path: &Path, sync_on_write: bool) -> IoResult<Self> {
        let exists = path.exists() && fs::metadata(path)?.len() >= 5;

        let sequence = if exists {
            Self::find_last_sequence(path)?
        } else {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?;
            codec::write_header(&mut file)?;
            if sync_on_write {
                file.sync_all()?;
            }
            0
        };

        let file = OpenOptions::new().append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(WalState {
                writer: BufWriter::new(file),
                sequence,
            }),
            sync_on_write,
        })
    }

    fn lock(&self) -> IoResult<MutexGuard<'_, WalState>> {
        self.state.lock().map_err(|_| poisoned())
    }

    /// Append an entry to the WAL.
    ///
    /// Returns the sequence number assigned to this entry. The sequence only
    /// advances once the entry is flushed.
    pub fn append(&self, kind: WalEntryKind) -> IoResult<u64> {
        let mut state = self.lock()?;

        let candidate = state.sequence + 1;
        let entry = WalEntry {
            sequence: candidate,
            timestamp: Utc::now(),
            kind,
        };

        let encoded = codec::encode(&entry)?;

        state.writer.write_all(&encoded)?;
        state.writer.flush()?;

        if self.sync_on_write {
            state.writer.get_ref().sync_all()?;
        }

        state.sequence = candidate;

        Ok(candidate)
    }

    /// Iterate over all entries in the WAL.
    ///
    /// Used during recovery to replay mutations.
    pub fn iter(&self) -> IoResult<WalIterator> {
        WalIterator::new(&self.path)
    }

    /// Get the current sequence number.
    pub fn current_sequence(&self) -> IoResult<u64> {
        Ok(self.lock()?.sequence)
    }

    /// Get the WAL file size in bytes.
    pub fn size_bytes(&self) -> IoResult<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    /// Reset the WAL to an empty log after its contents were written to a
    /// snapshot.
    ///
    /// Only call this after the snapshot is durable on disk.
    pub fn truncate(&self) -> IoResult<()> {
        let mut state = self.lock()?;
        state.writer.flush()?;

        {
            let mut file = OpenOptions::new().write(true).truncate(true).open(&self.path)?;
            codec::write_header(&mut file)?;
            if self.sync_on_write {
                file.sync_all()?;
            }
        }

        // The old append handle still points past the new end; replace it.
        let file = OpenOptions::new().append(true).open(&self.path)?;
        state.writer = BufWriter::new(file);
        state.sequence = 0;

        Ok(())
    }

    fn find_last_sequence(path: &Path) -> IoResult<u64> {
        let mut last_seq = 0;

        for entry_result in WalIterator::new(path)? {
            match entry_result {
                Ok(entry) => last_seq = entry.sequence,
                Err(e) => {
                    // The store compacts on open when the log has an invalid tail.
                    warn!(sequence = last_seq + 1, error = %e, "WAL corruption detected");
                    break;
                }
            }
        }

        Ok(last_seq)
    }
}

/// Iterator over WAL entries.
///
/// A torn trailing entry ends iteration silently; a checksum failure is
/// yielded as an error. `valid_len` reports how much of the file parsed.
pub struct WalIterator {
    reader: BufReader<File>,
    file_size: u64,
    valid_len: u64,
}

impl WalIterator {
    fn new(path: &Path) -> IoResult<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let _version = codec::read_header(&mut reader)?;
        let valid_len = reader.stream_position()?;

        Ok(Self {
            reader,
            file_size,
            valid_len,
        })
    }

    /// Byte length of the header plus every entry decoded so far.
    ///
    /// After iteration ends, a value below the file size means the log has
    /// a torn or corrupt tail.
    #[must_use]
    pub const fn valid_len(&self) -> u64 {
        self.valid_len
    }

    fn at_eof(&mut self) -> IoResult<bool> {
        let pos = self.reader.stream_position()?;
        Ok(pos >= self.file_size)
    }
}

impl Iterator for WalIterator {
    type Item = IoResult<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.at_eof() {
            Ok(true) => return None,
            Ok(false) => {}
            Err(e) => return Some(Err(e)),
        }

        match codec::decode(&mut self.reader) {
            Ok(entry) => {
                match self.reader.stream_position() {
                    Ok(pos) => self.valid_len = pos,
                    Err(e) => return Some(Err(e)),
                }
                Some(Ok(entry))
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_wal_append_and_iterate() {
        let dir = tempdir().unwrap();
        let wal_path = dir.path().join("test.wal");

        let wal = WriteAheadLog::open(&wal_path, false).unwrap();

        let lead = Lead::new("test");
        wal.append(WalEntryKind::LeadInsert(lead.clone())).unwrap();
        wal.append(WalEntryKind::LeadBulkDelete { ids: vec![lead.id] }).unwrap();

        assert_eq!(wal.current_sequence().unwrap(), 2);

        drop(wal);

        let wal = WriteAheadLog::open(&wal_path, false).unwrap();
        assert_eq!(wal.current_sequence().unwrap(), 2);

        let entries: Vec<_> = wal.iter().unwrap().collect();
        assert_eq!(entries.len(), 2);

        let first = entries[0].as_ref().unwrap();
        assert_eq!(first.sequence, 1);
        assert!(matches!(first.kind, WalEntryKind::LeadInsert(_)));

        let second = entries[1].as_ref().unwrap();
        let WalEntryKind::LeadBulkDelete { ids } = &second.kind else {
            panic!("expected bulk delete, got {:?}", second.kind);
        };
        assert_eq!(ids, &vec![lead.id]);
    }

    #[test]
    fn test_truncate_resets_sequence() {
        let dir = tempdir().unwrap();
        let wal_path = dir.path().join("trunc.wal");

        let wal = WriteAheadLog::open(&wal_path, true).unwrap();
        wal.append(WalEntryKind::LeadInsert(Lead::new("a"))).unwrap();
        let before = wal.size_bytes().unwrap();

        wal.truncate().unwrap();
        assert_eq!(wal.current_sequence().unwrap(), 0);
        assert!(wal.size_bytes().unwrap() < before);
        assert_eq!(wal.iter().unwrap().count(), 0);

        wal.append(WalEntryKind::LeadDelete { id: LeadId::new() }).unwrap();
        assert_eq!(wal.current_sequence().unwrap(), 1);
        assert_eq!(wal.iter().unwrap().count(), 1);
    }

    #[test]
    fn test_valid_len_stops_before_torn_tail() {
        let dir = tempdir().unwrap();
        let wal_path = dir.path().join("torn.wal");

        let wal = WriteAheadLog::open(&wal_path, false).unwrap();
        wal.append(WalEntryKind::LeadInsert(Lead::new("kept"))).unwrap();
        let after_first = wal.size_bytes().unwrap();
        wal.append(WalEntryKind::LeadInsert(Lead::new("torn"))).unwrap();
        drop(wal);

        let file = OpenOptions::new().write(true).open(&wal_path).unwrap();
        let full = file.metadata().unwrap().len();
        file.set_len(full - 3).unwrap();

        let mut iter = WalIterator::new(&wal_path).unwrap();
        let mut decoded = 0;
        for entry in iter.by_ref() {
            entry.unwrap();
            decoded += 1;
        }
        assert_eq!(decoded, 1);
        assert_eq!(iter.valid_len(), after_first);
    }
}
