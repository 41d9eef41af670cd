//! Compaction snapshots.
//!
//! A snapshot is the full lead collection, in natural order, written when
//! the WAL is compacted. Opening a store loads the snapshot first and then
//! replays the WAL on top of it.
//!
//! # File Format
//! ```text
//! [MAGIC: 4 bytes][VERSION: 1 byte]
//! [codec-encoded SnapshotHeader]
//! [codec-encoded Vec<Lead>]
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Error as IoError, ErrorKind, Result as IoResult, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lead::Lead;

use super::codec;

/// Snapshot file header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotHeader {
    /// Number of leads in the snapshot.
    pub lead_count: u64,
    /// When the snapshot was written.
    pub created_at: DateTime<Utc>,
}

/// Writes `leads` to `path`, replacing any previous snapshot atomically.
///
/// The data goes to a sibling temp file that is fsynced and renamed over
/// the old snapshot, so a crash leaves either the old or the new one.
pub fn write(path: &Path, leads: &[Lead]) -> IoResult<SnapshotHeader> {
    let tmp_path = path.with_extension("snap.tmp");

    let header = SnapshotHeader {
        lead_count: leads.len() as u64,
        created_at: Utc::now(),
    };

    {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        codec::write_header(&mut writer)?;
        writer.write_all(&codec::encode(&header)?)?;
        writer.write_all(&codec::encode(&leads)?)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    fs::rename(&tmp_path, path)?;
    Ok(header)
}

/// Reads a snapshot. A missing file is an empty collection.
pub fn read(path: &Path) -> IoResult<Vec<Lead>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);

    let _version = codec::read_header(&mut reader)?;
    let header: SnapshotHeader = codec::decode(&mut reader)?;
    let leads: Vec<Lead> = codec::decode(&mut reader)?;

    if leads.len() as u64 != header.lead_count {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!(
                "snapshot lead count mismatch: header={} data={}",
                header.lead_count,
                leads.len()
            ),
        ));
    }

    Ok(leads)
}
