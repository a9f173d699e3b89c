//! Disk persistence for store snapshots using bincode serialization.
//!
//! A snapshot holds every live document as of the start of one log
//! generation and is named after that generation. Only the snapshot named by
//! the current log header is live; any other is left over from an older or
//! failed compaction and may be removed.
//! Writes use atomic temp-file + rename to prevent corruption on crash.
//! A CRC32 checksum is appended as a footer for integrity verification.

use crate::document::Document;
use crate::storage::wal::sync_parent_dir;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const SNAPSHOT_PREFIX: &str = "snapshot-";
const SNAPSHOT_SUFFIX: &str = ".bin";

/// Magic bytes appended before the CRC32 footer.
const SNAPSHOT_CRC_MAGIC: &[u8; 4] = b"WIXS";

/// Full document set as of the start of log generation `generation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub generation: u64,
    pub documents: Vec<Document>,
}

/// Borrowed form of [`Snapshot`]; serializes to identical bytes.
#[derive(Serialize)]
struct SnapshotRef<'a> {
    generation: u64,
    documents: &'a [&'a Document],
}

/// Path of the snapshot for log generation `generation`.
pub fn snapshot_path(dir: &Path, generation: u64) -> PathBuf {
    dir.join(format!("{}{:020}{}", SNAPSHOT_PREFIX, generation, SNAPSHOT_SUFFIX))
}

/// Generations of every snapshot file in `dir`, ascending.
pub fn snapshot_generations(dir: &Path) -> io::Result<Vec<u64>> {
    let mut generations = Vec::new();
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let generation = name
            .to_str()
            .and_then(|n| n.strip_prefix(SNAPSHOT_PREFIX))
            .and_then(|n| n.strip_suffix(SNAPSHOT_SUFFIX))
            .and_then(|n| n.parse::<u64>().ok());
        if let Some(generation) = generation {
            generations.push(generation);
        }
    }
    generations.sort_unstable();
    Ok(generations)
}

/// Deletes every snapshot except the one for `keep`. Failures are logged, not returned.
pub fn remove_snapshots_except(dir: &Path, keep: u64) {
    let generations = match snapshot_generations(dir) {
        Ok(generations) => generations,
        Err(e) => {
            tracing::warn!(error = %e, "failed to list snapshots");
            return;
        }
    };
    for generation in generations.into_iter().filter(|g| *g != keep) {
        match fs::remove_file(snapshot_path(dir, generation)) {
            Ok(()) => tracing::debug!(generation, "Removed unused snapshot"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(generation, error = %e, "failed to remove unused snapshot"),
        }
    }
}

/// Save the snapshot of `generation` to `dir` with an atomic write. Returns the payload size.
///
/// Layout: `[bincode payload][magic "WIXS"][u32 CRC32 BE]`.
pub fn save_snapshot(dir: &Path, generation: u64, documents: &[&Document]) -> io::Result<u64> {
    let snapshot = SnapshotRef {
        generation,
        documents,
    };
    let bytes = bincode::serialize(&snapshot).map_err(|e| io::Error::other(e.to_string()))?;

    // Compute CRC32 over the bincode payload
    let crc = crc32fast::hash(&bytes);

    let path = snapshot_path(dir, generation);
    let tmp_path = path.with_extension("bin.tmp");

    let mut output = Vec::with_capacity(bytes.len() + 8);
    output.extend_from_slice(&bytes);
    output.extend_from_slice(SNAPSHOT_CRC_MAGIC);
    output.extend_from_slice(&crc.to_be_bytes());

    // Atomic write: write to temp, fsync, then rename
    {
        let mut opts = OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let mut file = opts.open(&tmp_path)?;
        file.write_all(&output)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, &path)?;
    sync_parent_dir(&path);

    tracing::info!(
        generation,
        documents = documents.len(),
        "Saved snapshot ({} bytes, CRC32={:#010x})",
        bytes.len(),
        crc
    );
    Ok(bytes.len() as u64)
}

/// Load the snapshot of `generation` from `dir`, verifying its CRC32 footer.
///
/// Returns `Ok(None)` if that snapshot does not exist.
pub fn load_snapshot(dir: &Path, generation: u64) -> io::Result<Option<Snapshot>> {
    let path = snapshot_path(dir, generation);
    let raw = match fs::read(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    // Last 8 bytes = [magic "WIXS"][CRC32 BE]
    if raw.len() < 8 || &raw[raw.len() - 8..raw.len() - 4] != SNAPSHOT_CRC_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Snapshot {:?} has no checksum footer", path),
        ));
    }
    let payload = &raw[..raw.len() - 8];
    let stored_crc = u32::from_be_bytes([
        raw[raw.len() - 4],
        raw[raw.len() - 3],
        raw[raw.len() - 2],
        raw[raw.len() - 1],
    ]);
    let computed_crc = crc32fast::hash(payload);
    if computed_crc != stored_crc {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Snapshot CRC32 mismatch: expected {:#010x}, got {:#010x}. File may be corrupted: {:?}",
                stored_crc, computed_crc, path
            ),
        ));
    }
    tracing::debug!("Snapshot CRC32 verified: {:#010x}", stored_crc);

    let snapshot: Snapshot = bincode::deserialize(payload)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    if snapshot.generation != generation {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Snapshot {:?} holds generation {}, expected {}",
                path, snapshot.generation, generation
            ),
        ));
    }

    tracing::info!(
        generation = snapshot.generation,
        documents = snapshot.documents.len(),
        "Loaded snapshot"
    );
    Ok(Some(snapshot))
}
