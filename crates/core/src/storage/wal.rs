//! Synchronous write-ahead log shared by every process using a data directory.
//!
//! Every mutation is appended to the WAL before being applied in memory.
//! The file starts with a 16-byte header `[magic "WIXW"][u32 version BE][u64 generation BE]`
//! followed by entries framed as `[u32 length BE][u32 CRC32 BE][bincode payload]`,
//! each durably flushed with `fsync`.
//!
//! The log holds no open handle between calls: callers serialize access with
//! the store lock and track how far they have read with a byte offset, so
//! several processes can append to and tail the same file. The generation
//! changes whenever compaction replaces the log, which tells a reader that
//! its offset is no longer meaningful.

use crate::document::Document;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// File name of the log inside the data directory.
pub const WAL_FILE_NAME: &str = "wal.bin";

/// Magic bytes at the start of the log.
const WAL_MAGIC: &[u8; 4] = b"WIXW";

/// On-disk format version.
const WAL_VERSION: u32 = 1;

/// Length of the file header; the first entry starts here.
pub const WAL_HEADER_LEN: u64 = 16;

/// Upper bound on a single frame. A larger length prefix can only come from
/// a damaged file and is treated like a CRC mismatch.
const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// A single mutation entry in the write-ahead log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalEntry {
    /// Insert or fully replace a document.
    Upsert { document: Document },
    /// Delete a document by id.
    Delete { id: String },
}

/// Diagnostic statistics from reading the log.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReplayStats {
    /// Number of entries successfully deserialized.
    pub success: usize,
    /// Number of entries skipped due to deserialization errors (CRC was valid).
    pub skipped: usize,
    /// Number of CRC mismatches encountered (reading stopped).
    pub crc_errors: usize,
    /// Whether reading was terminated by a truncated entry.
    pub truncated: bool,
}

impl ReplayStats {
    /// Returns `true` if bytes past [`LogRead::end_offset`] are unusable.
    pub fn has_damaged_tail(&self) -> bool {
        self.truncated || self.crc_errors > 0
    }
}

/// Result of reading the log from some offset.
#[derive(Debug)]
pub struct LogRead {
    /// Generation recorded in the header.
    pub generation: u64,
    /// Entries in append order.
    pub entries: Vec<WalEntry>,
    /// Offset just past the last intact frame.
    pub end_offset: u64,
    pub stats: ReplayStats,
}

/// Append-only log file with CRC32 integrity checks and a generation header.
#[derive(Debug, Clone)]
pub struct SyncWriteAheadLog {
    path: PathBuf,
}

impl SyncWriteAheadLog {
    /// Points at `wal.bin` inside `data_dir`. Does no I/O.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(WAL_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the log file in bytes, 0 if it does not exist.
    pub fn size(&self) -> io::Result<u64> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Reads the generation from the header, or `None` if the file is missing.
    pub fn read_generation(&self) -> io::Result<Option<u64>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        read_header(&mut file).map(Some)
    }

    /// Atomically replaces the log with an empty one of the given generation.
    ///
    /// Writes a temp file, fsyncs it, renames it over the log and fsyncs the
    /// directory, so a reader sees either the old log or the new one.
    pub fn create(&self, generation: u64) -> io::Result<()> {
        let tmp_path = self.path.with_extension("bin.tmp");
        let staged = open_options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .and_then(|mut file| {
                file.write_all(&encode_header(generation))?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&tmp_path, &self.path));
        if let Err(e) = staged {
            if tmp_path.is_file() {
                let _ = fs::remove_file(&tmp_path);
            }
            return Err(e);
        }
        sync_parent_dir(&self.path);
        tracing::debug!(generation, "WAL reset");
        Ok(())
    }

    /// Appends one entry and fsyncs it. Returns the offset just past the new frame.
    ///
    /// If the write or the fsync fails the file is cut back to its previous
    /// length, so a failed append never leaves a partial frame behind.
    pub fn append(&self, entry: &WalEntry) -> io::Result<u64> {
        let framed = serialize_and_frame(entry)?;
        let mut file = open_options().append(true).open(&self.path)?;
        let start = file.metadata()?.len();
        if start < WAL_HEADER_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("WAL {:?} has no header", self.path),
            ));
        }

        let written = file.write_all(&framed).and_then(|()| file.sync_data());
        if let Err(e) = written {
            if let Err(rollback) = file.set_len(start) {
                tracing::error!(error = %rollback, "failed to roll back partial WAL append");
            }
            return Err(e);
        }
        Ok(start + framed.len() as u64)
    }

    /// Reads every intact entry at or after `offset`, verifying CRC32 checksums.
    ///
    /// Stops at the first truncated or corrupt frame; `end_offset` then marks
    /// where the damage begins. Offsets before the header are clamped to it.
    pub fn read_from(&self, offset: u64) -> io::Result<LogRead> {
        let mut file = File::open(&self.path)?;
        let generation = read_header(&mut file)?;
        let start = offset.max(WAL_HEADER_LEN);
        file.seek(SeekFrom::Start(start))?;

        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        let mut stats = ReplayStats::default();
        let mut end_offset = start;
        let mut header_buf = [0u8; 8];

        loop {
            match read_full(&mut reader, &mut header_buf)? {
                0 => break,
                n if n < header_buf.len() => {
                    tracing::warn!(offset = end_offset, "WAL truncated mid-header, stopping replay");
                    stats.truncated = true;
                    break;
                }
                _ => {}
            }
            let len =
                u32::from_be_bytes([header_buf[0], header_buf[1], header_buf[2], header_buf[3]])
                    as usize;
            let stored_crc =
                u32::from_be_bytes([header_buf[4], header_buf[5], header_buf[6], header_buf[7]]);
            if len > MAX_FRAME_BYTES {
                tracing::warn!(offset = end_offset, len, "WAL frame length implausible, stopping replay");
                stats.crc_errors += 1;
                break;
            }
            let mut data = vec![0u8; len];
            if read_full(&mut reader, &mut data)? < len {
                tracing::warn!(offset = end_offset, "WAL truncated mid-entry, stopping replay");
                stats.truncated = true;
                break;
            }
            let computed_crc = crc32fast::hash(&data);
            if computed_crc != stored_crc {
                tracing::warn!(offset = end_offset, "WAL entry CRC mismatch, stopping replay");
                stats.crc_errors += 1;
                break;
            }
            end_offset += (header_buf.len() + len) as u64;
            match bincode::deserialize::<WalEntry>(&data) {
                Ok(entry) => {
                    entries.push(entry);
                    stats.success += 1;
                }
                Err(e) => {
                    tracing::warn!("WAL entry deserialization failed, skipping: {}", e);
                    stats.skipped += 1;
                }
            }
        }

        Ok(LogRead {
            generation,
            entries,
            end_offset,
            stats,
        })
    }

    /// Cuts the log back to `len` bytes and fsyncs. Used to drop a torn tail.
    pub fn truncate_to(&self, len: u64) -> io::Result<()> {
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(len.max(WAL_HEADER_LEN))?;
        file.sync_all()
    }
}

fn open_options() -> OpenOptions {
    let mut opts = OpenOptions::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    opts
}

fn encode_header(generation: u64) -> [u8; WAL_HEADER_LEN as usize] {
    let mut header = [0u8; WAL_HEADER_LEN as usize];
    header[..4].copy_from_slice(WAL_MAGIC);
    header[4..8].copy_from_slice(&WAL_VERSION.to_be_bytes());
    header[8..].copy_from_slice(&generation.to_be_bytes());
    header
}

fn read_header(file: &mut File) -> io::Result<u64> {
    let mut header = [0u8; WAL_HEADER_LEN as usize];
    file.read_exact(&mut header).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            io::Error::new(io::ErrorKind::InvalidData, "WAL header truncated")
        } else {
            e
        }
    })?;
    if &header[..4] != WAL_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "WAL magic mismatch",
        ));
    }
    let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    if version != WAL_VERSION {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported WAL version {}", version),
        ));
    }
    let mut generation = [0u8; 8];
    generation.copy_from_slice(&header[8..]);
    Ok(u64::from_be_bytes(generation))
}

/// Reads until `buf` is full or EOF. Returns the number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Fsyncs the directory holding `path` so a rename survives a crash.
pub(crate) fn sync_parent_dir(path: &Path) {
    #[cfg(unix)]
    if let Some(dir) = path.parent() {
        if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
            tracing::warn!(error = %e, "failed to fsync data directory");
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

/// Serialize a WAL entry into its on-disk frame format:
/// `[u32 len BE][u32 crc32 BE][bincode payload]`.
fn serialize_and_frame(entry: &WalEntry) -> io::Result<Vec<u8>> {
    let bytes = bincode::serialize(entry).map_err(|e| io::Error::other(e.to_string()))?;
    let len = bytes.len() as u32;
    let crc = crc32fast::hash(&bytes);

    let mut framed = Vec::with_capacity(8 + bytes.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(&crc.to_be_bytes());
    framed.extend_from_slice(&bytes);
    Ok(framed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn doc(id: &str) -> WalEntry {
        WalEntry::Upsert {
            document: Document::new(id).with_title("Hello").with_tag("news"),
        }
    }

    fn fresh() -> (TempDir, SyncWriteAheadLog) {
        let dir = TempDir::new().unwrap();
        let wal = SyncWriteAheadLog::new(dir.path());
        wal.create(0).unwrap();
        (dir, wal)
    }

    #[test]
    fn test_append_and_read() {
        let (_dir, wal) = fresh();
        let first_end = wal.append(&doc("1")).unwrap();
        let end = wal.append(&WalEntry::Delete { id: "1".into() }).unwrap();
        assert_eq!(end, wal.size().unwrap());

        let read = wal.read_from(0).unwrap();
        assert_eq!(read.generation, 0);
        assert_eq!(read.stats.success, 2);
        assert_eq!(read.end_offset, end);
        assert_eq!(read.entries[0], doc("1"));

        let tail = wal.read_from(first_end).unwrap();
        assert_eq!(tail.entries, vec![WalEntry::Delete { id: "1".into() }]);
    }

    #[test]
    fn test_missing_log_has_no_generation() {
        let dir = TempDir::new().unwrap();
        let wal = SyncWriteAheadLog::new(dir.path());
        assert_eq!(wal.read_generation().unwrap(), None);
        assert_eq!(wal.size().unwrap(), 0);
        assert!(wal.append(&doc("1")).is_err());
    }

    #[test]
    fn test_create_resets_and_bumps_generation() {
        let (_dir, wal) = fresh();
        wal.append(&doc("1")).unwrap();
        wal.create(7).unwrap();
        assert_eq!(wal.read_generation().unwrap(), Some(7));
        assert_eq!(wal.size().unwrap(), WAL_HEADER_LEN);
        assert!(wal.read_from(0).unwrap().entries.is_empty());
    }

    #[test]
    fn test_failed_create_keeps_old_log() {
        let (dir, wal) = fresh();
        let end = wal.append(&doc("1")).unwrap();
        let blocker = dir.path().join("wal.bin.tmp");
        fs::create_dir(&blocker).unwrap();

        assert!(wal.create(1).is_err());
        assert!(blocker.is_dir());
        assert_eq!(wal.read_generation().unwrap(), Some(0));
        assert_eq!(wal.size().unwrap(), end);
        assert_eq!(wal.read_from(0).unwrap().entries, vec![doc("1")]);
    }

    #[test]
    fn test_torn_tail_detected_and_repaired() {
        let (_dir, wal) = fresh();
        let good_end = wal.append(&doc("1")).unwrap();
        let full_end = wal.append(&doc("2")).unwrap();
        wal.truncate_to(full_end - 3).unwrap();

        let read = wal.read_from(0).unwrap();
        assert!(read.stats.truncated);
        assert!(read.stats.has_damaged_tail());
        assert_eq!(read.entries.len(), 1);
        assert_eq!(read.end_offset, good_end);

        wal.truncate_to(read.end_offset).unwrap();
        let end = wal.append(&doc("3")).unwrap();
        let read = wal.read_from(0).unwrap();
        assert!(!read.stats.has_damaged_tail());
        assert_eq!(read.entries.len(), 2);
        assert_eq!(read.end_offset, end);
    }

    #[test]
    fn test_crc_corruption_detected() {
        let (_dir, wal) = fresh();
        wal.append(&doc("1")).unwrap();
        let mut data = fs::read(wal.path()).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        fs::write(wal.path(), &data).unwrap();

        let read = wal.read_from(0).unwrap();
        assert_eq!(read.stats.crc_errors, 1);
        assert!(read.entries.is_empty());
        assert_eq!(read.end_offset, WAL_HEADER_LEN);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let (_dir, wal) = fresh();
        fs::write(wal.path(), b"NOPE0000000000000000").unwrap();
        let err = wal.read_from(0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_serialize_and_frame_format() {
        let framed = serialize_and_frame(&WalEntry::Delete { id: "x".into() }).unwrap();
        // First 4 bytes = length (BE), next 4 = CRC32 (BE)
        let len = u32::from_be_bytes([framed[0], framed[1], framed[2], framed[3]]) as usize;
        let stored_crc = u32::from_be_bytes([framed[4], framed[5], framed[6], framed[7]]);
        let payload = &framed[8..];
        assert_eq!(payload.len(), len);
        assert_eq!(crc32fast::hash(payload), stored_crc);
    }
}
