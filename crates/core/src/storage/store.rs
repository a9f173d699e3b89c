//! Durable, multi-process document store.
//!
//! Every instance opened on the same data directory shares one write-ahead
//! log and the snapshot its header names. Operations run under the store lock (shared for
//! searches, exclusive for writes and compaction) and first catch up with
//! whatever other instances appended since this one last looked, so a
//! search always observes every write that completed before it started,
//! whichever process made it.

use crate::config;
use crate::document::Document;
use crate::error::{Result, StoreError, ValidationError};
use crate::search::{SearchQuery, SpatialFilter};
use crate::storage::documents::DocumentStore;
use crate::storage::lock::LOCK_FILE_NAME;
use crate::storage::persistence::{
    load_snapshot, remove_snapshots_except, save_snapshot, snapshot_generations,
};
use crate::storage::pool::HandlePool;
use crate::storage::wal::{SyncWriteAheadLog, WalEntry, WAL_HEADER_LEN};
use crate::text::TextQuery;
use parking_lot::{Mutex, RwLock};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Runtime configuration for a [`Store`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the log, snapshot and lock files.
    pub data_dir: PathBuf,
    /// Maximum number of concurrent operations per instance.
    pub pool_size: usize,
    /// Log size that triggers compaction after a write. 0 disables it.
    pub compact_threshold_bytes: u64,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            pool_size: config::DEFAULT_POOL_SIZE,
            compact_threshold_bytes: config::DEFAULT_COMPACT_THRESHOLD_BYTES,
        }
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_compact_threshold(mut self, bytes: u64) -> Self {
        self.compact_threshold_bytes = bytes;
        self
    }
}

/// How far this instance has read the shared log.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LogCursor {
    generation: u64,
    offset: u64,
}

/// Which store lock the caller holds.
#[derive(Debug, Clone, Copy, PartialEq)]
enum LockMode {
    Shared,
    Exclusive,
}

/// Outcome of a compaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompactionStats {
    /// Generation of the new snapshot and log.
    pub generation: u64,
    /// Documents written to the snapshot.
    pub documents: usize,
    /// Log bytes reclaimed.
    pub reclaimed_bytes: u64,
}

/// A handle on a data directory. Cheap to share behind an `Arc`; open one
/// per process, or several in the same process, on the same directory.
#[derive(Debug)]
pub struct Store {
    config: StoreConfig,
    wal: SyncWriteAheadLog,
    pool: HandlePool,
    /// In-process mirror of the file lock: readers share, writers exclude.
    gate: RwLock<()>,
    cursor: Mutex<LogCursor>,
    data: RwLock<DocumentStore>,
}

impl Store {
    /// Opens (creating if needed) the store in `config.data_dir` and loads
    /// the snapshot plus the log.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let fresh_dir = !config.data_dir.exists();
        fs::create_dir_all(&config.data_dir)?;
        // Only a directory this call created is narrowed; an existing one
        // may be shared by replicas running as other users.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if fresh_dir {
                let restricted = fs::Permissions::from_mode(0o700);
                if let Err(e) = fs::set_permissions(&config.data_dir, restricted) {
                    tracing::warn!(
                        data_dir = %config.data_dir.display(),
                        error = %e,
                        "failed to restrict data directory permissions"
                    );
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = fresh_dir;
            tracing::warn!("advisory file locks unavailable: only one process may use the data directory");
        }

        let store = Self {
            wal: SyncWriteAheadLog::new(&config.data_dir),
            pool: HandlePool::new(&config.data_dir.join(LOCK_FILE_NAME), config.pool_size),
            gate: RwLock::new(()),
            cursor: Mutex::new(LogCursor {
                generation: u64::MAX,
                offset: 0,
            }),
            data: RwLock::new(DocumentStore::new()),
            config,
        };

        {
            let handle = store.pool.acquire()?;
            let _gate = store.gate.write();
            let _lock = handle.exclusive()?;
            store.catch_up(LockMode::Exclusive)?;
        }

        let cursor = *store.cursor.lock();
        tracing::info!(
            data_dir = %store.config.data_dir.display(),
            documents = store.data.read().len(),
            generation = cursor.generation,
            wal_bytes = cursor.offset,
            "Store opened"
        );
        Ok(store)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Inserts or fully replaces a document. Durable once this returns.
    pub fn upsert(&self, document: Document) -> Result<()> {
        document.validate()?;
        self.write(WalEntry::Upsert { document })?;
        Ok(())
    }

    /// Deletes a document. Returns `false` (and logs nothing) if it did not exist.
    pub fn delete(&self, id: &str) -> Result<bool> {
        if id.is_empty() {
            return Err(ValidationError::MissingField("id").into());
        }
        self.write(WalEntry::Delete { id: id.to_owned() })
    }

    /// Runs a combined search and returns the ordered, paged document ids.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<String>> {
        query.validate()?;
        self.read(|data| data.search(query))
    }

    /// Ids of documents matching a full-text query, most relevant first.
    pub fn text_search(&self, query: &str) -> Result<Vec<String>> {
        let query = SearchQuery::new().with_text(TextQuery::parse(query)?);
        self.search(&query)
    }

    /// Ids of documents within `radius_km` of (`lat`, `lon`), nearest first.
    pub fn spatial_search(&self, lat: f64, lon: f64, radius_km: f64) -> Result<Vec<String>> {
        let query = SearchQuery::new().with_spatial(SpatialFilter::new(lat, lon, radius_km)?);
        self.search(&query)
    }

    /// Ids of documents with `metadata[key] == value`, by id.
    pub fn metadata_search(&self, key: &str, value: &str) -> Result<Vec<String>> {
        self.search(&SearchQuery::new().with_metadata(key, value))
    }

    /// Fetches one document as currently stored.
    pub fn get(&self, id: &str) -> Result<Option<Arc<Document>>> {
        self.read(|data| data.get(id).cloned())
    }

    /// Number of documents as of the last operation on this instance.
    pub fn document_count(&self) -> usize {
        self.data.read().len()
    }

    /// Current size of the shared log in bytes.
    pub fn wal_size_bytes(&self) -> Result<u64> {
        Ok(self.wal.size()?)
    }

    /// Number of operations currently holding a pooled handle.
    pub fn active_operations(&self) -> usize {
        self.pool.in_use()
    }

    /// Writes a snapshot of every document and starts a new, empty log generation.
    pub fn compact(&self) -> Result<CompactionStats> {
        let handle = self.pool.acquire()?;
        let _gate = self.gate.write();
        let _lock = handle.exclusive()?;
        self.catch_up(LockMode::Exclusive)?;
        self.compact_locked()
    }

    fn read<T>(&self, f: impl FnOnce(&DocumentStore) -> T) -> Result<T> {
        let handle = self.pool.acquire()?;
        let _gate = self.gate.read();
        let _lock = handle.shared()?;
        self.catch_up(LockMode::Shared)?;
        let data = self.data.read();
        Ok(f(&data))
    }

    fn write(&self, entry: WalEntry) -> Result<bool> {
        let handle = self.pool.acquire()?;
        let _gate = self.gate.write();
        let _lock = handle.exclusive()?;
        self.catch_up(LockMode::Exclusive)?;

        if let WalEntry::Delete { id } = &entry {
            if !self.data.read().contains(id) {
                return Ok(false);
            }
        }

        let end = {
            let mut cursor = self.cursor.lock();
            let end = self.wal.append(&entry)?;
            cursor.offset = end;
            end
        };
        let changed = self.data.write().apply(entry);

        let threshold = self.config.compact_threshold_bytes;
        if threshold > 0 && end >= threshold {
            // The write is already durable; a failed compaction only leaves a long log.
            if let Err(e) = self.compact_locked() {
                tracing::error!(error = %e, "automatic compaction failed");
            }
        }
        Ok(changed)
    }

    /// Snapshot + log reset. Caller holds the exclusive lock and is caught up.
    ///
    /// The snapshot for `g + 1` is unused until the log header says `g + 1`,
    /// so the log rename is the only commit point: on any earlier failure the
    /// old log and snapshot stay authoritative and later writes are kept.
    fn compact_locked(&self) -> Result<CompactionStats> {
        let dir = &self.config.data_dir;
        let mut cursor = self.cursor.lock();
        let data = self.data.read();
        let generation = cursor.generation + 1;
        let documents: Vec<&Document> = data.documents().map(|d| &**d).collect();

        save_snapshot(dir, generation, &documents)?;
        if let Err(e) = self.wal.create(generation) {
            remove_snapshots_except(dir, cursor.generation);
            return Err(e.into());
        }
        remove_snapshots_except(dir, generation);

        let reclaimed_bytes = cursor.offset.saturating_sub(WAL_HEADER_LEN);
        *cursor = LogCursor {
            generation,
            offset: WAL_HEADER_LEN,
        };
        let stats = CompactionStats {
            generation,
            documents: documents.len(),
            reclaimed_bytes,
        };
        tracing::info!(
            generation,
            documents = stats.documents,
            reclaimed_bytes,
            "Compaction complete"
        );
        Ok(stats)
    }

    /// Brings the in-memory state up to date with the shared files.
    ///
    /// Under the exclusive lock this also repairs what a crashed writer left
    /// behind: a missing or stale log is recreated and a torn tail is cut off.
    fn catch_up(&self, mode: LockMode) -> Result<()> {
        let mut cursor = self.cursor.lock();
        let log_generation = self.wal.read_generation()?;

        if log_generation == Some(cursor.generation) {
            let read = self.wal.read_from(cursor.offset)?;
            if !read.entries.is_empty() {
                let mut data = self.data.write();
                tracing::debug!(entries = read.entries.len(), "applying log entries from other writers");
                for entry in read.entries {
                    data.apply(entry);
                }
            }
            cursor.offset = read.end_offset;
            if read.stats.has_damaged_tail() {
                self.repair_tail(mode, read.end_offset)?;
            }
            return Ok(());
        }

        self.reload(&mut cursor, log_generation, mode)
    }

    /// Rebuilds the in-memory state from the snapshot the log header names.
    ///
    /// A missing log falls back to the newest snapshot. Snapshots the log does
    /// not name are left over from an interrupted compaction and are ignored.
    fn reload(&self, cursor: &mut LogCursor, log_generation: Option<u64>, mode: LockMode) -> Result<()> {
        let dir = &self.config.data_dir;
        let generation = match log_generation {
            Some(generation) => generation,
            None => snapshot_generations(dir)?.last().copied().unwrap_or(0),
        };
        let snapshot = load_snapshot(dir, generation)?;
        if snapshot.is_none() && generation > 0 {
            return Err(StoreError::Corrupt(format!(
                "log generation {} has no matching snapshot",
                generation
            )));
        }
        let mut data =
            DocumentStore::from_documents(snapshot.into_iter().flat_map(|s| s.documents));
        data.validate().map_err(StoreError::Corrupt)?;

        if log_generation.is_some() {
            let read = self.wal.read_from(WAL_HEADER_LEN)?;
            let replayed = read.entries.len();
            for entry in read.entries {
                data.apply(entry);
            }
            *cursor = LogCursor {
                generation,
                offset: read.end_offset,
            };
            if read.stats.has_damaged_tail() {
                self.repair_tail(mode, read.end_offset)?;
            }
            tracing::debug!(generation, replayed, "Store state reloaded");
        } else {
            match mode {
                LockMode::Exclusive => {
                    if generation > 0 {
                        tracing::warn!(generation, "log is missing, starting a new one");
                    }
                    self.wal.create(generation)?;
                }
                LockMode::Shared => {
                    tracing::warn!(
                        generation,
                        "log is missing, serving the snapshot until the next write"
                    );
                }
            }
            *cursor = LogCursor {
                generation,
                offset: WAL_HEADER_LEN,
            };
        }

        if mode == LockMode::Exclusive {
            remove_snapshots_except(dir, generation);
        }
        *self.data.write() = data;
        Ok(())
    }

    fn repair_tail(&self, mode: LockMode, end_offset: u64) -> Result<()> {
        if mode == LockMode::Exclusive {
            tracing::warn!(offset = end_offset, "truncating damaged log tail");
            self.wal.truncate_to(end_offset)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::GeoPoint;
    use crate::storage::wal::WAL_FILE_NAME;
    use std::thread;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> Store {
        Store::open(StoreConfig::new(dir.path())).unwrap()
    }

    fn doc(id: &str, body: &str) -> Document {
        Document::new(id).with_body(body)
    }

    #[test]
    fn test_upsert_search_delete() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store.upsert(doc("1", "hello world")).unwrap();
        store.upsert(doc("2", "goodbye world")).unwrap();

        assert_eq!(store.text_search("hello").unwrap(), vec!["1"]);
        assert!(store.delete("1").unwrap());
        assert!(!store.delete("1").unwrap());
        assert!(store.text_search("hello").unwrap().is_empty());
        assert_eq!(store.document_count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_only_a_created_directory_is_restricted() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let mode = |path: &Path| fs::metadata(path).unwrap().permissions().mode() & 0o777;

        let shared = dir.path().join("shared");
        fs::create_dir(&shared).unwrap();
        fs::set_permissions(&shared, fs::Permissions::from_mode(0o775)).unwrap();
        Store::open(StoreConfig::new(&shared)).unwrap();
        assert_eq!(mode(&shared), 0o775);

        let created = dir.path().join("created");
        Store::open(StoreConfig::new(&created)).unwrap();
        assert_eq!(mode(&created), 0o700);
    }

    #[test]
    fn test_invalid_document_leaves_no_trace() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let before = store.wal_size_bytes().unwrap();
        let err = store.upsert(Document::new("")).unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(store.wal_size_bytes().unwrap(), before);
    }

    #[test]
    fn test_delete_of_missing_id_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let before = store.wal_size_bytes().unwrap();
        assert!(!store.delete("ghost").unwrap());
        assert_eq!(store.wal_size_bytes().unwrap(), before);
    }

    #[test]
    fn test_reopen_recovers_everything() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir);
            store
                .upsert(
                    doc("1", "persisted text")
                        .with_metadata("foo", "bar")
                        .with_tag("kept")
                        .with_location(GeoPoint { lat: 10.0, lon: 10.0 }),
                )
                .unwrap();
            store.upsert(doc("2", "removed later")).unwrap();
            store.delete("2").unwrap();
        }
        let store = open(&dir);
        assert_eq!(store.document_count(), 1);
        assert_eq!(store.text_search("persisted").unwrap(), vec!["1"]);
        assert_eq!(store.metadata_search("foo", "bar").unwrap(), vec!["1"]);
        assert_eq!(store.spatial_search(10.0, 10.0, 1.0).unwrap(), vec!["1"]);
        assert!(store.get("2").unwrap().is_none());
    }

    #[test]
    fn test_second_instance_sees_writes_immediately() {
        let dir = TempDir::new().unwrap();
        let a = open(&dir);
        let b = open(&dir);

        a.upsert(doc("1", "written by a")).unwrap();
        assert_eq!(b.text_search("written").unwrap(), vec!["1"]);

        b.upsert(doc("1", "replaced by b")).unwrap();
        assert!(a.text_search("written").unwrap().is_empty());
        assert_eq!(a.text_search("replaced").unwrap(), vec!["1"]);

        assert!(a.delete("1").unwrap());
        assert!(b.search(&SearchQuery::new()).unwrap().is_empty());
    }

    #[test]
    fn test_compaction_seen_by_other_instance() {
        let dir = TempDir::new().unwrap();
        let a = open(&dir);
        let b = open(&dir);
        for i in 0..10 {
            a.upsert(doc(&i.to_string(), "bulk entry")).unwrap();
        }
        let stats = a.compact().unwrap();
        assert_eq!(stats.documents, 10);
        assert_eq!(stats.generation, 1);
        assert_eq!(a.wal_size_bytes().unwrap(), WAL_HEADER_LEN);

        a.upsert(doc("after", "post compaction")).unwrap();
        assert_eq!(b.document_count(), 0);
        assert_eq!(b.search(&SearchQuery::new()).unwrap().len(), 11);

        drop((a, b));
        let reopened = open(&dir);
        assert_eq!(reopened.document_count(), 11);
        assert_eq!(reopened.text_search("compaction").unwrap(), vec!["after"]);
    }

    #[test]
    fn test_size_triggered_compaction() {
        let dir = TempDir::new().unwrap();
        let store =
            Store::open(StoreConfig::new(dir.path()).with_compact_threshold(1024)).unwrap();
        for i in 0..20 {
            store.upsert(doc(&i.to_string(), &"filler ".repeat(20))).unwrap();
        }
        assert_eq!(snapshot_generations(dir.path()).unwrap().len(), 1);
        assert!(store.wal_size_bytes().unwrap() < 1024);
        drop(store);
        assert_eq!(open(&dir).document_count(), 20);
    }

    #[test]
    fn test_torn_tail_is_dropped_on_open() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir);
            store.upsert(doc("1", "complete")).unwrap();
            store.upsert(doc("2", "torn")).unwrap();
        }
        let wal_path = dir.path().join(WAL_FILE_NAME);
        let len = fs::metadata(&wal_path).unwrap().len();
        fs::OpenOptions::new()
            .write(true)
            .open(&wal_path)
            .unwrap()
            .set_len(len - 2)
            .unwrap();

        let store = open(&dir);
        assert_eq!(store.search(&SearchQuery::new()).unwrap(), vec!["1"]);
        store.upsert(doc("3", "after repair")).unwrap();
        drop(store);
        assert_eq!(open(&dir).search(&SearchQuery::new()).unwrap(), vec!["1", "3"]);
    }

    #[test]
    fn test_unreferenced_snapshot_is_ignored() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir);
            store.upsert(doc("1", "in the log")).unwrap();
            // Snapshot of generation 1 written, log never switched over.
            let ghost = doc("ghost", "never committed");
            save_snapshot(dir.path(), 1, &[&ghost]).unwrap();
        }
        let store = open(&dir);
        assert_eq!(store.search(&SearchQuery::new()).unwrap(), vec!["1"]);
        assert_eq!(store.wal.read_generation().unwrap(), Some(0));
        assert!(snapshot_generations(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_failed_compaction_keeps_later_writes() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store.upsert(doc("before", "written first")).unwrap();

        let blocker = dir.path().join(format!("{}.tmp", WAL_FILE_NAME));
        fs::create_dir(&blocker).unwrap();
        assert!(store.compact().is_err());
        assert!(snapshot_generations(dir.path()).unwrap().is_empty());
        fs::remove_dir(&blocker).unwrap();

        store.upsert(doc("after", "acknowledged after the failure")).unwrap();
        let replica = open(&dir);
        assert_eq!(replica.search(&SearchQuery::new()).unwrap(), vec!["after", "before"]);

        drop((store, replica));
        let reopened = open(&dir);
        assert_eq!(reopened.search(&SearchQuery::new()).unwrap(), vec!["after", "before"]);
        assert_eq!(reopened.compact().unwrap().generation, 1);
        drop(reopened);
        assert_eq!(open(&dir).document_count(), 2);
    }

    #[test]
    fn test_missing_log_falls_back_to_snapshot() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir);
            store.upsert(doc("1", "compacted")).unwrap();
            store.compact().unwrap();
        }
        fs::remove_file(dir.path().join(WAL_FILE_NAME)).unwrap();

        let store = open(&dir);
        assert_eq!(store.text_search("compacted").unwrap(), vec!["1"]);
        assert_eq!(store.wal.read_generation().unwrap(), Some(1));
    }

    #[test]
    fn test_concurrent_writers_and_readers() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(StoreConfig::new(dir.path()).with_pool_size(4)).unwrap());
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..25 {
                        store.upsert(doc(&format!("{w}-{i}"), "concurrent")).unwrap();
                        store.text_search("concurrent").unwrap();
                    }
                })
            })
            .collect();
        for handle in writers {
            handle.join().unwrap();
        }
        assert_eq!(store.text_search("concurrent").unwrap().len(), 100);
        assert_eq!(store.active_operations(), 0);
    }
}
