//! Storage layer: in-memory document store, write-ahead log, snapshots and
//! the cross-process locking that lets several processes share one data directory.
//!
//! Data lives in memory in a [`DocumentStore`] owned by a [`Store`].
//! Durability is provided by a [`SyncWriteAheadLog`] (CRC32 + fsync) and
//! bincode snapshots (atomic temp-file + rename).

/// In-memory documents and their indexes.
pub mod documents;
/// Advisory file locks.
pub mod lock;
/// Disk persistence: snapshot save/load with atomic writes.
pub mod persistence;
/// Pool of lock-file handles.
pub mod pool;
/// The durable, shared store.
pub mod store;
/// Write-Ahead Log with CRC32 checksums.
pub mod wal;

pub use documents::DocumentStore;
pub use persistence::{load_snapshot, save_snapshot, snapshot_generations, Snapshot};
pub use store::{CompactionStats, Store, StoreConfig};
pub use wal::{LogRead, ReplayStats, SyncWriteAheadLog, WalEntry};
