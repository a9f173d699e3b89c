//! Advisory file locks coordinating every process that opens a data directory.
//!
//! Readers take a shared lock and writers an exclusive one on `store.lock`.
//! `flock` locks belong to an open file description, so each concurrent
//! operation must lock through its own [`LockFile`]; the
//! [`HandlePool`](crate::storage::pool::HandlePool) hands those out.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// File name of the lock file inside the data directory.
pub const LOCK_FILE_NAME: &str = "store.lock";

/// One open descriptor on the lock file.
#[derive(Debug)]
pub struct LockFile {
    file: File,
}

impl LockFile {
    /// Opens (creating if needed) the lock file at `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let mut opts = OpenOptions::new();
        opts.read(true).write(true).create(true).truncate(false);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        Ok(Self {
            file: opts.open(path)?,
        })
    }

    /// Blocks until a shared (read) lock is held.
    pub fn shared(&self) -> io::Result<FileLockGuard<'_>> {
        imp::lock(&self.file, false)?;
        Ok(FileLockGuard { file: &self.file })
    }

    /// Blocks until an exclusive (write) lock is held.
    pub fn exclusive(&self) -> io::Result<FileLockGuard<'_>> {
        imp::lock(&self.file, true)?;
        Ok(FileLockGuard { file: &self.file })
    }
}

/// Releases the lock on drop.
#[derive(Debug)]
pub struct FileLockGuard<'a> {
    file: &'a File,
}

impl Drop for FileLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = imp::unlock(self.file) {
            tracing::error!(error = %e, "failed to release store lock");
        }
    }
}

#[cfg(unix)]
mod imp {
    use std::fs::File;
    use std::io;
    use std::os::unix::io::AsRawFd;

    pub fn lock(file: &File, exclusive: bool) -> io::Result<()> {
        let op = if exclusive { libc::LOCK_EX } else { libc::LOCK_SH };
        flock(file, op)
    }

    pub fn unlock(file: &File) -> io::Result<()> {
        flock(file, libc::LOCK_UN)
    }

    fn flock(file: &File, op: libc::c_int) -> io::Result<()> {
        loop {
            // SAFETY: the descriptor is owned by `file` and stays open for the call.
            let rc = unsafe { libc::flock(file.as_raw_fd(), op) };
            if rc == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

#[cfg(not(unix))]
mod imp {
    //! No advisory locking: only the in-process gate applies.
    use std::fs::File;
    use std::io;

    pub fn lock(_file: &File, _exclusive: bool) -> io::Result<()> {
        Ok(())
    }

    pub fn unlock(_file: &File) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_shared_locks_coexist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCK_FILE_NAME);
        let a = LockFile::open(&path).unwrap();
        let b = LockFile::open(&path).unwrap();
        let _ga = a.shared().unwrap();
        let _gb = b.shared().unwrap();
    }

    #[test]
    fn test_exclusive_blocks_other_descriptor() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCK_FILE_NAME);
        let a = LockFile::open(&path).unwrap();
        let guard = a.exclusive().unwrap();

        let (tx, rx) = mpsc::channel();
        let other = path.clone();
        let waiter = std::thread::spawn(move || {
            let b = LockFile::open(&other).unwrap();
            let _g = b.shared().unwrap();
            tx.send(()).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        drop(guard);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
    }
}
