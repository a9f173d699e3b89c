//! Bounded pool of lock-file handles.
//!
//! Every store operation borrows one handle for its duration. When all
//! handles are in use, callers block until one is returned.

use crate::storage::lock::LockFile;
use parking_lot::{Condvar, Mutex};
use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
struct PoolState {
    idle: Vec<LockFile>,
    /// Handles opened so far, idle or borrowed.
    opened: usize,
}

/// Lazily filled pool of at most `capacity` [`LockFile`] handles.
#[derive(Debug)]
pub struct HandlePool {
    path: PathBuf,
    capacity: usize,
    state: Mutex<PoolState>,
    returned: Condvar,
}

impl HandlePool {
    /// Creates an empty pool; handles are opened on first use. A capacity of 0 is raised to 1.
    pub fn new(path: &Path, capacity: usize) -> Self {
        Self {
            path: path.to_path_buf(),
            capacity: capacity.max(1),
            state: Mutex::new(PoolState::default()),
            returned: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of handles currently borrowed.
    pub fn in_use(&self) -> usize {
        let state = self.state.lock();
        state.opened - state.idle.len()
    }

    /// Borrows a handle, opening a new one if the pool is not full and
    /// waiting for a return otherwise.
    pub fn acquire(&self) -> io::Result<PooledHandle<'_>> {
        let mut state = self.state.lock();
        loop {
            if let Some(handle) = state.idle.pop() {
                return Ok(self.wrap(handle));
            }
            if state.opened < self.capacity {
                state.opened += 1;
                drop(state);
                return match LockFile::open(&self.path) {
                    Ok(handle) => Ok(self.wrap(handle)),
                    Err(e) => {
                        self.state.lock().opened -= 1;
                        self.returned.notify_one();
                        Err(e)
                    }
                };
            }
            self.returned.wait(&mut state);
        }
    }

    fn wrap(&self, handle: LockFile) -> PooledHandle<'_> {
        PooledHandle {
            pool: self,
            handle: Some(handle),
        }
    }

    fn release(&self, handle: LockFile) {
        self.state.lock().idle.push(handle);
        self.returned.notify_one();
    }
}

/// A borrowed handle; goes back to the pool on drop.
#[derive(Debug)]
pub struct PooledHandle<'a> {
    pool: &'a HandlePool,
    handle: Option<LockFile>,
}

impl Deref for PooledHandle<'_> {
    type Target = LockFile;

    fn deref(&self) -> &LockFile {
        // Only `None` after drop has started.
        self.handle.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledHandle<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.release(handle);
        }
    }
}
