use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::vfs::File;

/// An open file handle: the inode it was opened against and the backend's
/// own open [`File`], which carries whatever read-cursor/reader state that
/// backend needs.
pub struct FileHandle {
    pub inode: u64,
    pub file: Box<dyn File>,
}

/// Allocates unique FUSE file handles and tracks open file state. Mirrors
/// the engine's original handle table: an atomic counter that skips 0 (FUSE
/// treats 0 as "no handle"), backed by a mutex-guarded map since handles are
/// opened/closed far less often than read.
pub struct FileHandleManager {
    next_handle: AtomicU64,
    handles: Mutex<HashMap<u64, FileHandle>>,
    max_handles: usize,
}

impl FileHandleManager {
    pub fn new() -> Self {
        Self::with_max_handles(0)
    }

    pub fn with_max_handles(max_handles: usize) -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            handles: Mutex::new(HashMap::new()),
            max_handles,
        }
    }

    /// Registers a freshly opened file and returns its handle, or `None` if
    /// the handle limit has been reached.
    pub fn allocate(&self, inode: u64, file: Box<dyn File>) -> Option<u64> {
        let mut handles = self.handles.lock().unwrap();
        if self.max_handles > 0 && handles.len() >= self.max_handles {
            return None;
        }
        let mut fh = self.next_handle.fetch_add(1, Ordering::SeqCst);
        if fh == 0 {
            fh = self.next_handle.fetch_add(1, Ordering::SeqCst);
        }
        handles.insert(fh, FileHandle { inode, file });
        Some(fh)
    }

    pub fn with_file<R>(&self, fh: u64, f: impl FnOnce(&mut FileHandle) -> R) -> Option<R> {
        let mut handles = self.handles.lock().unwrap();
        handles.get_mut(&fh).map(f)
    }

    pub fn remove(&self, fh: u64) -> Option<FileHandle> {
        self.handles.lock().unwrap().remove(&fh)
    }

    pub fn contains(&self, fh: u64) -> bool {
        self.handles.lock().unwrap().contains_key(&fh)
    }

    pub fn len(&self) -> usize {
        self.handles.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub fn set_next_handle(&self, value: u64) {
        self.next_handle.store(value, Ordering::SeqCst);
    }
}

impl Default for FileHandleManager {
    fn default() -> Self {
        Self::new()
    }
}
