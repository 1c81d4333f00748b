use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::inode_entry::InodeEntry;
use crate::vfs::VPath;

/// Maps FUSE inode numbers onto virtual paths and back. Uses DashMap for
/// concurrent access and an AtomicU64 for thread-safe inode generation, the
/// same approach the engine's torrent inode table used, but keyed on path
/// instead of a torrent id/file index pair since the composed filesystem
/// tree owns that distinction now.
pub struct InodeManager {
    next_inode: AtomicU64,
    paths: DashMap<u64, VPath>,
    inodes: DashMap<VPath, u64>,
    max_inodes: usize,
}

impl InodeManager {
    /// Creates a new manager with root inode (inode 1) pre-allocated and no
    /// inode limit.
    pub fn new() -> Self {
        Self::with_max_inodes(0)
    }

    /// Creates a new manager with a maximum inode limit (0 = unlimited).
    pub fn with_max_inodes(max_inodes: usize) -> Self {
        let paths = DashMap::new();
        let inodes = DashMap::new();
        paths.insert(1, VPath::root());
        inodes.insert(VPath::root(), 1);
        Self {
            next_inode: AtomicU64::new(2),
            paths,
            inodes,
            max_inodes,
        }
    }

    pub fn can_allocate(&self) -> bool {
        self.max_inodes == 0 || self.paths.len() < self.max_inodes
    }

    pub fn max_inodes(&self) -> usize {
        self.max_inodes
    }

    /// Returns the existing inode for `path`, allocating a fresh one if this
    /// is the first time the path has been seen. Returns 0 if the inode
    /// limit has been reached and no inode exists yet for this path.
    pub fn ensure_inode(&self, path: &VPath) -> u64 {
        if let Some(existing) = self.inodes.get(path) {
            return *existing;
        }
        if self.max_inodes > 0 && self.paths.len() >= self.max_inodes {
            tracing::warn!(path = %path, "inode limit reached, cannot allocate");
            return 0;
        }
        let ino = self.next_inode.fetch_add(1, Ordering::SeqCst);
        self.paths.insert(ino, path.clone());
        self.inodes.insert(path.clone(), ino);
        ino
    }

    pub fn path_for(&self, ino: u64) -> Option<VPath> {
        self.paths.get(&ino).map(|p| p.clone())
    }

    pub fn inode_for(&self, path: &VPath) -> Option<u64> {
        self.inodes.get(path).map(|i| *i)
    }

    pub fn entry_for(&self, ino: u64) -> Option<InodeEntry> {
        let path = self.path_for(ino)?;
        let parent = self.inode_for(&path.parent()).unwrap_or(1);
        Some(InodeEntry {
            ino,
            path,
            parent: if ino == 1 { 1 } else { parent },
        })
    }

    pub fn contains(&self, ino: u64) -> bool {
        self.paths.contains_key(&ino)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.len() <= 1
    }

    /// Drops an inode from the table. The path may be re-allocated a fresh
    /// inode number on its next lookup; FUSE's own dentry cache TTL keeps
    /// this from being observable mid-lookup.
    pub fn forget(&self, ino: u64) {
        if ino == 1 {
            return;
        }
        if let Some((_, path)) = self.paths.remove(&ino) {
            self.inodes.remove(&path);
        }
    }
}

impl Default for InodeManager {
    fn default() -> Self {
        Self::new()
    }
}
