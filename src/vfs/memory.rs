//! An in-memory [`Filesystem`] backed by a flat `{vpath -> bytes}` map.
//! Grounded on the original system's `MemoryFs`/`MemoryFile`: a thin
//! `bytes.Reader` wrapper with no directory entries of its own — every
//! directory is synthesised from path prefixes at list/stat time.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{VfsError, VfsResult};
use crate::vfs::{lookup_or_synthesize_dir, synthesize_read_dir, File, FileInfo, Filesystem, VPath};

#[derive(Debug, Default)]
pub struct MemoryFs {
    files: HashMap<String, Arc<Vec<u8>>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a file at `path` (cleaned on insert).
    pub fn insert(&mut self, path: &str, contents: impl Into<Vec<u8>>) {
        let cleaned = VPath::clean(path);
        self.files.insert(cleaned.as_str().to_string(), Arc::new(contents.into()));
    }

    fn entries(&self) -> impl Iterator<Item = (&str, u64)> + Clone {
        self.files.iter().map(|(p, b)| (p.as_str(), b.len() as u64))
    }
}

pub struct MemoryFile {
    data: Arc<Vec<u8>>,
    cursor: usize,
}

impl File for MemoryFile {
    fn size(&self) -> i64 {
        self.data.len() as i64
    }

    fn is_dir(&self) -> bool {
        false
    }

    fn stat(&self) -> VfsResult<FileInfo> {
        Ok(FileInfo::new_file("", self.data.len() as u64))
    }

    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let n = self.read_at(buf, self.cursor as i64)?;
        self.cursor += n;
        Ok(n)
    }

    fn read_at(&mut self, buf: &mut [u8], off: i64) -> VfsResult<usize> {
        if off < 0 {
            return Err(VfsError::invalid_argument("", "negative offset"));
        }
        let off = off as usize;
        if off >= self.data.len() {
            return Ok(0);
        }
        let n = std::cmp::min(buf.len(), self.data.len() - off);
        buf[..n].copy_from_slice(&self.data[off..off + n]);
        Ok(n)
    }
}

impl Filesystem for MemoryFs {
    fn open(&self, path: &VPath) -> VfsResult<Box<dyn File>> {
        match self.files.get(path.as_str()) {
            Some(data) => Ok(Box::new(MemoryFile {
                data: Arc::clone(data),
                cursor: 0,
            })),
            None => Err(VfsError::not_exist(path.as_str())),
        }
    }

    fn stat(&self, path: &VPath) -> VfsResult<FileInfo> {
        if path.is_root() {
            return Ok(FileInfo::new_dir("/"));
        }
        lookup_or_synthesize_dir(self.entries(), path).ok_or_else(|| VfsError::not_exist(path.as_str()))
    }

    fn read_dir(&self, path: &VPath) -> VfsResult<Vec<FileInfo>> {
        if !path.is_root() {
            self.stat(path)?;
        }
        Ok(synthesize_read_dir(self.entries(), path))
    }
}
