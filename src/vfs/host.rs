//! A thin adaptor over a local OS directory tree, grounded on the original
//! system's `OsFS`/`LazyOsFile`: file handles defer the actual `open(2)`
//! until the first read, keeping directory listings cheap on large trees.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{VfsError, VfsResult};
use crate::vfs::{File, FileInfo, Filesystem, FILE_MODE, VPath};

pub struct HostFs {
    root: PathBuf,
}

impl HostFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn real_path(&self, path: &VPath) -> PathBuf {
        if path.is_root() {
            self.root.clone()
        } else {
            let mut p = self.root.clone();
            for c in path.components() {
                p.push(c);
            }
            p
        }
    }
}

/// Deferred-open file handle: the real `File` is opened on first read, not
/// at construction.
pub struct LazyHostFile {
    path: PathBuf,
    size: u64,
    inner: Mutex<Option<fs::File>>,
    cursor: u64,
}

impl LazyHostFile {
    fn ensure_open(&self) -> VfsResult<()> {
        let mut guard = self.inner.lock().unwrap();
        if guard.is_none() {
            *guard = Some(fs::File::open(&self.path)?);
        }
        Ok(())
    }
}

impl File for LazyHostFile {
    fn size(&self) -> i64 {
        self.size as i64
    }

    fn is_dir(&self) -> bool {
        false
    }

    fn stat(&self) -> VfsResult<FileInfo> {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(FileInfo::new_file(name, self.size))
    }

    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let n = self.read_at(buf, self.cursor as i64)?;
        self.cursor += n as u64;
        Ok(n)
    }

    fn read_at(&mut self, buf: &mut [u8], off: i64) -> VfsResult<usize> {
        use std::os::unix::fs::FileExt;
        if off < 0 {
            return Err(VfsError::invalid_argument(
                self.path.to_string_lossy(),
                "negative offset",
            ));
        }
        self.ensure_open()?;
        let guard = self.inner.lock().unwrap();
        let file = guard.as_ref().unwrap();
        match file.read_at(buf, off as u64) {
            Ok(n) => Ok(n),
            Err(e) => Err(e.into()),
        }
    }
}

impl Filesystem for HostFs {
    fn open(&self, path: &VPath) -> VfsResult<Box<dyn File>> {
        let real = self.real_path(path);
        let meta = fs::metadata(&real).map_err(|_| VfsError::not_exist(path.as_str()))?;
        if meta.is_dir() {
            return Err(VfsError::invalid_argument(path.as_str(), "is a directory"));
        }
        Ok(Box::new(LazyHostFile {
            path: real,
            size: meta.len(),
            inner: Mutex::new(None),
            cursor: 0,
        }))
    }

    fn stat(&self, path: &VPath) -> VfsResult<FileInfo> {
        let real = self.real_path(path);
        let meta = fs::metadata(&real).map_err(|_| VfsError::not_exist(path.as_str()))?;
        if meta.is_dir() {
            Ok(FileInfo::new_dir(path.name()))
        } else {
            Ok(FileInfo::new_file(path.name(), meta.len()))
        }
    }

    fn read_dir(&self, path: &VPath) -> VfsResult<Vec<FileInfo>> {
        let real = self.real_path(path);
        let entries = fs::read_dir(&real).map_err(|_| VfsError::not_exist(path.as_str()))?;
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry?;
            let meta = entry.metadata()?;
            let name = entry.file_name().to_string_lossy().to_string();
            out.push(if meta.is_dir() {
                FileInfo::new_dir(name)
            } else {
                FileInfo {
                    name,
                    size: meta.len(),
                    is_dir: false,
                    mode: FILE_MODE,
                }
            });
        }
        Ok(out)
    }
}
