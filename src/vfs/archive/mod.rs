//! Presents a container file (ZIP/RAR/7Z) as a read-only tree. Grounded on
//! the original system's `archive.go`: one factory per container format,
//! all sharing the contract "given a seekable reader of known size, produce
//! a `{name -> entry}` map on first demand," with the map memoised via a
//! once-evaluated function that also caches failures.

pub mod disktee;
mod readseek;
mod rar_loader;
mod sevenzip_loader;
mod zip_loader;

pub use rar_loader::rar_factory;
pub use sevenzip_loader::sevenzip_factory;
pub use zip_loader::zip_factory;

use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, Mutex, OnceLock};

use crate::error::{VfsError, VfsResult};
use crate::vfs::{lookup_or_synthesize_dir, synthesize_read_dir, File, FileInfo, Filesystem, VPath};

use disktee::DiskTeeReader;
use readseek::FileReadSeek;

/// One archive member: its declared size and a function that produces a
/// fresh forward-only decoder for it, invoked lazily the first time the
/// entry is opened.
struct Entry {
    size: u64,
    opener: Box<dyn Fn() -> VfsResult<Box<dyn Read + Send>> + Send + Sync>,
    reader: OnceLock<VfsResult<Arc<DiskTeeReader>>>,
}

impl Entry {
    fn tee(&self) -> VfsResult<Arc<DiskTeeReader>> {
        self.reader
            .get_or_init(|| {
                let source = (self.opener)()?;
                DiskTeeReader::new(source).map(Arc::new)
            })
            .clone()
    }
}

/// A memoised `{name -> entry}` index plus the shared, reopenable container
/// handle every loader builds it from.
pub struct ArchiveFs {
    entries: HashMap<String, Entry>,
}

impl ArchiveFs {
    /// Builds an archive filesystem from a parsed entry list. Loaders call
    /// this after reading the container's central directory / header table;
    /// entry bytes themselves are not touched until first open.
    fn from_entries(
        entries: Vec<(String, u64, Box<dyn Fn() -> VfsResult<Box<dyn Read + Send>> + Send + Sync>)>,
    ) -> Self {
        let mut map = HashMap::new();
        for (name, size, opener) in entries {
            let cleaned = VPath::clean(&name).as_str().to_string();
            map.insert(
                cleaned,
                Entry {
                    size,
                    opener,
                    reader: OnceLock::new(),
                },
            );
        }
        Self { entries: map }
    }

    fn iter_sizes(&self) -> impl Iterator<Item = (&str, u64)> + Clone {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.size))
    }
}

pub struct ArchiveEntryFile {
    tee: Arc<DiskTeeReader>,
    size: u64,
    name: String,
    cursor: u64,
}

impl File for ArchiveEntryFile {
    fn size(&self) -> i64 {
        self.size as i64
    }

    fn is_dir(&self) -> bool {
        false
    }

    fn stat(&self) -> VfsResult<FileInfo> {
        Ok(FileInfo::new_file(self.name.clone(), self.size))
    }

    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let n = self.read_at(buf, self.cursor as i64)?;
        self.cursor += n as u64;
        Ok(n)
    }

    fn read_at(&mut self, buf: &mut [u8], off: i64) -> VfsResult<usize> {
        if off < 0 {
            return Err(VfsError::invalid_argument(&self.name, "negative offset"));
        }
        if off as u64 >= self.size {
            return Ok(0);
        }
        let want = std::cmp::min(buf.len() as u64, self.size - off as u64) as usize;
        self.tee.read_at(&mut buf[..want], off as u64)
    }
}

impl Filesystem for ArchiveFs {
    fn open(&self, path: &VPath) -> VfsResult<Box<dyn File>> {
        let entry = self
            .entries
            .get(path.as_str())
            .ok_or_else(|| VfsError::not_exist(path.as_str()))?;
        let tee = entry.tee().map_err(|e| e.with_context(path.as_str()))?;
        Ok(Box::new(ArchiveEntryFile {
            tee,
            size: entry.size,
            name: path.name().to_string(),
            cursor: 0,
        }))
    }

    fn stat(&self, path: &VPath) -> VfsResult<FileInfo> {
        if path.is_root() {
            return Ok(FileInfo::new_dir("/"));
        }
        lookup_or_synthesize_dir(self.iter_sizes(), path).ok_or_else(|| VfsError::not_exist(path.as_str()))
    }

    fn read_dir(&self, path: &VPath) -> VfsResult<Vec<FileInfo>> {
        if !path.is_root() {
            self.stat(path)?;
        }
        Ok(synthesize_read_dir(self.iter_sizes(), path))
    }
}

/// Shared, reopenable handle to a container file: every entry's lazy
/// decoder gets its own cursor over the same underlying bytes via
/// [`FileReadSeek`], without needing to reopen the file from its parent
/// filesystem.
pub(crate) fn shared_container(file: Box<dyn File>) -> VfsResult<(Arc<Mutex<Box<dyn File>>>, u64)> {
    let size = file.size();
    if size < 0 {
        return Err(VfsError::invalid_argument("", "archive container has negative size"));
    }
    Ok((Arc::new(Mutex::new(file)), size as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A loader-agnostic sanity check: given a hand-built entry list behind
    /// the archive abstraction (standing in for any concrete container
    /// format), listing/opening/EOF semantics match the memory FS.
    #[test]
    fn archive_fs_lists_and_reads_entries_like_memory_fs() {
        let body = b"Hello World".to_vec();
        let body_for_closure = body.clone();
        let entries = vec![(
            "path/to/test/file/1.txt".to_string(),
            body.len() as u64,
            Box::new(move || -> VfsResult<Box<dyn Read + Send>> {
                Ok(Box::new(std::io::Cursor::new(body_for_closure.clone())))
            }) as Box<dyn Fn() -> VfsResult<Box<dyn Read + Send>> + Send + Sync>,
        )];
        let fs = ArchiveFs::from_entries(entries);

        let listing = fs
            .read_dir(&VPath::clean("/path/to/test/file"))
            .unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "1.txt");

        let mut f = fs.open(&VPath::clean("/path/to/test/file/1.txt")).unwrap();
        let mut buf = [0u8; 11];
        assert_eq!(f.read(&mut buf).unwrap(), 11);
        assert_eq!(&buf, b"Hello World");
        let mut tail = [0u8; 1];
        assert_eq!(f.read(&mut tail).unwrap(), 0);
    }

    #[test]
    fn failed_entry_open_is_cached() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        let entries = vec![(
            "/bad.bin".to_string(),
            10,
            Box::new(move || -> VfsResult<Box<dyn Read + Send>> {
                calls2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Err(VfsError::backend("/bad.bin", "decode", "corrupt"))
            }) as Box<dyn Fn() -> VfsResult<Box<dyn Read + Send>> + Send + Sync>,
        )];
        let fs = ArchiveFs::from_entries(entries);
        assert!(fs.open(&VPath::clean("/bad.bin")).is_err());
        assert!(fs.open(&VPath::clean("/bad.bin")).is_err());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1, "opener must run once, error cached");
    }
}
