//! ZIP container factory, grounded on `archive.go`'s `ZipLoader`: opens a
//! `zip.NewReader` against the container, skips directory entries, and
//! wraps each file entry's decompression stream in the disk-tee reader.
//!
//! The `zip` crate's entry handle borrows its archive for the duration of a
//! read, so instead of holding that borrow across calls (impossible
//! without self-referential storage), each [`ZipEntrySeqReader`] re-derives
//! `by_name` for every `read()` call and fast-forwards past bytes already
//! delivered. [`super::disktee::DiskTeeReader`] then ensures this only
//! happens once per byte position across the entry's lifetime, by caching
//! everything it has already pulled through to a temp file.

use std::io::Read;
use std::sync::Arc;

use crate::error::{VfsError, VfsResult};
use crate::vfs::archive::readseek::FileReadSeek;
use crate::vfs::archive::{shared_container, ArchiveFs};
use crate::vfs::resolver::FsFactory;
use crate::vfs::{File, Filesystem};

struct ZipEntrySeqReader {
    container: Arc<std::sync::Mutex<Box<dyn File>>>,
    container_size: u64,
    name: String,
    pos: u64,
}

impl Read for ZipEntrySeqReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let reader = FileReadSeek::new(Arc::clone(&self.container), self.container_size);
        let mut archive = zip::ZipArchive::new(reader)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        let mut entry = archive
            .by_name(&self.name)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

        let mut skip = self.pos;
        let mut sink = [0u8; 8192];
        while skip > 0 {
            let want = std::cmp::min(sink.len() as u64, skip) as usize;
            let n = entry.read(&mut sink[..want])?;
            if n == 0 {
                return Ok(0);
            }
            skip -= n as u64;
        }
        let n = entry.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

pub fn zip_factory() -> FsFactory {
    Box::new(|file: Box<dyn File>| -> VfsResult<Box<dyn Filesystem>> {
        let (container, size) = shared_container(file)?;
        let reader = FileReadSeek::new(Arc::clone(&container), size);
        let mut archive = zip::ZipArchive::new(reader)
            .map_err(|e| VfsError::backend("", "zip.open", e.to_string()))?;

        let mut entries = Vec::new();
        for i in 0..archive.len() {
            let zf = archive
                .by_index(i)
                .map_err(|e| VfsError::backend("", "zip.index", e.to_string()))?;
            if zf.is_dir() {
                continue;
            }
            let name = format!("/{}", zf.name());
            let entry_size = zf.size();
            let name_for_opener = zf.name().to_string();
            let container_for_opener = Arc::clone(&container);
            entries.push((
                name,
                entry_size,
                Box::new(move || -> VfsResult<Box<dyn Read + Send>> {
                    Ok(Box::new(ZipEntrySeqReader {
                        container: Arc::clone(&container_for_opener),
                        container_size: size,
                        name: name_for_opener.clone(),
                        pos: 0,
                    }))
                }) as Box<dyn Fn() -> VfsResult<Box<dyn Read + Send>> + Send + Sync>,
            ));
        }

        Ok(Box::new(ArchiveFs::from_entries(entries)))
    })
}
