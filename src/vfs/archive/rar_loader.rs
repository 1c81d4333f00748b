//! RAR container factory.
//!
//! The original system's `RarLoader` wraps the *entire* sequential RAR
//! stream in a single disk-tee reader shared across entries, because the
//! Go RAR decoder only supports forward iteration, not independent
//! per-entry reopen. The `unrar` crate used here exposes the same
//! single-pass shape (`Archive::open_for_processing` /
//! `read_header`/`extract_with_base`), so rather than reproduce a RAR
//! decoder's internal seeking, this factory performs that single forward
//! pass once, eagerly, into a private temporary directory, then mounts a
//! [`HostFs`] rooted there (removed again once the mount is dropped) —
//! trading the lazy per-byte teeing ZIP gets for a one-shot extraction,
//! which is the shape `unrar`'s own API encourages. Documented as a
//! deliberate simplification in DESIGN.md.

use std::io::Write;

use crate::error::{VfsError, VfsResult};
use crate::vfs::host::HostFs;
use crate::vfs::resolver::FsFactory;
use crate::vfs::{File, FileInfo, Filesystem, VPath};

/// A [`HostFs`] paired with the temporary extraction directory it is
/// rooted at, so the scratch directory is removed once the mounted
/// filesystem (and therefore this wrapper) is dropped.
struct ExtractedFs {
    host: HostFs,
    _scratch: tempfile::TempDir,
}

impl Filesystem for ExtractedFs {
    fn open(&self, path: &VPath) -> VfsResult<Box<dyn File>> {
        self.host.open(path)
    }

    fn stat(&self, path: &VPath) -> VfsResult<FileInfo> {
        self.host.stat(path)
    }

    fn read_dir(&self, path: &VPath) -> VfsResult<Vec<FileInfo>> {
        self.host.read_dir(path)
    }
}

pub fn rar_factory() -> FsFactory {
    Box::new(|mut file: Box<dyn File>| -> VfsResult<Box<dyn Filesystem>> {
        let dir = tempfile::tempdir().map_err(VfsError::from)?;
        let archive_path = dir.path().join("container.rar");
        materialize(&mut file, &archive_path)?;

        let extract_dir = dir.path().join("extracted");
        std::fs::create_dir_all(&extract_dir).map_err(VfsError::from)?;

        let mut archive = unrar::Archive::new(&archive_path)
            .open_for_processing()
            .map_err(|e| VfsError::backend("", "rar.open", e.to_string()))?;
        while let Some(header) = archive
            .read_header()
            .map_err(|e| VfsError::backend("", "rar.read_header", e.to_string()))?
        {
            archive = if header.entry().is_file() {
                header
                    .extract_with_base(&extract_dir)
                    .map_err(|e| VfsError::backend("", "rar.extract", e.to_string()))?
            } else {
                header
                    .skip()
                    .map_err(|e| VfsError::backend("", "rar.skip", e.to_string()))?
            };
        }

        Ok(Box::new(ExtractedFs {
            host: HostFs::new(extract_dir),
            _scratch: dir,
        }))
    })
}

fn materialize(file: &mut Box<dyn File>, dest: &std::path::Path) -> VfsResult<()> {
    let mut out = std::fs::File::create(dest).map_err(VfsError::from)?;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n]).map_err(VfsError::from)?;
    }
    Ok(())
}
