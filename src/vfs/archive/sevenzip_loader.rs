//! 7Z container factory. `sevenz-rust`'s stable public entry point is
//! whole-archive extraction to a directory; as with [`super::rar_loader`],
//! the container is first materialised to a temp file (7z also requires
//! random access for its header/dictionary layout) and then fully
//! extracted once into a scratch directory mounted as a [`HostFs`].

use std::io::Write;

use crate::error::{VfsError, VfsResult};
use crate::vfs::host::HostFs;
use crate::vfs::resolver::FsFactory;
use crate::vfs::{File, FileInfo, Filesystem, VPath};

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

pub fn sevenzip_factory() -> FsFactory {
    Box::new(|mut file: Box<dyn File>| -> VfsResult<Box<dyn Filesystem>> {
        let dir = tempfile::tempdir().map_err(VfsError::from)?;
        let archive_path = dir.path().join("container.7z");
        materialize(&mut file, &archive_path)?;

        let extract_dir = dir.path().join("extracted");
        std::fs::create_dir_all(&extract_dir).map_err(VfsError::from)?;

        sevenz_rust::decompress_file(&archive_path, &extract_dir)
            .map_err(|e| VfsError::backend("", "7z.decompress", e.to_string()))?;

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
