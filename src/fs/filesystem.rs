//! `fuser::Filesystem` adapter over the generic [`crate::vfs::Filesystem`]
//! capability set. Every callback delegates to the composed backend tree
//! (resolver over torrent/host/archive filesystems); this layer only knows
//! about inode bookkeeping, FUSE attribute conversion, and the sync/async
//! boundary for reads.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use fuser::{
    FileType, Filesystem as FuseFilesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, Request,
};
use tracing::{debug, error, info, instrument, warn};

use crate::fs::inode_manager::InodeManager;
use crate::fs::{reply_ino_not_found, reply_no_permission, reply_not_directory, reply_not_file};
use crate::metrics::Metrics;
use crate::types::attr::file_attr;
use crate::types::handle::FileHandleManager;
use crate::vfs::{Filesystem as VfsTree, VPath};

const ENTRY_TTL: Duration = Duration::from_secs(1);

/// Top-level FUSE adapter. Holds no torrent- or archive-specific state of
/// its own: `root` is whatever composed tree `lib.rs` built (resolver over
/// host/torrent/archive backends), and everything else here is generic
/// inode/handle bookkeeping plus FUSE wire format conversion.
pub struct VfsFuse {
    root: Arc<dyn VfsTree>,
    inodes: Arc<InodeManager>,
    handles: Arc<FileHandleManager>,
    metrics: Arc<Metrics>,
    runtime: tokio::runtime::Handle,
}

impl VfsFuse {
    pub fn new(root: Arc<dyn VfsTree>, metrics: Arc<Metrics>, runtime: tokio::runtime::Handle) -> Self {
        Self {
            root,
            inodes: Arc::new(InodeManager::new()),
            handles: Arc::new(FileHandleManager::new()),
            metrics,
            runtime,
        }
    }

    pub fn with_max_inodes(mut self, max_inodes: usize) -> Self {
        self.inodes = Arc::new(InodeManager::with_max_inodes(max_inodes));
        self
    }

    pub fn with_max_handles(mut self, max_handles: usize) -> Self {
        self.handles = Arc::new(FileHandleManager::with_max_handles(max_handles));
        self
    }

    /// Mounts at `mount_point` with the standard read-only option set.
    /// Blocks until unmounted.
    pub fn mount(self, mount_point: &std::path::Path) -> std::io::Result<()> {
        let options = Self::mount_options();
        info!(mount_point = %mount_point.display(), "mounting virtual torrent filesystem");
        fuser::mount2(self, mount_point, &options)
    }

    fn mount_options() -> Vec<fuser::MountOption> {
        vec![
            fuser::MountOption::RO,
            fuser::MountOption::NoSuid,
            fuser::MountOption::NoDev,
            fuser::MountOption::NoAtime,
            fuser::MountOption::AutoUnmount,
        ]
    }

    fn path_for(&self, ino: u64) -> Option<VPath> {
        self.inodes.path_for(ino)
    }
}

impl FuseFilesystem for VfsFuse {
    fn init(
        &mut self,
        _req: &Request<'_>,
        _config: &mut fuser::KernelConfig,
    ) -> Result<(), libc::c_int> {
        match self.root.stat(&VPath::root()) {
            Ok(info) if info.is_dir => {
                info!("virtual torrent filesystem initialized");
                Ok(())
            }
            Ok(_) => {
                error!("root path did not resolve to a directory");
                Err(libc::EIO)
            }
            Err(e) => {
                error!(error = %e, "failed to stat root during init");
                Err(e.to_errno())
            }
        }
    }

    fn destroy(&mut self) {
        info!("shutting down virtual torrent filesystem");
    }

    #[instrument(skip(self, reply, name), fields(parent))]
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        self.metrics.fuse.record_lookup();
        let name = name.to_string_lossy();

        let parent_path = match self.path_for(parent) {
            Some(p) => p,
            None => {
                reply_ino_not_found!(self.metrics, reply, "lookup", parent);
                return;
            }
        };

        let child_path = match name.as_ref() {
            "." => parent_path.clone(),
            ".." => parent_path.parent(),
            other => parent_path.join(other),
        };

        match self.root.stat(&child_path) {
            Ok(info) => {
                let ino = self.inodes.ensure_inode(&child_path);
                if ino == 0 {
                    self.metrics.fuse.record_error();
                    reply.error(libc::ENFILE);
                    return;
                }
                let attr = file_attr(ino, &info);
                reply.entry(&ENTRY_TTL, &attr, 0);
            }
            Err(e) => {
                debug!(fuse_op = "lookup", path = %child_path, error = %e, "lookup miss");
                reply.error(e.to_errno());
            }
        }
    }

    #[instrument(skip(self, reply), fields(ino))]
    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        self.metrics.fuse.record_getattr();
        let path = match self.path_for(ino) {
            Some(p) => p,
            None => {
                reply_ino_not_found!(self.metrics, reply, "getattr", ino);
                return;
            }
        };
        match self.root.stat(&path) {
            Ok(info) => reply.attr(&ENTRY_TTL, &file_attr(ino, &info)),
            Err(e) => {
                self.metrics.fuse.record_error();
                reply.error(e.to_errno());
            }
        }
    }

    #[instrument(skip(self, reply), fields(ino))]
    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        self.metrics.fuse.record_open();

        let access_mode = flags & libc::O_ACCMODE;
        if access_mode != libc::O_RDONLY {
            reply_no_permission!(self.metrics, reply, "open", ino, "write_access_requested");
            return;
        }

        let path = match self.path_for(ino) {
            Some(p) => p,
            None => {
                reply_ino_not_found!(self.metrics, reply, "open", ino);
                return;
            }
        };

        match self.root.open(&path) {
            Ok(file) => {
                if file.is_dir() {
                    reply_not_file!(self.metrics, reply, "open", ino);
                    return;
                }
                match self.handles.allocate(ino, file) {
                    Some(fh) => reply.opened(fh, 0),
                    None => {
                        self.metrics.fuse.record_error();
                        reply.error(libc::EMFILE);
                    }
                }
            }
            Err(e) => {
                self.metrics.fuse.record_error();
                reply.error(e.to_errno());
            }
        }
    }

    #[instrument(skip(self, reply), fields(fh))]
    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        if offset < 0 {
            self.metrics.fuse.record_error();
            reply.error(libc::EINVAL);
            return;
        }

        let handles = Arc::clone(&self.handles);
        let metrics = Arc::clone(&self.metrics);
        let size = size as usize;

        // Offloaded to the blocking pool so a slow read from the torrent
        // backend (which may itself block on network I/O, see
        // engine::bridge::EngineHandle) doesn't stall the FUSE dispatch
        // loop for unrelated requests.
        self.runtime.spawn_blocking(move || {
            let start = std::time::Instant::now();
            let mut buf = vec![0u8; size];
            let outcome = handles.with_file(fh, |handle| handle.file.read_at(&mut buf, offset));
            match outcome {
                Some(Ok(n)) => {
                    metrics.fuse.record_read(n as u64, start.elapsed());
                    reply.data(&buf[..n]);
                }
                Some(Err(e)) => {
                    metrics.fuse.record_error();
                    reply.error(e.to_errno());
                }
                None => {
                    metrics.fuse.record_error();
                    reply.error(libc::EBADF);
                }
            }
        });
    }

    #[instrument(skip(self, reply), fields(fh))]
    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        self.metrics.fuse.record_release();
        if let Some(mut handle) = self.handles.remove(fh) {
            let _ = handle.file.close();
        } else {
            warn!(fuse_op = "release", fh = fh, "handle not found");
        }
        reply.ok();
    }

    #[instrument(skip(self, reply), fields(ino))]
    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        self.metrics.fuse.record_readdir();

        let path = match self.path_for(ino) {
            Some(p) => p,
            None => {
                reply_ino_not_found!(self.metrics, reply, "readdir", ino);
                return;
            }
        };

        let entries = match self.root.read_dir(&path) {
            Ok(entries) => entries,
            Err(e) => {
                self.metrics.fuse.record_error();
                reply.error(e.to_errno());
                return;
            }
        };

        let mut rows: Vec<(u64, FileType, String)> = vec![
            (ino, FileType::Directory, ".".to_string()),
            (
                self.inodes.inode_for(&path.parent()).unwrap_or(1),
                FileType::Directory,
                "..".to_string(),
            ),
        ];
        for entry in entries {
            let child_path = path.join(&entry.name);
            let child_ino = self.inodes.ensure_inode(&child_path);
            if child_ino == 0 {
                continue;
            }
            let kind = if entry.is_dir {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            rows.push((child_ino, kind, entry.name));
        }

        for (i, (row_ino, kind, name)) in rows.into_iter().enumerate().skip(offset as usize) {
            if reply.add(row_ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        debug!(fuse_op = "readlink", ino = ino, "symlinks are not supported");
        reply.error(libc::EINVAL);
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        reply.error(libc::EROFS);
    }

    fn rmdir(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(libc::EROFS);
    }

    #[instrument(skip(self, reply, name), fields(parent))]
    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name = name.to_string_lossy();
        let parent_path = match self.path_for(parent) {
            Some(p) => p,
            None => {
                reply_ino_not_found!(self.metrics, reply, "unlink", parent);
                return;
            }
        };
        let target = parent_path.join(&name);
        match self.root.unlink(&target) {
            Ok(()) => {
                info!(fuse_op = "unlink", path = %target, "excluded file");
                reply.ok();
            }
            Err(e) => {
                self.metrics.fuse.record_error();
                reply.error(e.to_errno());
            }
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let inode_count = self.inodes.len() as u64;
        reply.statfs(0, 0, 0, inode_count, inode_count, 4096, 255, 4096);
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        const W_OK: i32 = 2;
        const F_OK: i32 = 0;

        if mask == F_OK {
            reply.ok_or_enoent(self.inodes.contains(ino));
            return;
        }
        if mask & W_OK != 0 {
            reply.error(libc::EACCES);
            return;
        }
        if self.inodes.contains(ino) {
            reply.ok();
        } else {
            reply.error(libc::ENOENT);
        }
    }
}

trait ReplyEmptyExt {
    fn ok_or_enoent(self, exists: bool);
}

impl ReplyEmptyExt for ReplyEmpty {
    fn ok_or_enoent(self, exists: bool) {
        if exists {
            self.ok();
        } else {
            self.error(libc::ENOENT);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VfsResult;
    use crate::vfs::{File, FileInfo};
    use std::collections::BTreeMap;

    struct MemFile {
        data: Vec<u8>,
        cursor: usize,
    }

    impl File for MemFile {
        fn size(&self) -> i64 {
            self.data.len() as i64
        }
        fn is_dir(&self) -> bool {
            false
        }
        fn stat(&self) -> VfsResult<FileInfo> {
            Ok(FileInfo::new_file("mem", self.data.len() as u64))
        }
        fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
            let n = self.read_at(buf, self.cursor as i64)?;
            self.cursor += n;
            Ok(n)
        }
        fn read_at(&mut self, buf: &mut [u8], off: i64) -> VfsResult<usize> {
            let off = off as usize;
            if off >= self.data.len() {
                return Ok(0);
            }
            let n = std::cmp::min(buf.len(), self.data.len() - off);
            buf[..n].copy_from_slice(&self.data[off..off + n]);
            Ok(n)
        }
    }

    struct FixtureFs {
        files: BTreeMap<String, Vec<u8>>,
    }

    impl VfsTree for FixtureFs {
        fn open(&self, path: &VPath) -> VfsResult<Box<dyn File>> {
            let data = self
                .files
                .get(path.as_str())
                .cloned()
                .ok_or_else(|| crate::error::VfsError::not_exist(path.as_str()))?;
            Ok(Box::new(MemFile { data, cursor: 0 }))
        }

        fn stat(&self, path: &VPath) -> VfsResult<FileInfo> {
            if path.is_root() {
                return Ok(FileInfo::new_dir("/"));
            }
            if let Some(data) = self.files.get(path.as_str()) {
                return Ok(FileInfo::new_file(path.name(), data.len() as u64));
            }
            Err(crate::error::VfsError::not_exist(path.as_str()))
        }

        fn read_dir(&self, path: &VPath) -> VfsResult<Vec<FileInfo>> {
            Ok(crate::vfs::synthesize_read_dir(
                self.files.iter().map(|(p, d)| (p.as_str(), d.len() as u64)),
                path,
            ))
        }
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().unwrap()
    }

    #[test]
    fn inode_allocation_is_idempotent_across_lookup_like_calls() {
        let fs = VfsFuse::new(
            Arc::new(FixtureFs {
                files: BTreeMap::from([("/movie.mkv".to_string(), vec![1, 2, 3])]),
            }),
            Arc::new(Metrics::new()),
            runtime().handle().clone(),
        );
        let ino1 = fs.inodes.ensure_inode(&VPath::clean("/movie.mkv"));
        let ino2 = fs.inodes.ensure_inode(&VPath::clean("/movie.mkv"));
        assert_eq!(ino1, ino2);
    }

    #[test]
    fn path_for_root_resolves_to_root_path() {
        let fs = VfsFuse::new(
            Arc::new(FixtureFs { files: BTreeMap::new() }),
            Arc::new(Metrics::new()),
            runtime().handle().clone(),
        );
        assert_eq!(fs.path_for(1), Some(VPath::root()));
    }

    #[test]
    fn mount_options_are_read_only() {
        let options = VfsFuse::mount_options();
        assert!(options.contains(&fuser::MountOption::RO));
        assert!(options.contains(&fuser::MountOption::AutoUnmount));
    }
}
