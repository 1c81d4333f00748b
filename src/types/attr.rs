use fuser::FileAttr;

use crate::vfs::{fixed_mtime, FileInfo};

/// Converts a backend [`FileInfo`] into the FUSE attribute struct for the
/// given inode. Times are pinned to the epoch and mode bits come straight
/// from the backend (`0444`/`0555`), matching the read-only, reproducible
/// listings the composed filesystem promises.
pub fn file_attr(ino: u64, info: &FileInfo) -> FileAttr {
    let mtime = fixed_mtime();
    let uid = unsafe { libc::geteuid() };
    let gid = unsafe { libc::getegid() };
    FileAttr {
        ino,
        size: info.size,
        blocks: info.size.div_ceil(512),
        atime: mtime,
        mtime,
        ctime: mtime,
        crtime: mtime,
        kind: if info.is_dir {
            fuser::FileType::Directory
        } else {
            fuser::FileType::RegularFile
        },
        perm: info.mode as u16,
        nlink: if info.is_dir { 2 } else { 1 },
        uid,
        gid,
        rdev: 0,
        flags: 0,
        blksize: 512,
    }
}
