use crate::vfs::VPath;

/// One allocated inode: the virtual path it names and its parent inode.
/// Kind (file/dir/symlink) is never cached here — it's re-derived from the
/// backing [`crate::vfs::Filesystem`] on every call, since exclusion and
/// archive contents can change without a remount.
#[derive(Debug, Clone)]
pub struct InodeEntry {
    pub ino: u64,
    pub path: VPath,
    pub parent: u64,
}

impl InodeEntry {
    pub fn root() -> Self {
        Self {
            ino: 1,
            path: VPath::root(),
            parent: 1,
        }
    }
}
