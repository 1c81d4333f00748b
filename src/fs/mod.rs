pub mod filesystem;
pub mod inode_entry;
pub mod inode_manager;
pub mod macros;

pub use macros::{
    fuse_error, fuse_log, fuse_ok, reply_ino_not_found, reply_no_permission, reply_not_directory,
    reply_not_file,
};
