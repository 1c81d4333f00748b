//! The external BT engine collaborator's trait boundary. Torrent FS blocks
//! on and reads through a `TorrentHandle`; the concrete HTTP-backed
//! adapter (grounded on the teacher's `api/` module) lives in [`client`].

pub mod bridge;
pub mod circuit_breaker;
pub mod client;
pub mod torrent_file;
pub mod types;

pub use bridge::EngineHandle;
pub use client::EngineClient;
pub use types::{TorrentFileInfo, TorrentSummary};

use std::sync::Arc;
use std::time::Duration;

use crate::error::VfsResult;

/// The trait boundary a concrete BT engine adapter implements. Pre-info
/// torrents (hash known, files unknown) are represented by `files()`
/// blocking until the info dictionary arrives.
pub trait TorrentHandle: Send + Sync {
    fn info_hash(&self) -> [u8; 20];

    fn display_name(&self) -> String;

    /// Blocks on "got-info" the first time it is called for a pre-info
    /// torrent; returns immediately once the file list is known.
    fn files(&self) -> VfsResult<Arc<Vec<TorrentFileInfo>>>;

    /// Reads up to `buf.len()` bytes starting at the given torrent-space
    /// (concatenated-file) offset, blocking on peer availability up to
    /// `deadline`. A return of `Ok(0)` before `buf` is exhausted means
    /// end-of-torrent, not an error.
    fn read_at(&self, buf: &mut [u8], off: u64, deadline: Duration) -> VfsResult<usize>;
}
