//! Piece-addressable storage backend: maps a torrent engine's piece-level
//! read/write requests onto per-file OS I/O, persists piece completion,
//! and reclaims bytes when a file is excluded.

pub mod completion;
pub mod segment;

use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

pub use completion::CompletionStore;
pub use segment::{Segment, SegmentLocator};

use crate::engine::TorrentFileInfo;
use crate::error::{VfsError, VfsResult};

/// Rejects `..`, drive-letter, and otherwise filesystem-escaping
/// components, returning the sanitised relative path.
fn sanitize_path(raw: &str) -> VfsResult<PathBuf> {
    let mut out = PathBuf::new();
    for comp in raw.split(['/', '\\']) {
        if comp.is_empty() || comp == "." {
            continue;
        }
        if comp == ".." {
            return Err(VfsError::invalid_argument(raw, "path escapes torrent root"));
        }
        if comp.contains(':') {
            return Err(VfsError::invalid_argument(
                raw,
                "drive-letter component not allowed",
            ));
        }
        out.push(comp);
    }
    Ok(out)
}

pub struct PieceStorage {
    base_dir: PathBuf,
    completion: CompletionStore,
}

impl PieceStorage {
    pub fn open(base_dir: impl Into<PathBuf>, completion_db_path: impl AsRef<Path>) -> VfsResult<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        let completion = CompletionStore::open(completion_db_path)?;
        Ok(Self { base_dir, completion })
    }

    fn backing_path(&self, torrent_name: &str, file_path: &str) -> VfsResult<PathBuf> {
        let torrent_dir = sanitize_path(torrent_name)?;
        let rel = sanitize_path(file_path)?;
        Ok(self.base_dir.join(torrent_dir).join(rel))
    }

    /// Creates zero-length backing files up front so callers can stat them
    /// immediately, per the component design's open-time materialisation.
    pub fn materialize_empty_files(&self, torrent_name: &str, files: &[TorrentFileInfo]) -> VfsResult<()> {
        for f in files.iter().filter(|f| f.length == 0) {
            let path = self.backing_path(torrent_name, &f.path)?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::File::create(&path)?;
        }
        Ok(())
    }

    /// Reads `buf.len()` bytes from torrent-space offset `off`. A
    /// non-existent or short backing file ends the read early (`EOF`, not
    /// an error) at that point; unexpected I/O errors propagate.
    pub fn read_at(&self, torrent_name: &str, files: &[TorrentFileInfo], off: u64, buf: &mut [u8]) -> VfsResult<usize> {
        let lengths: Vec<u64> = files.iter().map(|f| f.length).collect();
        let locator = SegmentLocator::new(lengths);
        let mut total = 0usize;
        for seg in locator.locate(off, buf.len() as u64) {
            let file_info = &files[seg.file_index];
            let path = self.backing_path(torrent_name, &file_info.path)?;
            let file = match std::fs::File::open(&path) {
                Ok(f) => f,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => break,
                Err(e) => return Err(e.into()),
            };
            let actual_len = file.metadata()?.len();
            if seg.file_offset >= actual_len {
                break;
            }
            let clamped = seg.len.min(actual_len - seg.file_offset) as usize;
            file.read_exact_at(&mut buf[total..total + clamped], seg.file_offset)?;
            total += clamped;
            if (clamped as u64) < seg.len {
                break;
            }
        }
        Ok(total)
    }

    /// Writes `buf` at torrent-space offset `off`, creating parent
    /// directories and backing files as needed. Aborts on the first error.
    pub fn write_at(&self, torrent_name: &str, files: &[TorrentFileInfo], off: u64, buf: &[u8]) -> VfsResult<usize> {
        let lengths: Vec<u64> = files.iter().map(|f| f.length).collect();
        let locator = SegmentLocator::new(lengths);
        let mut total = 0usize;
        for seg in locator.locate(off, buf.len() as u64) {
            let file_info = &files[seg.file_index];
            let path = self.backing_path(torrent_name, &file_info.path)?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .open(&path)?;
            let src = &buf[total..total + seg.len as usize];
            file.write_all_at(src, seg.file_offset)?;
            total += seg.len as usize;
        }
        Ok(total)
    }

    /// The raw, unverified completion flag for one piece.
    pub fn completion_flag(&self, info_hash: &[u8; 20], index: u32) -> VfsResult<bool> {
        self.completion.get(info_hash, index)
    }

    /// Reads the completion flag and, if set, verifies each backing file
    /// spanned by `[piece_offset, piece_offset+piece_len)` is long enough
    /// to cover its share. A mismatch clears the flag and reports `false`.
    pub fn verify_completion(
        &self,
        info_hash: &[u8; 20],
        index: u32,
        torrent_name: &str,
        files: &[TorrentFileInfo],
        piece_offset: u64,
        piece_len: u64,
    ) -> VfsResult<bool> {
        if !self.completion.get(info_hash, index)? {
            return Ok(false);
        }
        let lengths: Vec<u64> = files.iter().map(|f| f.length).collect();
        let locator = SegmentLocator::new(lengths);
        for seg in locator.locate(piece_offset, piece_len) {
            let file_info = &files[seg.file_index];
            let path = self.backing_path(torrent_name, &file_info.path)?;
            let actual = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            if actual < seg.file_offset + seg.len {
                self.completion.set(info_hash, index, false)?;
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn mark_complete(&self, info_hash: &[u8; 20], index: u32) -> VfsResult<()> {
        self.completion.set(info_hash, index, true)
    }

    pub fn mark_not_complete(&self, info_hash: &[u8; 20], index: u32) -> VfsResult<()> {
        self.completion.set(info_hash, index, false)
    }

    /// Clears completion for every piece the file occupies, then removes
    /// the backing file. The order matters: a crash between the two steps
    /// must never leave pieces marked complete with the bytes gone.
    pub fn delete_file(&self, info_hash: &[u8; 20], torrent_name: &str, file: &TorrentFileInfo) -> VfsResult<()> {
        for index in file.begin_piece..file.end_piece {
            self.completion.set(info_hash, index, false)?;
        }
        let path = self.backing_path(torrent_name, &file.path)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
