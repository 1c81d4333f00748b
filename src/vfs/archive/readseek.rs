//! Adapts the engine's `File` trait (positional `read_at`) into `Read +
//! Seek`, so archive-decoding crates that expect a standard seekable reader
//! can operate directly against any backend (host, torrent, nested
//! archive) without it being materialised to a real OS file first.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

use crate::vfs::File;

#[derive(Clone)]
pub struct FileReadSeek {
    inner: Arc<Mutex<Box<dyn File>>>,
    pos: u64,
    size: u64,
}

impl FileReadSeek {
    pub fn new(inner: Arc<Mutex<Box<dyn File>>>, size: u64) -> Self {
        Self { inner, pos: 0, size }
    }
}

impl Read for FileReadSeek {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut file = self.inner.lock().unwrap();
        let n = file
            .read_at(buf, self.pos as i64)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for FileReadSeek {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(p) => self.size as i64 + p,
            SeekFrom::Current(p) => self.pos as i64 + p,
        };
        if new_pos < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "negative seek"));
        }
        self.pos = new_pos as u64;
        Ok(self.pos)
    }
}
