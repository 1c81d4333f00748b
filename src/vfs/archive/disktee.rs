//! A sequential-to-random-access adapter, grounded on the original system's
//! `DiskTeeReader`: mirrors every byte read from a forward-only source into
//! a private temporary file, so `read_at` can be served from the temp file
//! once enough bytes have been "teed" through.

use std::fs::File as StdFile;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

use crate::error::{VfsError, VfsResult};

struct Inner {
    source: Box<dyn Read + Send>,
    temp: StdFile,
    /// Bytes mirrored into `temp` so far.
    teed: u64,
}

/// Wraps a forward-only reader, spilling consumed bytes to a temp file so
/// later `read_at` calls can seek freely within what has already been read.
pub struct DiskTeeReader {
    inner: Mutex<Inner>,
}

impl DiskTeeReader {
    pub fn new(source: Box<dyn Read + Send>) -> VfsResult<Self> {
        let temp = tempfile::tempfile()?;
        Ok(Self {
            inner: Mutex::new(Inner {
                source,
                temp,
                teed: 0,
            }),
        })
    }

    /// Advances the tee until at least `target` bytes have been mirrored to
    /// disk, or the source is exhausted.
    fn advance_to(&self, inner: &mut Inner, target: u64) -> VfsResult<()> {
        let mut buf = [0u8; 64 * 1024];
        while inner.teed < target {
            let want = std::cmp::min(buf.len() as u64, target - inner.teed) as usize;
            let n = inner.source.read(&mut buf[..want])?;
            if n == 0 {
                break;
            }
            inner.temp.write_all(&buf[..n])?;
            inner.teed += n as u64;
        }
        Ok(())
    }

    pub fn read_at(&self, buf: &mut [u8], off: u64) -> VfsResult<usize> {
        let mut inner = self.inner.lock().unwrap();
        let target = off + buf.len() as u64;
        if target > inner.teed {
            self.advance_to(&mut inner, target)?;
        }
        if off >= inner.teed {
            return Ok(0);
        }
        let n = std::cmp::min(buf.len() as u64, inner.teed - off) as usize;
        inner.temp.seek(SeekFrom::Start(off))?;
        inner.temp.read_exact(&mut buf[..n]).map_err(VfsError::from)?;
        Ok(n)
    }

    /// Sequential read, advancing the tee directly (does not require a
    /// round trip through the temp file for the common append-only case).
    pub fn read(&self, buf: &mut [u8]) -> VfsResult<usize> {
        let mut inner = self.inner.lock().unwrap();
        let n = inner.source.read(buf)?;
        if n > 0 {
            inner.temp.seek(SeekFrom::Start(inner.teed))?;
            inner.temp.write_all(&buf[..n])?;
            inner.teed += n as u64;
        }
        Ok(n)
    }
}
