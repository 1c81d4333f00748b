//! Minimal bencode reader for the one thing the resolver needs from a
//! `.torrent` file placed under the host data directory: the SHA-1
//! info-hash, computed over the exact raw bytes of the `info` dictionary
//! per BEP 3. Nothing else in the file is interpreted; every other value
//! is only skipped over on the way to finding that key.

use sha1::{Digest, Sha1};

use crate::error::{VfsError, VfsResult};

/// Computes the 20-byte info-hash of a raw `.torrent` file.
pub fn info_hash(bytes: &[u8]) -> VfsResult<[u8; 20]> {
    let span = info_dict_span(bytes)?;
    let mut hasher = Sha1::new();
    hasher.update(&bytes[span]);
    let digest = hasher.finalize();
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    Ok(out)
}

fn malformed(reason: &str) -> VfsError {
    VfsError::backend("", "bencode.parse", reason.to_string())
}

fn info_dict_span(bytes: &[u8]) -> VfsResult<std::ops::Range<usize>> {
    if bytes.first() != Some(&b'd') {
        return Err(malformed("torrent file does not start with a dictionary"));
    }
    let mut pos = 1;
    loop {
        match bytes.get(pos) {
            Some(b'e') => return Err(malformed("no top-level \"info\" key")),
            Some(_) => {}
            None => return Err(malformed("unterminated top-level dictionary")),
        }
        let (key, key_end) = read_string(bytes, pos)?;
        let value_start = key_end;
        let value_end = skip_value(bytes, value_start)?;
        if key == b"info" {
            return Ok(value_start..value_end);
        }
        pos = value_end;
    }
}

fn read_string(bytes: &[u8], pos: usize) -> VfsResult<(&[u8], usize)> {
    let colon = bytes[pos..]
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| malformed("malformed bencode string length"))?;
    let len: usize = std::str::from_utf8(&bytes[pos..pos + colon])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| malformed("non-numeric bencode string length"))?;
    let start = pos + colon + 1;
    let end = start
        .checked_add(len)
        .ok_or_else(|| malformed("bencode string length overflow"))?;
    if end > bytes.len() {
        return Err(malformed("truncated bencode string"));
    }
    Ok((&bytes[start..end], end))
}

fn skip_value(bytes: &[u8], pos: usize) -> VfsResult<usize> {
    match bytes.get(pos) {
        Some(b'i') => {
            let offset = bytes[pos..]
                .iter()
                .position(|&b| b == b'e')
                .ok_or_else(|| malformed("unterminated bencode integer"))?;
            Ok(pos + offset + 1)
        }
        Some(b'l') => {
            let mut cur = pos + 1;
            while bytes.get(cur) != Some(&b'e') {
                if cur >= bytes.len() {
                    return Err(malformed("unterminated bencode list"));
                }
                cur = skip_value(bytes, cur)?;
            }
            Ok(cur + 1)
        }
        Some(b'd') => {
            let mut cur = pos + 1;
            while bytes.get(cur) != Some(&b'e') {
                if cur >= bytes.len() {
                    return Err(malformed("unterminated bencode dictionary"));
                }
                let (_, key_end) = read_string(bytes, cur)?;
                cur = skip_value(bytes, key_end)?;
            }
            Ok(cur + 1)
        }
        Some(c) if c.is_ascii_digit() => {
            let (_, end) = read_string(bytes, pos)?;
            Ok(end)
        }
        _ => Err(malformed("unexpected bencode token")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_torrent(extra_top_level: &str) -> Vec<u8> {
        format!(
            "d{extra_top_level}4:infod6:lengthi1024e4:name8:file.binee",
        )
        .into_bytes()
    }

    #[test]
    fn extracts_info_hash_from_minimal_torrent() {
        let bytes = sample_torrent("");
        let hash = info_hash(&bytes).unwrap();
        assert_eq!(hash.len(), 20);
    }

    #[test]
    fn hash_is_stable_across_unrelated_leading_keys() {
        let without_tracker = sample_torrent("");
        let with_tracker = sample_torrent("8:announce9:udp://tr/");
        assert_eq!(
            info_hash(&without_tracker).unwrap(),
            info_hash(&with_tracker).unwrap(),
            "info-hash must depend only on the info dict's bytes"
        );
    }

    #[test]
    fn rejects_non_dictionary_input() {
        assert!(info_hash(b"not bencode").is_err());
    }

    #[test]
    fn rejects_dictionary_missing_info_key() {
        let bytes = b"d8:announce9:udp://tr/e".to_vec();
        assert!(info_hash(&bytes).is_err());
    }
}
