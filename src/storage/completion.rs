//! Durable piece-completion store, keyed `info_hash(20) || index_be(4)`,
//! value one byte in `{0x00, 0xFF}`. Backed by `redb`, chosen for the same
//! reason the pack's `phrontizo-DebridMovieMapper` project pairs an
//! embedded KV store with an async HTTP/tracing stack for durable local
//! state.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::VfsResult;

const TABLE: TableDefinition<&[u8], u8> = TableDefinition::new("piece-completion");

pub struct CompletionStore {
    db: Database,
}

impl CompletionStore {
    pub fn open(path: impl AsRef<Path>) -> VfsResult<Self> {
        let db = Database::create(path)?;
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(TABLE)?;
        }
        write_txn.commit()?;
        Ok(Self { db })
    }

    fn key(info_hash: &[u8; 20], index: u32) -> Vec<u8> {
        let mut k = Vec::with_capacity(24);
        k.extend_from_slice(info_hash);
        k.extend_from_slice(&index.to_be_bytes());
        k
    }

    pub fn get(&self, info_hash: &[u8; 20], index: u32) -> VfsResult<bool> {
        let key = Self::key(info_hash, index);
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TABLE)?;
        Ok(table
            .get(key.as_slice())?
            .map(|v| v.value() == 0xFF)
            .unwrap_or(false))
    }

    /// Sets the completion flag. A value already matching `complete` is a
    /// no-op write (idempotent per the completion record's contract).
    pub fn set(&self, info_hash: &[u8; 20], index: u32, complete: bool) -> VfsResult<()> {
        let key = Self::key(info_hash, index);
        let value: u8 = if complete { 0xFF } else { 0x00 };
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TABLE)?;
            let current = table.get(key.as_slice())?.map(|v| v.value());
            if current != Some(value) {
                table.insert(key.as_slice(), value)?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (CompletionStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = CompletionStore::open(dir.path().join("completion.redb")).unwrap();
        (store, dir)
    }

    #[test]
    fn set_then_get_round_trips() {
        let (store, _dir) = store();
        let hash = [7u8; 20];
        assert!(!store.get(&hash, 3).unwrap());
        store.set(&hash, 3, true).unwrap();
        assert!(store.get(&hash, 3).unwrap());
    }

    #[test]
    fn set_is_idempotent() {
        let (store, _dir) = store();
        let hash = [1u8; 20];
        store.set(&hash, 0, true).unwrap();
        store.set(&hash, 0, true).unwrap();
        assert!(store.get(&hash, 0).unwrap());
    }

    #[test]
    fn reopen_after_restart_preserves_committed_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("completion.redb");
        {
            let store = CompletionStore::open(&path).unwrap();
            store.set(&[2u8; 20], 5, true).unwrap();
        }
        let reopened = CompletionStore::open(&path).unwrap();
        assert!(reopened.get(&[2u8; 20], 5).unwrap());
    }

    #[test]
    fn missing_key_reports_not_complete() {
        let (store, _dir) = store();
        assert!(!store.get(&[9u8; 20], 0).unwrap());
    }

    #[test]
    fn distinct_pieces_of_the_same_torrent_are_independent() {
        let (store, _dir) = store();
        let hash = [4u8; 20];
        store.set(&hash, 0, true).unwrap();
        assert!(store.get(&hash, 0).unwrap());
        assert!(!store.get(&hash, 1).unwrap());
    }
}
