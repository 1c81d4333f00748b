//! Durable exclude-set repository: `info_hash_hex -> JSON array of paths`.
//! Backed by the same embedded `redb` database file as the piece
//! completion store (two named tables, one file), but opened
//! independently here so the repository has no dependency on storage.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::VfsResult;

const TABLE: TableDefinition<&str, &str> = TableDefinition::new("excluded-files");

pub struct MetaRepository {
    db: Database,
    lock: Mutex<()>,
}

impl MetaRepository {
    pub fn open(path: impl AsRef<Path>) -> VfsResult<Self> {
        let db = Database::create(path)?;
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(TABLE)?;
        }
        write_txn.commit()?;
        Ok(Self {
            db,
            lock: Mutex::new(()),
        })
    }

    /// The exclude set for `info_hash`. A missing key is an empty set, not
    /// an error.
    pub fn excluded(&self, info_hash: &[u8; 20]) -> VfsResult<HashSet<String>> {
        let key = hex::encode(info_hash);
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TABLE)?;
        match table.get(key.as_str())? {
            Some(v) => {
                let parsed: Vec<String> = serde_json::from_str(v.value())?;
                Ok(parsed.into_iter().collect())
            }
            None => Ok(HashSet::new()),
        }
    }

    /// Union-inserts `paths` into the exclude set for `info_hash` and
    /// persists the result. Monotonic: never removes a path already
    /// excluded. Single mutex serialises the read-modify-write.
    pub fn exclude(&self, info_hash: &[u8; 20], paths: &[&str]) -> VfsResult<()> {
        let _guard = self.lock.lock().unwrap();
        let mut current = self.excluded(info_hash)?;
        for p in paths {
            current.insert((*p).to_string());
        }
        let encoded: Vec<&String> = current.iter().collect();
        let json = serde_json::to_string(&encoded)?;
        let key = hex::encode(info_hash);

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TABLE)?;
            table.insert(key.as_str(), json.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
