//! Storage engine implementation.

use super::{StorageConfig, Transaction};
use crate::error::Error;
use parking_lot::{Mutex, MutexGuard};
use sled::{Db, Tree};

/// Tree name for row records and index entries.
const DATA_TREE: &str = "data";

/// Tree name for metadata (row id sequences).
const META_TREE: &str = "meta";

/// Prefix for row id sequences in the meta tree.
const SEQUENCE_PREFIX: &[u8] = b"seq:";

/// The main storage engine wrapping sled.
pub struct StorageEngine {
    /// The underlying sled database.
    db: Db,

    /// Tree for rows and index entries.
    data_tree: Tree,

    /// Tree for metadata.
    meta_tree: Tree,

    /// Serializes commits of concurrent transactions.
    commit_lock: Mutex<()>,
}

impl StorageEngine {
    /// Open or create a storage engine with the given configuration.
    pub fn open(config: StorageConfig) -> Result<Self, Error> {
        let sled_config = config.to_sled_config();
        let db = sled_config.open()?;
        let data_tree = db.open_tree(DATA_TREE)?;
        let meta_tree = db.open_tree(META_TREE)?;

        Ok(Self {
            db,
            data_tree,
            meta_tree,
            commit_lock: Mutex::new(()),
        })
    }

    /// Check if the database was recovered from a previous run.
    pub fn was_recovered(&self) -> bool {
        self.db.was_recovered()
    }

    /// Begin a new transaction.
    pub fn begin(&self) -> Transaction<'_> {
        Transaction::new(self)
    }

    /// Read a committed value.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.data_tree.get(key)?.map(|v| v.to_vec()))
    }

    /// Scan committed entries under a prefix, in key order.
    pub fn scan_prefix(
        &self,
        prefix: &[u8],
    ) -> impl Iterator<Item = Result<(Vec<u8>, Vec<u8>), Error>> + '_ {
        self.data_tree
            .scan_prefix(prefix)
            .map(|result| {
                let (k, v) = result?;
                Ok((k.to_vec(), v.to_vec()))
            })
    }

    /// Allocate the next row id for a table.
    ///
    /// Sequences are not transactional: ids handed out to a rolled back
    /// transaction are never reused. The first id is 1.
    pub fn next_row_id(&self, table_id: u64) -> Result<u64, Error> {
        let seq_key = Self::sequence_key(table_id);
        let updated = self.meta_tree.update_and_fetch(&seq_key, |old| {
            let current = old.and_then(decode_u64).unwrap_or(0);
            Some((current + 1).to_be_bytes().to_vec())
        })?;
        updated
            .as_deref()
            .and_then(decode_u64)
            .ok_or(Error::InvalidKey)
    }

    /// Remove the row id sequence of a dropped table.
    pub fn drop_sequence(&self, table_id: u64) -> Result<(), Error> {
        self.meta_tree.remove(Self::sequence_key(table_id))?;
        Ok(())
    }

    /// Generate a new catalog object id.
    pub fn generate_id(&self) -> Result<u64, Error> {
        // sled ids start at 0; object id 0 is kept free.
        Ok(self.db.generate_id()? + 1)
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }

    /// Get database size in bytes.
    pub fn size_on_disk(&self) -> Result<u64, Error> {
        Ok(self.db.size_on_disk()?)
    }

    /// Get the underlying sled database (for opening new trees).
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Apply a batch of writes atomically.
    pub(crate) fn apply(&self, batch: sled::Batch) -> Result<(), Error> {
        self.data_tree.apply_batch(batch)?;
        Ok(())
    }

    /// Acquire the commit lock (for transactions).
    pub(crate) fn lock_commits(&self) -> MutexGuard<'_, ()> {
        self.commit_lock.lock()
    }

    fn sequence_key(table_id: u64) -> Vec<u8> {
        let mut seq_key = Vec::with_capacity(SEQUENCE_PREFIX.len() + 8);
        seq_key.extend_from_slice(SEQUENCE_PREFIX);
        seq_key.extend_from_slice(&table_id.to_be_bytes());
        seq_key
    }
}

fn decode_u64(bytes: &[u8]) -> Option<u64> {
    let buf: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::key;

    #[test]
    fn test_sequence_starts_at_one() {
        let engine = StorageEngine::open(StorageConfig::temporary()).unwrap();
        assert_eq!(engine.next_row_id(5).unwrap(), 1);
        assert_eq!(engine.next_row_id(5).unwrap(), 2);
        assert_eq!(engine.next_row_id(6).unwrap(), 1);
    }

    #[test]
    fn test_generate_id_never_zero() {
        let engine = StorageEngine::open(StorageConfig::temporary()).unwrap();
        let a = engine.generate_id().unwrap();
        let b = engine.generate_id().unwrap();
        assert!(a > 0);
        assert!(b > a);
    }

    #[test]
    fn test_drop_sequence_restarts() {
        let engine = StorageEngine::open(StorageConfig::temporary()).unwrap();
        engine.next_row_id(1).unwrap();
        engine.next_row_id(1).unwrap();
        engine.drop_sequence(1).unwrap();
        assert_eq!(engine.next_row_id(1).unwrap(), 1);
    }

    #[test]
    fn test_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::new(dir.path());

        {
            let engine = StorageEngine::open(config.clone()).unwrap();
            let mut tx = engine.begin();
            tx.put(key::row_key(1, 1), vec![1, 2, 3]);
            tx.commit().unwrap();
            engine.flush().unwrap();
        }

        {
            let engine = StorageEngine::open(config).unwrap();
            assert_eq!(engine.get(&key::row_key(1, 1)).unwrap(), Some(vec![1, 2, 3]));
        }
    }
}
