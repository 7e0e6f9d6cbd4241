//! Transaction support for atomic multi-key operations.

use std::collections::BTreeMap;

use super::{key, Record, StorageEngine};
use crate::error::{ConstraintError, Error};

/// A transaction over the data tree.
///
/// Writes are buffered in an ordered overlay and become visible to other
/// transactions only on commit, which applies them as one atomic batch.
/// Reads inside the transaction see its own uncommitted writes.
///
/// Unique keys checked against the overlay are claimed, and commit fails if
/// another transaction committed the same key in the meantime.
pub struct Transaction<'a> {
    engine: &'a StorageEngine,
    /// Pending writes: `Some(bytes)` for puts, `None` for removals.
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    /// Index prefixes that must hold no committed entry at commit, with the
    /// error raised if one does.
    claims: Vec<(Vec<u8>, ConstraintError)>,
}

impl<'a> Transaction<'a> {
    /// Create a new transaction.
    pub(crate) fn new(engine: &'a StorageEngine) -> Self {
        Self {
            engine,
            writes: BTreeMap::new(),
            claims: Vec::new(),
        }
    }

    /// The engine this transaction writes to.
    pub fn engine(&self) -> &'a StorageEngine {
        self.engine
    }

    /// Read a value, preferring uncommitted writes of this transaction.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        match self.writes.get(key) {
            Some(pending) => Ok(pending.clone()),
            None => self.engine.get(key),
        }
    }

    /// Queue a put.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> &mut Self {
        self.writes.insert(key, Some(value));
        self
    }

    /// Queue a removal.
    pub fn remove(&mut self, key: Vec<u8>) -> &mut Self {
        self.writes.insert(key, None);
        self
    }

    /// Scan entries under a prefix, merging committed state with this
    /// transaction's overlay. Results are in key order.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        for entry in self.engine.scan_prefix(prefix) {
            let (k, v) = entry?;
            merged.insert(k, v);
        }

        for (k, pending) in self
            .writes
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            match pending {
                Some(v) => {
                    merged.insert(k.clone(), v.clone());
                }
                None => {
                    merged.remove(k);
                }
            }
        }

        Ok(merged.into_iter().collect())
    }

    /// Read a row record.
    pub fn get_record(&self, table_id: u64, row_id: u64) -> Result<Option<Record>, Error> {
        match self.get(&key::row_key(table_id, row_id))? {
            Some(bytes) => Ok(Some(Record::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Queue a row record write.
    pub fn put_record(&mut self, table_id: u64, row_id: u64, record: &Record) -> Result<(), Error> {
        let bytes = record.to_bytes()?;
        self.put(key::row_key(table_id, row_id), bytes);
        Ok(())
    }

    /// Queue a row record removal.
    pub fn remove_record(&mut self, table_id: u64, row_id: u64) {
        self.remove(key::row_key(table_id, row_id));
    }

    /// All rows of a table in row id order.
    pub fn scan_records(&self, table_id: u64) -> Result<Vec<(u64, Record)>, Error> {
        self.scan_prefix(&key::table_prefix(table_id))?
            .into_iter()
            .map(|(k, v)| {
                let row_id = key::decode_row_id(&k).ok_or(Error::InvalidKey)?;
                Ok((row_id, Record::from_bytes(&v)?))
            })
            .collect()
    }

    /// Allocate the next row id for a table.
    pub fn next_row_id(&self, table_id: u64) -> Result<u64, Error> {
        self.engine.next_row_id(table_id)
    }

    /// Claim a unique index key. Only entries committed by others count
    /// against the claim; this transaction's own removals release them.
    pub fn claim_unique(&mut self, prefix: Vec<u8>, violation: ConstraintError) {
        self.claims.push((prefix, violation));
    }

    /// Number of pending writes.
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    /// Commit the transaction atomically.
    ///
    /// All writes succeed or none do. The overlay is cleared afterwards, so
    /// a later `rollback` is a no-op. Unique claims are rechecked under the
    /// commit lock; a lost claim fails the commit and nothing is written.
    pub fn commit(&mut self) -> Result<(), Error> {
        let writes = std::mem::take(&mut self.writes);
        let claims = std::mem::take(&mut self.claims);
        if writes.is_empty() {
            return Ok(());
        }

        let _guard = self.engine.lock_commits();
        for (prefix, violation) in claims {
            for entry in self.engine.scan_prefix(&prefix) {
                let (k, _) = entry?;
                if !matches!(writes.get(&k), Some(None)) {
                    return Err(violation.into());
                }
            }
        }

        let mut batch = sled::Batch::default();
        for (k, pending) in writes {
            match pending {
                Some(v) => batch.insert(k, v),
                None => batch.remove(k),
            }
        }
        self.engine.apply(batch)
    }

    /// Discard all pending writes.
    pub fn rollback(&mut self) {
        self.writes.clear();
        self.claims.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageConfig;
    use crate::value::Value;

    fn engine() -> StorageEngine {
        StorageEngine::open(StorageConfig::temporary()).unwrap()
    }

    #[test]
    fn test_read_your_writes() {
        let engine = engine();
        let mut tx = engine.begin();
        tx.put_record(1, 1, &Record::new(vec![Value::Int64(10)])).unwrap();

        let record = tx.get_record(1, 1).unwrap().unwrap();
        assert_eq!(record.values, vec![Value::Int64(10)]);

        // Not visible outside before commit
        assert!(engine.begin().get_record(1, 1).unwrap().is_none());
    }

    #[test]
    fn test_commit_makes_writes_visible() {
        let engine = engine();
        let mut tx = engine.begin();
        tx.put_record(1, 1, &Record::new(vec![Value::Int64(1)])).unwrap();
        tx.put_record(1, 2, &Record::new(vec![Value::Int64(2)])).unwrap();
        tx.commit().unwrap();
        assert_eq!(tx.pending_writes(), 0);

        let rows = engine.begin().scan_records(1).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, 1);
        assert_eq!(rows[1].0, 2);
    }

    #[test]
    fn test_rollback_discards() {
        let engine = engine();
        let mut tx = engine.begin();
        tx.put_record(1, 1, &Record::new(vec![Value::Null])).unwrap();
        tx.rollback();
        tx.commit().unwrap();

        assert!(engine.begin().scan_records(1).unwrap().is_empty());
    }

    #[test]
    fn test_rollback_after_commit_is_noop() {
        let engine = engine();
        let mut tx = engine.begin();
        tx.put_record(1, 1, &Record::new(vec![Value::Null])).unwrap();
        tx.commit().unwrap();
        tx.rollback();

        assert_eq!(engine.begin().scan_records(1).unwrap().len(), 1);
    }

    #[test]
    fn test_scan_merges_overlay() {
        let engine = engine();
        let mut setup = engine.begin();
        setup.put_record(4, 1, &Record::new(vec![Value::Int64(1)])).unwrap();
        setup.put_record(4, 2, &Record::new(vec![Value::Int64(2)])).unwrap();
        setup.commit().unwrap();

        let mut tx = engine.begin();
        tx.remove_record(4, 1);
        tx.put_record(4, 3, &Record::new(vec![Value::Int64(3)])).unwrap();
        // Different table, must not leak into the scan
        tx.put_record(5, 1, &Record::new(vec![Value::Int64(9)])).unwrap();

        let ids: Vec<u64> = tx.scan_records(4).unwrap().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    fn taken() -> ConstraintError {
        ConstraintError::UniqueViolation {
            constraint: "PK".into(),
            table: "S.T".into(),
            value: "1".into(),
        }
    }

    #[test]
    fn test_lost_unique_claim_fails_commit() {
        let engine = engine();
        let prefix = b"i-claim".to_vec();

        let mut first = engine.begin();
        let mut second = engine.begin();
        for (tx, row) in [(&mut first, 1u8), (&mut second, 2)] {
            tx.claim_unique(prefix.clone(), taken());
            tx.put([prefix.as_slice(), &[row][..]].concat(), Vec::new());
            tx.put_record(7, row as u64, &Record::new(vec![Value::Int64(1)])).unwrap();
        }

        first.commit().unwrap();
        let err = second.commit().unwrap_err();
        assert!(matches!(
            err,
            Error::ConstraintViolation(ConstraintError::UniqueViolation { .. })
        ));
        assert_eq!(engine.begin().scan_records(7).unwrap().len(), 1);
    }

    #[test]
    fn test_own_removal_releases_claim() {
        let engine = engine();
        let prefix = b"i-claim".to_vec();
        let mut setup = engine.begin();
        setup.put([prefix.as_slice(), &[1u8][..]].concat(), Vec::new());
        setup.commit().unwrap();

        let mut tx = engine.begin();
        tx.remove([prefix.as_slice(), &[1u8][..]].concat());
        tx.claim_unique(prefix.clone(), taken());
        tx.put([prefix.as_slice(), &[2u8][..]].concat(), Vec::new());
        tx.commit().unwrap();

        let keys: Vec<Vec<u8>> = engine.scan_prefix(&prefix).map(|e| e.unwrap().0).collect();
        assert_eq!(keys, vec![[prefix.as_slice(), &[2u8][..]].concat()]);
    }
}
