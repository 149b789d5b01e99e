//! # SledLedger — Persistent World State
//!
//! The on-disk ledger for a single operator node, built on sled. Everything
//! lives in one tree, `world_state`, keyed by the UTF-8 bytes of the ledger
//! key. One tree means one `apply_batch`, and one `apply_batch` is atomic,
//! which is the only property settlement actually cares about.
//!
//! Sequence numbers come from `Db::generate_id`, which is monotonic across
//! restarts. Order numbers are derived from them, so that matters.

use sled::{Batch, Db, Tree};
use std::path::Path;

use super::{Ledger, LedgerError, LedgerResult, WriteBatch};

const WORLD_STATE_TREE: &str = "world_state";

/// sled-backed [`Ledger`].
///
/// Cheap to clone; sled handles are reference counted and thread safe.
#[derive(Debug, Clone)]
pub struct SledLedger {
    db: Db,
    state: Tree,
}

impl SledLedger {
    /// Open or create a ledger at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> LedgerResult<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// A throwaway ledger that disappears on drop. For tests.
    pub fn open_temporary() -> LedgerResult<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> LedgerResult<Self> {
        let state = db.open_tree(WORLD_STATE_TREE)?;
        Ok(Self { db, state })
    }

    /// Force everything to disk.
    pub fn flush(&self) -> LedgerResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn utf8_key(raw: &[u8]) -> LedgerResult<String> {
    String::from_utf8(raw.to_vec())
        .map_err(|e| LedgerError::Serialization(format!("non-UTF-8 ledger key: {e}")))
}

impl Ledger for SledLedger {
    fn get(&self, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        Ok(self.state.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    fn put(&self, key: &str, value: Vec<u8>) -> LedgerResult<()> {
        self.state.insert(key.as_bytes(), value)?;
        Ok(())
    }

    fn range_query(&self, start: &str, end: &str) -> LedgerResult<Vec<(String, Vec<u8>)>> {
        if start >= end {
            return Ok(Vec::new());
        }
        self.state
            .range(start.as_bytes()..end.as_bytes())
            .map(|item| {
                let (k, v) = item?;
                Ok((utf8_key(&k)?, v.to_vec()))
            })
            .collect()
    }

    fn commit(&self, batch: WriteBatch) -> LedgerResult<()> {
        let mut sled_batch = Batch::default();
        for (key, value) in batch.into_puts() {
            sled_batch.insert(key.as_bytes(), value);
        }
        self.state.apply_batch(sled_batch)?;
        self.db.flush()?;
        Ok(())
    }

    fn next_sequence(&self) -> LedgerResult<u64> {
        Ok(self.db.generate_id()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{composite_key, object_range};

    #[test]
    fn put_get_temporary() {
        let ledger = SledLedger::open_temporary().unwrap();
        ledger.put("ring", b"[]".to_vec()).unwrap();
        assert_eq!(ledger.get("ring").unwrap().unwrap(), b"[]");
        assert!(ledger.get("nope").unwrap().is_none());
    }

    #[test]
    fn range_over_composite_keys() {
        let ledger = SledLedger::open_temporary().unwrap();
        for id in ["10000", "10001", "10002"] {
            ledger.put(&composite_key("good", &[id]), b"{}".to_vec()).unwrap();
        }
        ledger.put(&composite_key("wallet", &["x"]), b"{}".to_vec()).unwrap();
        let (start, end) = object_range("good");
        let rows = ledger.range_query(&start, &end).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].0, composite_key("good", &["10000"]));
    }

    #[test]
    fn batch_commit_and_sequence() {
        let ledger = SledLedger::open_temporary().unwrap();
        let mut batch = WriteBatch::new();
        batch.put("a", b"1".to_vec());
        batch.put("b", b"2".to_vec());
        ledger.commit(batch).unwrap();
        assert!(ledger.get("a").unwrap().is_some());
        assert!(ledger.get("b").unwrap().is_some());

        let s1 = ledger.next_sequence().unwrap();
        let s2 = ledger.next_sequence().unwrap();
        assert!(s2 > s1);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let ledger = SledLedger::open(dir.path()).unwrap();
            ledger.put("k", b"v".to_vec()).unwrap();
            ledger.flush().unwrap();
        }
        let ledger = SledLedger::open(dir.path()).unwrap();
        assert_eq!(ledger.get("k").unwrap().unwrap(), b"v");
    }
}
