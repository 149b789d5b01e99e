//! In-process ledger. Tests, demos, and anything that doesn't need to
//! survive a restart.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{Ledger, LedgerResult, WriteBatch};

/// A `BTreeMap` world state behind a `parking_lot` lock.
///
/// Commits take the write lock once for the whole batch, so readers see
/// either none or all of it.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<BTreeMap<String, Vec<u8>>>,
    sequence: AtomicU64,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }
}

impl Ledger for MemoryLedger {
    fn get(&self, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        Ok(self.state.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> LedgerResult<()> {
        self.state.write().insert(key.to_string(), value);
        Ok(())
    }

    fn range_query(&self, start: &str, end: &str) -> LedgerResult<Vec<(String, Vec<u8>)>> {
        if start >= end {
            return Ok(Vec::new());
        }
        Ok(self
            .state
            .read()
            .range::<str, _>((Bound::Included(start), Bound::Excluded(end)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn commit(&self, batch: WriteBatch) -> LedgerResult<()> {
        let mut state = self.state.write();
        for (key, value) in batch.into_puts() {
            state.insert(key, value);
        }
        Ok(())
    }

    fn next_sequence(&self) -> LedgerResult<u64> {
        Ok(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }
}
