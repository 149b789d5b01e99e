//! # Ledger Collaborator
//!
//! The world state that settlement reads from and writes to. umbra does not
//! run consensus; it talks to whatever ledger it is given through the
//! [`Ledger`] trait and assumes that ledger serializes writers per key.
//!
//! ## Key layout
//!
//! Records of one type share a composite-key prefix so they can be range
//! scanned:
//!
//! ```text
//! \0wallet\0<address>\0
//! \0good\0<id>\0
//! \0order\0<orderNum>\0
//! ring                      (the registry, a plain key)
//! ```
//!
//! Keys compare lexicographically, and `\0` sorts before everything, so
//! `[\0type\0, \0type\x01)` covers exactly one object type.
//!
//! ## Atomicity
//!
//! Multi-record updates go through [`WriteBatch`] and [`Ledger::commit`].
//! A commit lands completely or not at all. Settlement never issues two
//! `put`s where one batch would do.

pub mod memory;
pub mod sled_store;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use memory::MemoryLedger;
pub use sled_store::SledLedger;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// ---------------------------------------------------------------------------
// WriteBatch
// ---------------------------------------------------------------------------

/// A set of writes applied atomically by [`Ledger::commit`].
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    puts: Vec<(String, Vec<u8>)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.puts.push((key.into(), value));
    }

    /// Serialize `record` as JSON and queue it.
    pub fn put_json<T: Serialize>(&mut self, key: impl Into<String>, record: &T) -> LedgerResult<()> {
        self.put(key, serde_json::to_vec(record)?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.puts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.puts.is_empty()
    }

    pub fn into_puts(self) -> Vec<(String, Vec<u8>)> {
        self.puts
    }
}

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

/// `\0type\0part1\0part2\0`.
pub fn composite_key(object_type: &str, parts: &[&str]) -> String {
    let mut key = String::with_capacity(2 + object_type.len() + parts.iter().map(|p| p.len() + 1).sum::<usize>());
    key.push('\0');
    key.push_str(object_type);
    key.push('\0');
    for part in parts {
        key.push_str(part);
        key.push('\0');
    }
    key
}

/// Half-open key range covering every composite key of `object_type`.
pub fn object_range(object_type: &str) -> (String, String) {
    (format!("\0{object_type}\0"), format!("\0{object_type}\u{1}"))
}

// ---------------------------------------------------------------------------
// Ledger trait
// ---------------------------------------------------------------------------

/// The world-state contract settlement is written against.
pub trait Ledger: Send + Sync {
    fn get(&self, key: &str) -> LedgerResult<Option<Vec<u8>>>;

    fn put(&self, key: &str, value: Vec<u8>) -> LedgerResult<()>;

    /// Every `(key, value)` with `start <= key < end`, in key order.
    fn range_query(&self, start: &str, end: &str) -> LedgerResult<Vec<(String, Vec<u8>)>>;

    /// Apply every write in `batch`, or none of them.
    fn commit(&self, batch: WriteBatch) -> LedgerResult<()>;

    /// Monotonic sequence number, unique for the lifetime of the ledger.
    fn next_sequence(&self) -> LedgerResult<u64>;

    fn composite_key(&self, object_type: &str, parts: &[&str]) -> String {
        composite_key(object_type, parts)
    }

    /// Records of `object_type` whose JSON field `field` equals `value`.
    ///
    /// The default scans the object-type range. A backend with secondary
    /// indexes should override it.
    fn query_by_field(
        &self,
        object_type: &str,
        field: &str,
        value: &str,
    ) -> LedgerResult<Vec<(String, Vec<u8>)>> {
        let (start, end) = object_range(object_type);
        let mut hits = Vec::new();
        for (key, bytes) in self.range_query(&start, &end)? {
            let record: serde_json::Value = serde_json::from_slice(&bytes)?;
            let matches = match record.get(field) {
                Some(serde_json::Value::String(s)) => s == value,
                Some(other) => other.to_string() == value,
                None => false,
            };
            if matches {
                hits.push((key, bytes));
            }
        }
        Ok(hits)
    }
}

/// Read and deserialize a JSON record.
pub fn get_json<L: Ledger + ?Sized, T: DeserializeOwned>(
    ledger: &L,
    key: &str,
) -> LedgerResult<Option<T>> {
    match ledger.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Serialize and write a JSON record.
pub fn put_json<L: Ledger + ?Sized, T: Serialize>(
    ledger: &L,
    key: &str,
    record: &T,
) -> LedgerResult<()> {
    ledger.put(key, serde_json::to_vec(record)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_key_layout() {
        assert_eq!(composite_key("wallet", &["abc"]), "\0wallet\0abc\0");
        assert_eq!(composite_key("order", &["a", "b"]), "\0order\0a\0b\0");
    }

    #[test]
    fn object_range_brackets_its_type_only() {
        let (start, end) = object_range("good");
        let inside = composite_key("good", &["10000"]);
        let other = composite_key("goods", &["10000"]);
        assert!(start.as_str() <= inside.as_str() && inside.as_str() < end.as_str());
        assert!(!(start.as_str() <= other.as_str() && other.as_str() < end.as_str()));
    }

    #[test]
    fn batch_collects_puts() {
        let mut batch = WriteBatch::new();
        assert!(batch.is_empty());
        batch.put("a", b"1".to_vec());
        batch.put_json("b", &serde_json::json!({"x": 1})).unwrap();
        assert_eq!(batch.len(), 2);
    }
}
