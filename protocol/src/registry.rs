//! # Ring Sources
//!
//! Where decoy keys come from. Settlement asks a [`RingSource`] for a
//! window of decoys, adds the buyer, and signs over the result.
//!
//! The default, [`RegistryRingSource`], reads the ledger's `ring` record:
//! skip the sentinel at index 0, take the next `window` keys in order. That
//! is deterministic on purpose, so every run over the same registry draws
//! the same decoys and the buyer's presence cannot be inferred from which
//! decoys were picked.
//!
//! [`StaticRingSource`] hands out a fixed list. Handy for tests, and for
//! deployments that enroll ring members somewhere other than the ledger.

use crate::config::RING_REGISTRY_KEY;
use crate::crypto::CurvePublicKey;
use crate::ledger::{get_json, Ledger};
use crate::records::RingRegistry;
use crate::settlement::{SettlementError, SettlementResult};

pub trait RingSource: Send + Sync {
    /// Up to `window` decoy keys.
    fn decoys(&self, ledger: &dyn Ledger, window: usize) -> SettlementResult<Vec<CurvePublicKey>>;
}

/// Reads decoys from the ledger's ring registry record.
#[derive(Clone, Copy, Debug, Default)]
pub struct RegistryRingSource;

impl RingSource for RegistryRingSource {
    fn decoys(&self, ledger: &dyn Ledger, window: usize) -> SettlementResult<Vec<CurvePublicKey>> {
        let registry: RingRegistry = get_json(ledger, RING_REGISTRY_KEY)?
            .ok_or_else(|| SettlementError::not_found("ring registry", RING_REGISTRY_KEY))?;
        registry
            .pubs
            .iter()
            .skip(1)
            .take(window)
            .map(|hex_key| CurvePublicKey::from_hex(hex_key).map_err(SettlementError::from))
            .collect()
    }
}

/// A fixed decoy list.
#[derive(Clone, Debug, Default)]
pub struct StaticRingSource {
    keys: Vec<CurvePublicKey>,
}

impl StaticRingSource {
    pub fn new(keys: Vec<CurvePublicKey>) -> Self {
        Self { keys }
    }
}

impl RingSource for StaticRingSource {
    fn decoys(&self, _ledger: &dyn Ledger, window: usize) -> SettlementResult<Vec<CurvePublicKey>> {
        Ok(self.keys.iter().take(window).copied().collect())
    }
}

/// Decoys plus the signer, deduplicated and sorted by encoding.
///
/// Sorting means the signer's slot says nothing about who the signer is.
pub fn assemble_ring(mut decoys: Vec<CurvePublicKey>, signer: CurvePublicKey) -> Vec<CurvePublicKey> {
    decoys.push(signer);
    decoys.sort();
    decoys.dedup();
    decoys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CurveKeypair;
    use crate::ledger::{put_json, MemoryLedger};

    fn keys(n: usize) -> Vec<CurvePublicKey> {
        (0..n).map(|_| CurveKeypair::generate().public_key()).collect()
    }

    #[test]
    fn registry_skips_sentinel_and_takes_window() {
        let ledger = MemoryLedger::new();
        let ks = keys(7);
        put_json(&ledger, RING_REGISTRY_KEY, &RingRegistry::from_keys(&ks)).unwrap();
        let decoys = RegistryRingSource.decoys(&ledger, 5).unwrap();
        assert_eq!(decoys, ks[..5].to_vec());
    }

    #[test]
    fn short_registry_returns_what_it_has() {
        let ledger = MemoryLedger::new();
        let ks = keys(2);
        put_json(&ledger, RING_REGISTRY_KEY, &RingRegistry::from_keys(&ks)).unwrap();
        assert_eq!(RegistryRingSource.decoys(&ledger, 5).unwrap().len(), 2);
    }

    #[test]
    fn missing_registry_is_not_found() {
        let ledger = MemoryLedger::new();
        let err = RegistryRingSource.decoys(&ledger, 5).unwrap_err();
        assert!(matches!(err, SettlementError::NotFound { .. }));
    }

    #[test]
    fn garbage_registry_entry_is_decode_error() {
        let ledger = MemoryLedger::new();
        let reg = RingRegistry {
            pubs: vec![String::new(), "zz".into()],
        };
        put_json(&ledger, RING_REGISTRY_KEY, &reg).unwrap();
        assert!(matches!(
            RegistryRingSource.decoys(&ledger, 5),
            Err(SettlementError::DecodeError(_))
        ));
    }

    #[test]
    fn assembled_ring_is_sorted_and_contains_signer_once() {
        let ks = keys(4);
        let signer = ks[2];
        let ring = assemble_ring(ks.clone(), signer);
        assert_eq!(ring.len(), 4);
        assert!(ring.windows(2).all(|w| w[0] < w[1]));

        let outsider = CurveKeypair::generate().public_key();
        let ring = assemble_ring(ks, outsider);
        assert_eq!(ring.len(), 5);
        assert!(ring.contains(&outsider));
    }
}
