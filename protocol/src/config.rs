//! # Protocol Configuration & Constants
//!
//! Every magic number in umbra lives here. If you're hardcoding a bit width
//! or a ledger key prefix somewhere else, you're doing it wrong and you owe
//! the team coffee.
//!
//! Most of these values are baked into records that already sit on a
//! ledger. Changing the ones marked *wire* after the first settlement is
//! somewhere between "migration project" and "career-ending".

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full version string of the settlement protocol.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Fingerprint folded into every transcript and hash domain (*wire*).
pub const PROTOCOL_FINGERPRINT: &str = "umbra-settlement-v1";

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Ristretto255 point encoding length. Compressed, canonical, 32 bytes.
pub const POINT_LENGTH: usize = 32;

/// Canonical scalar encoding length.
pub const SCALAR_LENGTH: usize = 32;

/// ElGamal ciphertext length: `C1 || C2`.
pub const CIPHERTEXT_LENGTH: usize = 2 * POINT_LENGTH;

/// Ed25519 signature length. Always 64 bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes. Twelve. Not 16. Not 8.
pub const AES_NONCE_LENGTH: usize = 12;

/// Hash domain for ring-signature challenges (*wire*).
pub const RING_CHALLENGE_DOMAIN: &[u8] = b"umbra.ring.challenge.v1";

/// Hash domain for sealed-box key derivation (*wire*).
pub const SEALED_BOX_DOMAIN: &[u8] = b"umbra.sealed.v1";

/// Transcript label for range proofs (*wire*).
pub const RANGE_PROOF_LABEL: &[u8] = b"umbra.range.v1";

/// Transcript label for the commitment-equality proof (*wire*).
pub const EQUALITY_PROOF_LABEL: &[u8] = b"umbra.commit-eq.v1";

/// BLAKE3 derive-key context for order numbers (*wire*).
pub const ORDER_NUMBER_CONTEXT: &str = "umbra 2026 order number v1";

// ---------------------------------------------------------------------------
// Amount Bounds
// ---------------------------------------------------------------------------

/// Default upper bound for decryptable amounts.
///
/// Decryption is a baby-step/giant-step search, so the bound is also the
/// difference between "a few milliseconds" and "see you next quarter".
/// 2^32 gives a 65,536-entry table.
pub const DEFAULT_MAX_AMOUNT: u64 = 1 << 32;

/// Hard ceiling for `max_amount`. A 2^40 bound needs a table of ~1M
/// points. Past that the table stops fitting in anybody's patience.
pub const MAX_SUPPORTED_AMOUNT: u64 = 1 << 40;

/// Bit width of the "price is positive" range proof (`RP_m`).
pub const DEFAULT_PRICE_BITS: usize = 32;

/// Bit width of the "buyer stays solvent" range proof (`RP_b`).
pub const DEFAULT_BALANCE_BITS: usize = 64;

/// Bit widths the range-proof backend accepts.
pub const SUPPORTED_RANGE_BITS: [usize; 4] = [8, 16, 32, 64];

// ---------------------------------------------------------------------------
// Ring Registry
// ---------------------------------------------------------------------------

/// Number of decoy keys drawn from the registry for every ring.
pub const DEFAULT_RING_WINDOW: usize = 5;

/// Smallest ring we are willing to sign over. A ring of one is just a
/// signature wearing a fake mustache.
pub const MIN_RING_SIZE: usize = 2;

/// Ledger key of the ring registry record (*wire*).
pub const RING_REGISTRY_KEY: &str = "ring";

// ---------------------------------------------------------------------------
// Ledger Object Types
// ---------------------------------------------------------------------------

/// Composite-key object type for wallets (*wire*).
pub const OBJECT_WALLET: &str = "wallet";

/// Composite-key object type for goods (*wire*).
pub const OBJECT_GOOD: &str = "good";

/// Composite-key object type for orders (*wire*).
pub const OBJECT_ORDER: &str = "order";

// ---------------------------------------------------------------------------
// Genesis
// ---------------------------------------------------------------------------

/// Demo goods seeded by `init_ledger`: `(id, price, amount)`.
pub const GENESIS_GOODS: [(&str, i64, i64); 2] = [("10000", 100, 20), ("10001", 50, 30)];

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Rejected configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_amount {0} exceeds supported ceiling {MAX_SUPPORTED_AMOUNT}")]
    AmountBoundTooLarge(u64),

    #[error("max_amount must be positive")]
    AmountBoundZero,

    #[error("unsupported range-proof width: {0} bits")]
    UnsupportedBits(usize),

    #[error("price proof of {bits} bits cannot cover prices up to {max_amount}")]
    PriceBitsTooNarrow { bits: usize, max_amount: u64 },

    #[error("balance proof of {bits} bits cannot cover balances up to {max_amount}")]
    BalanceBitsTooNarrow { bits: usize, max_amount: u64 },

    #[error("ring window must hold at least one decoy")]
    EmptyRingWindow,
}

/// `2^bits`, saturating at `u64::MAX` for the 64-bit width.
fn range_capacity(bits: usize) -> u64 {
    1u64.checked_shl(bits as u32).unwrap_or(u64::MAX)
}

/// Knobs a deployment may turn without touching the wire format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Largest amount `decrypt` will recover.
    pub max_amount: u64,
    /// Range-proof width for the price statement.
    pub price_bits: usize,
    /// Range-proof width for the post-trade buyer balance.
    pub balance_bits: usize,
    /// Decoys drawn from the registry per ring.
    pub ring_window: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_amount: DEFAULT_MAX_AMOUNT,
            price_bits: DEFAULT_PRICE_BITS,
            balance_bits: DEFAULT_BALANCE_BITS,
            ring_window: DEFAULT_RING_WINDOW,
        }
    }
}

impl ProtocolConfig {
    /// Check every field against what the primitives can actually do.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_amount == 0 {
            return Err(ConfigError::AmountBoundZero);
        }
        if self.max_amount > MAX_SUPPORTED_AMOUNT {
            return Err(ConfigError::AmountBoundTooLarge(self.max_amount));
        }
        for bits in [self.price_bits, self.balance_bits] {
            if !SUPPORTED_RANGE_BITS.contains(&bits) {
                return Err(ConfigError::UnsupportedBits(bits));
            }
        }
        // RP_m proves price - 1, which tops out at max_amount - 1.
        if range_capacity(self.price_bits) < self.max_amount {
            return Err(ConfigError::PriceBitsTooNarrow {
                bits: self.price_bits,
                max_amount: self.max_amount,
            });
        }
        // RP_b proves a post-trade balance, which must fit with room to spare.
        if range_capacity(self.balance_bits) <= self.max_amount {
            return Err(ConfigError::BalanceBitsTooNarrow {
                bits: self.balance_bits,
                max_amount: self.max_amount,
            });
        }
        if self.ring_window == 0 {
            return Err(ConfigError::EmptyRingWindow);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(ProtocolConfig::default().validate(), Ok(()));
    }

    #[test]
    fn oversized_amount_bound_rejected() {
        let cfg = ProtocolConfig {
            max_amount: MAX_SUPPORTED_AMOUNT + 1,
            ..Default::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::AmountBoundTooLarge(MAX_SUPPORTED_AMOUNT + 1))
        );
    }

    #[test]
    fn odd_bit_width_rejected() {
        let cfg = ProtocolConfig {
            price_bits: 12,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::UnsupportedBits(12)));
    }

    #[test]
    fn price_width_must_cover_amount_bound() {
        let cfg = ProtocolConfig {
            max_amount: 1 << 40,
            price_bits: 8,
            balance_bits: 64,
            ..Default::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::PriceBitsTooNarrow {
                bits: 8,
                max_amount: 1 << 40
            })
        );

        // Exactly 2^bits still fits: the proof is over price - 1.
        let edge = ProtocolConfig {
            max_amount: 1 << 8,
            price_bits: 8,
            ..Default::default()
        };
        assert_eq!(edge.validate(), Ok(()));
    }

    #[test]
    fn balance_width_must_cover_amount_bound() {
        let cfg = ProtocolConfig {
            max_amount: 1 << 16,
            price_bits: 16,
            balance_bits: 16,
            ..Default::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::BalanceBitsTooNarrow {
                bits: 16,
                max_amount: 1 << 16
            })
        );

        let ok = ProtocolConfig {
            balance_bits: 32,
            ..cfg
        };
        assert_eq!(ok.validate(), Ok(()));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: ProtocolConfig = serde_json::from_str(r#"{"max_amount": 1024}"#).unwrap();
        assert_eq!(cfg.max_amount, 1024);
        assert_eq!(cfg.price_bits, DEFAULT_PRICE_BITS);
        assert_eq!(cfg.ring_window, DEFAULT_RING_WINDOW);
    }

    #[test]
    fn test_range_widths_sanity() {
        // The price proof should never be wider than the balance proof.
        // If it is, somebody is selling a yacht for more than the GDP.
        assert!(DEFAULT_PRICE_BITS <= DEFAULT_BALANCE_BITS);
        assert!(SUPPORTED_RANGE_BITS.contains(&DEFAULT_PRICE_BITS));
        assert!(SUPPORTED_RANGE_BITS.contains(&DEFAULT_BALANCE_BITS));
    }

    #[test]
    fn test_lengths() {
        assert_eq!(CIPHERTEXT_LENGTH, 64);
        assert_eq!(SIGNATURE_LENGTH, 64);
        assert_eq!(AES_NONCE_LENGTH, 12);
    }
}
