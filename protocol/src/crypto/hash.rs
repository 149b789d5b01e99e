//! # Hashing Utilities
//!
//! Three hash functions, three jobs, no overlap:
//!
//! - **SHA-512** feeds `hash_to_scalar`. A 512-bit digest reduced mod ℓ is
//!   statistically indistinguishable from a uniform scalar, which is what
//!   Fiat–Shamir challenges need.
//! - **SHA-256** derives addresses and sealed-box keys. Boring, everywhere,
//!   and exactly 32 bytes, which happens to be an AES-256 key.
//! - **BLAKE3** in `derive_key` mode mints order numbers. Its context
//!   string gives us domain separation for free.
//!
//! If you need a fourth hash function, you probably need a second opinion.

use curve25519_dalek::scalar::Scalar;
use sha2::{Digest, Sha256, Sha512};

use super::keys::{CurvePublicKey, SigningPublicKey};
use crate::config::ORDER_NUMBER_CONTEXT;

/// SHA-256 over the concatenation of `parts`.
pub fn sha256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// SHA-256 of a single buffer.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    sha256_multi(&[data])
}

/// Hash a domain label and a list of parts to a scalar mod ℓ.
///
/// Each part is length-prefixed (u64 little-endian) so that
/// `["ab", "c"]` and `["a", "bc"]` never collide.
pub fn hash_to_scalar(domain: &[u8], parts: &[&[u8]]) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update((domain.len() as u64).to_le_bytes());
    hasher.update(domain);
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    Scalar::from_hash(hasher)
}

/// Domain-separated BLAKE3 over `parts`.
pub fn domain_separated_hash(context: &str, parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// A party's ledger address: `bs58(SHA-256(cipher_pub ‖ ed25519_pub))`.
///
/// Both keys go in, so swapping either one gives a different wallet.
pub fn derive_address(cipher: &CurvePublicKey, signing: &SigningPublicKey) -> String {
    bs58::encode(sha256_multi(&[cipher.as_bytes(), signing.as_bytes()])).into_string()
}

/// Order number for one negotiation.
///
/// `sequence` comes from the ledger, so two otherwise identical trades
/// (same buyer, seller, good, price) still get distinct numbers.
pub fn order_number(buyer: &str, seller: &str, good_id: &str, price: i64, sequence: u64) -> String {
    // Separators keep "ab"+"c" apart from "a"+"bc".
    let digest = domain_separated_hash(
        ORDER_NUMBER_CONTEXT,
        &[
            buyer.as_bytes(),
            &[0],
            seller.as_bytes(),
            &[0],
            good_id.as_bytes(),
            &[0],
            &price.to_be_bytes(),
            &sequence.to_be_bytes(),
        ],
    );
    hex::encode(digest)
}
