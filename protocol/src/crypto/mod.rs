//! # Cryptographic Primitives for umbra
//!
//! Everything that touches a curve point lives here. The settlement
//! protocol never does group arithmetic itself; it asks this module.
//!
//! - **keys** — Ristretto255 cipher/ring keys and Ed25519 signing keys.
//! - **elgamal** — additively homomorphic balances with bounded decryption.
//! - **ring** — linkable ring signatures.
//! - **sealed** — anonymous public-key boxes (DH + AES-256-GCM).
//! - **hash** — the three hash functions we allow ourselves.
//!
//! ## A note on "rolling your own crypto"
//!
//! The group, the hashes, the AEAD and Ed25519 are audited crates. The two
//! constructions on top (exponential ElGamal and the linkable ring) are
//! textbook and small enough to read in one sitting. Please keep them that
//! way.

pub mod elgamal;
pub mod error;
pub mod hash;
pub mod keys;
pub mod ring;
pub mod sealed;

pub use elgamal::{Ciphertext, DiscreteLogTable, HomomorphicCipher};
pub use error::{CryptoError, CryptoResult};
pub use hash::{derive_address, order_number, sha256};
pub use keys::{CurveKeypair, CurvePublicKey, Signature, SigningKeypair, SigningPublicKey};
pub use ring::{linkable, LinkableRingSigner, LinkableRingVerifier, RingSignature};
pub use sealed::{open, seal};
