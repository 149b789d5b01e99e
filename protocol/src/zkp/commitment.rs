//! # Pedersen Commitments over Ristretto255
//!
//! ```text
//! C = v·G + r·H
//! ```
//!
//! `G` and `H` come from [`PedersenGens::default`]: the Ristretto basepoint
//! and a hash-derived point with no known discrete log relative to it.
//! Those are the same generators the range proofs use, which is what lets
//! a range proof's commitment be compared to a price commitment at all.
//!
//! An [`Opening`] is the witness `(v, r)`. Openings are secrets: they are
//! only ever moved between parties inside sealed boxes.

use bulletproofs::PedersenGens;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::{ZkpError, ZkpResult};
use crate::config::{POINT_LENGTH, SCALAR_LENGTH};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A compressed Pedersen commitment.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Commitment {
    bytes: [u8; POINT_LENGTH],
}

/// The witness behind a [`Commitment`].
#[derive(Clone, PartialEq, Eq)]
pub struct Opening {
    pub value: u64,
    pub blinding: Scalar,
}

// ---------------------------------------------------------------------------
// Commitment
// ---------------------------------------------------------------------------

impl Commitment {
    pub fn from_point(point: &RistrettoPoint) -> Self {
        Self {
            bytes: point.compress().to_bytes(),
        }
    }

    pub fn from_compressed(compressed: CompressedRistretto) -> Self {
        Self {
            bytes: compressed.to_bytes(),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> ZkpResult<Self> {
        let bytes: [u8; POINT_LENGTH] = bytes.try_into().map_err(|_| {
            ZkpError::Decode(format!(
                "commitment: expected {POINT_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; POINT_LENGTH] {
        &self.bytes
    }

    pub fn compressed(&self) -> CompressedRistretto {
        CompressedRistretto(self.bytes)
    }

    pub fn to_point(&self) -> ZkpResult<RistrettoPoint> {
        self.compressed().decompress().ok_or(ZkpError::InvalidPoint)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn from_hex(s: &str) -> ZkpResult<Self> {
        Self::from_slice(&hex::decode(s)?)
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", &self.to_hex()[..16])
    }
}

impl Serialize for Commitment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Commitment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Opening
// ---------------------------------------------------------------------------

impl Opening {
    /// Encoded length: `value (u64 LE) ‖ blinding`.
    pub const LENGTH: usize = 8 + SCALAR_LENGTH;

    pub fn to_bytes(&self) -> [u8; Self::LENGTH] {
        let mut out = [0u8; Self::LENGTH];
        out[..8].copy_from_slice(&self.value.to_le_bytes());
        out[8..].copy_from_slice(self.blinding.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> ZkpResult<Self> {
        if bytes.len() != Self::LENGTH {
            return Err(ZkpError::Decode(format!(
                "opening: expected {} bytes, got {}",
                Self::LENGTH,
                bytes.len()
            )));
        }
        let mut value = [0u8; 8];
        value.copy_from_slice(&bytes[..8]);
        let mut blinding = [0u8; SCALAR_LENGTH];
        blinding.copy_from_slice(&bytes[8..]);
        let blinding = Option::<Scalar>::from(Scalar::from_canonical_bytes(blinding))
            .ok_or_else(|| ZkpError::Decode("opening: non-canonical blinding".to_string()))?;
        Ok(Self {
            value: u64::from_le_bytes(value),
            blinding,
        })
    }
}

impl fmt::Debug for Opening {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The value is as secret as the blinding. Neither gets printed.
        write!(f, "Opening(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Commit to `value` with a fresh blinding.
pub fn commit<R: RngCore + CryptoRng>(
    gens: &PedersenGens,
    value: u64,
    rng: &mut R,
) -> (Commitment, Opening) {
    let blinding = Scalar::random(rng);
    let commitment = commit_with(gens, value, &blinding);
    (commitment, Opening { value, blinding })
}

/// Commit to `value` with a caller-chosen blinding.
pub fn commit_with(gens: &PedersenGens, value: u64, blinding: &Scalar) -> Commitment {
    Commitment::from_point(&gens.commit(Scalar::from(value), *blinding))
}

/// Check that `opening` opens `commitment`.
pub fn verify_opening(
    gens: &PedersenGens,
    commitment: &Commitment,
    opening: &Opening,
) -> ZkpResult<()> {
    if commit_with(gens, opening.value, &opening.blinding) == *commitment {
        Ok(())
    } else {
        Err(ZkpError::OpeningMismatch)
    }
}
