//! # Commitment Equality
//!
//! Buyer and seller each commit to the price with their own blinding:
//!
//! ```text
//! A = v·G + r_A·H        B = v·G + r_B·H
//! ```
//!
//! If the values match, `A − B = (r_A − r_B)·H` has no `G` component. A
//! Schnorr proof of knowledge of `δ = r_A − r_B` with base `H` shows exactly
//! that. Anyone who can produce it for mismatched values has found
//! `log_G H`, and then we have bigger problems.
//!
//! ```text
//! prover:   t ←$,  T = t·H,  e = FS(A, B, T, ctx),  z = t + e·δ
//! verifier: z·H == T + e·(A − B)
//! ```
//!
//! Wire format: `T (32) ‖ z (32)`.

use bulletproofs::PedersenGens;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use merlin::Transcript;
use rand_core::{CryptoRng, RngCore};

use super::commitment::{Commitment, Opening};
use super::{ZkpError, ZkpResult};
use crate::config::{EQUALITY_PROOF_LABEL, POINT_LENGTH};

/// Proof that two commitments hide the same value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitmentEqualityProof {
    t: [u8; POINT_LENGTH],
    z: Scalar,
}

fn challenge(a: &Commitment, b: &Commitment, t: &[u8; 32], context: &[u8]) -> Scalar {
    let mut transcript = Transcript::new(EQUALITY_PROOF_LABEL);
    transcript.append_message(b"A", a.as_bytes());
    transcript.append_message(b"B", b.as_bytes());
    transcript.append_message(b"T", t);
    transcript.append_message(b"ctx", context);
    let mut wide = [0u8; 64];
    transcript.challenge_bytes(b"e", &mut wide);
    Scalar::from_bytes_mod_order_wide(&wide)
}

impl CommitmentEqualityProof {
    pub const LENGTH: usize = 2 * POINT_LENGTH;

    /// Prove `A` and `B` hide the same value. Needs both openings.
    pub fn prove<R: RngCore + CryptoRng>(
        gens: &PedersenGens,
        a: (&Commitment, &Opening),
        b: (&Commitment, &Opening),
        context: &[u8],
        rng: &mut R,
    ) -> ZkpResult<Self> {
        if a.1.value != b.1.value {
            return Err(ZkpError::EqualityInvalid);
        }
        let delta = a.1.blinding - b.1.blinding;
        let nonce = Scalar::random(rng);
        let t = (nonce * gens.B_blinding).compress().to_bytes();
        let e = challenge(a.0, b.0, &t, context);
        Ok(Self {
            t,
            z: nonce + e * delta,
        })
    }

    pub fn verify(
        &self,
        gens: &PedersenGens,
        a: &Commitment,
        b: &Commitment,
        context: &[u8],
    ) -> ZkpResult<()> {
        let t_point = Commitment::from_slice(&self.t)?.to_point()?;
        let diff: RistrettoPoint = a.to_point()? - b.to_point()?;
        let e = challenge(a, b, &self.t, context);
        if self.z * gens.B_blinding == t_point + e * diff {
            Ok(())
        } else {
            Err(ZkpError::EqualityInvalid)
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::LENGTH] {
        let mut out = [0u8; Self::LENGTH];
        out[..POINT_LENGTH].copy_from_slice(&self.t);
        out[POINT_LENGTH..].copy_from_slice(self.z.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> ZkpResult<Self> {
        if bytes.len() != Self::LENGTH {
            return Err(ZkpError::Decode(format!(
                "equality proof: expected {} bytes, got {}",
                Self::LENGTH,
                bytes.len()
            )));
        }
        let mut t = [0u8; POINT_LENGTH];
        t.copy_from_slice(&bytes[..POINT_LENGTH]);
        let mut z = [0u8; 32];
        z.copy_from_slice(&bytes[POINT_LENGTH..]);
        let z = Option::<Scalar>::from(Scalar::from_canonical_bytes(z))
            .ok_or_else(|| ZkpError::Decode("equality proof: non-canonical z".to_string()))?;
        Ok(Self { t, z })
    }
}
