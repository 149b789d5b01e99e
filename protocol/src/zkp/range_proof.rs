//! # Range Proofs
//!
//! Thin adapter over `bulletproofs::RangeProof`. The inner-product argument
//! is the library's business; ours is making sure the generators, the bit
//! width and the transcript line up between prover and verifier.
//!
//! ## Generator context
//!
//! A [`RangeProofContext`] is built for exactly one bit width and handed to
//! every prove/verify call. There is no global "current width". A bundle
//! also records the width it was proved at, and verification refuses a
//! bundle whose width disagrees with the context, instead of checking the
//! wrong statement and calling it a day.
//!
//! ## Wire format
//!
//! ```text
//! bits (1) ‖ commitment V (32) ‖ bulletproof bytes
//! ```

use bulletproofs::{BulletproofGens, PedersenGens, RangeProof};
use curve25519_dalek::scalar::Scalar;
use merlin::Transcript;
use std::fmt;

use super::commitment::Commitment;
use super::{ZkpError, ZkpResult};
use crate::config::{POINT_LENGTH, RANGE_PROOF_LABEL, SUPPORTED_RANGE_BITS};

/// Generators for one range-proof width.
#[derive(Clone)]
pub struct RangeProofContext {
    bits: usize,
    bp_gens: BulletproofGens,
    pc_gens: PedersenGens,
}

impl RangeProofContext {
    pub fn new(bits: usize) -> ZkpResult<Self> {
        if !SUPPORTED_RANGE_BITS.contains(&bits) {
            return Err(ZkpError::UnsupportedBits(bits));
        }
        Ok(Self {
            bits,
            bp_gens: BulletproofGens::new(bits, 1),
            pc_gens: PedersenGens::default(),
        })
    }

    pub fn bits(&self) -> usize {
        self.bits
    }

    pub fn pedersen(&self) -> &PedersenGens {
        &self.pc_gens
    }

    fn transcript(&self, bind: &[u8]) -> Transcript {
        let mut t = Transcript::new(RANGE_PROOF_LABEL);
        t.append_u64(b"bits", self.bits as u64);
        t.append_message(b"bind", bind);
        t
    }
}

impl fmt::Debug for RangeProofContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeProofContext")
            .field("bits", &self.bits)
            .finish()
    }
}

/// A range proof together with the commitment it speaks about.
#[derive(Clone)]
pub struct RangeProofBundle {
    pub bits: usize,
    pub commitment: Commitment,
    pub proof: RangeProof,
}

impl RangeProofBundle {
    pub fn to_bytes(&self) -> Vec<u8> {
        let proof = self.proof.to_bytes();
        let mut out = Vec::with_capacity(1 + POINT_LENGTH + proof.len());
        // Widths are at most 64, so they fit in one byte.
        out.push(self.bits as u8);
        out.extend_from_slice(self.commitment.as_bytes());
        out.extend_from_slice(&proof);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> ZkpResult<Self> {
        if bytes.len() <= 1 + POINT_LENGTH {
            return Err(ZkpError::Decode(format!(
                "range proof bundle too short: {} bytes",
                bytes.len()
            )));
        }
        let bits = bytes[0] as usize;
        if !SUPPORTED_RANGE_BITS.contains(&bits) {
            return Err(ZkpError::UnsupportedBits(bits));
        }
        let commitment = Commitment::from_slice(&bytes[1..1 + POINT_LENGTH])?;
        let proof = RangeProof::from_bytes(&bytes[1 + POINT_LENGTH..])
            .map_err(|e| ZkpError::Decode(format!("range proof: {e}")))?;
        Ok(Self {
            bits,
            commitment,
            proof,
        })
    }
}

impl fmt::Debug for RangeProofBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RangeProofBundle(bits={}, V={:?})", self.bits, self.commitment)
    }
}

/// Prove `value ∈ [0, 2^bits)` for the commitment `value·G + blinding·H`.
///
/// `bind` is folded into the transcript; the verifier must pass the same
/// bytes. Settlement binds every proof to its order number so a proof
/// cannot be lifted from one order into another.
pub fn prove_range(
    ctx: &RangeProofContext,
    value: u64,
    blinding: &Scalar,
    bind: &[u8],
) -> ZkpResult<RangeProofBundle> {
    if ctx.bits < 64 && value >> ctx.bits != 0 {
        return Err(ZkpError::ValueOutOfRange { bits: ctx.bits });
    }
    let mut transcript = ctx.transcript(bind);
    let (proof, commitment) = RangeProof::prove_single(
        &ctx.bp_gens,
        &ctx.pc_gens,
        &mut transcript,
        value,
        blinding,
        ctx.bits,
    )
    .map_err(|e| ZkpError::ProofGeneration(e.to_string()))?;

    Ok(RangeProofBundle {
        bits: ctx.bits,
        commitment: Commitment::from_compressed(commitment),
        proof,
    })
}

/// Verify a bundle against the context's width and the same `bind` bytes.
pub fn verify_range(ctx: &RangeProofContext, bundle: &RangeProofBundle, bind: &[u8]) -> ZkpResult<()> {
    if bundle.bits != ctx.bits {
        return Err(ZkpError::RangeProofInvalid(format!(
            "proof is {} bits, context expects {}",
            bundle.bits, ctx.bits
        )));
    }
    let mut transcript = ctx.transcript(bind);
    bundle
        .proof
        .verify_single(
            &ctx.bp_gens,
            &ctx.pc_gens,
            &mut transcript,
            &bundle.commitment.compressed(),
            ctx.bits,
        )
        .map_err(|e| ZkpError::RangeProofInvalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zkp::commitment::commit_with;
    use rand::rngs::OsRng;

    #[test]
    fn prove_and_verify() {
        let ctx = RangeProofContext::new(32).unwrap();
        let r = Scalar::random(&mut OsRng);
        let bundle = prove_range(&ctx, 19, &r, b"order-1").unwrap();
        assert!(verify_range(&ctx, &bundle, b"order-1").is_ok());
        // The bundle commits with the shared Pedersen generators.
        assert_eq!(bundle.commitment, commit_with(ctx.pedersen(), 19, &r));
    }

    #[test]
    fn out_of_range_value_refused() {
        let ctx = RangeProofContext::new(8).unwrap();
        let r = Scalar::random(&mut OsRng);
        assert_eq!(
            prove_range(&ctx, 256, &r, b"").unwrap_err(),
            ZkpError::ValueOutOfRange { bits: 8 }
        );
        assert!(prove_range(&ctx, 255, &r, b"").is_ok());
    }

    #[test]
    fn width_mismatch_rejected() {
        let narrow = RangeProofContext::new(16).unwrap();
        let wide = RangeProofContext::new(64).unwrap();
        let r = Scalar::random(&mut OsRng);
        let bundle = prove_range(&narrow, 5, &r, b"").unwrap();
        assert!(matches!(
            verify_range(&wide, &bundle, b""),
            Err(ZkpError::RangeProofInvalid(_))
        ));
    }

    #[test]
    fn different_binding_rejected() {
        let ctx = RangeProofContext::new(16).unwrap();
        let r = Scalar::random(&mut OsRng);
        let bundle = prove_range(&ctx, 5, &r, b"order-1").unwrap();
        assert!(verify_range(&ctx, &bundle, b"order-2").is_err());
    }

    #[test]
    fn swapped_commitment_rejected() {
        let ctx = RangeProofContext::new(16).unwrap();
        let r = Scalar::random(&mut OsRng);
        let mut bundle = prove_range(&ctx, 5, &r, b"").unwrap();
        bundle.commitment = commit_with(ctx.pedersen(), 6, &r);
        assert!(verify_range(&ctx, &bundle, b"").is_err());
    }

    #[test]
    fn bytes_roundtrip_then_verify() {
        let ctx = RangeProofContext::new(32).unwrap();
        let r = Scalar::random(&mut OsRng);
        let bytes = prove_range(&ctx, 1000, &r, b"x").unwrap().to_bytes();
        assert_eq!(bytes[0], 32);
        let decoded = RangeProofBundle::from_bytes(&bytes).unwrap();
        assert!(verify_range(&ctx, &decoded, b"x").is_ok());
    }

    #[test]
    fn tampered_proof_bytes_fail() {
        let ctx = RangeProofContext::new(16).unwrap();
        let r = Scalar::random(&mut OsRng);
        let bytes = prove_range(&ctx, 77, &r, b"").unwrap().to_bytes();
        for idx in [1usize, 20, 40, 100, bytes.len() - 1] {
            let mut tampered = bytes.clone();
            tampered[idx] ^= 0x02;
            let ok = RangeProofBundle::from_bytes(&tampered)
                .and_then(|b| verify_range(&ctx, &b, b""))
                .is_ok();
            assert!(!ok, "flip at byte {idx} went unnoticed");
        }
    }

    #[test]
    fn unsupported_width() {
        assert_eq!(
            RangeProofContext::new(12).unwrap_err(),
            ZkpError::UnsupportedBits(12)
        );
    }
}
