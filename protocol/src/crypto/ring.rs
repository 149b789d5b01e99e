//! # Linkable Ring Signatures
//!
//! A ring signature says "one of these `n` keys signed this" and nothing
//! more. The linkable flavour adds a tag `Q = d·R`, where `R` is the sum of
//! every key in the ring. Sign twice over the same ring with the same key
//! and you get the same `Q`, so two signatures can be tied to one hidden
//! signer without ever learning which one it was.
//!
//! ## The chain
//!
//! Each slot folds a Schnorr-style commitment pair into a hash chain:
//!
//! ```text
//! c' = s_i + c
//! v  = s_i·G + c'·P_i
//! w  = s_i·R + c'·Q
//! c  ← H(ring, Q, msg, v, w)
//! ```
//!
//! The signer starts the chain at its own slot with `v = k·G`, `w = k·R`,
//! walks every other slot with random responses, and closes the loop with
//!
//! ```text
//! s_π = (k − c·d) · (d + 1)⁻¹
//! ```
//!
//! which makes slot π reproduce `k·G` and `k·R` exactly. The verifier runs
//! the full loop from `c_0` and accepts iff it lands back on `c_0`.
//!
//! ### Why it holds up
//!
//! Closing the loop at some slot `i` needs `v = (s + s·x_i + c·x_i)·G` for a
//! `v` that was hashed *before* `s` was chosen, i.e. knowing `x_i`. The `w`
//! leg forces the same scalar against `R` and `Q`: the only consistent
//! choice is `Q = x_i·R`. A forger who could pick `Q` freely would have to
//! break the discrete log of one of the ring keys.
//!
//! This is the one and only chain variant in the codebase. Sign and verify
//! share [`challenge`] and [`step`]. If you add a second variant, add a
//! second signature type too.
//!
//! ## Wire format
//!
//! `Q (32) ‖ c_0 (32) ‖ s_0 … s_{n−1} (32 each)`: `32·(n+2)` bytes.

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::{Identity, IsIdentity};
use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};
use std::fmt;

use super::error::{CryptoError, CryptoResult};
use super::hash::hash_to_scalar;
use super::keys::{point_from_bytes, scalar_from_bytes, CurveKeypair, CurvePublicKey};
use crate::config::{MIN_RING_SIZE, POINT_LENGTH, RING_CHALLENGE_DOMAIN, SCALAR_LENGTH};

// ---------------------------------------------------------------------------
// Ring context
// ---------------------------------------------------------------------------

/// A validated ring: decompressed keys, their sum, and the byte image that
/// goes into every challenge.
struct Ring {
    points: Vec<RistrettoPoint>,
    sum: RistrettoPoint,
    encoded: Vec<u8>,
}

impl Ring {
    fn new(keys: &[CurvePublicKey]) -> CryptoResult<Self> {
        if keys.len() < MIN_RING_SIZE {
            return Err(CryptoError::RingTooSmall {
                size: keys.len(),
                min: MIN_RING_SIZE,
            });
        }
        let points = keys
            .iter()
            .map(CurvePublicKey::to_point)
            .collect::<CryptoResult<Vec<_>>>()?;
        let sum = points
            .iter()
            .fold(RistrettoPoint::identity(), |acc, p| acc + p);
        if sum.is_identity() {
            return Err(CryptoError::IdentityPoint("ring sum"));
        }
        let encoded = keys.iter().flat_map(|k| k.as_bytes().to_vec()).collect();
        Ok(Self {
            points,
            sum,
            encoded,
        })
    }

    fn len(&self) -> usize {
        self.points.len()
    }
}

fn challenge(
    ring: &Ring,
    tag: &[u8; 32],
    msg: &[u8],
    v: &RistrettoPoint,
    w: &RistrettoPoint,
) -> Scalar {
    hash_to_scalar(
        RING_CHALLENGE_DOMAIN,
        &[
            &ring.encoded,
            tag,
            msg,
            v.compress().as_bytes(),
            w.compress().as_bytes(),
        ],
    )
}

/// One link of the chain at slot `i`.
fn step(
    ring: &Ring,
    i: usize,
    q: &RistrettoPoint,
    tag: &[u8; 32],
    msg: &[u8],
    s: &Scalar,
    c: &Scalar,
) -> Scalar {
    let folded = s + c;
    let v = RistrettoPoint::mul_base(s) + folded * ring.points[i];
    let w = s * ring.sum + folded * q;
    challenge(ring, tag, msg, &v, &w)
}

// ---------------------------------------------------------------------------
// RingSignature
// ---------------------------------------------------------------------------

/// A linkable ring signature.
#[derive(Clone, PartialEq, Eq)]
pub struct RingSignature {
    tag: [u8; POINT_LENGTH],
    c0: Scalar,
    responses: Vec<Scalar>,
}

impl RingSignature {
    /// Expected encoded length for a ring of `n` keys.
    pub fn encoded_len(n: usize) -> usize {
        POINT_LENGTH + SCALAR_LENGTH * (n + 1)
    }

    /// The linking tag `Q`, compressed.
    pub fn linking_tag(&self) -> &[u8; POINT_LENGTH] {
        &self.tag
    }

    pub fn ring_size(&self) -> usize {
        self.responses.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::encoded_len(self.responses.len()));
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(self.c0.as_bytes());
        for s in &self.responses {
            out.extend_from_slice(s.as_bytes());
        }
        out
    }

    /// Decode a signature made over a ring of `ring_size` keys.
    pub fn from_bytes(bytes: &[u8], ring_size: usize) -> CryptoResult<Self> {
        let expected = Self::encoded_len(ring_size);
        if bytes.len() != expected {
            return Err(CryptoError::SignatureLength {
                expected,
                got: bytes.len(),
            });
        }
        let mut tag = [0u8; POINT_LENGTH];
        tag.copy_from_slice(&bytes[..POINT_LENGTH]);
        let mut chunks = bytes[POINT_LENGTH..].chunks_exact(SCALAR_LENGTH);
        let c0 = match chunks.next() {
            Some(chunk) => scalar_from_bytes(chunk)?,
            None => {
                return Err(CryptoError::SignatureLength {
                    expected,
                    got: bytes.len(),
                })
            }
        };
        let responses = chunks
            .map(scalar_from_bytes)
            .collect::<CryptoResult<Vec<_>>>()?;
        Ok(Self { tag, c0, responses })
    }
}

impl fmt::Debug for RingSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RingSignature(n={}, tag={})",
            self.responses.len(),
            &hex::encode(self.tag)[..16]
        )
    }
}

/// Two signatures come from the same hidden signer iff their tags match.
///
/// Only meaningful for signatures over the same ring: the tag is `d·R`,
/// and `R` changes with the ring.
pub fn linkable(a: &RingSignature, b: &RingSignature) -> bool {
    a.tag == b.tag
}

// ---------------------------------------------------------------------------
// Signer
// ---------------------------------------------------------------------------

/// Produces ring signatures for one keypair over one fixed ring.
pub struct LinkableRingSigner<'a> {
    keypair: &'a CurveKeypair,
    ring: Ring,
    index: usize,
}

impl<'a> LinkableRingSigner<'a> {
    pub fn new(keypair: &'a CurveKeypair, ring: &[CurvePublicKey]) -> CryptoResult<Self> {
        let ring_ctx = Ring::new(ring)?;
        let me = keypair.public_key();
        let index = ring
            .iter()
            .position(|k| *k == me)
            .ok_or(CryptoError::SignerNotInRing)?;
        Ok(Self {
            keypair,
            ring: ring_ctx,
            index,
        })
    }

    pub fn sign(&self, msg: &[u8]) -> CryptoResult<RingSignature> {
        self.sign_with(msg, &mut OsRng)
    }

    pub fn sign_with<R: RngCore + CryptoRng>(
        &self,
        msg: &[u8],
        rng: &mut R,
    ) -> CryptoResult<RingSignature> {
        let n = self.ring.len();
        let d = self.keypair.secret();
        let d_plus_one = d + Scalar::ONE;
        if d_plus_one == Scalar::ZERO {
            return Err(CryptoError::DegenerateKey);
        }

        let q = d * self.ring.sum;
        let tag = q.compress().to_bytes();

        let k = Scalar::random(rng);
        let mut responses = vec![Scalar::ZERO; n];
        let mut c = challenge(
            &self.ring,
            &tag,
            msg,
            &RistrettoPoint::mul_base(&k),
            &(k * self.ring.sum),
        );

        let mut c0 = None;
        let mut i = (self.index + 1) % n;
        while i != self.index {
            if i == 0 {
                c0 = Some(c);
            }
            let s = Scalar::random(rng);
            c = step(&self.ring, i, &q, &tag, msg, &s, &c);
            responses[i] = s;
            i = (i + 1) % n;
        }
        // Signer at slot 0: the chain value arriving here is c_0.
        let c0 = c0.unwrap_or(c);

        responses[self.index] = (k - c * d) * d_plus_one.invert();

        Ok(RingSignature { tag, c0, responses })
    }
}

// ---------------------------------------------------------------------------
// Verifier
// ---------------------------------------------------------------------------

/// Verifies signatures over one fixed ring.
pub struct LinkableRingVerifier {
    ring: Ring,
}

impl LinkableRingVerifier {
    pub fn new(ring: &[CurvePublicKey]) -> CryptoResult<Self> {
        Ok(Self {
            ring: Ring::new(ring)?,
        })
    }

    pub fn ring_size(&self) -> usize {
        self.ring.len()
    }

    pub fn verify(&self, msg: &[u8], sig: &RingSignature) -> CryptoResult<()> {
        let n = self.ring.len();
        if sig.responses.len() != n {
            return Err(CryptoError::SignatureLength {
                expected: RingSignature::encoded_len(n),
                got: RingSignature::encoded_len(sig.responses.len()),
            });
        }
        let q = point_from_bytes(&sig.tag)?;
        if q.is_identity() {
            return Err(CryptoError::IdentityPoint("linking tag"));
        }

        let mut c = sig.c0;
        for (i, s) in sig.responses.iter().enumerate() {
            c = step(&self.ring, i, &q, &sig.tag, msg, s, &c);
        }
        if c == sig.c0 {
            Ok(())
        } else {
            Err(CryptoError::RingSignatureInvalid)
        }
    }

    /// Decode then verify.
    pub fn verify_bytes(&self, msg: &[u8], bytes: &[u8]) -> CryptoResult<RingSignature> {
        let sig = RingSignature::from_bytes(bytes, self.ring.len())?;
        self.verify(msg, &sig)?;
        Ok(sig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_of(n: usize) -> (Vec<CurveKeypair>, Vec<CurvePublicKey>) {
        let kps: Vec<CurveKeypair> = (0..n).map(|_| CurveKeypair::generate()).collect();
        let pubs = kps.iter().map(|k| k.public_key()).collect();
        (kps, pubs)
    }

    #[test]
    fn sign_verify_every_slot() {
        let (kps, pubs) = ring_of(4);
        let verifier = LinkableRingVerifier::new(&pubs).unwrap();
        for kp in &kps {
            let sig = LinkableRingSigner::new(kp, &pubs)
                .unwrap()
                .sign(b"Enc_A_M || Enc_B_M || Enc_A_B")
                .unwrap();
            assert!(verifier.verify(b"Enc_A_M || Enc_B_M || Enc_A_B", &sig).is_ok());
        }
    }

    #[test]
    fn minimum_ring_of_two() {
        let (kps, pubs) = ring_of(2);
        let verifier = LinkableRingVerifier::new(&pubs).unwrap();
        for kp in &kps {
            let sig = LinkableRingSigner::new(kp, &pubs).unwrap().sign(b"m").unwrap();
            verifier.verify(b"m", &sig).unwrap();
        }
    }

    #[test]
    fn wrong_message_rejected() {
        let (kps, pubs) = ring_of(3);
        let sig = LinkableRingSigner::new(&kps[1], &pubs).unwrap().sign(b"pay 20").unwrap();
        let verifier = LinkableRingVerifier::new(&pubs).unwrap();
        assert_eq!(
            verifier.verify(b"pay 21", &sig).unwrap_err(),
            CryptoError::RingSignatureInvalid
        );
    }

    #[test]
    fn wrong_ring_rejected() {
        let (kps, pubs) = ring_of(3);
        let sig = LinkableRingSigner::new(&kps[0], &pubs).unwrap().sign(b"m").unwrap();
        let (_, other) = ring_of(3);
        let verifier = LinkableRingVerifier::new(&other).unwrap();
        assert!(verifier.verify(b"m", &sig).is_err());
    }

    #[test]
    fn same_signer_links_different_signers_do_not() {
        let (kps, pubs) = ring_of(5);
        let a1 = LinkableRingSigner::new(&kps[2], &pubs).unwrap().sign(b"one").unwrap();
        let a2 = LinkableRingSigner::new(&kps[2], &pubs).unwrap().sign(b"two").unwrap();
        let b = LinkableRingSigner::new(&kps[3], &pubs).unwrap().sign(b"one").unwrap();
        assert!(linkable(&a1, &a2));
        assert!(!linkable(&a1, &b));
    }

    #[test]
    fn ring_too_small() {
        let (kps, pubs) = ring_of(1);
        assert!(matches!(
            LinkableRingSigner::new(&kps[0], &pubs),
            Err(CryptoError::RingTooSmall { size: 1, min: 2 })
        ));
        assert!(LinkableRingVerifier::new(&pubs).is_err());
    }

    #[test]
    fn outsider_cannot_sign() {
        let (_, pubs) = ring_of(3);
        let outsider = CurveKeypair::generate();
        assert!(matches!(
            LinkableRingSigner::new(&outsider, &pubs),
            Err(CryptoError::SignerNotInRing)
        ));
    }

    #[test]
    fn bytes_roundtrip_and_length_check() {
        let (kps, pubs) = ring_of(3);
        let sig = LinkableRingSigner::new(&kps[0], &pubs).unwrap().sign(b"m").unwrap();
        let bytes = sig.to_bytes();
        assert_eq!(bytes.len(), 32 * 5);
        let verifier = LinkableRingVerifier::new(&pubs).unwrap();
        assert!(verifier.verify_bytes(b"m", &bytes).is_ok());
        assert!(matches!(
            verifier.verify_bytes(b"m", &bytes[..bytes.len() - 1]),
            Err(CryptoError::SignatureLength { .. })
        ));
    }

    #[test]
    fn any_flipped_byte_fails() {
        let (kps, pubs) = ring_of(3);
        let sig = LinkableRingSigner::new(&kps[1], &pubs).unwrap().sign(b"m").unwrap();
        let bytes = sig.to_bytes();
        let verifier = LinkableRingVerifier::new(&pubs).unwrap();
        for idx in (0..bytes.len()).step_by(7) {
            let mut tampered = bytes.clone();
            tampered[idx] ^= 0x04;
            assert!(
                verifier.verify_bytes(b"m", &tampered).is_err(),
                "flip at byte {idx} went unnoticed"
            );
        }
    }
}
