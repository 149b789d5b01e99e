//! # Sealed Boxes
//!
//! Anonymous public-key encryption to a Ristretto key: the sender is
//! nobody, the recipient is whoever holds `d` for `P = d·G`.
//!
//! Construction:
//!
//! 1. Draw an ephemeral scalar `r`, publish `E = r·G`.
//! 2. Shared point `S = r·P` (the recipient computes `d·E`).
//! 3. `key = SHA-256(domain ‖ S ‖ E ‖ P)`.
//! 4. AES-256-GCM with a random 96-bit nonce. `E ‖ P` ride along as AAD.
//!
//! Wire format: `E (32) ‖ nonce (12) ‖ ciphertext+tag`.
//!
//! Each box uses a fresh key, so the random-nonce birthday bound is
//! not a concern here. It would be a concern if somebody "optimized" the
//! ephemeral scalar into a constant. Don't.
//!
//! Two users: auditor escrow of party addresses, and the commitment-opening
//! hand-off between buyer and seller.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::IsIdentity;
use rand::rngs::OsRng;
use rand::RngCore;

use super::error::{CryptoError, CryptoResult};
use super::hash::sha256_multi;
use super::keys::{point_from_bytes, CurveKeypair, CurvePublicKey};
use crate::config::{AES_NONCE_LENGTH, POINT_LENGTH, SEALED_BOX_DOMAIN};

/// Smallest well-formed box: header plus a bare GCM tag.
const MIN_SEALED_LENGTH: usize = POINT_LENGTH + AES_NONCE_LENGTH + 16;

fn box_key(shared: &RistrettoPoint, ephemeral: &[u8; 32], recipient: &[u8; 32]) -> [u8; 32] {
    sha256_multi(&[
        SEALED_BOX_DOMAIN,
        shared.compress().as_bytes(),
        ephemeral,
        recipient,
    ])
}

/// Seal `plaintext` to `recipient`.
pub fn seal(recipient: &CurvePublicKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let point = recipient.to_point()?;
    let r = Scalar::random(&mut OsRng);
    let ephemeral = RistrettoPoint::mul_base(&r).compress().to_bytes();
    let key = box_key(&(r * point), &ephemeral, recipient.as_bytes());

    let mut aad = [0u8; 2 * POINT_LENGTH];
    aad[..POINT_LENGTH].copy_from_slice(&ephemeral);
    aad[POINT_LENGTH..].copy_from_slice(recipient.as_bytes());

    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::SealFailed)?;
    let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
    OsRng.fill_bytes(&mut nonce_bytes);
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|_| CryptoError::SealFailed)?;

    let mut out = Vec::with_capacity(POINT_LENGTH + AES_NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&ephemeral);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a box produced by [`seal`].
///
/// Wrong key, flipped bit, truncated tail: all of it is `OpenFailed`.
/// Which one it was is none of the caller's business.
pub fn open(recipient: &CurveKeypair, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
    if sealed.len() < MIN_SEALED_LENGTH {
        return Err(CryptoError::Decode(format!(
            "sealed box too short: {} bytes",
            sealed.len()
        )));
    }
    let (ephemeral, rest) = sealed.split_at(POINT_LENGTH);
    let (nonce_bytes, ciphertext) = rest.split_at(AES_NONCE_LENGTH);

    let eph_point = point_from_bytes(ephemeral)?;
    if eph_point.is_identity() {
        return Err(CryptoError::IdentityPoint("sealed box ephemeral key"));
    }
    let mut eph_arr = [0u8; POINT_LENGTH];
    eph_arr.copy_from_slice(ephemeral);
    let recipient_bytes = recipient.public_key();
    let key = box_key(
        &(recipient.secret() * eph_point),
        &eph_arr,
        recipient_bytes.as_bytes(),
    );

    let mut aad = [0u8; 2 * POINT_LENGTH];
    aad[..POINT_LENGTH].copy_from_slice(&eph_arr);
    aad[POINT_LENGTH..].copy_from_slice(recipient_bytes.as_bytes());

    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::OpenFailed)?;
    cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: &aad,
            },
        )
        .map_err(|_| CryptoError::OpenFailed)
}
