//! # Key Management
//!
//! Every party in umbra owns two keypairs, and they do different jobs:
//!
//! - A **curve keypair** `(d, Q = d·G)` over Ristretto255. Balances are
//!   encrypted to `Q`, the ring registry is made of these keys, and the
//!   linkable ring signature is produced with `d`.
//! - A **signing keypair** (Ed25519). It authenticates the things a party
//!   says in the clear: the seller's confirmation and both price
//!   commitments.
//!
//! Keeping them apart means a ring signature can never be confused with a
//! plain signature, and the Ed25519 side gets to stay boring.
//!
//! ## Security considerations
//!
//! - Secret material never appears in `Debug` output.
//! - We use OS-level RNG (`OsRng`) for generation unless a caller hands us
//!   an RNG explicitly (tests, benches).
//! - Key bytes are never logged. If you add logging to this module,
//!   you will be asked to leave.

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::IsIdentity;
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};

use super::error::{CryptoError, CryptoResult};
use crate::config::{POINT_LENGTH, SCALAR_LENGTH, SIGNATURE_LENGTH};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fixed<const N: usize>(bytes: &[u8], what: &str) -> CryptoResult<[u8; N]> {
    bytes.try_into().map_err(|_| {
        CryptoError::Decode(format!("{what}: expected {N} bytes, got {}", bytes.len()))
    })
}

/// Parse a canonical scalar. Non-canonical encodings are a decode error,
/// not something we silently reduce.
pub(crate) fn scalar_from_bytes(bytes: &[u8]) -> CryptoResult<Scalar> {
    let arr = fixed::<SCALAR_LENGTH>(bytes, "scalar")?;
    Option::<Scalar>::from(Scalar::from_canonical_bytes(arr))
        .ok_or_else(|| CryptoError::Decode("non-canonical scalar".to_string()))
}

/// Decompress a 32-byte Ristretto encoding.
pub(crate) fn point_from_bytes(bytes: &[u8]) -> CryptoResult<RistrettoPoint> {
    let arr = fixed::<POINT_LENGTH>(bytes, "point")?;
    CompressedRistretto(arr)
        .decompress()
        .ok_or(CryptoError::InvalidPoint)
}

// ---------------------------------------------------------------------------
// CurvePublicKey
// ---------------------------------------------------------------------------

/// A Ristretto255 public key, stored in its canonical compressed form.
///
/// Construction only checks the length. Whether the bytes are actually a
/// group element is checked by [`to_point`](Self::to_point), at the moment
/// somebody tries to do math with it. That keeps "the ledger record is
/// garbled" and "the ledger record names a bogus key" as separate errors.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CurvePublicKey {
    bytes: [u8; POINT_LENGTH],
}

impl CurvePublicKey {
    /// Wrap an existing group element.
    pub fn from_point(point: &RistrettoPoint) -> Self {
        Self {
            bytes: point.compress().to_bytes(),
        }
    }

    /// Length-checked constructor from raw bytes.
    pub fn from_slice(slice: &[u8]) -> CryptoResult<Self> {
        Ok(Self {
            bytes: fixed(slice, "public key")?,
        })
    }

    pub fn as_bytes(&self) -> &[u8; POINT_LENGTH] {
        &self.bytes
    }

    /// Decompress into a usable, non-identity group element.
    pub fn to_point(&self) -> CryptoResult<RistrettoPoint> {
        let point = point_from_bytes(&self.bytes)?;
        if point.is_identity() {
            return Err(CryptoError::IdentityPoint("public key"));
        }
        Ok(point)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        Self::from_slice(&hex::decode(s)?)
    }
}

impl Hash for CurvePublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Display for CurvePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for CurvePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CurvePublicKey({})", &self.to_hex()[..16])
    }
}

impl Serialize for CurvePublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for CurvePublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// CurveKeypair
// ---------------------------------------------------------------------------

/// A Ristretto255 keypair `(d, Q = d·G)`.
///
/// Intentionally not `Serialize`. Exporting a secret should be a conscious
/// act, so use [`secret_bytes`](Self::secret_bytes) / [`from_secret_bytes`](Self::from_secret_bytes).
#[derive(Clone)]
pub struct CurveKeypair {
    secret: Scalar,
    point: RistrettoPoint,
    public: CurvePublicKey,
}

impl CurveKeypair {
    /// Fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self::generate_with(&mut OsRng)
    }

    /// Fresh keypair from a caller-supplied CSPRNG.
    pub fn generate_with<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        loop {
            let secret = Scalar::random(rng);
            // d = 0 has no public key worth the name; d = -1 breaks the
            // ring-signature close, which divides by (d + 1).
            if secret != Scalar::ZERO && secret + Scalar::ONE != Scalar::ZERO {
                return Self::from_scalar(secret);
            }
        }
    }

    fn from_scalar(secret: Scalar) -> Self {
        let point = RistrettoPoint::mul_base(&secret);
        Self {
            secret,
            point,
            public: CurvePublicKey::from_point(&point),
        }
    }

    /// Rebuild from a canonical 32-byte secret scalar.
    pub fn from_secret_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        let secret = scalar_from_bytes(bytes)?;
        if secret == Scalar::ZERO {
            return Err(CryptoError::DegenerateKey);
        }
        Ok(Self::from_scalar(secret))
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        Self::from_secret_bytes(&hex::decode(s)?)
    }

    /// Export the secret scalar. Handle like a loaded weapon.
    pub fn secret_bytes(&self) -> [u8; SCALAR_LENGTH] {
        self.secret.to_bytes()
    }

    pub fn public_key(&self) -> CurvePublicKey {
        self.public
    }

    /// The public key as a group element (already decompressed).
    pub fn public_point(&self) -> &RistrettoPoint {
        &self.point
    }

    pub(crate) fn secret(&self) -> &Scalar {
        &self.secret
    }
}

impl fmt::Debug for CurveKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CurveKeypair(pub={})", self.public.to_hex())
    }
}

impl PartialEq for CurveKeypair {
    fn eq(&self, other: &Self) -> bool {
        self.public == other.public
    }
}

impl Eq for CurveKeypair {}

// ---------------------------------------------------------------------------
// Ed25519: SigningKeypair / SigningPublicKey / Signature
// ---------------------------------------------------------------------------

/// Ed25519 keypair for plain, attributable signatures.
///
/// Deterministic signatures: same key, same message, same 64 bytes. No
/// nonce games at signing time.
pub struct SigningKeypair {
    signing_key: SigningKey,
}

/// The public half of a [`SigningKeypair`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SigningPublicKey {
    bytes: [u8; 32],
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature {
    bytes: [u8; SIGNATURE_LENGTH],
}

impl SigningKeypair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair from a 32-byte seed. Weak seed, weak key.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn from_hex(hex_str: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(hex_str)?;
        Ok(Self::from_seed(&fixed(&bytes, "signing seed")?))
    }

    pub fn public_key(&self) -> SigningPublicKey {
        SigningPublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature {
            bytes: self.signing_key.sign(message).to_bytes(),
        }
    }

    /// Export the 32-byte seed.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl Clone for SigningKeypair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.signing_key.to_bytes())
    }
}

impl fmt::Debug for SigningKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKeypair(pub={})", self.public_key().to_hex())
    }
}

impl SigningPublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Length-checked and point-checked constructor.
    pub fn try_from_slice(slice: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; 32] = fixed(slice, "verifying key")?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| CryptoError::InvalidPoint)?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Strict verification. Returns a typed error so callers can `?` it
    /// straight into their own error kinds.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> CryptoResult<()> {
        let key = VerifyingKey::from_bytes(&self.bytes).map_err(|_| CryptoError::InvalidPoint)?;
        let sig = DalekSignature::from_bytes(&signature.bytes);
        key.verify_strict(message, &sig)
            .map_err(|_| CryptoError::SignatureInvalid)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        Self::try_from_slice(&hex::decode(s)?)
    }
}

impl fmt::Debug for SigningPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningPublicKey({})", &self.to_hex()[..16])
    }
}

impl Serialize for SigningPublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SigningPublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl Signature {
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        Ok(Self {
            bytes: fixed(bytes, "signature")?,
        })
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.bytes
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = hex::encode(self.bytes);
        write!(f, "Signature({}...{})", &hex_str[..8], &hex_str[120..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn curve_keypair_public_matches_secret() {
        let kp = CurveKeypair::generate();
        let expected = RistrettoPoint::mul_base(kp.secret());
        assert_eq!(kp.public_key().to_point().unwrap(), expected);
    }

    #[test]
    fn curve_keypair_secret_roundtrip() {
        let kp = CurveKeypair::generate();
        let restored = CurveKeypair::from_secret_bytes(&kp.secret_bytes()).unwrap();
        assert_eq!(kp, restored);
        let from_hex = CurveKeypair::from_hex(&hex::encode(kp.secret_bytes())).unwrap();
        assert_eq!(kp, from_hex);
    }

    #[test]
    fn seeded_generation_is_deterministic() {
        let a = CurveKeypair::generate_with(&mut StdRng::seed_from_u64(7));
        let b = CurveKeypair::generate_with(&mut StdRng::seed_from_u64(7));
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn non_canonical_secret_rejected() {
        // 0xff..ff is far above the group order.
        let err = CurveKeypair::from_secret_bytes(&[0xff; 32]).unwrap_err();
        assert!(matches!(err, CryptoError::Decode(_)));
    }

    #[test]
    fn zero_secret_rejected() {
        assert_eq!(
            CurveKeypair::from_secret_bytes(&[0u8; 32]).unwrap_err(),
            CryptoError::DegenerateKey
        );
    }

    #[test]
    fn public_key_wrong_length_is_decode_error() {
        assert!(matches!(
            CurvePublicKey::from_slice(&[1u8; 31]),
            Err(CryptoError::Decode(_))
        ));
    }

    #[test]
    fn bogus_point_is_curve_error() {
        // All-0xff is not a canonical Ristretto encoding.
        let pk = CurvePublicKey::from_slice(&[0xff; 32]).unwrap();
        assert_eq!(pk.to_point().unwrap_err(), CryptoError::InvalidPoint);
    }

    #[test]
    fn identity_public_key_rejected() {
        let pk = CurvePublicKey::from_slice(&[0u8; 32]).unwrap();
        assert_eq!(
            pk.to_point().unwrap_err(),
            CryptoError::IdentityPoint("public key")
        );
    }

    #[test]
    fn curve_public_key_serde_is_hex() {
        let pk = CurveKeypair::generate().public_key();
        let json = serde_json::to_string(&pk).unwrap();
        assert_eq!(json, format!("\"{}\"", pk.to_hex()));
        let back: CurvePublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(pk, back);
    }

    #[test]
    fn ed25519_sign_verify() {
        let kp = SigningKeypair::generate();
        let sig = kp.sign(b"confirm order 42");
        assert!(kp.public_key().verify(b"confirm order 42", &sig).is_ok());
        assert_eq!(
            kp.public_key().verify(b"confirm order 43", &sig),
            Err(CryptoError::SignatureInvalid)
        );
    }

    #[test]
    fn ed25519_wrong_key_fails() {
        let kp1 = SigningKeypair::generate();
        let kp2 = SigningKeypair::generate();
        let sig = kp1.sign(b"message");
        assert!(kp2.public_key().verify(b"message", &sig).is_err());
    }

    #[test]
    fn ed25519_deterministic_from_seed() {
        let a = SigningKeypair::from_seed(&[42u8; 32]);
        let b = SigningKeypair::from_seed(&[42u8; 32]);
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.sign(b"x"), b.sign(b"x"));
    }

    #[test]
    fn signature_length_checked() {
        assert!(Signature::from_slice(&[0u8; 63]).is_err());
        assert!(Signature::from_slice(&[0u8; 64]).is_ok());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let kp = CurveKeypair::generate();
        let dbg = format!("{:?}", kp);
        assert!(dbg.starts_with("CurveKeypair(pub="));
        assert!(!dbg.contains(&hex::encode(kp.secret_bytes())));

        let skp = SigningKeypair::generate();
        let dbg = format!("{:?}", skp);
        assert!(!dbg.contains(&hex::encode(skp.secret_bytes())));
    }
}
