//! Error type shared by every primitive in [`crate::crypto`].

use thiserror::Error;

/// Failures from key handling, the homomorphic cipher, ring signatures and
/// sealed boxes.
///
/// Decode failures (wrong length, bad hex, non-canonical scalar) are kept
/// apart from curve failures (bytes that are not a group element, or the
/// identity where it is forbidden) because callers treat the two
/// differently: the first is a malformed message, the second is adversarial
/// or corrupted input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("decode error: {0}")]
    Decode(String),

    #[error("bytes do not encode a valid group element")]
    InvalidPoint,

    #[error("unexpected identity element in {0}")]
    IdentityPoint(&'static str),

    #[error("recovered amount exceeds the configured bound {max}")]
    AmountOutOfRange { max: u64 },

    #[error("ring must contain at least {min} keys, got {size}")]
    RingTooSmall { size: usize, min: usize },

    #[error("signing key is not a member of the ring")]
    SignerNotInRing,

    #[error("ring signature length mismatch: expected {expected} bytes, got {got}")]
    SignatureLength { expected: usize, got: usize },

    #[error("ring signature verification failed")]
    RingSignatureInvalid,

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("secret key has no usable inverse")]
    DegenerateKey,

    #[error("sealed box could not be opened")]
    OpenFailed,

    #[error("sealed box could not be created")]
    SealFailed,
}

impl From<hex::FromHexError> for CryptoError {
    fn from(e: hex::FromHexError) -> Self {
        CryptoError::Decode(e.to_string())
    }
}

pub type CryptoResult<T> = Result<T, CryptoError>;
