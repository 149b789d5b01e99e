//! Error types for the settlement protocol.
//!
//! Every protocol step returns a [`SettlementError`]. Lower layers keep
//! their own error enums; the `From` impls below fold them into the kinds
//! callers actually branch on, which [`SettlementError::kind`] exposes as a
//! flat, stable [`ErrorKind`].

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::crypto::CryptoError;
use crate::keystore::KeyStoreError;
use crate::ledger::LedgerError;
use crate::records::OrderState;
use crate::zkp::ZkpError;

/// Errors that can occur while running the settlement protocol.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// A wallet, good, order or ring record is missing.
    #[error("{what} not found: {key}")]
    NotFound { what: &'static str, key: String },

    /// The record we were about to create is already there.
    #[error("{what} already exists: {key}")]
    AlreadyExists { what: &'static str, key: String },

    /// The step is not allowed in the order's current state.
    #[error("invalid state: order is {current}, cannot {attempted}")]
    InvalidState {
        current: OrderState,
        attempted: &'static str,
    },

    /// The good is held by an open order until it settles, is rejected,
    /// or is cancelled.
    #[error("invalid state: good {good_id} is locked by an open order")]
    GoodLocked { good_id: String },

    /// Malformed hex, JSON, lengths or scalars.
    #[error("decode error: {0}")]
    DecodeError(String),

    /// Bytes that are not a group element, or the identity where forbidden.
    #[error("curve error: {0}")]
    CurveError(String),

    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("range proof invalid: {0}")]
    RangeProofInvalid(String),

    /// Decryption landed outside the configured amount bound.
    #[error("amount outside decryptable range [0, {max}]")]
    AmountOutOfRange { max: u64 },

    /// A recomputed ciphertext or commitment disagrees with the stored one.
    #[error("consistency mismatch: {0}")]
    ConsistencyMismatch(String),

    /// The buyer cannot cover the price.
    #[error("insufficient funds: price {required} exceeds balance")]
    InsufficientFunds { required: i64 },

    /// A request argument is unusable (negative price, empty id, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("key store error: {0}")]
    KeyStore(#[from] KeyStoreError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Flat classification of [`SettlementError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidState,
    DecodeError,
    CurveError,
    SignatureInvalid,
    RangeProofInvalid,
    AmountOutOfRange,
    ConsistencyMismatch,
    InsufficientFunds,
    InvalidInput,
    Ledger,
    KeyStore,
    Config,
}

impl SettlementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SettlementError::NotFound { .. } => ErrorKind::NotFound,
            SettlementError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            SettlementError::InvalidState { .. } | SettlementError::GoodLocked { .. } => {
                ErrorKind::InvalidState
            }
            SettlementError::DecodeError(_) => ErrorKind::DecodeError,
            SettlementError::CurveError(_) => ErrorKind::CurveError,
            SettlementError::SignatureInvalid(_) => ErrorKind::SignatureInvalid,
            SettlementError::RangeProofInvalid(_) => ErrorKind::RangeProofInvalid,
            SettlementError::AmountOutOfRange { .. } => ErrorKind::AmountOutOfRange,
            SettlementError::ConsistencyMismatch(_) => ErrorKind::ConsistencyMismatch,
            SettlementError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            SettlementError::InvalidInput(_) => ErrorKind::InvalidInput,
            SettlementError::Ledger(_) => ErrorKind::Ledger,
            SettlementError::KeyStore(KeyStoreError::UnknownParty(_)) => ErrorKind::NotFound,
            SettlementError::KeyStore(_) => ErrorKind::KeyStore,
            SettlementError::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn not_found(what: &'static str, key: impl Into<String>) -> Self {
        SettlementError::NotFound {
            what,
            key: key.into(),
        }
    }
}

impl From<CryptoError> for SettlementError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::Decode(_) | CryptoError::SignatureLength { .. } | CryptoError::OpenFailed => {
                SettlementError::DecodeError(e.to_string())
            }
            CryptoError::InvalidPoint
            | CryptoError::IdentityPoint(_)
            | CryptoError::DegenerateKey
            | CryptoError::SealFailed => SettlementError::CurveError(e.to_string()),
            CryptoError::AmountOutOfRange { max } => SettlementError::AmountOutOfRange { max },
            CryptoError::RingTooSmall { .. }
            | CryptoError::SignerNotInRing
            | CryptoError::RingSignatureInvalid
            | CryptoError::SignatureInvalid => SettlementError::SignatureInvalid(e.to_string()),
        }
    }
}

impl From<ZkpError> for SettlementError {
    fn from(e: ZkpError) -> Self {
        match e {
            ZkpError::Decode(_) => SettlementError::DecodeError(e.to_string()),
            ZkpError::InvalidPoint => SettlementError::CurveError(e.to_string()),
            ZkpError::UnsupportedBits(_)
            | ZkpError::ValueOutOfRange { .. }
            | ZkpError::ProofGeneration(_)
            | ZkpError::RangeProofInvalid(_) => SettlementError::RangeProofInvalid(e.to_string()),
            ZkpError::EqualityInvalid | ZkpError::OpeningMismatch => {
                SettlementError::ConsistencyMismatch(e.to_string())
            }
        }
    }
}

impl From<serde_json::Error> for SettlementError {
    fn from(e: serde_json::Error) -> Self {
        SettlementError::DecodeError(e.to_string())
    }
}

pub type SettlementResult<T> = Result<T, SettlementError>;
