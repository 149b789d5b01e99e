//! # Commitments and Zero-Knowledge Proofs
//!
//! The confidential half of settlement. Balances are hidden by ElGamal;
//! *statements about* the hidden amounts are made here:
//!
//! ```text
//! commitment.rs   — Pedersen commitments C = v·G + r·H and their openings
//! range_proof.rs  — Bulletproofs range proofs with an explicit generator context
//! equality.rs     — Schnorr proof that two commitments hide the same value
//! ```
//!
//! ## Security Model
//!
//! - **Hiding**: perfect, given a uniformly random blinding.
//! - **Binding**: computational, under DLOG between `G` and `H`. `H` is
//!   hash-derived by `PedersenGens`, so nobody knows `log_G H`.
//! - **Range soundness**: Bulletproofs, Fiat–Shamir via merlin transcripts.
//!
//! Every prove/verify call takes its generators as an argument. There is no
//! ambient generator state anywhere in this module, so a proof can only
//! ever be checked against the width it claims.

pub mod commitment;
pub mod equality;
pub mod range_proof;

use thiserror::Error;

pub use commitment::{commit, commit_with, verify_opening, Commitment, Opening};
pub use equality::CommitmentEqualityProof;
pub use range_proof::{prove_range, verify_range, RangeProofBundle, RangeProofContext};

/// Errors from commitment and proof handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ZkpError {
    #[error("decode error: {0}")]
    Decode(String),

    #[error("bytes do not encode a valid group element")]
    InvalidPoint,

    #[error("unsupported range-proof width: {0} bits")]
    UnsupportedBits(usize),

    #[error("value does not fit in {bits} bits")]
    ValueOutOfRange { bits: usize },

    #[error("range proof could not be generated: {0}")]
    ProofGeneration(String),

    #[error("range proof verification failed: {0}")]
    RangeProofInvalid(String),

    #[error("commitment equality proof failed")]
    EqualityInvalid,

    #[error("opening does not match commitment")]
    OpeningMismatch,
}

impl From<hex::FromHexError> for ZkpError {
    fn from(e: hex::FromHexError) -> Self {
        ZkpError::Decode(e.to_string())
    }
}

pub type ZkpResult<T> = Result<T, ZkpError>;
