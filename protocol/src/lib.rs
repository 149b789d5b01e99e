// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Umbra Protocol — Core Library
//!
//! Two parties trade a good for money on a shared ledger, and the ledger
//! never learns how much money either of them has. Balances live as
//! additively homomorphic ciphertexts, prices as Pedersen commitments, and
//! the buyer hides inside a ring of keys when it signs for the debit.
//!
//! The stack is deliberately boring: Ristretto for every group operation,
//! Bulletproofs for ranges, Ed25519 for plain signatures, AES-256-GCM for
//! sealed boxes. Nothing here needs a trusted setup.
//!
//! ## Architecture
//!
//! - **crypto** — ElGamal-in-the-exponent, linkable ring signatures, keys, hashes.
//! - **zkp** — Pedersen commitments, range proofs, commitment equality.
//! - **ledger** — The world-state contract, with in-memory and sled backends.
//! - **keystore** — Who holds which secret. Settlement asks, never stores.
//! - **records** — Wallet, Good, Order and the ring registry, as stored.
//! - **registry** — Where ring decoys come from.
//! - **settlement** — The order state machine and the settle gate.
//! - **config** — Wire constants and the knobs a deployment may turn.
//!
//! ## Design Philosophy
//!
//! 1. A step either writes everything it produced or nothing.
//! 2. Settlement re-checks every claim against current state. Trust nobody,
//!    including the previous step.
//! 3. Secrets never touch the ledger. Openings travel sealed.

pub mod config;
pub mod crypto;
pub mod keystore;
pub mod ledger;
pub mod records;
pub mod registry;
pub mod settlement;
pub mod zkp;

pub use settlement::{ErrorKind, SettlementError, SettlementProtocol, SettlementResult};
