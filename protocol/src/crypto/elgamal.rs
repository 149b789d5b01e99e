//! # Additively Homomorphic EC ElGamal
//!
//! Balances live on the ledger as "exponential" ElGamal ciphertexts over
//! Ristretto255:
//!
//! ```text
//! Encrypt(Q, m) = (C1, C2) = (k·G, m·G + k·Q)
//! Decrypt(d, C) = dlog_G(C2 − d·C1)
//! ```
//!
//! Adding ciphertexts componentwise adds the plaintexts, which is the whole
//! reason we put up with the next part.
//!
//! ## The catch
//!
//! Decryption ends in a discrete log. Over the full group that is, by
//! design, hopeless. Over `[0, max_amount]` it is a baby-step/giant-step
//! search with a `⌈√(max+1)⌉`-entry table, built once and shared. Anything
//! outside the bound (including "negative" results of an overdrawn
//! subtraction) is reported as [`CryptoError::AmountOutOfRange`]. We never
//! guess, and we never search past the bound.

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::{Identity, IsIdentity};
use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::ops::{Add, Sub};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::error::{CryptoError, CryptoResult};
use super::keys::{point_from_bytes, CurveKeypair, CurvePublicKey};
use crate::config::{CIPHERTEXT_LENGTH, MAX_SUPPORTED_AMOUNT, POINT_LENGTH};

// ---------------------------------------------------------------------------
// Ciphertext
// ---------------------------------------------------------------------------

/// An ElGamal ciphertext `(C1, C2)`.
///
/// Equality is group-element equality, which for Ristretto is the same as
/// equality of the canonical 64-byte encoding. Settlement relies on that.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ciphertext {
    c1: RistrettoPoint,
    c2: RistrettoPoint,
}

impl Ciphertext {
    /// `C1 ‖ C2`, each a compressed Ristretto point.
    pub fn to_bytes(&self) -> [u8; CIPHERTEXT_LENGTH] {
        let mut out = [0u8; CIPHERTEXT_LENGTH];
        out[..POINT_LENGTH].copy_from_slice(self.c1.compress().as_bytes());
        out[POINT_LENGTH..].copy_from_slice(self.c2.compress().as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != CIPHERTEXT_LENGTH {
            return Err(CryptoError::Decode(format!(
                "ciphertext: expected {CIPHERTEXT_LENGTH} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            c1: point_from_bytes(&bytes[..POINT_LENGTH])?,
            c2: point_from_bytes(&bytes[POINT_LENGTH..])?,
        })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        Self::from_bytes(&hex::decode(s)?)
    }
}

impl Add for Ciphertext {
    type Output = Ciphertext;

    fn add(self, rhs: Ciphertext) -> Ciphertext {
        Ciphertext {
            c1: self.c1 + rhs.c1,
            c2: self.c2 + rhs.c2,
        }
    }
}

impl Sub for Ciphertext {
    type Output = Ciphertext;

    fn sub(self, rhs: Ciphertext) -> Ciphertext {
        Ciphertext {
            c1: self.c1 - rhs.c1,
            c2: self.c2 - rhs.c2,
        }
    }
}

impl fmt::Debug for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = self.to_hex();
        write!(f, "Ciphertext({}...{})", &h[..8], &h[120..])
    }
}

impl Serialize for Ciphertext {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Ciphertext {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// DiscreteLogTable
// ---------------------------------------------------------------------------

/// Precomputed baby steps for bounded discrete-log recovery.
///
/// Holds `j·G → j` for `j ∈ [0, m)` with `m = ⌈√(max+1)⌉`, plus the
/// giant stride `m·G`. Immutable once built.
pub struct DiscreteLogTable {
    max: u64,
    step: u64,
    baby: HashMap<[u8; 32], u64>,
    giant: RistrettoPoint,
}

/// Smallest `m` with `m² ≥ n`.
fn ceil_sqrt(n: u64) -> u64 {
    let mut m = (n as f64).sqrt() as u64;
    while m.saturating_mul(m) < n {
        m += 1;
    }
    while m > 1 && (m - 1).saturating_mul(m - 1) >= n {
        m -= 1;
    }
    m.max(1)
}

impl DiscreteLogTable {
    pub fn new(max: u64) -> CryptoResult<Self> {
        if max > MAX_SUPPORTED_AMOUNT {
            return Err(CryptoError::AmountOutOfRange {
                max: MAX_SUPPORTED_AMOUNT,
            });
        }
        let started = Instant::now();
        let step = ceil_sqrt(max + 1);

        let mut baby = HashMap::with_capacity(step as usize);
        let mut acc = RistrettoPoint::identity();
        for j in 0..step {
            baby.insert(acc.compress().to_bytes(), j);
            acc += curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
        }
        // After the loop `acc = m·G`.
        debug!(max, step, elapsed_ms = started.elapsed().as_millis() as u64, "discrete-log table built");

        Ok(Self {
            max,
            step,
            baby,
            giant: acc,
        })
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    /// Recover `m` from `m·G`, provided `m ≤ max`.
    pub fn solve(&self, target: &RistrettoPoint) -> CryptoResult<u64> {
        let mut gamma = *target;
        let mut i = 0u64;
        while i.saturating_mul(self.step) <= self.max {
            if let Some(j) = self.baby.get(gamma.compress().as_bytes()) {
                let m = i * self.step + j;
                return if m <= self.max {
                    Ok(m)
                } else {
                    Err(CryptoError::AmountOutOfRange { max: self.max })
                };
            }
            gamma -= self.giant;
            i += 1;
        }
        Err(CryptoError::AmountOutOfRange { max: self.max })
    }
}

impl fmt::Debug for DiscreteLogTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscreteLogTable")
            .field("max", &self.max)
            .field("step", &self.step)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// HomomorphicCipher
// ---------------------------------------------------------------------------

/// The cipher, bundled with its decryption table.
///
/// Cloning is cheap: the table sits behind an `Arc`.
#[derive(Clone, Debug)]
pub struct HomomorphicCipher {
    table: Arc<DiscreteLogTable>,
}

impl HomomorphicCipher {
    /// Build a cipher able to decrypt amounts in `[0, max_amount]`.
    pub fn new(max_amount: u64) -> CryptoResult<Self> {
        Ok(Self {
            table: Arc::new(DiscreteLogTable::new(max_amount)?),
        })
    }

    pub fn max_amount(&self) -> u64 {
        self.table.max()
    }

    pub fn encrypt(&self, public: &CurvePublicKey, amount: u64) -> CryptoResult<Ciphertext> {
        self.encrypt_with(public, amount, &mut OsRng)
    }

    pub fn encrypt_with<R: RngCore + CryptoRng>(
        &self,
        public: &CurvePublicKey,
        amount: u64,
        rng: &mut R,
    ) -> CryptoResult<Ciphertext> {
        let q = public.to_point()?;
        let k = loop {
            let k = Scalar::random(rng);
            if k != Scalar::ZERO {
                break k;
            }
        };
        Ok(Ciphertext {
            c1: RistrettoPoint::mul_base(&k),
            c2: RistrettoPoint::mul_base(&Scalar::from(amount)) + k * q,
        })
    }

    pub fn decrypt(&self, keypair: &CurveKeypair, ct: &Ciphertext) -> CryptoResult<u64> {
        if ct.c1.is_identity() {
            return Err(CryptoError::IdentityPoint("ciphertext C1"));
        }
        let started = Instant::now();
        let m_point = ct.c2 - keypair.secret() * ct.c1;
        let result = self.table.solve(&m_point);
        debug!(elapsed_us = started.elapsed().as_micros() as u64, ok = result.is_ok(), "decrypt");
        result
    }

    /// Decrypts to `m_a + m_b`.
    pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Ciphertext {
        *a + *b
    }

    /// Decrypts to `m_a − m_b`.
    pub fn sub(&self, a: &Ciphertext, b: &Ciphertext) -> Ciphertext {
        *a - *b
    }
}
