//! # Ledger Records
//!
//! The JSON shapes that live in world state. Field names are part of the
//! wire format: other tools read these records straight off the ledger, so
//! renaming a field is a migration, not a refactor.
//!
//! Byte blobs (signatures, proofs, sealed boxes) are lowercase hex. An
//! empty string means "not set yet". Typed values (ciphertexts,
//! commitments, keys) serialize as hex through their own impls and use
//! `null` for "not set yet".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::config::GENESIS_GOODS;
use crate::crypto::{Ciphertext, CurvePublicKey};
use crate::zkp::Commitment;

/// hex serialization for `Vec<u8>` fields.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Small integer enums
// ---------------------------------------------------------------------------

/// Serialize a `u8`-backed enum as a bare integer.
macro_rules! int_enum {
    ($name:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_i64(self) -> i64 {
                self as i64
            }

            pub fn from_i64(v: i64) -> Option<Self> {
                match v {
                    $($value => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_i64(self.as_i64())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let v = i64::deserialize(deserializer)?;
                $name::from_i64(v).ok_or_else(|| {
                    serde::de::Error::custom(format!("invalid {}: {v}", stringify!($name)))
                })
            }
        }
    };
}

/// Where a good is in its sale lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GoodStatus {
    Idle = 0,
    ForSale = 1,
    Locked = 2,
}

int_enum!(GoodStatus { Idle = 0, ForSale = 1, Locked = 2 });

/// The seller's answer to a proposal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SellerOption {
    Pending = 0,
    Accept = 1,
    Reject = 2,
}

int_enum!(SellerOption { Pending = 0, Accept = 1, Reject = 2 });

/// Order lifecycle.
///
/// ```text
/// Proposed ─┬─► SellerAccepted ─► CommitsExchanged ─► ProofsSubmitted ─► Settled
///           └─► Rejected
/// (any non-terminal) ─► Cancelled
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderState {
    Proposed,
    SellerAccepted,
    CommitsExchanged,
    ProofsSubmitted,
    Settled,
    Rejected,
    Cancelled,
}

impl OrderState {
    /// Terminal states never change again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderState::Settled | OrderState::Rejected | OrderState::Cancelled
        )
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// Wallet / Good / RingRegistry
// ---------------------------------------------------------------------------

/// An encrypted balance under its owner's cipher key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub address: String,
    pub balance: Ciphertext,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Good {
    pub id: String,
    pub owner: String,
    pub price: i64,
    pub amount: i64,
    pub status: GoodStatus,
}

/// Decoy keys for ring assembly. Index 0 is a reserved sentinel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingRegistry {
    pub pubs: Vec<String>,
}

impl RingRegistry {
    /// Build a registry from keys, prepending the empty sentinel.
    pub fn from_keys(keys: &[CurvePublicKey]) -> Self {
        let mut pubs = Vec::with_capacity(keys.len() + 1);
        pubs.push(String::new());
        pubs.extend(keys.iter().map(CurvePublicKey::to_hex));
        Self { pubs }
    }
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// One negotiation, from proposal to settlement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "orderNum")]
    pub order_num: String,
    #[serde(rename = "goodId")]
    pub good_id: String,
    pub buyer: String,
    pub seller: String,
    pub price: i64,

    pub state: OrderState,
    pub seller_opt: SellerOption,

    // -- seller leg ---------------------------------------------------------
    pub enc_b_m: Option<Ciphertext>,
    #[serde(default)]
    pub enc_b_b: Option<Ciphertext>,
    #[serde(with = "hex_bytes", default)]
    pub sign_confirm: Vec<u8>,

    // -- commitments --------------------------------------------------------
    #[serde(rename = "commA", default)]
    pub comm_a: Option<Commitment>,
    #[serde(rename = "sign_commA", with = "hex_bytes", default)]
    pub sign_comm_a: Vec<u8>,
    #[serde(rename = "commB", default)]
    pub comm_b: Option<Commitment>,
    #[serde(rename = "sign_commB", with = "hex_bytes", default)]
    pub sign_comm_b: Vec<u8>,
    #[serde(with = "hex_bytes", default)]
    pub comm_eq_proof: Vec<u8>,
    #[serde(with = "hex_bytes", default)]
    pub sealed_opening_a: Vec<u8>,
    #[serde(with = "hex_bytes", default)]
    pub sealed_opening_b: Vec<u8>,

    // -- buyer leg ----------------------------------------------------------
    #[serde(default)]
    pub enc_a_m: Option<Ciphertext>,
    #[serde(default)]
    pub enc_a_b: Option<Ciphertext>,
    #[serde(with = "hex_bytes", default)]
    pub rp_m: Vec<u8>,
    #[serde(with = "hex_bytes", default)]
    pub rp_b: Vec<u8>,
    #[serde(with = "hex_bytes", default)]
    pub link_sign_1: Vec<u8>,
    #[serde(with = "hex_bytes", default)]
    pub link_sign_2: Vec<u8>,
    #[serde(default)]
    pub pubs: Vec<CurvePublicKey>,

    // -- auditor escrow -----------------------------------------------------
    #[serde(with = "hex_bytes", default)]
    pub enc_s_add_a: Vec<u8>,
    #[serde(with = "hex_bytes", default)]
    pub enc_s_add_b: Vec<u8>,

    pub settled: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// A fresh proposal. Everything past the seller's encrypted price is
    /// left unset.
    pub fn proposed(
        order_num: String,
        good_id: String,
        buyer: String,
        seller: String,
        price: i64,
        enc_b_m: Ciphertext,
    ) -> Self {
        let now = Utc::now();
        Self {
            order_num,
            good_id,
            buyer,
            seller,
            price,
            state: OrderState::Proposed,
            seller_opt: SellerOption::Pending,
            enc_b_m: Some(enc_b_m),
            enc_b_b: None,
            sign_confirm: Vec::new(),
            comm_a: None,
            sign_comm_a: Vec::new(),
            comm_b: None,
            sign_comm_b: Vec::new(),
            comm_eq_proof: Vec::new(),
            sealed_opening_a: Vec::new(),
            sealed_opening_b: Vec::new(),
            enc_a_m: None,
            enc_a_b: None,
            rp_m: Vec::new(),
            rp_b: Vec::new(),
            link_sign_1: Vec::new(),
            link_sign_2: Vec::new(),
            pubs: Vec::new(),
            enc_s_add_a: Vec::new(),
            enc_s_add_b: Vec::new(),
            settled: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next` and stamp the update time.
    pub fn advance(&mut self, next: OrderState) {
        self.state = next;
        self.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// Genesis
// ---------------------------------------------------------------------------

/// Initial world state seeded by `init_ledger`.
#[derive(Clone, Debug, Default)]
pub struct Genesis {
    pub goods: Vec<Good>,
    pub ring: Vec<CurvePublicKey>,
}

impl Genesis {
    /// The demo catalogue, all owned by `owner` and listed for sale.
    pub fn demo(owner: &str, ring: Vec<CurvePublicKey>) -> Self {
        let goods = GENESIS_GOODS
            .iter()
            .map(|(id, price, amount)| Good {
                id: (*id).to_string(),
                owner: owner.to_string(),
                price: *price,
                amount: *amount,
                status: GoodStatus::ForSale,
            })
            .collect();
        Self { goods, ring }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CurveKeypair, HomomorphicCipher};

    #[test]
    fn good_status_is_an_integer_on_the_wire() {
        let good = Good {
            id: "10000".into(),
            owner: "bob".into(),
            price: 100,
            amount: 20,
            status: GoodStatus::Locked,
        };
        let v = serde_json::to_value(&good).unwrap();
        assert_eq!(v["status"], 2);
        let back: Good = serde_json::from_value(v).unwrap();
        assert_eq!(back, good);
    }

    #[test]
    fn unknown_status_rejected() {
        let raw = r#"{"id":"1","owner":"x","price":1,"amount":1,"status":9}"#;
        assert!(serde_json::from_str::<Good>(raw).is_err());
    }

    #[test]
    fn order_field_names() {
        let cipher = HomomorphicCipher::new(1 << 8).unwrap();
        let kp = CurveKeypair::generate();
        let ct = cipher.encrypt(&kp.public_key(), 20).unwrap();
        let mut order = Order::proposed("n".into(), "10000".into(), "a".into(), "b".into(), 20, ct);
        order.sign_confirm = vec![0xab, 0xcd];
        let v = serde_json::to_value(&order).unwrap();
        for field in [
            "orderNum", "goodId", "buyer", "seller", "price", "state", "seller_opt", "enc_b_m",
            "enc_b_b", "sign_confirm", "commA", "sign_commA", "commB", "sign_commB", "rp_m",
            "rp_b", "link_sign_1", "link_sign_2", "enc_a_m", "enc_a_b", "enc_s_add_a",
            "enc_s_add_b", "pubs", "settled", "createdAt", "updatedAt",
        ] {
            assert!(v.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(v["sign_confirm"], "abcd");
        assert_eq!(v["seller_opt"], 0);
        assert_eq!(v["state"], "Proposed");
        let back: Order = serde_json::from_value(v).unwrap();
        assert_eq!(back, order);
    }

    #[test]
    fn terminal_states() {
        assert!(OrderState::Settled.is_terminal());
        assert!(OrderState::Rejected.is_terminal());
        assert!(OrderState::Cancelled.is_terminal());
        assert!(!OrderState::ProofsSubmitted.is_terminal());
    }

    #[test]
    fn registry_has_sentinel() {
        let keys = vec![CurveKeypair::generate().public_key()];
        let reg = RingRegistry::from_keys(&keys);
        assert_eq!(reg.pubs.len(), 2);
        assert!(reg.pubs[0].is_empty());
    }

    #[test]
    fn demo_genesis_matches_catalogue() {
        let g = Genesis::demo("bob", Vec::new());
        assert_eq!(g.goods.len(), 2);
        assert_eq!(g.goods[0].id, "10000");
        assert_eq!(g.goods[0].price, 100);
        assert_eq!(g.goods[1].amount, 30);
    }
}
