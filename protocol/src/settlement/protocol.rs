//! # SettlementProtocol
//!
//! Orchestrates the cipher, the ring signer, and the commitment/proof
//! adapter against ledger records. Every public step:
//!
//! 1. loads the order and checks its state,
//! 2. does its crypto with the acting party's keys from the key store,
//! 3. writes everything it changed in one ledger commit.
//!
//! No step writes half its output. No step touches a terminal order.
//!
//! ## Who knows what
//!
//! - The seller learns the price (it set it) and nothing about the buyer's
//!   balance.
//! - The buyer learns the seller's commitment opening, sealed to it, so it
//!   can prove both commitments hide the same price.
//! - The ledger (and anybody reading it) sees ciphertexts, commitments,
//!   proofs and ring signatures. Party addresses of the submit step are
//!   additionally escrowed to the auditor.
//!
//! ## The settle gate
//!
//! `settle` re-checks everything against *current* wallet state, so a
//! proof computed against a balance that has since moved is refused with
//! `ConsistencyMismatch` instead of overwriting the newer balance.

use bulletproofs::PedersenGens;
use curve25519_dalek::scalar::Scalar;
use rand::rngs::OsRng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::error::{SettlementError, SettlementResult};
use super::messages::{
    balance_link_message, commitment_message, confirm_message, settlement_link_message,
};
use crate::config::{
    ProtocolConfig, OBJECT_GOOD, OBJECT_ORDER, OBJECT_WALLET, RING_REGISTRY_KEY,
};
use crate::crypto::{
    linkable, open, order_number, seal, CurveKeypair, CurvePublicKey, HomomorphicCipher,
    LinkableRingSigner, LinkableRingVerifier, Signature, SigningPublicKey,
};
use crate::keystore::KeyStore;
use crate::ledger::{composite_key, get_json, object_range, Ledger, WriteBatch};
use crate::records::{
    Genesis, Good, GoodStatus, Order, OrderState, RingRegistry, SellerOption, Wallet,
};
use crate::registry::{assemble_ring, RingSource};
use crate::zkp::{
    commit, prove_range, verify_opening, verify_range, Commitment, CommitmentEqualityProof,
    Opening, RangeProofBundle, RangeProofContext,
};

/// Addresses recovered from an order's auditor escrow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub order_num: String,
    pub buyer: String,
    pub seller: String,
}

/// The settlement engine, wired to its collaborators.
pub struct SettlementProtocol<L, K, R> {
    ledger: L,
    keys: K,
    rings: R,
    auditor: CurvePublicKey,
    config: ProtocolConfig,
    cipher: HomomorphicCipher,
    pedersen: PedersenGens,
    price_ctx: RangeProofContext,
    balance_ctx: RangeProofContext,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn wallet_key(address: &str) -> String {
    composite_key(OBJECT_WALLET, &[address])
}

fn good_key(id: &str) -> String {
    composite_key(OBJECT_GOOD, &[id])
}

fn order_key(order_num: &str) -> String {
    composite_key(OBJECT_ORDER, &[order_num])
}

/// An order field that an earlier step should have filled.
fn required<'a, T>(field: &'a Option<T>, name: &str) -> SettlementResult<&'a T> {
    field
        .as_ref()
        .ok_or_else(|| SettlementError::DecodeError(format!("order is missing {name}")))
}

fn required_bytes<'a>(field: &'a [u8], name: &str) -> SettlementResult<&'a [u8]> {
    if field.is_empty() {
        return Err(SettlementError::DecodeError(format!("order is missing {name}")));
    }
    Ok(field)
}

fn expect_state(order: &Order, expected: OrderState, attempted: &'static str) -> SettlementResult<()> {
    if order.state != expected {
        return Err(SettlementError::InvalidState {
            current: order.state,
            attempted,
        });
    }
    Ok(())
}

/// Log a failed settle check, then pass the result through.
fn gate<T>(order_num: &str, check: &'static str, result: SettlementResult<T>) -> SettlementResult<T> {
    if let Err(e) = &result {
        warn!(order_num, check, error = %e, "settlement check failed");
    }
    result
}

fn positive_price(price: i64, max: u64) -> SettlementResult<u64> {
    if price <= 0 {
        return Err(SettlementError::InvalidInput(format!("price must be positive, got {price}")));
    }
    let price = price as u64;
    if price > max {
        return Err(SettlementError::AmountOutOfRange { max });
    }
    Ok(price)
}

// ---------------------------------------------------------------------------
// Construction and record access
// ---------------------------------------------------------------------------

impl<L: Ledger, K: KeyStore, R: RingSource> SettlementProtocol<L, K, R> {
    pub fn new(
        ledger: L,
        keys: K,
        rings: R,
        auditor: CurvePublicKey,
        config: ProtocolConfig,
    ) -> SettlementResult<Self> {
        config.validate()?;
        auditor.to_point()?;
        let started = Instant::now();
        let cipher = HomomorphicCipher::new(config.max_amount)?;
        let price_ctx = RangeProofContext::new(config.price_bits)?;
        let balance_ctx = RangeProofContext::new(config.balance_bits)?;
        info!(
            max_amount = config.max_amount,
            price_bits = config.price_bits,
            balance_bits = config.balance_bits,
            setup_ms = started.elapsed().as_millis() as u64,
            "settlement protocol ready"
        );
        Ok(Self {
            ledger,
            keys,
            rings,
            auditor,
            config,
            cipher,
            // RP_m is bound to commA, so both must use the same generators.
            pedersen: *price_ctx.pedersen(),
            price_ctx,
            balance_ctx,
        })
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn keystore(&self) -> &K {
        &self.keys
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn cipher(&self) -> &HomomorphicCipher {
        &self.cipher
    }

    fn load<T: DeserializeOwned>(&self, key: &str, what: &'static str, id: &str) -> SettlementResult<T> {
        let bytes = self
            .ledger
            .get(key)?
            .ok_or_else(|| SettlementError::not_found(what, id))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn load_all<T: DeserializeOwned>(&self, rows: Vec<(String, Vec<u8>)>) -> SettlementResult<Vec<T>> {
        rows.into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(SettlementError::from))
            .collect()
    }

    // -- Bootstrap ------------------------------------------------------------

    /// Seed goods and the ring registry. Runs once per ledger.
    pub fn init_ledger(&self, genesis: &Genesis) -> SettlementResult<()> {
        if self.ledger.get(RING_REGISTRY_KEY)?.is_some() {
            return Err(SettlementError::AlreadyExists {
                what: "ring registry",
                key: RING_REGISTRY_KEY.to_string(),
            });
        }
        let mut batch = WriteBatch::new();
        for good in &genesis.goods {
            batch.put_json(good_key(&good.id), good)?;
        }
        batch.put_json(RING_REGISTRY_KEY, &RingRegistry::from_keys(&genesis.ring))?;
        self.ledger.commit(batch)?;
        info!(goods = genesis.goods.len(), ring = genesis.ring.len(), "ledger initialized");
        Ok(())
    }

    /// Open a wallet holding `amount`, encrypted to the owner.
    pub fn create_wallet(&self, address: &str, amount: u64) -> SettlementResult<Wallet> {
        let identity = self.keys.identity(address)?;
        if amount > self.cipher.max_amount() {
            return Err(SettlementError::AmountOutOfRange {
                max: self.cipher.max_amount(),
            });
        }
        let key = wallet_key(address);
        if self.ledger.get(&key)?.is_some() {
            return Err(SettlementError::AlreadyExists {
                what: "wallet",
                key: address.to_string(),
            });
        }
        let wallet = Wallet {
            address: address.to_string(),
            balance: self.cipher.encrypt(&identity.cipher_key, amount)?,
        };
        let mut batch = WriteBatch::new();
        batch.put_json(key, &wallet)?;
        self.ledger.commit(batch)?;
        info!(address, "wallet created");
        Ok(wallet)
    }

    // -- Queries ----------------------------------------------------------------

    pub fn get_wallet(&self, address: &str) -> SettlementResult<Wallet> {
        self.load(&wallet_key(address), "wallet", address)
    }

    /// Decrypt a wallet with its owner's key. Costs a bounded discrete log.
    pub fn wallet_balance(&self, address: &str) -> SettlementResult<u64> {
        let wallet = self.get_wallet(address)?;
        let owner = self.keys.party(address)?;
        Ok(self.cipher.decrypt(&owner.cipher, &wallet.balance)?)
    }

    pub fn get_good(&self, id: &str) -> SettlementResult<Good> {
        self.load(&good_key(id), "good", id)
    }

    pub fn all_goods(&self) -> SettlementResult<Vec<Good>> {
        let (start, end) = object_range(OBJECT_GOOD);
        self.load_all(self.ledger.range_query(&start, &end)?)
    }

    pub fn goods_by_owner(&self, owner: &str) -> SettlementResult<Vec<Good>> {
        self.load_all(self.ledger.query_by_field(OBJECT_GOOD, "owner", owner)?)
    }

    pub fn get_order(&self, order_num: &str) -> SettlementResult<Order> {
        self.load(&order_key(order_num), "order", order_num)
    }

    pub fn orders_by_buyer(&self, buyer: &str) -> SettlementResult<Vec<Order>> {
        self.load_all(self.ledger.query_by_field(OBJECT_ORDER, "buyer", buyer)?)
    }

    pub fn orders_by_seller(&self, seller: &str) -> SettlementResult<Vec<Order>> {
        self.load_all(self.ledger.query_by_field(OBJECT_ORDER, "seller", seller)?)
    }

    /// Every registered ring key (sentinel excluded).
    pub fn ring_keys(&self) -> SettlementResult<Vec<CurvePublicKey>> {
        let registry: RingRegistry = get_json(&self.ledger, RING_REGISTRY_KEY)?
            .ok_or_else(|| SettlementError::not_found("ring registry", RING_REGISTRY_KEY))?;
        registry
            .pubs
            .iter()
            .skip(1)
            .map(|k| CurvePublicKey::from_hex(k).map_err(SettlementError::from))
            .collect()
    }

    /// Set a good's price and put it up for sale.
    pub fn list_good(&self, id: &str, price: i64) -> SettlementResult<Good> {
        positive_price(price, self.cipher.max_amount())?;
        let mut good = self.get_good(id)?;
        if good.status == GoodStatus::Locked {
            return Err(SettlementError::GoodLocked {
                good_id: id.to_string(),
            });
        }
        good.price = price;
        good.status = GoodStatus::ForSale;
        let mut batch = WriteBatch::new();
        batch.put_json(good_key(id), &good)?;
        self.ledger.commit(batch)?;
        info!(good_id = id, "good listed");
        Ok(good)
    }
}

// ---------------------------------------------------------------------------
// Protocol steps
// ---------------------------------------------------------------------------

impl<L: Ledger, K: KeyStore, R: RingSource> SettlementProtocol<L, K, R> {
    /// Buyer opens an order for `good_id` at its listed price.
    pub fn propose(&self, buyer: &str, seller: &str, good_id: &str) -> SettlementResult<Order> {
        if buyer == seller {
            return Err(SettlementError::InvalidInput(
                "buyer and seller must differ".to_string(),
            ));
        }
        let mut good = self.get_good(good_id)?;
        if good.owner != seller {
            return Err(SettlementError::InvalidInput(format!(
                "good {good_id} is not owned by the seller"
            )));
        }
        // Idle and ForSale goods can both be bought; only an open order blocks.
        if good.status == GoodStatus::Locked {
            return Err(SettlementError::GoodLocked {
                good_id: good_id.to_string(),
            });
        }
        let price = positive_price(good.price, self.cipher.max_amount())?;

        let seller_id = self.keys.identity(seller)?;
        self.keys.identity(buyer)?;
        self.get_wallet(buyer)?;
        self.get_wallet(seller)?;

        let sequence = self.ledger.next_sequence()?;
        let order_num = order_number(buyer, seller, good_id, good.price, sequence);
        let key = order_key(&order_num);
        if self.ledger.get(&key)?.is_some() {
            return Err(SettlementError::AlreadyExists {
                what: "order",
                key: order_num,
            });
        }

        let enc_b_m = self.cipher.encrypt(&seller_id.cipher_key, price)?;
        let order = Order::proposed(
            order_num.clone(),
            good_id.to_string(),
            buyer.to_string(),
            seller.to_string(),
            good.price,
            enc_b_m,
        );
        good.status = GoodStatus::Locked;

        let mut batch = WriteBatch::new();
        batch.put_json(key, &order)?;
        batch.put_json(good_key(good_id), &good)?;
        self.ledger.commit(batch)?;
        info!(order_num = %order_num, state = %order.state, good_id, "order proposed");
        Ok(order)
    }

    /// Seller accepts or rejects a proposal.
    pub fn seller_decide(&self, order_num: &str, decision: SellerOption) -> SettlementResult<Order> {
        let mut order = self.get_order(order_num)?;
        expect_state(&order, OrderState::Proposed, "decide")?;

        match decision {
            SellerOption::Pending => Err(SettlementError::InvalidInput(
                "a decision must accept or reject".to_string(),
            )),
            SellerOption::Reject => {
                let mut good = self.get_good(&order.good_id)?;
                good.status = GoodStatus::ForSale;
                order.seller_opt = SellerOption::Reject;
                order.advance(OrderState::Rejected);

                let mut batch = WriteBatch::new();
                batch.put_json(order_key(order_num), &order)?;
                batch.put_json(good_key(&good.id), &good)?;
                self.ledger.commit(batch)?;
                info!(order_num, state = %order.state, "order rejected by seller");
                Ok(order)
            }
            SellerOption::Accept => {
                let seller = self.keys.party(&order.seller)?;
                let buyer_id = self.keys.identity(&order.buyer)?;
                let wallet = self.get_wallet(&order.seller)?;
                let enc_b_m = *required(&order.enc_b_m, "enc_b_m")?;

                // The seller checks the ciphertext actually carries its price.
                let price = self.cipher.decrypt(&seller.cipher, &enc_b_m)?;
                if price != order.price as u64 {
                    return Err(SettlementError::ConsistencyMismatch(
                        "Enc_B_M does not decrypt to the listed price".to_string(),
                    ));
                }

                let enc_b_b = self.cipher.add(&wallet.balance, &enc_b_m);
                let sign_confirm = seller
                    .signing
                    .sign(&confirm_message(&enc_b_m, &enc_b_b, order_num, &order.buyer));

                let (comm_b, opening_b) = commit(&self.pedersen, price, &mut OsRng);
                let sign_comm_b = seller.signing.sign(&commitment_message(order_num, &comm_b));
                let sealed_opening_b = seal(&buyer_id.cipher_key, &opening_b.to_bytes())?;

                order.enc_b_b = Some(enc_b_b);
                order.sign_confirm = sign_confirm.to_vec();
                order.comm_b = Some(comm_b);
                order.sign_comm_b = sign_comm_b.to_vec();
                order.sealed_opening_b = sealed_opening_b;
                order.seller_opt = SellerOption::Accept;
                order.advance(OrderState::SellerAccepted);

                let mut batch = WriteBatch::new();
                batch.put_json(order_key(order_num), &order)?;
                self.ledger.commit(batch)?;
                info!(order_num, state = %order.state, "order accepted by seller");
                Ok(order)
            }
        }
    }

    /// Buyer checks the seller's confirmation and commits to the price.
    pub fn buyer_commit(&self, order_num: &str) -> SettlementResult<Order> {
        let mut order = self.get_order(order_num)?;
        expect_state(&order, OrderState::SellerAccepted, "commit")?;

        let buyer = self.keys.party(&order.buyer)?;
        let seller_id = self.keys.identity(&order.seller)?;
        let enc_b_m = required(&order.enc_b_m, "enc_b_m")?;
        let enc_b_b = required(&order.enc_b_b, "enc_b_b")?;
        let comm_b = *required(&order.comm_b, "commB")?;

        let confirm = Signature::from_slice(required_bytes(&order.sign_confirm, "sign_confirm")?)?;
        seller_id
            .verifying_key
            .verify(&confirm_message(enc_b_m, enc_b_b, order_num, &order.buyer), &confirm)?;
        let sig_b = Signature::from_slice(required_bytes(&order.sign_comm_b, "sign_commB")?)?;
        seller_id
            .verifying_key
            .verify(&commitment_message(order_num, &comm_b), &sig_b)?;

        let opening_b = Opening::from_bytes(&open(
            &buyer.cipher,
            required_bytes(&order.sealed_opening_b, "sealed_opening_b")?,
        )?)?;
        verify_opening(&self.pedersen, &comm_b, &opening_b)?;
        if opening_b.value != order.price as u64 {
            return Err(SettlementError::ConsistencyMismatch(
                "commB does not commit to the order price".to_string(),
            ));
        }

        let (comm_a, opening_a) = commit(&self.pedersen, opening_b.value, &mut OsRng);
        let sign_comm_a = buyer.signing.sign(&commitment_message(order_num, &comm_a));
        let eq_proof = CommitmentEqualityProof::prove(
            &self.pedersen,
            (&comm_a, &opening_a),
            (&comm_b, &opening_b),
            order_num.as_bytes(),
            &mut OsRng,
        )?;
        let sealed_opening_a = seal(&buyer.cipher.public_key(), &opening_a.to_bytes())?;

        order.comm_a = Some(comm_a);
        order.sign_comm_a = sign_comm_a.to_vec();
        order.comm_eq_proof = eq_proof.to_bytes().to_vec();
        order.sealed_opening_a = sealed_opening_a;
        order.advance(OrderState::CommitsExchanged);

        let mut batch = WriteBatch::new();
        batch.put_json(order_key(order_num), &order)?;
        self.ledger.commit(batch)?;
        info!(order_num, state = %order.state, "commitments exchanged");
        Ok(order)
    }

    /// Buyer encrypts its side, proves ranges, ring-signs, escrows addresses.
    pub fn buyer_submit(&self, order_num: &str) -> SettlementResult<Order> {
        let mut order = self.get_order(order_num)?;
        expect_state(&order, OrderState::CommitsExchanged, "submit")?;

        let started = Instant::now();
        let buyer = self.keys.party(&order.buyer)?;
        let wallet = self.get_wallet(&order.buyer)?;
        let price = positive_price(order.price, self.cipher.max_amount())?;
        let enc_b_m = *required(&order.enc_b_m, "enc_b_m")?;
        let comm_a = *required(&order.comm_a, "commA")?;

        let balance = self.cipher.decrypt(&buyer.cipher, &wallet.balance)?;
        if balance < price {
            warn!(order_num, "buyer cannot cover the price");
            return Err(SettlementError::InsufficientFunds {
                required: order.price,
            });
        }

        let opening_a = Opening::from_bytes(&open(
            &buyer.cipher,
            required_bytes(&order.sealed_opening_a, "sealed_opening_a")?,
        )?)?;
        verify_opening(&self.pedersen, &comm_a, &opening_a)?;

        let enc_a_m = self.cipher.encrypt(&buyer.cipher.public_key(), price)?;
        let enc_a_b = self.cipher.sub(&wallet.balance, &enc_a_m);

        // RP_m commits to price - 1 under r_A, so V + G = commA.
        let rp_m = prove_range(&self.price_ctx, price - 1, &opening_a.blinding, order_num.as_bytes())?;
        let rp_b = prove_range(
            &self.balance_ctx,
            balance - price,
            &Scalar::random(&mut OsRng),
            order_num.as_bytes(),
        )?;

        let decoys = self.rings.decoys(&self.ledger, self.config.ring_window)?;
        let ring = assemble_ring(decoys, buyer.cipher.public_key());
        let signer = LinkableRingSigner::new(&buyer.cipher, &ring)?;
        let link_sign_1 = signer.sign(&balance_link_message(&enc_a_m, &enc_b_m, &enc_a_b))?;
        let link_sign_2 = signer.sign(&settlement_link_message(
            &order.buyer,
            &order.seller,
            order_num,
            &order.sign_confirm,
        ))?;

        let enc_s_add_a = seal(&self.auditor, order.buyer.as_bytes())?;
        let enc_s_add_b = seal(&self.auditor, order.seller.as_bytes())?;

        order.enc_a_m = Some(enc_a_m);
        order.enc_a_b = Some(enc_a_b);
        order.rp_m = rp_m.to_bytes();
        order.rp_b = rp_b.to_bytes();
        order.link_sign_1 = link_sign_1.to_bytes();
        order.link_sign_2 = link_sign_2.to_bytes();
        order.pubs = ring;
        order.enc_s_add_a = enc_s_add_a;
        order.enc_s_add_b = enc_s_add_b;
        order.advance(OrderState::ProofsSubmitted);

        let mut batch = WriteBatch::new();
        batch.put_json(order_key(order_num), &order)?;
        self.ledger.commit(batch)?;
        debug!(order_num, elapsed_ms = started.elapsed().as_millis() as u64, "submit proofs built");
        info!(order_num, state = %order.state, ring = order.pubs.len(), "proofs submitted");
        Ok(order)
    }

    /// Re-verify everything, then move both balances in one commit.
    pub fn settle(&self, order_num: &str) -> SettlementResult<Order> {
        let mut order = self.get_order(order_num)?;
        expect_state(&order, OrderState::ProofsSubmitted, "settle")?;

        let started = Instant::now();
        let buyer_id = self.keys.identity(&order.buyer)?;
        let seller_id = self.keys.identity(&order.seller)?;
        let wallet_a = self.get_wallet(&order.buyer)?;
        let wallet_b = self.get_wallet(&order.seller)?;
        let mut good = self.get_good(&order.good_id)?;

        let enc_a_m = *required(&order.enc_a_m, "enc_a_m")?;
        let enc_a_b = *required(&order.enc_a_b, "enc_a_b")?;
        let enc_b_m = *required(&order.enc_b_m, "enc_b_m")?;
        let enc_b_b = *required(&order.enc_b_b, "enc_b_b")?;
        let comm_a = *required(&order.comm_a, "commA")?;
        let comm_b = *required(&order.comm_b, "commB")?;

        // The buyer has to be hiding in the ring, not outside it.
        if !order.pubs.contains(&buyer_id.cipher_key) {
            return gate(
                order_num,
                "ring",
                Err(SettlementError::SignatureInvalid(
                    "buyer's key is not a ring member".to_string(),
                )),
            );
        }

        // 1-3: both link signatures verify and share one hidden signer.
        let verifier = gate(order_num, "ring", LinkableRingVerifier::new(&order.pubs).map_err(Into::into))?;
        let sig1 = gate(
            order_num,
            "link_sign_1",
            verifier
                .verify_bytes(&balance_link_message(&enc_a_m, &enc_b_m, &enc_a_b), &order.link_sign_1)
                .map_err(Into::into),
        )?;
        let sig2 = gate(
            order_num,
            "link_sign_2",
            verifier
                .verify_bytes(
                    &settlement_link_message(&order.buyer, &order.seller, order_num, &order.sign_confirm),
                    &order.link_sign_2,
                )
                .map_err(Into::into),
        )?;
        if !linkable(&sig1, &sig2) {
            return gate(
                order_num,
                "linkable",
                Err(SettlementError::SignatureInvalid(
                    "link signatures come from different signers".to_string(),
                )),
            );
        }

        // 4: buyer's new balance follows from its current one.
        if self.cipher.sub(&wallet_a.balance, &enc_a_m) != enc_a_b {
            return gate(
                order_num,
                "enc_a_b",
                Err(SettlementError::ConsistencyMismatch(
                    "Enc_A_B does not follow from the buyer's current balance".to_string(),
                )),
            );
        }

        // 5: seller's confirmation.
        gate(
            order_num,
            "sign_confirm",
            self.verify_signature(
                &seller_id.verifying_key,
                &confirm_message(&enc_b_m, &enc_b_b, order_num, &order.buyer),
                &order.sign_confirm,
            ),
        )?;

        // 6: seller's new balance follows from its current one.
        if self.cipher.add(&wallet_b.balance, &enc_b_m) != enc_b_b {
            return gate(
                order_num,
                "enc_b_b",
                Err(SettlementError::ConsistencyMismatch(
                    "Enc_B_B does not follow from the seller's current balance".to_string(),
                )),
            );
        }

        // 7: both commitment signatures.
        gate(
            order_num,
            "sign_commA",
            self.verify_signature(
                &buyer_id.verifying_key,
                &commitment_message(order_num, &comm_a),
                &order.sign_comm_a,
            ),
        )?;
        gate(
            order_num,
            "sign_commB",
            self.verify_signature(
                &seller_id.verifying_key,
                &commitment_message(order_num, &comm_b),
                &order.sign_comm_b,
            ),
        )?;

        // 8: commA and commB hide the same price.
        gate(order_num, "comm_eq", self.verify_equality(&order, &comm_a, &comm_b))?;

        // 9: range proofs, with RP_m tied to commA.
        gate(order_num, "rp_m", self.verify_price_proof(&order, &comm_a))?;
        gate(order_num, "rp_b", self.verify_balance_proof(&order))?;

        order.settled = true;
        order.advance(OrderState::Settled);
        good.owner = order.buyer.clone();
        good.status = GoodStatus::Idle;

        let mut batch = WriteBatch::new();
        batch.put_json(
            wallet_key(&order.buyer),
            &Wallet {
                address: order.buyer.clone(),
                balance: enc_a_b,
            },
        )?;
        batch.put_json(
            wallet_key(&order.seller),
            &Wallet {
                address: order.seller.clone(),
                balance: enc_b_b,
            },
        )?;
        batch.put_json(order_key(order_num), &order)?;
        batch.put_json(good_key(&good.id), &good)?;
        self.ledger.commit(batch)?;

        debug!(order_num, elapsed_ms = started.elapsed().as_millis() as u64, "settle checks");
        info!(order_num, state = %order.state, "order settled");
        Ok(order)
    }

    /// Abandon an order that hasn't reached a terminal state.
    pub fn cancel(&self, order_num: &str) -> SettlementResult<Order> {
        let mut order = self.get_order(order_num)?;
        if order.state.is_terminal() {
            return Err(SettlementError::InvalidState {
                current: order.state,
                attempted: "cancel",
            });
        }
        let mut good = self.get_good(&order.good_id)?;
        good.status = GoodStatus::ForSale;
        order.advance(OrderState::Cancelled);

        let mut batch = WriteBatch::new();
        batch.put_json(order_key(order_num), &order)?;
        batch.put_json(good_key(&good.id), &good)?;
        self.ledger.commit(batch)?;
        info!(order_num, state = %order.state, "order cancelled");
        Ok(order)
    }

    /// Open the auditor escrow of a submitted or settled order.
    pub fn audit(&self, order_num: &str, auditor: &CurveKeypair) -> SettlementResult<AuditRecord> {
        let order = self.get_order(order_num)?;
        if !matches!(order.state, OrderState::ProofsSubmitted | OrderState::Settled) {
            return Err(SettlementError::InvalidState {
                current: order.state,
                attempted: "audit",
            });
        }
        let reveal = |sealed: &[u8], name: &str| -> SettlementResult<String> {
            let plain = open(auditor, required_bytes(sealed, name)?)?;
            String::from_utf8(plain)
                .map_err(|e| SettlementError::DecodeError(format!("{name}: {e}")))
        };
        let record = AuditRecord {
            order_num: order_num.to_string(),
            buyer: reveal(&order.enc_s_add_a, "enc_s_add_a")?,
            seller: reveal(&order.enc_s_add_b, "enc_s_add_b")?,
        };
        info!(order_num, "order audited");
        Ok(record)
    }

    // -- Settle check helpers ---------------------------------------------------

    fn verify_signature(
        &self,
        key: &SigningPublicKey,
        message: &[u8],
        signature: &[u8],
    ) -> SettlementResult<()> {
        let sig = Signature::from_slice(signature)?;
        key.verify(message, &sig)?;
        Ok(())
    }

    fn verify_equality(&self, order: &Order, comm_a: &Commitment, comm_b: &Commitment) -> SettlementResult<()> {
        let proof = CommitmentEqualityProof::from_bytes(&order.comm_eq_proof)?;
        proof.verify(&self.pedersen, comm_a, comm_b, order.order_num.as_bytes())?;
        Ok(())
    }

    fn verify_price_proof(&self, order: &Order, comm_a: &Commitment) -> SettlementResult<()> {
        let bundle = RangeProofBundle::from_bytes(&order.rp_m)?;
        verify_range(&self.price_ctx, &bundle, order.order_num.as_bytes())?;
        let shifted = bundle.commitment.to_point()? + self.pedersen.B;
        if shifted != comm_a.to_point()? {
            return Err(SettlementError::RangeProofInvalid(
                "RP_m does not speak about commA".to_string(),
            ));
        }
        Ok(())
    }

    fn verify_balance_proof(&self, order: &Order) -> SettlementResult<()> {
        let bundle = RangeProofBundle::from_bytes(&order.rp_b)?;
        verify_range(&self.balance_ctx, &bundle, order.order_num.as_bytes())?;
        Ok(())
    }
}

impl<L, K, R> std::fmt::Debug for SettlementProtocol<L, K, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementProtocol")
            .field("config", &self.config)
            .field("auditor", &self.auditor)
            .finish()
    }
}
