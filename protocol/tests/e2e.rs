//! End-to-end tests for the Umbra settlement protocol.
//!
//! Every test drives real parties through the public API: generate keys,
//! seed a ledger, walk an order from proposal to settlement (or to one of
//! the ways it can fail), and then look at what actually landed in the
//! world state. Balances are checked by decrypting, never by peeking.
//!
//! Each test builds its own ledger and key store. No shared state.

use rand::rngs::OsRng;

use umbra_protocol::config::ProtocolConfig;
use umbra_protocol::crypto::{
    CryptoError, CurveKeypair, CurvePublicKey, HomomorphicCipher, LinkableRingSigner,
};
use umbra_protocol::keystore::{FileKeyStore, KeyStore, MemoryKeyStore, Party};
use umbra_protocol::ledger::{composite_key, put_json, Ledger, MemoryLedger, SledLedger};
use umbra_protocol::records::{Genesis, GoodStatus, Order, OrderState, SellerOption};
use umbra_protocol::registry::{RegistryRingSource, RingSource, StaticRingSource};
use umbra_protocol::settlement::messages::{balance_link_message, settlement_link_message};
use umbra_protocol::{ErrorKind, SettlementProtocol};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const TEST_MAX_AMOUNT: u64 = 1 << 16;

struct World<L, K, R> {
    proto: SettlementProtocol<L, K, R>,
    alice: String,
    bob: String,
    auditor: CurveKeypair,
}

fn decoys(n: usize) -> Vec<CurvePublicKey> {
    (0..n).map(|_| CurveKeypair::generate().public_key()).collect()
}

fn test_config() -> ProtocolConfig {
    ProtocolConfig {
        max_amount: TEST_MAX_AMOUNT,
        ..Default::default()
    }
}

/// Alice buys, Bob sells. Bob owns the demo catalogue.
fn build<L: Ledger, K: KeyStore, R: RingSource>(
    ledger: L,
    keys: K,
    rings: R,
    alice_funds: u64,
    bob_funds: u64,
) -> World<L, K, R> {
    let alice = keys.insert(Party::generate("alice")).unwrap();
    let bob = keys.insert(Party::generate("bob")).unwrap();
    let auditor = CurveKeypair::generate();
    let proto =
        SettlementProtocol::new(ledger, keys, rings, auditor.public_key(), test_config()).unwrap();
    proto.init_ledger(&Genesis::demo(&bob, decoys(6))).unwrap();
    proto.create_wallet(&alice, alice_funds).unwrap();
    proto.create_wallet(&bob, bob_funds).unwrap();
    World {
        proto,
        alice,
        bob,
        auditor,
    }
}

fn memory_world() -> World<MemoryLedger, MemoryKeyStore, RegistryRingSource> {
    build(MemoryLedger::new(), MemoryKeyStore::new(), RegistryRingSource, 100, 50)
}

/// Walk an order up to (and including) the buyer's submission.
fn submitted<L: Ledger, K: KeyStore, R: RingSource>(
    w: &World<L, K, R>,
    good_id: &str,
) -> String {
    let num = w.proto.propose(&w.alice, &w.bob, good_id).unwrap().order_num;
    w.proto.seller_decide(&num, SellerOption::Accept).unwrap();
    w.proto.buyer_commit(&num).unwrap();
    w.proto.buyer_submit(&num).unwrap();
    num
}

/// Overwrite a stored order, the way a misbehaving client would.
fn overwrite_order<L: Ledger, K: KeyStore, R: RingSource>(w: &World<L, K, R>, order: &Order) {
    let key = composite_key("order", &[&order.order_num]);
    put_json(w.proto.ledger(), &key, order).unwrap();
}

fn assert_balances<L: Ledger, K: KeyStore, R: RingSource>(
    w: &World<L, K, R>,
    alice: u64,
    bob: u64,
) {
    assert_eq!(w.proto.wallet_balance(&w.alice).unwrap(), alice);
    assert_eq!(w.proto.wallet_balance(&w.bob).unwrap(), bob);
}

// ---------------------------------------------------------------------------
// 1. Happy Path
// ---------------------------------------------------------------------------

#[test]
fn trade_settles_and_moves_balances() {
    let w = memory_world();
    w.proto.list_good("10001", 20).unwrap();

    let order = w.proto.propose(&w.alice, &w.bob, "10001").unwrap();
    assert_eq!(order.state, OrderState::Proposed);
    assert_eq!(order.order_num.len(), 64);
    let num = order.order_num;

    let accepted = w.proto.seller_decide(&num, SellerOption::Accept).unwrap();
    assert_eq!(accepted.seller_opt, SellerOption::Accept);
    assert!(accepted.comm_b.is_some());

    let committed = w.proto.buyer_commit(&num).unwrap();
    assert_eq!(committed.state, OrderState::CommitsExchanged);
    assert_eq!(committed.comm_eq_proof.len(), 64);

    let proofs = w.proto.buyer_submit(&num).unwrap();
    assert_eq!(proofs.state, OrderState::ProofsSubmitted);
    assert_eq!(proofs.pubs.len(), 6);
    assert!(!proofs.link_sign_1.is_empty());

    // Nothing moves until settle.
    assert_balances(&w, 100, 50);

    let settled = w.proto.settle(&num).unwrap();
    assert!(settled.settled);
    assert_eq!(settled.state, OrderState::Settled);
    assert_balances(&w, 80, 70);

    let good = w.proto.get_good("10001").unwrap();
    assert_eq!(good.owner, w.alice);
    assert_eq!(good.status, GoodStatus::Idle);
}

#[test]
fn settled_order_cannot_settle_twice() {
    let w = memory_world();
    w.proto.list_good("10001", 20).unwrap();
    let num = submitted(&w, "10001");
    w.proto.settle(&num).unwrap();

    let err = w.proto.settle(&num).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_balances(&w, 80, 70);
}

#[test]
fn settled_good_can_be_sold_back() {
    let w = memory_world();
    w.proto.list_good("10001", 20).unwrap();
    let num = submitted(&w, "10001");
    w.proto.settle(&num).unwrap();
    assert_eq!(w.proto.get_good("10001").unwrap().status, GoodStatus::Idle);

    // Alice now owns the good and sells it to Bob at the same price.
    let back = w.proto.propose(&w.bob, &w.alice, "10001").unwrap().order_num;
    w.proto.seller_decide(&back, SellerOption::Accept).unwrap();
    w.proto.buyer_commit(&back).unwrap();
    w.proto.buyer_submit(&back).unwrap();
    w.proto.settle(&back).unwrap();

    assert_balances(&w, 100, 50);
    assert_eq!(w.proto.get_good("10001").unwrap().owner, w.bob);
}

#[test]
fn ring_hides_buyer_among_decoys() {
    let w = memory_world();
    let num = submitted(&w, "10001");
    let order = w.proto.get_order(&num).unwrap();

    let alice = w.proto.keystore().party(&w.alice).unwrap();
    assert!(order.pubs.contains(&alice.cipher.public_key()));
    assert!(order.pubs.windows(2).all(|p| p[0] < p[1]));
}

#[test]
fn static_ring_source_works_end_to_end() {
    let w = build(
        MemoryLedger::new(),
        MemoryKeyStore::new(),
        StaticRingSource::new(decoys(3)),
        100,
        50,
    );
    let num = submitted(&w, "10001");
    assert_eq!(w.proto.get_order(&num).unwrap().pubs.len(), 4);
    w.proto.settle(&num).unwrap();
    assert_balances(&w, 50, 100);
}

// ---------------------------------------------------------------------------
// 2. Stale Balances
// ---------------------------------------------------------------------------

#[test]
fn stale_enc_a_b_is_refused_without_moving_funds() {
    let w = memory_world();
    w.proto.list_good("10000", 20).unwrap();

    // Both orders are proven against Alice's balance of 100.
    let first = submitted(&w, "10000");
    let second = submitted(&w, "10001");

    w.proto.settle(&first).unwrap();
    assert_balances(&w, 80, 70);

    let err = w.proto.settle(&second).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConsistencyMismatch);
    assert_balances(&w, 80, 70);

    let order = w.proto.get_order(&second).unwrap();
    assert_eq!(order.state, OrderState::ProofsSubmitted);
    assert!(!order.settled);
    assert_eq!(w.proto.get_good("10001").unwrap().owner, w.bob);
}

#[test]
fn seller_balance_moving_after_acceptance_is_refused() {
    let w = memory_world();
    w.proto.list_good("10000", 30).unwrap();
    let carol = w.proto.keystore().insert(Party::generate("carol")).unwrap();
    w.proto.create_wallet(&carol, 100).unwrap();

    // Alice's order is proven while Bob still holds 50.
    let num = submitted(&w, "10001");

    // Carol buys from Bob first. Only Bob's balance moves.
    let other = w.proto.propose(&carol, &w.bob, "10000").unwrap().order_num;
    w.proto.seller_decide(&other, SellerOption::Accept).unwrap();
    w.proto.buyer_commit(&other).unwrap();
    w.proto.buyer_submit(&other).unwrap();
    w.proto.settle(&other).unwrap();
    assert_balances(&w, 100, 80);

    let err = w.proto.settle(&num).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConsistencyMismatch);
    assert_balances(&w, 100, 80);
    assert_eq!(w.proto.wallet_balance(&carol).unwrap(), 70);
    assert_eq!(
        w.proto.get_order(&num).unwrap().state,
        OrderState::ProofsSubmitted
    );
}

// ---------------------------------------------------------------------------
// 3. Rejection and Cancellation
// ---------------------------------------------------------------------------

#[test]
fn seller_rejection_releases_good() {
    let w = memory_world();
    let num = w.proto.propose(&w.alice, &w.bob, "10001").unwrap().order_num;
    assert_eq!(w.proto.get_good("10001").unwrap().status, GoodStatus::Locked);

    let order = w.proto.seller_decide(&num, SellerOption::Reject).unwrap();
    assert_eq!(order.state, OrderState::Rejected);
    assert_eq!(order.seller_opt, SellerOption::Reject);
    assert_eq!(w.proto.get_good("10001").unwrap().status, GoodStatus::ForSale);

    assert_eq!(
        w.proto.buyer_commit(&num).unwrap_err().kind(),
        ErrorKind::InvalidState
    );
    assert_eq!(
        w.proto.seller_decide(&num, SellerOption::Accept).unwrap_err().kind(),
        ErrorKind::InvalidState
    );
    assert_balances(&w, 100, 50);

    // The good can be sold again.
    w.proto.propose(&w.alice, &w.bob, "10001").unwrap();
}

#[test]
fn cancel_after_submission_leaves_balances() {
    let w = memory_world();
    let num = submitted(&w, "10001");
    w.proto.cancel(&num).unwrap();

    assert_eq!(w.proto.settle(&num).unwrap_err().kind(), ErrorKind::InvalidState);
    assert_balances(&w, 100, 50);
    assert_eq!(w.proto.get_good("10001").unwrap().status, GoodStatus::ForSale);
}

#[test]
fn buyer_without_funds_cannot_submit() {
    let w = build(MemoryLedger::new(), MemoryKeyStore::new(), RegistryRingSource, 10, 0);
    let num = w.proto.propose(&w.alice, &w.bob, "10001").unwrap().order_num;
    w.proto.seller_decide(&num, SellerOption::Accept).unwrap();
    w.proto.buyer_commit(&num).unwrap();
    assert_eq!(
        w.proto.buyer_submit(&num).unwrap_err().kind(),
        ErrorKind::InsufficientFunds
    );
}

// ---------------------------------------------------------------------------
// 4. Tampering
// ---------------------------------------------------------------------------

#[test]
fn range_proof_from_another_order_is_rejected() {
    let w = memory_world();
    w.proto.list_good("10000", 50).unwrap();
    let victim = submitted(&w, "10001");
    let donor = submitted(&w, "10000");

    let donor_order = w.proto.get_order(&donor).unwrap();
    let mut order = w.proto.get_order(&victim).unwrap();
    order.rp_m = donor_order.rp_m;
    overwrite_order(&w, &order);

    assert_eq!(
        w.proto.settle(&victim).unwrap_err().kind(),
        ErrorKind::RangeProofInvalid
    );
    assert_balances(&w, 100, 50);
}

#[test]
fn equality_proof_from_another_order_is_rejected() {
    let w = memory_world();
    w.proto.list_good("10000", 50).unwrap();
    let victim = submitted(&w, "10001");
    let donor = submitted(&w, "10000");

    let donor_order = w.proto.get_order(&donor).unwrap();
    let mut order = w.proto.get_order(&victim).unwrap();
    order.comm_eq_proof = donor_order.comm_eq_proof;
    overwrite_order(&w, &order);

    assert_eq!(
        w.proto.settle(&victim).unwrap_err().kind(),
        ErrorKind::ConsistencyMismatch
    );
}

#[test]
fn forged_commitment_signature_is_rejected() {
    let w = memory_world();
    let num = submitted(&w, "10001");
    let mut order = w.proto.get_order(&num).unwrap();
    order.sign_comm_a[0] ^= 0x01;
    overwrite_order(&w, &order);

    assert_eq!(
        w.proto.settle(&num).unwrap_err().kind(),
        ErrorKind::SignatureInvalid
    );
}

#[test]
fn truncated_link_signature_is_rejected() {
    let w = memory_world();
    let num = submitted(&w, "10001");
    let mut order = w.proto.get_order(&num).unwrap();
    order.link_sign_2.truncate(64);
    overwrite_order(&w, &order);

    let err = w.proto.settle(&num).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DecodeError);
    assert_balances(&w, 100, 50);
}

#[test]
fn swapped_ring_breaks_link_signatures() {
    let w = memory_world();
    let num = submitted(&w, "10001");
    let mut order = w.proto.get_order(&num).unwrap();
    order.pubs = decoys(order.pubs.len());
    overwrite_order(&w, &order);

    assert_eq!(
        w.proto.settle(&num).unwrap_err().kind(),
        ErrorKind::SignatureInvalid
    );
}

#[test]
fn link_signatures_from_different_members_do_not_link() {
    let mallory = CurveKeypair::generate();
    let mut ring = decoys(2);
    ring.push(mallory.public_key());
    let w = build(
        MemoryLedger::new(),
        MemoryKeyStore::new(),
        StaticRingSource::new(ring),
        100,
        50,
    );
    let num = submitted(&w, "10001");
    let mut order = w.proto.get_order(&num).unwrap();
    assert!(order.pubs.contains(&mallory.public_key()));

    // A perfectly valid signature, just not from the buyer.
    let msg = settlement_link_message(&order.buyer, &order.seller, &num, &order.sign_confirm);
    let signer = LinkableRingSigner::new(&mallory, &order.pubs).unwrap();
    order.link_sign_2 = signer.sign(&msg).unwrap().to_bytes();
    overwrite_order(&w, &order);

    assert_eq!(
        w.proto.settle(&num).unwrap_err().kind(),
        ErrorKind::SignatureInvalid
    );
    assert_balances(&w, 100, 50);
}

#[test]
fn ring_without_the_buyer_is_refused() {
    let w = memory_world();
    let num = submitted(&w, "10001");
    let mut order = w.proto.get_order(&num).unwrap();

    // Swap in a ring Mallory controls and re-sign both messages.
    let mallory = CurveKeypair::generate();
    let mut ring = decoys(order.pubs.len() - 1);
    ring.push(mallory.public_key());
    ring.sort();
    let signer = LinkableRingSigner::new(&mallory, &ring).unwrap();
    let balance_msg = balance_link_message(
        order.enc_a_m.as_ref().unwrap(),
        order.enc_b_m.as_ref().unwrap(),
        order.enc_a_b.as_ref().unwrap(),
    );
    let settle_msg =
        settlement_link_message(&order.buyer, &order.seller, &num, &order.sign_confirm);
    order.link_sign_1 = signer.sign(&balance_msg).unwrap().to_bytes();
    order.link_sign_2 = signer.sign(&settle_msg).unwrap().to_bytes();
    order.pubs = ring;
    overwrite_order(&w, &order);

    assert_eq!(
        w.proto.settle(&num).unwrap_err().kind(),
        ErrorKind::SignatureInvalid
    );
    assert_balances(&w, 100, 50);
    assert!(!w.proto.get_order(&num).unwrap().settled);
}

// ---------------------------------------------------------------------------
// 5. Bounds and Audit
// ---------------------------------------------------------------------------

#[test]
fn decrypt_outside_bound_is_out_of_range() {
    let cipher = HomomorphicCipher::new(1 << 10).unwrap();
    let kp = CurveKeypair::generate();
    let ct = cipher.encrypt(&kp.public_key(), 5_000).unwrap();
    assert!(matches!(
        cipher.decrypt(&kp, &ct),
        Err(CryptoError::AmountOutOfRange { max: 1024 })
    ));

    let w = memory_world();
    let err = w.proto.create_wallet(&w.alice, TEST_MAX_AMOUNT + 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AmountOutOfRange);
}

#[test]
fn auditor_recovers_parties() {
    let w = memory_world();
    let num = submitted(&w, "10001");
    let record = w.proto.audit(&num, &w.auditor).unwrap();
    assert_eq!(record.buyer, w.alice);
    assert_eq!(record.seller, w.bob);

    w.proto.settle(&num).unwrap();
    assert_eq!(w.proto.audit(&num, &w.auditor).unwrap(), record);

    let nosy = CurveKeypair::generate_with(&mut OsRng);
    assert_eq!(
        w.proto.audit(&num, &nosy).unwrap_err().kind(),
        ErrorKind::DecodeError
    );
}

// ---------------------------------------------------------------------------
// 6. Persistence
// ---------------------------------------------------------------------------

#[test]
fn settled_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("ledger");
    let keys_path = dir.path().join("keys");

    let (alice, bob, num) = {
        let w = build(
            SledLedger::open(&ledger_path).unwrap(),
            FileKeyStore::open(&keys_path).unwrap(),
            RegistryRingSource,
            100,
            50,
        );
        w.proto.list_good("10001", 20).unwrap();
        let num = submitted(&w, "10001");
        w.proto.settle(&num).unwrap();
        (w.alice, w.bob, num)
    };

    let proto = SettlementProtocol::new(
        SledLedger::open(&ledger_path).unwrap(),
        FileKeyStore::open(&keys_path).unwrap(),
        RegistryRingSource,
        CurveKeypair::generate().public_key(),
        test_config(),
    )
    .unwrap();

    assert_eq!(proto.wallet_balance(&alice).unwrap(), 80);
    assert_eq!(proto.wallet_balance(&bob).unwrap(), 70);
    assert!(proto.get_order(&num).unwrap().settled);
    assert_eq!(proto.orders_by_buyer(&alice).unwrap().len(), 1);
    assert_eq!(proto.keystore().identities().len(), 2);
}
