//! Byte strings that get signed.
//!
//! Signer and verifier must build these identically, so they live in one
//! place. Variable-length fields are length-prefixed (u32 BE); ciphertexts
//! and commitments are fixed-width and go in raw.

use crate::crypto::Ciphertext;
use crate::zkp::Commitment;

fn push_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn push_bytes(buf: &mut Vec<u8>, b: &[u8]) {
    buf.extend_from_slice(&(b.len() as u32).to_be_bytes());
    buf.extend_from_slice(b);
}

/// Seller confirmation: `Enc_B_M ‖ Enc_B_B ‖ orderNum ‖ buyer`.
pub fn confirm_message(
    enc_b_m: &Ciphertext,
    enc_b_b: &Ciphertext,
    order_num: &str,
    buyer: &str,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128 + order_num.len() + buyer.len() + 8);
    buf.extend_from_slice(&enc_b_m.to_bytes());
    buf.extend_from_slice(&enc_b_b.to_bytes());
    push_str(&mut buf, order_num);
    push_str(&mut buf, buyer);
    buf
}

/// A party's signature over its own price commitment: `orderNum ‖ comm`.
pub fn commitment_message(order_num: &str, commitment: &Commitment) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + order_num.len() + 32);
    push_str(&mut buf, order_num);
    buf.extend_from_slice(commitment.as_bytes());
    buf
}

/// First link signature: `Enc_A_M ‖ Enc_B_M ‖ Enc_A_B`.
pub fn balance_link_message(
    enc_a_m: &Ciphertext,
    enc_b_m: &Ciphertext,
    enc_a_b: &Ciphertext,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(192);
    buf.extend_from_slice(&enc_a_m.to_bytes());
    buf.extend_from_slice(&enc_b_m.to_bytes());
    buf.extend_from_slice(&enc_a_b.to_bytes());
    buf
}

/// Second link signature: `buyer ‖ seller ‖ orderNum ‖ signConfirm`.
pub fn settlement_link_message(
    buyer: &str,
    seller: &str,
    order_num: &str,
    sign_confirm: &[u8],
) -> Vec<u8> {
    let mut buf = Vec::new();
    push_str(&mut buf, buyer);
    push_str(&mut buf, seller);
    push_str(&mut buf, order_num);
    push_bytes(&mut buf, sign_confirm);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_do_not_bleed() {
        let a = settlement_link_message("ab", "c", "n", b"s");
        let b = settlement_link_message("a", "bc", "n", b"s");
        assert_ne!(a, b);
    }

    #[test]
    fn link_message_changes_with_confirmation() {
        let a = settlement_link_message("a", "b", "n", b"sig-1");
        let b = settlement_link_message("a", "b", "n", b"sig-2");
        assert_ne!(a, b);
    }
}
