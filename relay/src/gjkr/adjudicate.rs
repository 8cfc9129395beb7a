//! Resolution of accusations.
//!
//! An accusation reveals the accuser's ephemeral private key for the accused
//! dealer, which lets every member decrypt the disputed share and check it
//! against the dealer's public commitment. The outcome depends only on
//! broadcast data, so every honest member reaches the same verdict.

use super::ephemeral;
use crate::group::MemberIndex;
use beacon_cryptography::bls12381::primitives::{
    group::{Element, Private, G1, G2},
    poly,
};

/// The member an accusation disqualifies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// The accusation was unfounded (or its evidence did not match).
    Accuser,
    /// The dealer sent an invalid share.
    Dealer,
}

/// Everything broadcast that bears on one accusation.
pub struct Evidence<'a> {
    pub request_id: u64,
    pub dealer: MemberIndex,
    pub accuser: MemberIndex,

    /// Ephemeral private key the accuser revealed for the dealer.
    pub revealed: &'a Private,
    /// Ephemeral public key the accuser published for the dealer.
    pub accuser_public: &'a G1,
    /// Ephemeral public key the dealer published for the accuser.
    pub dealer_public: &'a G1,

    /// The dealer's commitment.
    pub commitment: &'a poly::Public,
    /// The share the dealer encrypted for the accuser.
    pub ciphertext: &'a [u8],
}

/// Decides who is at fault for an accusation.
///
/// * If the revealed key does not match the key the accuser published, the
///   accuser is at fault.
/// * If the share does not decrypt, or does not match the commitment, the
///   dealer is at fault.
/// * Otherwise the share was valid and the accuser is at fault.
pub fn adjudicate(evidence: &Evidence<'_>) -> Verdict {
    if ephemeral::public(evidence.revealed) != *evidence.accuser_public {
        return Verdict::Accuser;
    }
    let key = ephemeral::symmetric_key(
        evidence.request_id,
        evidence.dealer,
        evidence.accuser,
        evidence.revealed,
        evidence.dealer_public,
    );
    let Some(share) = ephemeral::decrypt(&key, evidence.ciphertext) else {
        return Verdict::Dealer;
    };
    if !verify_share(evidence.commitment, evidence.accuser, &share) {
        return Verdict::Dealer;
    }
    Verdict::Accuser
}

/// Checks that `share` is the evaluation of the committed polynomial at
/// `recipient`.
pub fn verify_share(commitment: &poly::Public, recipient: MemberIndex, share: &Private) -> bool {
    let mut expected = G2::one();
    expected.mul(share);
    commitment.evaluate(recipient.get()).value == expected
}
