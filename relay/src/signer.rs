//! Sign relay entries with a share of the group key.

use crate::group::MemberIndex;
use beacon_cryptography::bls12381::primitives::{
    group::{self, Share},
    ops::{partial_sign, partial_verify, threshold_signature_recover, verify as verify_signature},
    poly::{self, PartialSignature},
    Error as PrimitivesError,
};
use std::{collections::BTreeSet, fmt};
use thiserror::Error;
use zeroize::Zeroize;

/// Errors that can occur when producing a relay entry.
#[derive(Debug, Error)]
pub enum Error {
    #[error("primitives error: {0}")]
    Primitives(#[from] PrimitivesError),
    #[error("not enough partial signatures: {0}/{1}")]
    NotEnoughPartials(usize, usize),
    #[error("invalid partial signature from {0}")]
    InvalidPartial(u32),
}

/// A member's share of a group key, produced by a successful key generation.
pub struct ThresholdSigner {
    member: MemberIndex,
    public: poly::Public,
    share: Share,
}

impl ThresholdSigner {
    /// Creates a signer from the group's public polynomial and a share of it.
    pub fn new(member: MemberIndex, public: poly::Public, share: Share) -> Self {
        Self {
            member,
            public,
            share,
        }
    }

    pub fn member(&self) -> MemberIndex {
        self.member
    }

    pub fn group_public_key(&self) -> &group::Public {
        poly::public(&self.public)
    }

    pub fn public(&self) -> &poly::Public {
        &self.public
    }

    /// Number of partial signatures required to produce an entry.
    pub fn threshold(&self) -> u32 {
        self.public.required()
    }

    /// Signs `previous_entry` with this member's share.
    pub fn sign(&self, previous_entry: &[u8]) -> PartialSignature {
        partial_sign(&self.share, previous_entry)
    }

    /// Checks a peer's partial signature over `previous_entry`.
    pub fn verify_partial(&self, previous_entry: &[u8], partial: &PartialSignature) -> bool {
        partial_verify(&self.public, previous_entry, partial).is_ok()
    }

    /// Combines partial signatures over `previous_entry` into a relay entry.
    ///
    /// Invalid partials are rejected, duplicates (by index) are counted once,
    /// and at least `threshold` distinct valid partials are required. The
    /// combined signature is checked against the group key before it is
    /// returned.
    pub fn combine<'a, I>(
        &self,
        previous_entry: &[u8],
        partials: I,
    ) -> Result<group::Signature, Error>
    where
        I: IntoIterator<Item = &'a PartialSignature>,
    {
        let mut seen = BTreeSet::new();
        let mut valid = Vec::new();
        for partial in partials {
            if !seen.insert(partial.index) {
                continue;
            }
            if !self.verify_partial(previous_entry, partial) {
                return Err(Error::InvalidPartial(partial.index));
            }
            valid.push(partial);
        }
        let threshold = self.threshold();
        if valid.len() < threshold as usize {
            return Err(Error::NotEnoughPartials(valid.len(), threshold as usize));
        }
        let signature = threshold_signature_recover(threshold, valid)?;
        verify_signature(self.group_public_key(), previous_entry, &signature)?;
        Ok(signature)
    }
}

impl fmt::Debug for ThresholdSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThresholdSigner")
            .field("member", &self.member)
            .field("group_public_key", self.group_public_key())
            .finish_non_exhaustive()
    }
}

impl Drop for ThresholdSigner {
    fn drop(&mut self) {
        self.share.zeroize();
    }
}

/// Whether `value` is the group's signature over `previous_entry`.
pub fn verify(
    group_public_key: &group::Public,
    previous_entry: &[u8],
    value: &group::Signature,
) -> bool {
    verify_signature(group_public_key, previous_entry, value).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_cryptography::bls12381::primitives::poly::new_from;
    use rand::{rngs::StdRng, SeedableRng};

    fn signers(n: u32, t: u32) -> Vec<ThresholdSigner> {
        let mut rng = StdRng::seed_from_u64(0);
        let secret = new_from(t - 1, &mut rng);
        let public = poly::Public::commit(&secret);
        (1..=n)
            .map(|i| {
                ThresholdSigner::new(
                    MemberIndex::new(i),
                    public.clone(),
                    Share {
                        index: i,
                        private: secret.evaluate(i).value,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_combine() {
        let signers = signers(5, 3);
        let entry = b"previous entry";
        let partials = signers[1..4].iter().map(|s| s.sign(entry)).collect::<Vec<_>>();
        let value = signers[0].combine(entry, &partials).unwrap();
        assert!(verify(signers[0].group_public_key(), entry, &value));

        // Any subset of the same size produces the same entry
        let others = signers[2..5].iter().map(|s| s.sign(entry)).collect::<Vec<_>>();
        assert_eq!(signers[4].combine(entry, &others).unwrap(), value);

        // A different previous entry produces a different value
        let partials = signers[..3].iter().map(|s| s.sign(b"other")).collect::<Vec<_>>();
        let other = signers[0].combine(b"other", &partials).unwrap();
        assert_ne!(other, value);
        assert!(!verify(signers[0].group_public_key(), entry, &other));
    }

    #[test]
    fn test_not_enough_partials() {
        let signers = signers(5, 3);
        let entry = b"previous entry";
        let partial = signers[0].sign(entry);

        // Duplicates are counted once
        let partials = vec![partial.clone(), partial, signers[1].sign(entry)];
        assert!(matches!(
            signers[0].combine(entry, &partials),
            Err(Error::NotEnoughPartials(2, 3))
        ));
    }

    #[test]
    fn test_invalid_partial() {
        let signers = signers(5, 3);
        let entry = b"previous entry";
        let mut partials = signers[..3].iter().map(|s| s.sign(entry)).collect::<Vec<_>>();
        partials[1] = signers[1].sign(b"something else");
        assert!(!signers[0].verify_partial(entry, &partials[1]));
        assert!(matches!(
            signers[0].combine(entry, &partials),
            Err(Error::InvalidPartial(2))
        ));
    }

    #[test]
    fn test_debug_redacts_share() {
        let signers = signers(3, 2);
        let debug = format!("{:?}", signers[0]);
        assert!(debug.contains("ThresholdSigner"));
        assert!(!debug.contains("private"));
    }
}
