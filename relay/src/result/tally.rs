use super::wire::Submission;
use crate::group::{Group, MemberIndex};
use beacon_chain::{DkgResult, RequestId};
use beacon_cryptography::PublicKey;
use std::collections::BTreeMap;
use thiserror::Error;

/// Reasons a submission is not counted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    #[error("sender is not a member")]
    NotMember,
    #[error("submission for another run")]
    WrongRequest,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("result does not fit the group")]
    InvalidResult,
    #[error("member already submitted")]
    Duplicate,
}

/// Results submitted by the members of a group, at most one per member.
pub struct Tally<P: PublicKey> {
    request_id: RequestId,
    members: Vec<P>,
    threshold: usize,

    submissions: BTreeMap<MemberIndex, DkgResult>,
}

impl<P: PublicKey> Tally<P> {
    pub fn new(request_id: RequestId, group: &Group<P>) -> Self {
        Self {
            request_id,
            members: group.members().to_vec(),
            threshold: group.threshold(),
            submissions: BTreeMap::new(),
        }
    }

    /// Counts a submission received from `sender`.
    ///
    /// Only the first submission of each member counts.
    pub fn add(&mut self, sender: &P, submission: Submission<P::Signature>) -> Result<(), Rejected> {
        let index = self
            .members
            .iter()
            .position(|m| m == sender)
            .map(MemberIndex::from_position)
            .ok_or(Rejected::NotMember)?;
        if submission.request_id != self.request_id {
            return Err(Rejected::WrongRequest);
        }
        if self.submissions.contains_key(&index) {
            return Err(Rejected::Duplicate);
        }
        if !submission.verify(sender) {
            return Err(Rejected::InvalidSignature);
        }
        submission
            .result
            .validate(self.members.len(), self.threshold)
            .map_err(|_| Rejected::InvalidResult)?;
        self.submissions.insert(index, submission.result);
        Ok(())
    }

    /// Number of submissions counted.
    pub fn len(&self) -> usize {
        self.submissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.submissions.is_empty()
    }

    /// Returns the result supported by a strict majority of the counted
    /// submissions, or `own` if there is none.
    pub fn winner(&self, own: &DkgResult) -> DkgResult {
        let mut counts: Vec<(&DkgResult, usize)> = Vec::new();
        for result in self.submissions.values() {
            match counts.iter_mut().find(|(r, _)| *r == result) {
                Some((_, count)) => *count += 1,
                None => counts.push((result, 1)),
            }
        }
        counts
            .into_iter()
            .find(|(_, count)| 2 * count > self.submissions.len())
            .map_or_else(|| own.clone(), |(result, _)| result.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_cryptography::{ed25519, Signer};

    const REQUEST: RequestId = 3;

    fn setup() -> (Vec<ed25519::PrivateKey>, Tally<ed25519::PublicKey>) {
        let signers = (0..5).map(ed25519::PrivateKey::from_seed).collect::<Vec<_>>();
        let group = Group::new(signers.iter().map(|s| s.public_key()).collect(), 3).unwrap();
        (signers, Tally::new(REQUEST, &group))
    }

    fn failed(inactive: usize) -> DkgResult {
        let mut flags = vec![false; 5];
        flags[inactive] = true;
        DkgResult::new(false, None, vec![false; 5], flags).unwrap()
    }

    fn submit(
        tally: &mut Tally<ed25519::PublicKey>,
        signer: &ed25519::PrivateKey,
        result: DkgResult,
    ) -> Result<(), Rejected> {
        tally.add(&signer.public_key(), Submission::sign(signer, REQUEST, result))
    }

    #[test]
    fn test_majority_wins() {
        let (signers, mut tally) = setup();
        for signer in &signers[..3] {
            submit(&mut tally, signer, failed(0)).unwrap();
        }
        submit(&mut tally, &signers[3], failed(1)).unwrap();
        assert_eq!(tally.len(), 4);
        assert_eq!(tally.winner(&failed(1)), failed(0));
    }

    #[test]
    fn test_no_majority_keeps_own() {
        let (signers, mut tally) = setup();
        submit(&mut tally, &signers[0], failed(0)).unwrap();
        submit(&mut tally, &signers[1], failed(0)).unwrap();
        submit(&mut tally, &signers[2], failed(1)).unwrap();
        submit(&mut tally, &signers[3], failed(1)).unwrap();
        assert_eq!(tally.winner(&failed(2)), failed(2));
    }

    #[test]
    fn test_first_submission_counts() {
        let (signers, mut tally) = setup();
        submit(&mut tally, &signers[0], failed(0)).unwrap();
        assert_eq!(
            submit(&mut tally, &signers[0], failed(1)),
            Err(Rejected::Duplicate)
        );
        assert_eq!(tally.winner(&failed(1)), failed(0));
    }

    #[test]
    fn test_rejections() {
        let (signers, mut tally) = setup();

        // Not a member
        let outsider = ed25519::PrivateKey::from_seed(99);
        assert_eq!(
            submit(&mut tally, &outsider, failed(0)),
            Err(Rejected::NotMember)
        );

        // Another run
        let submission = Submission::sign(&signers[0], REQUEST + 1, failed(0));
        assert_eq!(
            tally.add(&signers[0].public_key(), submission),
            Err(Rejected::WrongRequest)
        );

        // Signed by someone else
        let submission = Submission::sign(&signers[1], REQUEST, failed(0));
        assert_eq!(
            tally.add(&signers[0].public_key(), submission),
            Err(Rejected::InvalidSignature)
        );

        // Wrong group size
        let result = DkgResult::new(false, None, vec![false; 4], vec![false; 4]).unwrap();
        assert_eq!(
            submit(&mut tally, &signers[0], result),
            Err(Rejected::InvalidResult)
        );

        assert!(tally.is_empty());
    }
}
