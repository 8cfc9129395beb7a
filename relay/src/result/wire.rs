//! Signed result submissions exchanged between members.

use beacon_chain::{DkgResult, RequestId};
use beacon_cryptography::{Signature, Signer, Verifier};
use beacon_utils::codec::{Error as CodecError, EncodeSize, Read, ReadExt, Write};
use bytes::{Buf, BufMut};

/// Namespace for signing result submissions.
pub const NAMESPACE: &[u8] = b"_BEACON_DKG_RESULT_";

/// A member's result for a run, signed with its operator key.
#[derive(Clone, Debug, PartialEq)]
pub struct Submission<S: Signature> {
    pub request_id: RequestId,
    pub result: DkgResult,
    pub signature: S,
}

/// Bytes covered by a submission's signature.
fn payload(request_id: RequestId, result: &DkgResult) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8 + result.encode_size());
    request_id.write(&mut payload);
    result.write(&mut payload);
    payload
}

impl<S: Signature> Submission<S> {
    /// Signs `result` for `request_id`.
    pub fn sign<C: Signer<Signature = S>>(
        signer: &C,
        request_id: RequestId,
        result: DkgResult,
    ) -> Self {
        let signature = signer.sign(NAMESPACE, &payload(request_id, &result));
        Self {
            request_id,
            result,
            signature,
        }
    }

    /// Whether the submission was signed by `public_key`.
    pub fn verify<V: Verifier<Signature = S>>(&self, public_key: &V) -> bool {
        public_key.verify(
            NAMESPACE,
            &payload(self.request_id, &self.result),
            &self.signature,
        )
    }
}

impl<S: Signature> Write for Submission<S> {
    fn write(&self, buf: &mut impl BufMut) {
        self.request_id.write(buf);
        self.result.write(buf);
        self.signature.write(buf);
    }
}

impl<S: Signature> EncodeSize for Submission<S> {
    fn encode_size(&self) -> usize {
        self.request_id.encode_size() + self.result.encode_size() + self.signature.encode_size()
    }
}

/// Reading a submission is bounded by the size of the group.
impl<S: Signature> Read for Submission<S> {
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, group_size: &usize) -> Result<Self, CodecError> {
        let request_id = RequestId::read(buf)?;
        let result = DkgResult::read_cfg(buf, group_size)?;
        let signature = S::read(buf)?;
        Ok(Self {
            request_id,
            result,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_cryptography::ed25519;
    use beacon_utils::codec::{Decode, Encode};

    fn result() -> DkgResult {
        DkgResult::new(false, None, vec![true, false, false], vec![false, false, true]).unwrap()
    }

    #[test]
    fn test_sign_verify() {
        let signer = ed25519::PrivateKey::from_seed(0);
        let submission = Submission::sign(&signer, 4, result());
        assert!(submission.verify(&signer.public_key()));

        // Another operator
        let other = ed25519::PrivateKey::from_seed(1).public_key();
        assert!(!submission.verify(&other));

        // Another run
        let mut replayed = submission.clone();
        replayed.request_id = 5;
        assert!(!replayed.verify(&signer.public_key()));
    }

    #[test]
    fn test_codec() {
        let signer = ed25519::PrivateKey::from_seed(0);
        let submission = Submission::sign(&signer, 4, result());
        let decoded =
            Submission::<ed25519::Signature>::decode_cfg(submission.encode(), &3).unwrap();
        assert_eq!(decoded, submission);
        assert!(decoded.verify(&signer.public_key()));

        // Larger than the group
        assert!(Submission::<ed25519::Signature>::decode_cfg(submission.encode(), &2).is_err());
    }
}
