//! Digital signatures over the BLS12-381 curve using G2 as the Public Key (96 bytes)
//! and G1 as the Signature (48 bytes).
//!
//! Signatures are deterministic: signing the same message with the same key
//! always produces the same signature, which is what makes a threshold
//! signature usable as a random beacon value.

use super::{
    group::{self, equal, Element, Point, Scalar, Share},
    poly::{self, Eval, PartialSignature},
    Error,
};
use rand::RngCore;

/// Computes the public key from the private key.
pub fn compute_public(private: &Scalar) -> group::Public {
    let mut public = group::Public::one();
    public.mul(private);
    public
}

/// Returns a new keypair derived from the provided randomness.
pub fn keypair<R: RngCore>(rng: &mut R) -> (group::Private, group::Public) {
    let private = group::Private::rand(rng);
    let public = compute_public(&private);
    (private, public)
}

/// Hashes the provided message to G1.
pub fn hash_message(message: &[u8]) -> group::Signature {
    let mut hm = group::Signature::zero();
    hm.map(message);
    hm
}

/// Signs the provided message with the private key.
pub fn sign(private: &group::Private, message: &[u8]) -> group::Signature {
    let mut s = hash_message(message);
    s.mul(private);
    s
}

/// Verifies the signature with the provided public key.
pub fn verify(
    public: &group::Public,
    message: &[u8],
    signature: &group::Signature,
) -> Result<(), Error> {
    let hm = hash_message(message);
    if !equal(public, signature, &hm) {
        return Err(Error::InvalidSignature);
    }
    Ok(())
}

/// Signs the provided message with the key share.
pub fn partial_sign(private: &Share, message: &[u8]) -> PartialSignature {
    let sig = sign(&private.private, message);
    Eval {
        value: sig,
        index: private.index,
    }
}

/// Verifies the partial signature against the public polynomial.
///
/// The public key of the share is derived by evaluating the polynomial at
/// the partial signature's index.
pub fn partial_verify(
    public: &poly::Public,
    message: &[u8],
    partial: &PartialSignature,
) -> Result<(), Error> {
    if partial.index == 0 {
        return Err(Error::InvalidEvaluation);
    }
    let polynomial = public.evaluate(partial.index);
    verify(&polynomial.value, message, &partial.value)
}

/// Aggregates multiple partial signatures into a threshold signature.
///
/// Partial signatures are not verified here; callers must only provide
/// partials that passed [partial_verify].
pub fn threshold_signature_recover<'a, I>(
    threshold: u32,
    partials: I,
) -> Result<group::Signature, Error>
where
    I: IntoIterator<Item = &'a PartialSignature>,
{
    poly::Signature::recover(threshold, partials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bls12381::primitives::poly::{new_from, Private, Public};
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_sign_verify() {
        let mut rng = StdRng::seed_from_u64(0);
        let (private, public) = keypair(&mut rng);
        let message = b"hello world";
        let signature = sign(&private, message);
        verify(&public, message, &signature).unwrap();

        // Deterministic
        assert_eq!(signature, sign(&private, message));
    }

    #[test]
    fn test_verify_wrong_message() {
        let mut rng = StdRng::seed_from_u64(1);
        let (private, public) = keypair(&mut rng);
        let signature = sign(&private, b"hello");
        assert!(matches!(
            verify(&public, b"world", &signature),
            Err(Error::InvalidSignature)
        ));
    }

    #[test]
    fn test_verify_wrong_key() {
        let mut rng = StdRng::seed_from_u64(2);
        let (private, _) = keypair(&mut rng);
        let (_, other) = keypair(&mut rng);
        let signature = sign(&private, b"hello");
        assert!(verify(&other, b"hello", &signature).is_err());
    }

    fn deal(n: u32, t: u32, seed: u64) -> (Public, Vec<Share>) {
        let secret: Private = new_from(t - 1, &mut StdRng::seed_from_u64(seed));
        let commitment = Public::commit(&secret);
        let shares = (1..=n)
            .map(|i| Share {
                index: i,
                private: secret.evaluate(i).value,
            })
            .collect();
        (commitment, shares)
    }

    #[test]
    fn test_threshold_signature() {
        let (n, t) = (5, 3);
        let (commitment, shares) = deal(n, t, 3);
        let message = b"previous entry";

        let partials = shares
            .iter()
            .map(|s| partial_sign(s, message))
            .collect::<Vec<_>>();
        for p in &partials {
            partial_verify(&commitment, message, p).unwrap();
        }

        // Any threshold subset recovers the same signature
        let first = threshold_signature_recover(t, &partials[..3]).unwrap();
        let last = threshold_signature_recover(t, &partials[2..]).unwrap();
        assert_eq!(first, last);
        verify(poly::public(&commitment), message, &first).unwrap();
    }

    #[test]
    fn test_partial_verify_wrong_index() {
        let (commitment, shares) = deal(4, 2, 4);
        let mut partial = partial_sign(&shares[0], b"msg");
        partial.index = 2;
        assert!(partial_verify(&commitment, b"msg", &partial).is_err());
        partial.index = 0;
        assert!(matches!(
            partial_verify(&commitment, b"msg", &partial),
            Err(Error::InvalidEvaluation)
        ));
    }

    #[test]
    fn test_threshold_signature_insufficient() {
        let (_, shares) = deal(4, 3, 5);
        let partials = shares[..2]
            .iter()
            .map(|s| partial_sign(s, b"msg"))
            .collect::<Vec<_>>();
        assert!(matches!(
            threshold_signature_recover(3, &partials),
            Err(Error::NotEnoughPartialSignatures(3, 2))
        ));
    }
}
