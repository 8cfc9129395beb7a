//! Ed25519 operator keys.
//!
//! This implementation uses the `ed25519-consensus` crate to adhere to a strict
//! set of validation rules for Ed25519 signatures (which is necessary for
//! stability in a consensus context). You can read more about this
//! [here](https://hdevalence.ca/blog/2020-10-04-its-25519am).
//!
//! # Example
//! ```rust
//! use beacon_cryptography::{ed25519::PrivateKey, Signer, Verifier};
//! use rand::rngs::OsRng;
//!
//! // Generate a new private key
//! let signer = PrivateKey::from_rng(&mut OsRng);
//!
//! // Sign a message
//! let namespace = b"demo";
//! let msg = b"hello, world!";
//! let signature = signer.sign(namespace, msg);
//!
//! // Verify the signature
//! assert!(signer.public_key().verify(namespace, msg, &signature));
//! ```

use crate::{Signer, Verifier};
use beacon_utils::{
    codec::{Error as CodecError, EncodeSize, Read, ReadExt, Write},
    hex, union_unique,
};
use bytes::{Buf, BufMut};
use rand::{rngs::StdRng, CryptoRng, Rng, SeedableRng};
use std::{
    cmp::Ordering,
    fmt::{Debug, Display, Formatter},
    hash::{Hash, Hasher},
};
use zeroize::Zeroize;

const CURVE_NAME: &str = "ed25519";
const PRIVATE_KEY_LENGTH: usize = 32;
const PUBLIC_KEY_LENGTH: usize = 32;
const SIGNATURE_LENGTH: usize = 64;

/// Ed25519 Private Key.
#[derive(Clone)]
pub struct PrivateKey {
    raw: [u8; PRIVATE_KEY_LENGTH],
    key: ed25519_consensus::SigningKey,
}

impl PrivateKey {
    /// Create a [PrivateKey] from a seed.
    ///
    /// # Warning
    ///
    /// This function is insecure and should only be used for devnets
    /// and testing.
    pub fn from_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::from_rng(&mut rng)
    }

    /// Create a fresh [PrivateKey] using the supplied RNG.
    pub fn from_rng<R: Rng + CryptoRng>(rng: &mut R) -> Self {
        Self::from(ed25519_consensus::SigningKey::new(rng))
    }
}

impl Signer for PrivateKey {
    type Signature = Signature;
    type PublicKey = PublicKey;

    fn public_key(&self) -> PublicKey {
        PublicKey::from(self.key.verification_key())
    }

    fn sign(&self, namespace: &[u8], msg: &[u8]) -> Signature {
        Signature::from(self.key.sign(&union_unique(namespace, msg)))
    }
}

impl From<ed25519_consensus::SigningKey> for PrivateKey {
    fn from(key: ed25519_consensus::SigningKey) -> Self {
        let raw = key.to_bytes();
        Self { raw, key }
    }
}

impl From<[u8; PRIVATE_KEY_LENGTH]> for PrivateKey {
    fn from(raw: [u8; PRIVATE_KEY_LENGTH]) -> Self {
        let key = ed25519_consensus::SigningKey::from(raw);
        Self { raw, key }
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for PrivateKey {}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.raw.zeroize();
    }
}

impl Debug for PrivateKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivateKey(<redacted>)")
    }
}

/// Ed25519 Public Key.
#[derive(Clone, Copy)]
pub struct PublicKey {
    raw: [u8; PUBLIC_KEY_LENGTH],
    key: ed25519_consensus::VerificationKey,
}

impl Verifier for PublicKey {
    type Signature = Signature;

    fn verify(&self, namespace: &[u8], msg: &[u8], sig: &Signature) -> bool {
        self.key
            .verify(&sig.signature, &union_unique(namespace, msg))
            .is_ok()
    }
}

impl crate::PublicKey for PublicKey {}

impl From<ed25519_consensus::VerificationKey> for PublicKey {
    fn from(key: ed25519_consensus::VerificationKey) -> Self {
        let raw = key.to_bytes();
        Self { raw, key }
    }
}

impl TryFrom<[u8; PUBLIC_KEY_LENGTH]> for PublicKey {
    type Error = CodecError;

    fn try_from(raw: [u8; PUBLIC_KEY_LENGTH]) -> Result<Self, Self::Error> {
        let key = ed25519_consensus::VerificationKey::try_from(raw)
            .map_err(|_| CodecError::Invalid(CURVE_NAME, "invalid public key"))?;
        Ok(Self { raw, key })
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.raw
    }
}

impl Write for PublicKey {
    fn write(&self, buf: &mut impl BufMut) {
        self.raw.write(buf);
    }
}

impl EncodeSize for PublicKey {
    fn encode_size(&self) -> usize {
        PUBLIC_KEY_LENGTH
    }
}

impl Read for PublicKey {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let raw = <[u8; PUBLIC_KEY_LENGTH]>::read(buf)?;
        Self::try_from(raw)
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for PublicKey {}

impl Hash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Debug for PublicKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex(&self.raw))
    }
}

impl Display for PublicKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex(&self.raw))
    }
}

/// Ed25519 Signature.
#[derive(Clone, Copy)]
pub struct Signature {
    raw: [u8; SIGNATURE_LENGTH],
    signature: ed25519_consensus::Signature,
}

impl crate::Signature for Signature {}

impl From<ed25519_consensus::Signature> for Signature {
    fn from(signature: ed25519_consensus::Signature) -> Self {
        let raw = signature.to_bytes();
        Self { raw, signature }
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.raw
    }
}

impl Write for Signature {
    fn write(&self, buf: &mut impl BufMut) {
        self.raw.write(buf);
    }
}

impl EncodeSize for Signature {
    fn encode_size(&self) -> usize {
        SIGNATURE_LENGTH
    }
}

impl Read for Signature {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let raw = <[u8; SIGNATURE_LENGTH]>::read(buf)?;
        Ok(Self::from(ed25519_consensus::Signature::from(raw)))
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Signature {}

impl Debug for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex(&self.raw))
    }
}
