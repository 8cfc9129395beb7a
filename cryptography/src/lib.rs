//! Generate keys, sign arbitrary messages, and deterministically verify signatures.
//!
//! Two schemes are provided:
//!
//! * [bls12381]: threshold BLS signatures used to produce relay entries.
//! * [ed25519]: operator identities used to authenticate peers and sign DKG
//!   result submissions.

use beacon_utils::codec::{EncodeSize, Read, Write};
use std::{
    fmt::{Debug, Display},
    hash::Hash,
};

pub mod bls12381;
pub mod ed25519;

/// Produces [Signature]s over messages that can be verified with a corresponding [PublicKey].
pub trait Signer: Send + Sync + Clone + 'static {
    /// The type of [Signature] produced by this [Signer].
    type Signature: Signature;

    /// The corresponding [PublicKey] type.
    type PublicKey: PublicKey<Signature = Self::Signature>;

    /// Returns the [PublicKey] corresponding to this [Signer].
    fn public_key(&self) -> Self::PublicKey;

    /// Sign a message with the given namespace.
    ///
    /// The namespace is prepended to the message (see [beacon_utils::union_unique])
    /// so that a signature produced in one context cannot be replayed in another.
    fn sign(&self, namespace: &[u8], msg: &[u8]) -> Self::Signature;
}

/// Verifies [Signature]s over messages.
pub trait Verifier {
    /// The type of [Signature] that this verifier can verify.
    type Signature: Signature;

    /// Verify that a [Signature] is a valid over a given message.
    ///
    /// The namespace provided here must match the namespace provided during signing.
    fn verify(&self, namespace: &[u8], msg: &[u8], sig: &Self::Signature) -> bool;
}

/// A [PublicKey], able to verify [Signature]s.
pub trait PublicKey:
    Verifier
    + Clone
    + Ord
    + Hash
    + Debug
    + Display
    + Send
    + Sync
    + Write
    + EncodeSize
    + Read<Cfg = ()>
    + 'static
{
}

/// A [Signature] over a message.
pub trait Signature:
    Clone + PartialEq + Debug + Send + Sync + Write + EncodeSize + Read<Cfg = ()> + 'static
{
}
