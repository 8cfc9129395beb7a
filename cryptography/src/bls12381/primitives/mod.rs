//! Operations over the BLS12-381 scalar field.
//!
//! # Acknowledgements
//!
//! _The following crates were used as a reference when implementing this crate. If code is very similar
//! to the reference, it is accompanied by a comment and link._
//!
//! * <https://github.com/celo-org/celo-threshold-bls-rs>: Operations over the BLS12-381 scalar field and GJKR99.
//! * <https://github.com/filecoin-project/blstrs> + <https://github.com/MystenLabs/fastcrypto>: Implementing operations over
//!   the BLS12-381 scalar field with <https://github.com/supranational/blst>.
//!
//! # Example
//!
//! ```rust
//! use beacon_cryptography::bls12381::primitives::{
//!     group::Share,
//!     ops::{partial_sign, partial_verify, threshold_signature_recover, verify},
//!     poly::{self, new_from, Public},
//! };
//! use rand::rngs::OsRng;
//!
//! // Configure threshold
//! let (n, t) = (5, 3);
//!
//! // Generate a secret polynomial, its commitment and one share per member
//! let secret = new_from(t - 1, &mut OsRng);
//! let commitment = Public::commit(&secret);
//! let shares: Vec<_> = (1..=n)
//!     .map(|i| Share { index: i, private: secret.evaluate(i).value })
//!     .collect();
//!
//! // Generate and verify partial signatures
//! let message = b"hello world";
//! let partials: Vec<_> = shares.iter().map(|s| partial_sign(s, message)).collect();
//! for p in &partials {
//!     partial_verify(&commitment, message, p).expect("signature should be valid");
//! }
//!
//! // Aggregate partial signatures and verify against the group key
//! let signature = threshold_signature_recover(t, &partials).unwrap();
//! verify(poly::public(&commitment), message, &signature).expect("signature should be valid");
//! ```

pub mod group;
pub mod ops;
pub mod poly;

use thiserror::Error;

/// Errors that can occur when working with BLS12-381 primitives.
#[derive(Error, Debug)]
pub enum Error {
    #[error("not enough partial signatures: {1}/{0}")]
    NotEnoughPartialSignatures(usize, usize),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid evaluation index")]
    InvalidEvaluation,
    #[error("no inverse")]
    NoInverse,
    #[error("duplicate polynomial evaluation point")]
    DuplicateEval,
}
