//! Pairwise encryption of shares.
//!
//! Every member publishes one ephemeral key per peer. A dealer and a recipient
//! derive a symmetric key from the Diffie-Hellman secret of their two
//! ephemeral keys (in G1), bound to the run and to both indices, and the
//! dealer encrypts the recipient's share under it with ChaCha20-Poly1305.
//!
//! Each symmetric key encrypts exactly one share, so a fixed nonce is used.
//! Revealing an ephemeral private key (to back an accusation) exposes only the
//! share exchanged with that one dealer.

use crate::group::MemberIndex;
use beacon_cryptography::bls12381::primitives::group::{
    Element, Private, Scalar, G1, SCALAR_LENGTH,
};
use chacha20poly1305::{
    aead::{generic_array::typenum::Unsigned, Aead},
    AeadCore, ChaCha20Poly1305, KeyInit as _, Nonce,
};
use sha2::{Digest, Sha256};

/// Namespace for deriving symmetric keys.
const KEY_NAMESPACE: &[u8] = b"_BEACON_GJKR_SHARE_KEY_";

/// Length of an encrypted share.
pub const CIPHERTEXT_LENGTH: usize =
    SCALAR_LENGTH + <ChaCha20Poly1305 as AeadCore>::TagSize::USIZE;

const NONCE: [u8; 12] = [0u8; 12];

/// Returns the public key of an ephemeral private key.
pub fn public(private: &Private) -> G1 {
    let mut public = G1::one();
    public.mul(private);
    public
}

/// Derives the symmetric key shared by `dealer` and `recipient`.
///
/// Either side can compute it: the dealer from its private key for the
/// recipient and the recipient's public key for the dealer, and vice versa.
pub fn symmetric_key(
    request_id: u64,
    dealer: MemberIndex,
    recipient: MemberIndex,
    private: &Private,
    peer_public: &G1,
) -> [u8; 32] {
    let mut shared = *peer_public;
    shared.mul(private);

    let mut hasher = Sha256::new();
    hasher.update(KEY_NAMESPACE);
    hasher.update(request_id.to_be_bytes());
    hasher.update(dealer.get().to_be_bytes());
    hasher.update(recipient.get().to_be_bytes());
    hasher.update(shared.serialize());
    hasher.finalize().into()
}

/// Encrypts a share.
pub fn encrypt(key: &[u8; 32], share: &Scalar) -> Vec<u8> {
    let cipher = ChaCha20Poly1305::new(&(*key).into());
    // Encrypting a fixed-size plaintext into memory cannot fail.
    cipher
        .encrypt(Nonce::from_slice(&NONCE), share.serialize().as_slice())
        .unwrap_or_default()
}

/// Decrypts a share, returning `None` if the ciphertext was not produced
/// under `key` or does not hold a canonical scalar.
pub fn decrypt(key: &[u8; 32], ciphertext: &[u8]) -> Option<Scalar> {
    let cipher = ChaCha20Poly1305::new(&(*key).into());
    let plaintext = cipher.decrypt(Nonce::from_slice(&NONCE), ciphertext).ok()?;
    Scalar::deserialize(&plaintext)
}
