//! Fixtures shared by tests.

use crate::group::Group;
use beacon_chain::local::{self, Chain};
use beacon_cryptography::{ed25519, Signer};
use beacon_net::local::{self as network, Network};
use bytes::Bytes;
use std::time::Duration;

/// Entry requests extend when none has been generated yet.
pub const GENESIS: [u8; 32] = [9; 32];

pub fn signers(n: u64) -> Vec<ed25519::PrivateKey> {
    (0..n).map(ed25519::PrivateKey::from_seed).collect()
}

pub fn group(signers: &[ed25519::PrivateKey], threshold: usize) -> Group<ed25519::PublicKey> {
    Group::new(signers.iter().map(|s| s.public_key()).collect(), threshold).unwrap()
}

/// A chain producing one block per second.
pub fn chain(group_size: usize, threshold: usize) -> Chain {
    Chain::new(local::Config {
        block_time: Duration::from_secs(1),
        group_size,
        threshold,
        genesis_entry: Bytes::from_static(&GENESIS),
    })
}

pub fn network() -> Network<ed25519::PublicKey> {
    Network::new(network::Config {
        max_message_size: 1024 * 1024,
    })
}
