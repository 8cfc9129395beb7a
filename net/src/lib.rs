//! Communicate with the other members of a beacon group.
//!
//! Members exchange protocol messages over broadcast channels: every message
//! sent on a channel is delivered to every peer registered on that channel
//! (including the sender) and is attributed to the sender's operator key.
//! Delivery is best effort.
//!
//! [local] provides an in-memory implementation used by devnets and tests.
//! [handshake] authenticates a raw stream against a peer's operator key.

use beacon_cryptography::PublicKey;
use bytes::Bytes;
use std::{error::Error as StdError, fmt::Debug, future::Future};
use thiserror::Error;

pub mod handshake;
pub mod local;

/// Tuple representing a message received from a given public key.
pub type Message<P> = (P, Bytes);

/// Alias for identifying communication channels.
pub type Channel = u32;

/// Errors that can occur when interacting with a broadcast channel.
#[derive(Debug, Error)]
pub enum Error {
    #[error("message too large: {0}")]
    MessageTooLarge(usize),
    #[error("network closed")]
    NetworkClosed,
    #[error("peer already registered on channel {0}")]
    AlreadyRegistered(Channel),
}

/// Interface for broadcasting messages to all peers on a channel.
pub trait Sender: Clone + Debug + Send + 'static {
    /// Error that can occur when sending a message.
    type Error: Debug + StdError + Send + Sync;

    /// Public key type used to identify peers.
    type PublicKey: PublicKey;

    /// Broadcast a message, returning the number of peers it was delivered to.
    fn send(&mut self, message: Bytes) -> impl Future<Output = Result<usize, Self::Error>> + Send;
}

/// Interface for receiving messages from arbitrary peers.
pub trait Receiver: Debug + Send + 'static {
    /// Error that can occur when receiving a message.
    type Error: Debug + StdError + Send + Sync;

    /// Public key type used to identify peers.
    type PublicKey: PublicKey;

    /// Receive a message from an arbitrary peer.
    fn recv(
        &mut self,
    ) -> impl Future<Output = Result<Message<Self::PublicKey>, Self::Error>> + Send;
}
