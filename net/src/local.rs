//! In-memory broadcast network.
//!
//! Peers register on numbered channels and receive every message broadcast on
//! that channel (including their own). Each delivery is stamped with the
//! sender's public key, so receivers can attribute messages without any
//! additional authentication.
//!
//! # Example
//!
//! ```rust
//! use beacon_cryptography::{ed25519::PrivateKey, Signer};
//! use beacon_net::{local::{Config, Network}, Receiver, Sender};
//! use bytes::Bytes;
//!
//! # futures::executor::block_on(async {
//! let network = Network::new(Config { max_message_size: 1024 });
//! let alice = PrivateKey::from_seed(0).public_key();
//! let bob = PrivateKey::from_seed(1).public_key();
//! let (mut sender, _) = network.register(alice.clone(), 0).unwrap();
//! let (_, mut receiver) = network.register(bob, 0).unwrap();
//!
//! sender.send(Bytes::from_static(b"hello")).await.unwrap();
//! let (from, message) = receiver.recv().await.unwrap();
//! assert_eq!(from, alice);
//! assert_eq!(message, Bytes::from_static(b"hello"));
//! # });
//! ```

use crate::{Channel, Error, Message};
use beacon_cryptography::PublicKey;
use bytes::Bytes;
use futures::{channel::mpsc, StreamExt};
use std::{
    collections::{BTreeMap, HashMap},
    fmt::Debug,
    sync::{Arc, Mutex},
};
use tracing::debug;

/// Configuration for the in-memory network.
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum size of a message that can be broadcast.
    pub max_message_size: usize,
}

type Peers<P> = BTreeMap<P, mpsc::UnboundedSender<Message<P>>>;

/// In-memory network shared by all registered peers.
#[derive(Clone)]
pub struct Network<P: PublicKey> {
    cfg: Config,
    channels: Arc<Mutex<HashMap<Channel, Peers<P>>>>,
}

impl<P: PublicKey> Network<P> {
    /// Create a new network with no registered peers.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a peer on a channel.
    ///
    /// Returns the sender and receiver for the channel. A peer may only be
    /// registered once per channel.
    pub fn register(
        &self,
        public_key: P,
        channel: Channel,
    ) -> Result<(LocalSender<P>, LocalReceiver<P>), Error> {
        let mut channels = self.channels.lock().map_err(|_| Error::NetworkClosed)?;
        let peers = channels.entry(channel).or_default();
        if peers.contains_key(&public_key) {
            return Err(Error::AlreadyRegistered(channel));
        }
        let (sender, receiver) = mpsc::unbounded();
        peers.insert(public_key.clone(), sender);
        debug!(peer = %public_key, channel, "registered peer");
        Ok((
            LocalSender {
                me: public_key,
                channel,
                max_message_size: self.cfg.max_message_size,
                channels: self.channels.clone(),
            },
            LocalReceiver { receiver },
        ))
    }

    /// Remove a peer from a channel.
    ///
    /// Messages already delivered to the peer remain in its receiver.
    pub fn deregister(&self, public_key: &P, channel: Channel) {
        if let Ok(mut channels) = self.channels.lock() {
            if let Some(peers) = channels.get_mut(&channel) {
                peers.remove(public_key);
            }
        }
    }
}

/// Broadcasts messages to all peers registered on a channel.
#[derive(Clone)]
pub struct LocalSender<P: PublicKey> {
    me: P,
    channel: Channel,
    max_message_size: usize,
    channels: Arc<Mutex<HashMap<Channel, Peers<P>>>>,
}

impl<P: PublicKey> Debug for LocalSender<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSender")
            .field("me", &self.me)
            .field("channel", &self.channel)
            .finish()
    }
}

impl<P: PublicKey> crate::Sender for LocalSender<P> {
    type Error = Error;
    type PublicKey = P;

    async fn send(&mut self, message: Bytes) -> Result<usize, Error> {
        if message.len() > self.max_message_size {
            return Err(Error::MessageTooLarge(message.len()));
        }
        let mut channels = self.channels.lock().map_err(|_| Error::NetworkClosed)?;
        let Some(peers) = channels.get_mut(&self.channel) else {
            return Ok(0);
        };

        // Deliver to every peer, forgetting any that have dropped their receiver
        let mut delivered = 0;
        peers.retain(|peer, sender| {
            if sender
                .unbounded_send((self.me.clone(), message.clone()))
                .is_err()
            {
                debug!(?peer, "dropping closed peer");
                return false;
            }
            delivered += 1;
            true
        });
        Ok(delivered)
    }
}

/// Receives messages broadcast on a channel.
#[derive(Debug)]
pub struct LocalReceiver<P: PublicKey> {
    receiver: mpsc::UnboundedReceiver<Message<P>>,
}

impl<P: PublicKey> crate::Receiver for LocalReceiver<P> {
    type Error = Error;
    type PublicKey = P;

    async fn recv(&mut self) -> Result<Message<P>, Error> {
        self.receiver.next().await.ok_or(Error::NetworkClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Receiver, Sender};
    use beacon_cryptography::{ed25519, Signer};

    fn key(seed: u64) -> ed25519::PublicKey {
        ed25519::PrivateKey::from_seed(seed).public_key()
    }

    #[tokio::test]
    async fn test_broadcast_includes_sender() {
        let network = Network::new(Config {
            max_message_size: 1024,
        });
        let mut handles = (0..3)
            .map(|i| network.register(key(i), 0).unwrap())
            .collect::<Vec<_>>();

        let delivered = handles[0]
            .0
            .send(Bytes::from_static(b"hello"))
            .await
            .unwrap();
        assert_eq!(delivered, 3);
        for (_, receiver) in handles.iter_mut() {
            let (from, message) = receiver.recv().await.unwrap();
            assert_eq!(from, key(0));
            assert_eq!(message, Bytes::from_static(b"hello"));
        }
    }

    #[tokio::test]
    async fn test_channels_isolated() {
        let network = Network::new(Config {
            max_message_size: 1024,
        });
        let (mut sender, _) = network.register(key(0), 0).unwrap();
        let (_, mut other_channel) = network.register(key(1), 1).unwrap();
        let (_, mut same_channel) = network.register(key(1), 0).unwrap();

        sender.send(Bytes::from_static(b"zero")).await.unwrap();
        let (_, message) = same_channel.recv().await.unwrap();
        assert_eq!(message, Bytes::from_static(b"zero"));
        assert!(other_channel.receiver.try_next().is_err());
    }

    #[tokio::test]
    async fn test_register_twice() {
        let network = Network::new(Config {
            max_message_size: 1024,
        });
        network.register(key(0), 0).unwrap();
        assert!(matches!(
            network.register(key(0), 0),
            Err(Error::AlreadyRegistered(0))
        ));
    }

    #[tokio::test]
    async fn test_message_too_large() {
        let network = Network::new(Config {
            max_message_size: 4,
        });
        let (mut sender, _) = network.register(key(0), 0).unwrap();
        assert!(matches!(
            sender.send(Bytes::from_static(b"hello")).await,
            Err(Error::MessageTooLarge(5))
        ));
    }

    #[tokio::test]
    async fn test_dropped_receiver_forgotten() {
        let network = Network::new(Config {
            max_message_size: 1024,
        });
        let (mut sender, _own) = network.register(key(0), 0).unwrap();
        let (_, receiver) = network.register(key(1), 0).unwrap();
        drop(receiver);
        assert_eq!(sender.send(Bytes::from_static(b"a")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_deregister() {
        let network = Network::new(Config {
            max_message_size: 1024,
        });
        let (mut sender, _own) = network.register(key(0), 0).unwrap();
        let (_, _receiver) = network.register(key(1), 0).unwrap();
        network.deregister(&key(1), 0);
        assert_eq!(sender.send(Bytes::from_static(b"a")).await.unwrap(), 1);
    }
}
