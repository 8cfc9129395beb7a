//! Authenticate a stream against a peer's operator key.
//!
//! Both sides prove possession of their long-term key with a signed
//! challenge/response:
//!
//! 1. The dialer sends a [wire::Hello] with the protocol identifier, its
//!    public key and a fresh nonce.
//! 2. The listener checks the protocol and replies with a [wire::Challenge]:
//!    its public key, a fresh nonce and a signature over both nonces bound to
//!    the dialer's key. The dialer checks that the listener is the peer it
//!    meant to reach.
//! 3. The dialer answers with a [wire::Response] signature over both nonces
//!    bound to the listener's key.
//!
//! Signatures are namespaced by the protocol identifier, so a handshake for one
//! protocol can never be replayed against the other. Frames are not encrypted.

use beacon_cryptography::{PublicKey, Signer, Verifier};
use beacon_utils::codec::{DecodeExt, Encode, Error as CodecError};
use bytes::Bytes;
use rand::{rngs::OsRng, RngCore};
use std::time::Duration;
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    time::timeout,
};
use tracing::debug;

mod frame;
pub use frame::{recv_frame, send_frame};
pub mod wire;
use wire::{payload, Challenge, Hello, Response, Role, NONCE_LENGTH};

/// Identifier of the current handshake protocol.
pub const KEEP_HANDSHAKE_ID: &str = "/keep/handshake/1.0.0";

/// Identifier of the legacy handshake protocol.
pub const SECIO_ID: &str = "/secio/1.0.0";

/// Errors that can occur when securing a stream.
#[derive(Error, Debug)]
pub enum Error {
    #[error("handshake timeout")]
    HandshakeTimeout,
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),
    #[error("cannot dial self")]
    DialSelf,
    #[error("hello uses our public key")]
    HelloUsesOurKey,
    #[error("wrong peer")]
    WrongPeer,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("recv failed: {0}")]
    RecvFailed(std::io::Error),
    #[error("recv too large: {0} bytes")]
    RecvTooLarge(usize),
    #[error("send failed: {0}")]
    SendFailed(std::io::Error),
    #[error("send zero size")]
    SendZeroSize,
    #[error("send too large: {0} bytes")]
    SendTooLarge(usize),
    #[error("connection closed")]
    StreamClosed,
    #[error("unable to decode: {0}")]
    UnableToDecode(#[from] CodecError),
}

/// Handshake protocol spoken by a [SecureTransport].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Protocol {
    #[default]
    Keep,
    Secio,
}

impl Protocol {
    /// Returns the identifier announced during the handshake.
    pub fn id(&self) -> &'static str {
        match self {
            Protocol::Keep => KEEP_HANDSHAKE_ID,
            Protocol::Secio => SECIO_ID,
        }
    }
}

/// Configuration for a [SecureTransport].
///
/// # Warning
///
/// Peers must agree on `protocol` and `max_message_size`.
#[derive(Clone)]
pub struct Config<C: Signer> {
    /// The operator key used to prove our identity.
    pub signer: C,

    /// Protocol to speak.
    pub protocol: Protocol,

    /// Maximum frame size (in bytes).
    pub max_message_size: usize,

    /// Maximum time allowed for completing the handshake.
    pub handshake_timeout: Duration,
}

/// Secures raw streams by mutually authenticating both ends.
#[derive(Clone)]
pub struct SecureTransport<C: Signer> {
    cfg: Config<C>,
}

impl<C: Signer> SecureTransport<C> {
    pub fn new(cfg: Config<C>) -> Self {
        Self { cfg }
    }

    /// Returns the identity presented by this transport.
    pub fn local_peer(&self) -> C::PublicKey {
        self.cfg.signer.public_key()
    }

    /// Returns the protocol spoken by this transport.
    pub fn protocol(&self) -> Protocol {
        self.cfg.protocol
    }

    /// Secures a stream we dialed, failing unless the remote proves it holds
    /// the key of `remote`.
    pub async fn secure_outbound<S: AsyncRead + AsyncWrite + Unpin>(
        &self,
        stream: S,
        remote: C::PublicKey,
    ) -> Result<Connection<S, C::PublicKey>, Error> {
        if remote == self.local_peer() {
            return Err(Error::DialSelf);
        }
        timeout(self.cfg.handshake_timeout, self.dial(stream, remote))
            .await
            .map_err(|_| Error::HandshakeTimeout)?
    }

    /// Secures a stream a remote dialed, learning (and authenticating) the
    /// remote's identity.
    pub async fn secure_inbound<S: AsyncRead + AsyncWrite + Unpin>(
        &self,
        stream: S,
    ) -> Result<Connection<S, C::PublicKey>, Error> {
        timeout(self.cfg.handshake_timeout, self.listen(stream))
            .await
            .map_err(|_| Error::HandshakeTimeout)?
    }

    async fn dial<S: AsyncRead + AsyncWrite + Unpin>(
        &self,
        mut stream: S,
        remote: C::PublicKey,
    ) -> Result<Connection<S, C::PublicKey>, Error> {
        let namespace = self.cfg.protocol.id().as_bytes();
        let local = self.local_peer();

        // Open with our identity and nonce
        let mut dialer_nonce = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut dialer_nonce);
        let hello = Hello {
            protocol: Bytes::from_static(namespace),
            public_key: local.clone(),
            nonce: dialer_nonce,
        };
        send_frame(&mut stream, &hello.encode(), self.cfg.max_message_size).await?;

        // Verify the listener is who we expect
        let msg = recv_frame(&mut stream, self.cfg.max_message_size).await?;
        let challenge = Challenge::<C::PublicKey, C::Signature>::decode(msg)?;
        if challenge.public_key != remote {
            return Err(Error::WrongPeer);
        }
        let expected = payload(Role::Listener, &local, &dialer_nonce, &challenge.nonce);
        if !remote.verify(namespace, &expected, &challenge.signature) {
            return Err(Error::InvalidSignature);
        }

        // Prove our identity
        let proof = payload(Role::Dialer, &remote, &dialer_nonce, &challenge.nonce);
        let response = Response {
            signature: self.cfg.signer.sign(namespace, &proof),
        };
        send_frame(&mut stream, &response.encode(), self.cfg.max_message_size).await?;
        debug!(peer = %remote, protocol = self.cfg.protocol.id(), "secured outbound stream");

        Ok(Connection {
            stream,
            local,
            remote,
            max_message_size: self.cfg.max_message_size,
        })
    }

    async fn listen<S: AsyncRead + AsyncWrite + Unpin>(
        &self,
        mut stream: S,
    ) -> Result<Connection<S, C::PublicKey>, Error> {
        let namespace = self.cfg.protocol.id().as_bytes();
        let local = self.local_peer();

        // Check the dialer speaks our protocol
        let msg = recv_frame(&mut stream, self.cfg.max_message_size).await?;
        let hello = Hello::<C::PublicKey>::decode(msg)?;
        if hello.protocol.as_ref() != namespace {
            return Err(Error::ProtocolMismatch(
                String::from_utf8_lossy(&hello.protocol).into_owned(),
            ));
        }
        if hello.public_key == local {
            return Err(Error::HelloUsesOurKey);
        }
        let remote = hello.public_key;

        // Prove our identity, bound to the dialer's nonce
        let mut listener_nonce = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut listener_nonce);
        let proof = payload(Role::Listener, &remote, &hello.nonce, &listener_nonce);
        let challenge = Challenge {
            public_key: local.clone(),
            nonce: listener_nonce,
            signature: self.cfg.signer.sign(namespace, &proof),
        };
        send_frame(&mut stream, &challenge.encode(), self.cfg.max_message_size).await?;

        // Verify the dialer holds the key it claimed
        let msg = recv_frame(&mut stream, self.cfg.max_message_size).await?;
        let response = Response::<C::Signature>::decode(msg)?;
        let expected = payload(Role::Dialer, &local, &hello.nonce, &listener_nonce);
        if !remote.verify(namespace, &expected, &response.signature) {
            return Err(Error::InvalidSignature);
        }
        debug!(peer = %remote, protocol = self.cfg.protocol.id(), "secured inbound stream");

        Ok(Connection {
            stream,
            local,
            remote,
            max_message_size: self.cfg.max_message_size,
        })
    }
}

/// An authenticated stream.
pub struct Connection<S, P: PublicKey> {
    stream: S,
    local: P,
    remote: P,
    max_message_size: usize,
}

impl<S: AsyncRead + AsyncWrite + Unpin, P: PublicKey> Connection<S, P> {
    /// Returns our identity.
    pub fn local_peer(&self) -> &P {
        &self.local
    }

    /// Returns the authenticated identity of the remote.
    pub fn remote_peer(&self) -> &P {
        &self.remote
    }

    /// Sends a frame to the remote.
    pub async fn send(&mut self, msg: &[u8]) -> Result<(), Error> {
        send_frame(&mut self.stream, msg, self.max_message_size).await
    }

    /// Receives a frame from the remote.
    pub async fn recv(&mut self) -> Result<Bytes, Error> {
        recv_frame(&mut self.stream, self.max_message_size).await
    }

    /// Returns the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_cryptography::ed25519::PrivateKey;
    use tokio::io::duplex;

    fn transport(seed: u64, protocol: Protocol) -> SecureTransport<PrivateKey> {
        SecureTransport::new(Config {
            signer: PrivateKey::from_seed(seed),
            protocol,
            max_message_size: 1024,
            handshake_timeout: Duration::from_secs(5),
        })
    }

    #[tokio::test]
    async fn test_mutual_authentication() {
        for protocol in [Protocol::Keep, Protocol::Secio] {
            let dialer = transport(0, protocol);
            let listener = transport(1, protocol);
            let (a, b) = duplex(4096);

            let listener_task = {
                let listener = listener.clone();
                tokio::spawn(async move { listener.secure_inbound(b).await })
            };
            let mut outbound = dialer
                .secure_outbound(a, listener.local_peer())
                .await
                .unwrap();
            let mut inbound = listener_task.await.unwrap().unwrap();

            assert_eq!(outbound.remote_peer(), &listener.local_peer());
            assert_eq!(outbound.local_peer(), &dialer.local_peer());
            assert_eq!(inbound.remote_peer(), &dialer.local_peer());

            // Frames flow in both directions
            outbound.send(b"ping").await.unwrap();
            assert_eq!(inbound.recv().await.unwrap(), Bytes::from_static(b"ping"));
            inbound.send(b"pong").await.unwrap();
            assert_eq!(outbound.recv().await.unwrap(), Bytes::from_static(b"pong"));
        }
    }

    #[tokio::test]
    async fn test_wrong_peer() {
        let dialer = transport(0, Protocol::Keep);
        let listener = transport(1, Protocol::Keep);
        let expected = transport(2, Protocol::Keep).local_peer();
        let (a, b) = duplex(4096);

        let listener_task = tokio::spawn(async move { listener.secure_inbound(b).await });
        let result = dialer.secure_outbound(a, expected).await;
        assert!(matches!(result, Err(Error::WrongPeer)));

        // The listener never receives a response
        assert!(listener_task.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_protocol_mismatch() {
        let dialer = transport(0, Protocol::Keep);
        let listener = transport(1, Protocol::Secio);
        let (a, b) = duplex(4096);

        let remote = listener.local_peer();
        let listener_task = tokio::spawn(async move { listener.secure_inbound(b).await });
        let result = dialer.secure_outbound(a, remote).await;
        assert!(matches!(result, Err(Error::StreamClosed)));
        match listener_task.await.unwrap() {
            Err(Error::ProtocolMismatch(id)) => assert_eq!(id, KEEP_HANDSHAKE_ID),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_dial_self() {
        let dialer = transport(0, Protocol::Keep);
        let (a, _b) = duplex(4096);
        let result = dialer.secure_outbound(a, dialer.local_peer()).await;
        assert!(matches!(result, Err(Error::DialSelf)));
    }

    #[tokio::test]
    async fn test_forged_challenge() {
        // A listener claiming the expected identity but signing with another key
        let dialer = transport(0, Protocol::Keep);
        let impersonated = PrivateKey::from_seed(1);
        let forger = PrivateKey::from_seed(2);
        let (a, mut b) = duplex(4096);

        let forger_task = tokio::spawn(async move {
            let msg = recv_frame(&mut b, 1024).await.unwrap();
            let hello = Hello::<<PrivateKey as Signer>::PublicKey>::decode(msg).unwrap();
            let listener_nonce = [9u8; NONCE_LENGTH];
            let proof = payload(Role::Listener, &hello.public_key, &hello.nonce, &listener_nonce);
            let challenge = Challenge {
                public_key: impersonated.public_key(),
                nonce: listener_nonce,
                signature: forger.sign(KEEP_HANDSHAKE_ID.as_bytes(), &proof),
            };
            send_frame(&mut b, &challenge.encode(), 1024).await.unwrap();
            b
        });
        let result = dialer
            .secure_outbound(a, PrivateKey::from_seed(1).public_key())
            .await;
        assert!(matches!(result, Err(Error::InvalidSignature)));
        forger_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_forged_response() {
        // A dialer claiming an identity it cannot sign for
        let listener = transport(1, Protocol::Keep);
        let claimed = PrivateKey::from_seed(0);
        let forger = PrivateKey::from_seed(3);
        let (mut a, b) = duplex(4096);

        let listener_task = tokio::spawn(async move { listener.secure_inbound(b).await });
        let dialer_nonce = [5u8; NONCE_LENGTH];
        let hello = Hello {
            protocol: Bytes::from_static(KEEP_HANDSHAKE_ID.as_bytes()),
            public_key: claimed.public_key(),
            nonce: dialer_nonce,
        };
        send_frame(&mut a, &hello.encode(), 1024).await.unwrap();
        let msg = recv_frame(&mut a, 1024).await.unwrap();
        let challenge =
            Challenge::<<PrivateKey as Signer>::PublicKey, <PrivateKey as Signer>::Signature>::decode(msg)
                .unwrap();
        let proof = payload(Role::Dialer, &challenge.public_key, &dialer_nonce, &challenge.nonce);
        let response = Response {
            signature: forger.sign(KEEP_HANDSHAKE_ID.as_bytes(), &proof),
        };
        send_frame(&mut a, &response.encode(), 1024).await.unwrap();

        assert!(matches!(
            listener_task.await.unwrap(),
            Err(Error::InvalidSignature)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout() {
        let listener = transport(1, Protocol::Keep);
        let (_a, b) = duplex(4096);
        let result = listener.secure_inbound(b).await;
        assert!(matches!(result, Err(Error::HandshakeTimeout)));
    }
}
