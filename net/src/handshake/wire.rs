//! Handshake messages.

use beacon_cryptography::{PublicKey, Signature};
use beacon_utils::codec::{Error as CodecError, EncodeSize, Read, ReadExt, Write};
use bytes::{Buf, BufMut, Bytes};

/// Length of the nonce each side contributes to the handshake.
pub const NONCE_LENGTH: usize = 32;

/// Maximum length of a protocol identifier.
const MAX_PROTOCOL_LENGTH: usize = 64;

/// Sent by the dialer to open a handshake.
#[derive(Clone, Debug, PartialEq)]
pub struct Hello<P: PublicKey> {
    pub protocol: Bytes,
    pub public_key: P,
    pub nonce: [u8; NONCE_LENGTH],
}

impl<P: PublicKey> Write for Hello<P> {
    fn write(&self, buf: &mut impl BufMut) {
        self.protocol.write(buf);
        self.public_key.write(buf);
        self.nonce.write(buf);
    }
}

impl<P: PublicKey> EncodeSize for Hello<P> {
    fn encode_size(&self) -> usize {
        self.protocol.encode_size() + self.public_key.encode_size() + NONCE_LENGTH
    }
}

impl<P: PublicKey> Read for Hello<P> {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let protocol = Bytes::read_cfg(buf, &MAX_PROTOCOL_LENGTH)?;
        let public_key = P::read(buf)?;
        let nonce = <[u8; NONCE_LENGTH]>::read(buf)?;
        Ok(Self {
            protocol,
            public_key,
            nonce,
        })
    }
}

/// Sent by the listener: its identity, its nonce and a signature binding both
/// nonces to the dialer's identity.
#[derive(Clone, Debug, PartialEq)]
pub struct Challenge<P: PublicKey, S: Signature> {
    pub public_key: P,
    pub nonce: [u8; NONCE_LENGTH],
    pub signature: S,
}

impl<P: PublicKey, S: Signature> Write for Challenge<P, S> {
    fn write(&self, buf: &mut impl BufMut) {
        self.public_key.write(buf);
        self.nonce.write(buf);
        self.signature.write(buf);
    }
}

impl<P: PublicKey, S: Signature> EncodeSize for Challenge<P, S> {
    fn encode_size(&self) -> usize {
        self.public_key.encode_size() + NONCE_LENGTH + self.signature.encode_size()
    }
}

impl<P: PublicKey, S: Signature> Read for Challenge<P, S> {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let public_key = P::read(buf)?;
        let nonce = <[u8; NONCE_LENGTH]>::read(buf)?;
        let signature = S::read(buf)?;
        Ok(Self {
            public_key,
            nonce,
            signature,
        })
    }
}

/// Sent by the dialer to prove its identity.
#[derive(Clone, Debug, PartialEq)]
pub struct Response<S: Signature> {
    pub signature: S,
}

impl<S: Signature> Write for Response<S> {
    fn write(&self, buf: &mut impl BufMut) {
        self.signature.write(buf);
    }
}

impl<S: Signature> EncodeSize for Response<S> {
    fn encode_size(&self) -> usize {
        self.signature.encode_size()
    }
}

impl<S: Signature> Read for Response<S> {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        Ok(Self {
            signature: S::read(buf)?,
        })
    }
}

/// Which side of the handshake produced a signature.
#[derive(Clone, Copy)]
pub enum Role {
    Dialer = 0,
    Listener = 1,
}

/// Payload signed by `role` to prove its identity to `peer`.
///
/// Both nonces are included so a signature cannot be replayed in another
/// handshake.
pub fn payload<P: PublicKey>(
    role: Role,
    peer: &P,
    dialer_nonce: &[u8; NONCE_LENGTH],
    listener_nonce: &[u8; NONCE_LENGTH],
) -> Vec<u8> {
    let mut payload = Vec::with_capacity(1 + peer.encode_size() + 2 * NONCE_LENGTH);
    payload.push(role as u8);
    peer.write(&mut payload);
    payload.extend_from_slice(dialer_nonce);
    payload.extend_from_slice(listener_nonce);
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_cryptography::{ed25519, Signer};
    use beacon_utils::codec::{DecodeExt, Encode};

    #[test]
    fn test_hello_codec() {
        let hello = Hello {
            protocol: Bytes::from_static(b"/keep/handshake/1.0.0"),
            public_key: ed25519::PrivateKey::from_seed(0).public_key(),
            nonce: [7u8; NONCE_LENGTH],
        };
        let decoded = Hello::<ed25519::PublicKey>::decode(hello.encode()).unwrap();
        assert_eq!(decoded, hello);
    }

    #[test]
    fn test_hello_protocol_too_long() {
        let hello = Hello {
            protocol: Bytes::from(vec![b'a'; MAX_PROTOCOL_LENGTH + 1]),
            public_key: ed25519::PrivateKey::from_seed(0).public_key(),
            nonce: [0u8; NONCE_LENGTH],
        };
        assert!(Hello::<ed25519::PublicKey>::decode(hello.encode()).is_err());
    }

    #[test]
    fn test_payload_binds_role() {
        let peer = ed25519::PrivateKey::from_seed(1).public_key();
        let a = payload(Role::Dialer, &peer, &[1; NONCE_LENGTH], &[2; NONCE_LENGTH]);
        let b = payload(Role::Listener, &peer, &[1; NONCE_LENGTH], &[2; NONCE_LENGTH]);
        assert_ne!(a, b);
    }
}
