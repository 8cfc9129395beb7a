//! Key generation messages.

use super::ephemeral::CIPHERTEXT_LENGTH;
use crate::group::MemberIndex;
use beacon_cryptography::bls12381::primitives::{
    group::{Scalar, G1, G2},
    poly,
};
use beacon_utils::codec::{Error as CodecError, EncodeSize, Read, ReadExt, Write};
use bytes::{Buf, BufMut, Bytes};

/// A message broadcast during key generation.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub request_id: u64,
    pub payload: Payload,
}

/// Contents of a key generation message, one variant per phase.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    EphemeralKeys(Vec<EphemeralKey>),
    Dealing(Dealing),
    Accusations(Vec<Accusation>),
}

impl Payload {
    /// Phase in which the payload is broadcast (1-based).
    pub fn phase(&self) -> u8 {
        match self {
            Payload::EphemeralKeys(_) => 1,
            Payload::Dealing(_) => 2,
            Payload::Accusations(_) => 3,
        }
    }
}

/// The sender's ephemeral public key for one recipient.
#[derive(Clone, Debug, PartialEq)]
pub struct EphemeralKey {
    pub recipient: MemberIndex,
    pub key: G1,
}

/// The sender's commitment and one encrypted share per active peer.
#[derive(Clone, Debug, PartialEq)]
pub struct Dealing {
    pub commitment: poly::Public,
    pub shares: Vec<EncryptedShare>,
}

/// A share encrypted for one recipient.
#[derive(Clone, Debug, PartialEq)]
pub struct EncryptedShare {
    pub recipient: MemberIndex,
    pub ciphertext: Bytes,
}

/// A claim that `dealer` sent the sender an invalid share, backed by the
/// sender's ephemeral private key for that dealer.
#[derive(Clone, Debug, PartialEq)]
pub struct Accusation {
    pub dealer: MemberIndex,
    pub revealed: Scalar,
}

impl Write for Message {
    fn write(&self, buf: &mut impl BufMut) {
        self.request_id.write(buf);
        self.payload.phase().write(buf);
        match &self.payload {
            Payload::EphemeralKeys(keys) => keys.write(buf),
            Payload::Dealing(dealing) => dealing.write(buf),
            Payload::Accusations(accusations) => accusations.write(buf),
        }
    }
}

impl EncodeSize for Message {
    fn encode_size(&self) -> usize {
        8 + 1
            + match &self.payload {
                Payload::EphemeralKeys(keys) => keys.encode_size(),
                Payload::Dealing(dealing) => dealing.encode_size(),
                Payload::Accusations(accusations) => accusations.encode_size(),
            }
    }
}

/// Reading a message is bounded by the size of the group.
impl Read for Message {
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, group_size: &usize) -> Result<Self, CodecError> {
        let request_id = u64::read(buf)?;
        let payload = match u8::read(buf)? {
            1 => Payload::EphemeralKeys(Vec::read_cfg(buf, &(*group_size, ()))?),
            2 => Payload::Dealing(Dealing::read_cfg(buf, group_size)?),
            3 => Payload::Accusations(Vec::read_cfg(buf, &(*group_size, ()))?),
            _ => return Err(CodecError::Invalid("gjkr::Message", "unknown phase")),
        };
        Ok(Self {
            request_id,
            payload,
        })
    }
}

/// Reads the run and phase of an encoded [Message] without its payload.
///
/// Lets a message that fails to decode still be attributed to a phase.
pub fn header(mut buf: impl Buf) -> Option<(u64, u8)> {
    let request_id = u64::read(&mut buf).ok()?;
    let phase = u8::read(&mut buf).ok()?;
    (1..=3).contains(&phase).then_some((request_id, phase))
}

impl Write for EphemeralKey {
    fn write(&self, buf: &mut impl BufMut) {
        self.recipient.write(buf);
        self.key.write(buf);
    }
}

impl EncodeSize for EphemeralKey {
    fn encode_size(&self) -> usize {
        self.recipient.encode_size() + self.key.encode_size()
    }
}

impl Read for EphemeralKey {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let recipient = MemberIndex::read(buf)?;
        let key = G1::read(buf)?;
        Ok(Self { recipient, key })
    }
}

impl Write for Dealing {
    fn write(&self, buf: &mut impl BufMut) {
        // Length-prefixed so a commitment of the wrong degree still decodes
        // (and can be attributed to its dealer).
        self.commitment.required().write(buf);
        self.commitment.write(buf);
        self.shares.write(buf);
    }
}

impl EncodeSize for Dealing {
    fn encode_size(&self) -> usize {
        4 + self.commitment.encode_size() + self.shares.encode_size()
    }
}

impl Read for Dealing {
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, group_size: &usize) -> Result<Self, CodecError> {
        let coefficients = Vec::<G2>::read_cfg(buf, &(*group_size, ()))?;
        if coefficients.is_empty() {
            return Err(CodecError::Invalid("Dealing", "empty commitment"));
        }
        let commitment = poly::Public::from(coefficients);
        let shares = Vec::read_cfg(buf, &(*group_size, ()))?;
        Ok(Self { commitment, shares })
    }
}

impl Write for EncryptedShare {
    fn write(&self, buf: &mut impl BufMut) {
        self.recipient.write(buf);
        self.ciphertext.write(buf);
    }
}

impl EncodeSize for EncryptedShare {
    fn encode_size(&self) -> usize {
        self.recipient.encode_size() + self.ciphertext.encode_size()
    }
}

impl Read for EncryptedShare {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let recipient = MemberIndex::read(buf)?;
        let ciphertext = Bytes::read_cfg(buf, &CIPHERTEXT_LENGTH)?;
        Ok(Self {
            recipient,
            ciphertext,
        })
    }
}

impl Write for Accusation {
    fn write(&self, buf: &mut impl BufMut) {
        self.dealer.write(buf);
        self.revealed.write(buf);
    }
}

impl EncodeSize for Accusation {
    fn encode_size(&self) -> usize {
        self.dealer.encode_size() + self.revealed.encode_size()
    }
}

impl Read for Accusation {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let dealer = MemberIndex::read(buf)?;
        let revealed = Scalar::read(buf)?;
        Ok(Self { dealer, revealed })
    }
}
