//! The canonical outcome of a distributed key generation.

use crate::Error;
use beacon_cryptography::bls12381::primitives::group::{Element, Public, PUBLIC_KEY_LENGTH};
use beacon_utils::codec::{Error as CodecError, EncodeSize, Read, ReadExt, Write};
use bytes::{Buf, BufMut, Bytes};

/// Outcome of a DKG run, as submitted to (and published by) the ledger.
///
/// `disqualified` and `inactive` hold one flag per roster slot, in member
/// order. A successful result carries the compressed group public key, a
/// failed result carries no key.
///
/// Results are immutable once constructed and can only be built through
/// [DkgResult::new] (or decoding), which enforces the structural invariants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DkgResult {
    success: bool,
    group_public_key: Vec<u8>,
    disqualified: Vec<bool>,
    inactive: Vec<bool>,
}

impl DkgResult {
    /// Create a result, checking that:
    ///
    /// * `disqualified` and `inactive` have the same length,
    /// * no member is both disqualified and inactive,
    /// * a key is present if and only if the run succeeded.
    pub fn new(
        success: bool,
        group_public_key: Option<&Public>,
        disqualified: Vec<bool>,
        inactive: Vec<bool>,
    ) -> Result<Self, Error> {
        let group_public_key = group_public_key.map(Element::serialize).unwrap_or_default();
        Self::from_parts(success, group_public_key, disqualified, inactive)
    }

    fn from_parts(
        success: bool,
        group_public_key: Vec<u8>,
        disqualified: Vec<bool>,
        inactive: Vec<bool>,
    ) -> Result<Self, Error> {
        if disqualified.len() != inactive.len() {
            return Err(Error::InvalidResult("flag lengths differ"));
        }
        if disqualified.iter().zip(&inactive).any(|(d, i)| *d && *i) {
            return Err(Error::InvalidResult("member both disqualified and inactive"));
        }
        if success == group_public_key.is_empty() {
            return Err(Error::InvalidResult("key must be present iff successful"));
        }
        if success && Public::deserialize(&group_public_key).is_none() {
            return Err(Error::InvalidResult("invalid group public key"));
        }
        Ok(Self {
            success,
            group_public_key,
            disqualified,
            inactive,
        })
    }

    /// Decode a result from its on-chain representation (one byte per slot,
    /// `0x01` for set and `0x00` for unset).
    pub fn from_bytes(
        success: bool,
        group_public_key: &[u8],
        disqualified: &[u8],
        inactive: &[u8],
    ) -> Result<Self, Error> {
        Self::from_parts(
            success,
            group_public_key.to_vec(),
            flags_from_bytes(disqualified)?,
            flags_from_bytes(inactive)?,
        )
    }

    /// Whether the run produced a group key.
    pub fn success(&self) -> bool {
        self.success
    }

    /// Compressed group public key (empty if the run failed).
    pub fn group_public_key_bytes(&self) -> &[u8] {
        &self.group_public_key
    }

    /// Group public key, if the run succeeded.
    pub fn group_public_key(&self) -> Option<Public> {
        if !self.success {
            return None;
        }
        Public::deserialize(&self.group_public_key)
    }

    pub fn disqualified(&self) -> &[bool] {
        &self.disqualified
    }

    pub fn inactive(&self) -> &[bool] {
        &self.inactive
    }

    /// Number of roster slots.
    pub fn group_size(&self) -> usize {
        self.disqualified.len()
    }

    /// Number of members that are neither disqualified nor inactive.
    pub fn qualified(&self) -> usize {
        self.disqualified
            .iter()
            .zip(&self.inactive)
            .filter(|(d, i)| !**d && !**i)
            .count()
    }

    /// One byte per slot (`0x01` if disqualified), in member order.
    pub fn disqualified_bytes(&self) -> Vec<u8> {
        flags_to_bytes(&self.disqualified)
    }

    /// One byte per slot (`0x01` if inactive), in member order.
    pub fn inactive_bytes(&self) -> Vec<u8> {
        flags_to_bytes(&self.inactive)
    }

    /// Compares two optional results: equal if both are absent or both are
    /// present and field-wise equal.
    pub fn equals(a: Option<&DkgResult>, b: Option<&DkgResult>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Checks the result against the roster it claims to describe.
    pub fn validate(&self, group_size: usize, threshold: usize) -> Result<(), Error> {
        if self.group_size() != group_size {
            return Err(Error::InvalidResult("unexpected group size"));
        }
        if self.success && self.qualified() < threshold {
            return Err(Error::InvalidResult("not enough qualified members"));
        }
        Ok(())
    }
}

fn flags_to_bytes(flags: &[bool]) -> Vec<u8> {
    flags.iter().map(|f| u8::from(*f)).collect()
}

fn flags_from_bytes(bytes: &[u8]) -> Result<Vec<bool>, Error> {
    bytes
        .iter()
        .map(|b| match b {
            0x00 => Ok(false),
            0x01 => Ok(true),
            _ => Err(Error::InvalidResult("flag byte must be 0x00 or 0x01")),
        })
        .collect()
}

impl Write for DkgResult {
    fn write(&self, buf: &mut impl BufMut) {
        self.success.write(buf);
        Bytes::copy_from_slice(&self.group_public_key).write(buf);
        self.disqualified.write(buf);
        self.inactive.write(buf);
    }
}

impl EncodeSize for DkgResult {
    fn encode_size(&self) -> usize {
        1 + 4 + self.group_public_key.len() + self.disqualified.encode_size() + self.inactive.encode_size()
    }
}

/// Reading a result is bounded by the maximum group size.
impl Read for DkgResult {
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, max_group_size: &usize) -> Result<Self, CodecError> {
        let success = bool::read(buf)?;
        let group_public_key = Bytes::read_cfg(buf, &PUBLIC_KEY_LENGTH)?;
        let disqualified = Vec::<bool>::read_cfg(buf, &(*max_group_size, ()))?;
        let inactive = Vec::<bool>::read_cfg(buf, &(*max_group_size, ()))?;
        Self::from_parts(success, group_public_key.to_vec(), disqualified, inactive)
            .map_err(|_| CodecError::Invalid("DkgResult", "malformed result"))
    }
}
