//! Membership of a beacon group.
//!
//! The roster is kept in group-selection order (it is never sorted) and each
//! slot is identified by a 1-based [MemberIndex]. While a key generation runs,
//! members that misbehave are marked disqualified and members that stay
//! silent are marked inactive. Disqualification takes precedence: a
//! disqualified member is never inactive.

use beacon_cryptography::PublicKey;
use beacon_utils::codec::{Error as CodecError, EncodeSize, Read, ReadExt, Write};
use bytes::{Buf, BufMut};
use std::{collections::BTreeSet, fmt};
use thiserror::Error;

/// Errors that can occur when building a group.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid member index {0} for group of {1}")]
    InvalidIndex(u32, usize),
    #[error("invalid threshold {0} for group of {1}")]
    InvalidThreshold(usize, usize),
    #[error("duplicate member at index {0}")]
    DuplicateMember(MemberIndex),
    #[error("operator is not member {0}")]
    NotMember(MemberIndex),
}

/// 1-based position of a member in a group.
///
/// Zero is never a valid index (it is the evaluation point of the group
/// secret).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemberIndex(u32);

impl MemberIndex {
    /// Creates an index without validating it.
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Converts a 0-based roster position into a member index.
    pub fn from_position(position: usize) -> Self {
        Self(u32::try_from(position).map_or(0, |p| p.saturating_add(1)))
    }

    /// Returns the 0-based roster position.
    pub fn position(&self) -> usize {
        (self.0 as usize).saturating_sub(1)
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    /// Fails if the index is zero or outside a group of `group_size`.
    pub fn validate(&self, group_size: usize) -> Result<(), Error> {
        if self.0 == 0 || self.0 as usize > group_size {
            return Err(Error::InvalidIndex(self.0, group_size));
        }
        Ok(())
    }
}

impl fmt::Display for MemberIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Write for MemberIndex {
    fn write(&self, buf: &mut impl BufMut) {
        self.0.write(buf);
    }
}

impl EncodeSize for MemberIndex {
    fn encode_size(&self) -> usize {
        self.0.encode_size()
    }
}

impl Read for MemberIndex {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let index = u32::read(buf)?;
        if index == 0 {
            return Err(CodecError::Invalid("MemberIndex", "index must be non-zero"));
        }
        Ok(Self(index))
    }
}

/// Roster of a group and the faults observed while forming it.
#[derive(Clone, Debug)]
pub struct Group<P: PublicKey> {
    members: Vec<P>,
    threshold: usize,

    disqualified: BTreeSet<MemberIndex>,
    inactive: BTreeSet<MemberIndex>,
}

impl<P: PublicKey> Group<P> {
    /// Creates a group from an ordered roster.
    ///
    /// Requires `1 <= threshold < members.len()` and no operator appearing
    /// twice.
    pub fn new(members: Vec<P>, threshold: usize) -> Result<Self, Error> {
        if threshold == 0 || threshold >= members.len() {
            return Err(Error::InvalidThreshold(threshold, members.len()));
        }
        let mut seen = BTreeSet::new();
        for (position, member) in members.iter().enumerate() {
            if !seen.insert(member) {
                return Err(Error::DuplicateMember(MemberIndex::from_position(position)));
            }
        }
        Ok(Self {
            members,
            threshold,
            disqualified: BTreeSet::new(),
            inactive: BTreeSet::new(),
        })
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Returns the roster in member order.
    pub fn members(&self) -> &[P] {
        &self.members
    }

    /// Returns the operator at `index`.
    pub fn member(&self, index: MemberIndex) -> Option<&P> {
        if index.validate(self.size()).is_err() {
            return None;
        }
        self.members.get(index.position())
    }

    /// Returns the index of `operator`, if it is a member.
    pub fn index_of(&self, operator: &P) -> Option<MemberIndex> {
        self.members
            .iter()
            .position(|m| m == operator)
            .map(MemberIndex::from_position)
    }

    pub fn contains(&self, operator: &P) -> bool {
        self.index_of(operator).is_some()
    }

    /// Returns every member index in order.
    pub fn indices(&self) -> impl Iterator<Item = MemberIndex> {
        (1..=self.members.len() as u32).map(MemberIndex)
    }

    /// Marks a member as disqualified (clearing inactivity).
    pub fn disqualify(&mut self, index: MemberIndex) {
        self.inactive.remove(&index);
        self.disqualified.insert(index);
    }

    /// Marks a member as inactive, unless it is already disqualified.
    pub fn mark_inactive(&mut self, index: MemberIndex) {
        if self.disqualified.contains(&index) {
            return;
        }
        self.inactive.insert(index);
    }

    pub fn is_disqualified(&self, index: MemberIndex) -> bool {
        self.disqualified.contains(&index)
    }

    pub fn is_inactive(&self, index: MemberIndex) -> bool {
        self.inactive.contains(&index)
    }

    /// Whether the member is neither disqualified nor inactive.
    pub fn is_operating(&self, index: MemberIndex) -> bool {
        !self.is_disqualified(index) && !self.is_inactive(index)
    }

    /// Returns the members that are neither disqualified nor inactive, in
    /// member order.
    pub fn qualified(&self) -> Vec<MemberIndex> {
        self.indices().filter(|i| self.is_operating(*i)).collect()
    }

    /// Whether enough members remain to produce a signature.
    pub fn has_quorum(&self) -> bool {
        self.qualified().len() >= self.threshold
    }

    /// One flag per slot, set if the member is disqualified.
    pub fn disqualified_flags(&self) -> Vec<bool> {
        self.indices().map(|i| self.is_disqualified(i)).collect()
    }

    /// One flag per slot, set if the member is inactive.
    pub fn inactive_flags(&self) -> Vec<bool> {
        self.indices().map(|i| self.is_inactive(i)).collect()
    }
}
