//! Interact with the ledger that coordinates the beacon.
//!
//! The ledger provides three capabilities to beacon members:
//!
//! * a monotonically increasing block height ([BlockCounter]) that every phase
//!   deadline is measured against,
//! * submission of DKG results and relay entries ([ThresholdRelay]),
//! * an append-only log of events members can subscribe to.
//!
//! Every submission returns a [Pending] that resolves exactly once, to the
//! accepted value or the reason it was rejected.
//!
//! [local] provides an in-process chain used by devnets and tests.

use beacon_cryptography::bls12381::primitives::group;
use bytes::Bytes;
use futures::channel::mpsc;
use std::future::Future;
use thiserror::Error;

pub mod local;
mod pending;
pub use pending::{Pending, Resolver};
mod result;
pub use result::DkgResult;

/// Identifier of a relay entry request (and of the DKG run it triggers).
pub type RequestId = u64;

/// Errors that can occur when interacting with the ledger.
#[derive(Debug, Error)]
pub enum Error {
    #[error("result already submitted for request {0}")]
    AlreadySubmitted(RequestId),
    #[error("entry already submitted for request {0}")]
    EntryAlreadySubmitted(RequestId),
    #[error("invalid result: {0}")]
    InvalidResult(&'static str),
    #[error("unknown request")]
    UnknownRequest,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("entry signed by the wrong group")]
    GroupMismatch,
    #[error("entry does not extend the previous entry")]
    PreviousEntryMismatch,
    #[error("no group registered")]
    NoGroups,
    #[error("operation dropped")]
    Dropped,
    #[error("chain closed")]
    Closed,
}

/// A request for a new relay entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub request_id: RequestId,
    /// Caller supplied seed.
    pub seed: Bytes,
    /// Entry the group must sign to produce the new entry.
    pub previous_entry: Bytes,
    /// Group assigned to the request.
    pub group_public_key: group::Public,
    /// Height at which the request was accepted.
    pub block: u64,
}

/// A relay entry: the group's threshold signature over the previous entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub request_id: RequestId,
    pub value: group::Signature,
    pub group_public_key: group::Public,
    pub previous_entry: Bytes,
    pub seed: Bytes,
    /// Height at which the entry was accepted (ignored on submission).
    pub timestamp: u64,
}

/// A DKG result accepted by the ledger.
#[derive(Clone, Debug, PartialEq)]
pub struct DkgResultPublication {
    pub request_id: RequestId,
    pub result: DkgResult,
    /// Height at which the result was accepted.
    pub block: u64,
}

/// Interface for observing the ledger's block height.
pub trait BlockCounter: Clone + Send + Sync + 'static {
    /// Returns the current height.
    fn current_block(&self) -> u64;

    /// Resolves once the height reaches `height` (immediately if already reached).
    fn wait_for_block(&self, height: u64) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Interface for submitting to, and subscribing to, the beacon's ledger.
pub trait ThresholdRelay: Clone + Send + Sync + 'static {
    /// Requests a new relay entry.
    fn request_relay_entry(&self, seed: Bytes) -> Pending<Request>;

    /// Submits a relay entry. The first valid entry per request is accepted.
    fn submit_relay_entry(&self, entry: Entry) -> Pending<Entry>;

    /// Submits the outcome of a DKG run. The first valid result per request
    /// is accepted and every later one rejected.
    fn submit_dkg_result(
        &self,
        request_id: RequestId,
        result: DkgResult,
    ) -> Pending<DkgResultPublication>;

    /// Returns the result published for a request, if any.
    fn dkg_result(&self, request_id: RequestId) -> Pending<Option<DkgResultPublication>>;

    /// Subscribes to relay entry requests.
    fn on_relay_entry_requested(&self) -> mpsc::UnboundedReceiver<Request>;

    /// Subscribes to accepted relay entries.
    fn on_relay_entry_generated(&self) -> mpsc::UnboundedReceiver<Entry>;

    /// Subscribes to published DKG results.
    fn on_dkg_result_published(&self) -> mpsc::UnboundedReceiver<DkgResultPublication>;
}
