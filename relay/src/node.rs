//! Produce relay entries for the requests assigned to a group.
//!
//! A [Node] watches the ledger for requests assigned to its group, broadcasts
//! its partial signature over each request's previous entry and collects the
//! partials of its peers. Once `threshold` valid partials are available it
//! combines them and submits the entry. Every member races to submit; the
//! ledger keeps the first.

use crate::signer::ThresholdSigner;
use beacon_chain::{Entry, Request, RequestId, ThresholdRelay};
use beacon_cryptography::{bls12381::primitives::poly::PartialSignature, PublicKey};
use beacon_net::{Receiver, Sender};
use beacon_utils::codec::{
    DecodeExt, Encode, EncodeSize, Error as CodecError, Read, ReadExt, Write,
};
use bytes::{Buf, BufMut};
use futures::{channel::mpsc, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tokio::select;
use tracing::{debug, info, warn};

/// Errors that stop a node.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unable to send: {0}")]
    Send(String),
    #[error("unable to receive: {0}")]
    Recv(String),
}

/// A member's partial signature for one request.
#[derive(Clone, Debug, PartialEq)]
pub struct Partial {
    pub request_id: RequestId,
    pub partial: PartialSignature,
}

impl Write for Partial {
    fn write(&self, buf: &mut impl BufMut) {
        self.request_id.write(buf);
        self.partial.write(buf);
    }
}

impl EncodeSize for Partial {
    fn encode_size(&self) -> usize {
        self.request_id.encode_size() + self.partial.encode_size()
    }
}

impl Read for Partial {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let request_id = RequestId::read(buf)?;
        let partial = PartialSignature::read(buf)?;
        Ok(Self {
            request_id,
            partial,
        })
    }
}

/// Partials are buffered for at most this many request ids past the last
/// request seen.
const LOOKAHEAD: RequestId = 16;

/// Rounds this far below the last request seen are dropped.
const RETAIN: RequestId = 64;

/// Partials collected for one request.
#[derive(Default)]
struct Round {
    request: Option<Request>,
    partials: BTreeMap<u32, PartialSignature>,
}

pub struct Node<P: PublicKey, T: ThresholdRelay, S: Sender, R: Receiver> {
    signer: ThresholdSigner,
    members: Vec<P>,
    chain: T,
    sender: S,
    receiver: R,
    requests: mpsc::UnboundedReceiver<Request>,

    latest: Option<RequestId>,
    rounds: BTreeMap<RequestId, Round>,
    completed: BTreeSet<RequestId>,
}

impl<P, T, S, R> Node<P, T, S, R>
where
    P: PublicKey,
    T: ThresholdRelay,
    S: Sender<PublicKey = P>,
    R: Receiver<PublicKey = P>,
{
    /// Creates a node for the group with roster `members` (in member order).
    ///
    /// Requests made after this returns are served once [Node::run] is
    /// called.
    pub fn new(signer: ThresholdSigner, members: Vec<P>, chain: T, sender: S, receiver: R) -> Self {
        let requests = chain.on_relay_entry_requested();
        Self {
            signer,
            members,
            chain,
            sender,
            receiver,
            requests,

            latest: None,
            rounds: BTreeMap::new(),
            completed: BTreeSet::new(),
        }
    }

    /// Lowest request id still tracked.
    fn floor(&self) -> RequestId {
        self.latest.map_or(0, |latest| latest.saturating_sub(RETAIN))
    }

    /// Whether a partial for `request_id` may be buffered.
    fn accepts(&self, request_id: RequestId) -> bool {
        let next = self.latest.map_or(0, |latest| latest.saturating_add(1));
        request_id >= self.floor() && request_id < next.saturating_add(LOOKAHEAD)
    }

    fn prune(&mut self) {
        let floor = self.floor();
        self.rounds = self.rounds.split_off(&floor);
        self.completed = self.completed.split_off(&floor);
    }

    /// Serves requests until the ledger or the network shuts down.
    pub async fn run(mut self) -> Result<(), Error> {
        let me = self.signer.member();
        info!(member = %me, "relay node started");
        loop {
            select! {
                request = self.requests.next() => {
                    let Some(request) = request else {
                        info!(member = %me, "ledger closed, stopping relay node");
                        return Ok(());
                    };
                    self.handle_request(request).await?;
                },
                message = self.receiver.recv() => {
                    let (peer, message) = message.map_err(|err| Error::Recv(err.to_string()))?;
                    let partial = match Partial::decode(message) {
                        Ok(partial) => partial,
                        Err(err) => {
                            warn!(member = %me, %peer, ?err, "failed to decode partial signature");
                            continue;
                        }
                    };
                    self.handle_partial(&peer, partial).await;
                },
            }
        }
    }

    async fn handle_request(&mut self, request: Request) -> Result<(), Error> {
        let me = self.signer.member();
        if self.latest.map_or(true, |latest| request.request_id > latest) {
            self.latest = Some(request.request_id);
            self.prune();
        }
        if request.group_public_key != *self.signer.group_public_key() {
            debug!(member = %me, request = request.request_id, "request assigned to another group");
            return Ok(());
        }
        let request_id = request.request_id;
        let partial = self.signer.sign(&request.previous_entry);
        debug!(member = %me, request = request_id, "signing relay entry");
        self.sender
            .send(
                Partial {
                    request_id,
                    partial,
                }
                .encode()
                .freeze(),
            )
            .await
            .map_err(|err| Error::Send(err.to_string()))?;

        let round = self.rounds.entry(request_id).or_default();
        round.request = Some(request);
        self.try_complete(request_id).await;
        Ok(())
    }

    async fn handle_partial(&mut self, peer: &P, partial: Partial) {
        let me = self.signer.member();
        let request_id = partial.request_id;
        if self.completed.contains(&request_id) {
            return;
        }
        if !self.accepts(request_id) {
            debug!(member = %me, %peer, request = request_id, "dropping partial outside request window");
            return;
        }
        let Some(position) = self.members.iter().position(|m| m == peer) else {
            debug!(member = %me, %peer, "dropping partial from non-member");
            return;
        };
        if partial.partial.index as usize != position + 1 {
            warn!(member = %me, %peer, index = partial.partial.index, "partial signed for another member");
            return;
        }
        self.rounds
            .entry(request_id)
            .or_default()
            .partials
            .entry(partial.partial.index)
            .or_insert(partial.partial);
        self.try_complete(request_id).await;
    }

    /// Combines and submits the entry for `request_id` once enough valid
    /// partials are available.
    async fn try_complete(&mut self, request_id: RequestId) {
        let me = self.signer.member();
        let threshold = self.signer.threshold() as usize;
        let Some(round) = self.rounds.get_mut(&request_id) else {
            return;
        };
        let Some(request) = &round.request else {
            return;
        };

        // Drop any partial that does not verify (it may have arrived before
        // the request)
        let signer = &self.signer;
        round.partials.retain(|index, partial| {
            let valid = signer.verify_partial(&request.previous_entry, partial);
            if !valid {
                warn!(member = %me, from = index, request = request_id, "invalid partial signature");
            }
            valid
        });
        if round.partials.len() < threshold {
            return;
        }

        let value = match signer.combine(&request.previous_entry, round.partials.values()) {
            Ok(value) => value,
            Err(err) => {
                warn!(member = %me, request = request_id, ?err, "unable to combine partial signatures");
                return;
            }
        };
        let entry = Entry {
            request_id,
            value,
            group_public_key: request.group_public_key,
            previous_entry: request.previous_entry.clone(),
            seed: request.seed.clone(),
            timestamp: 0,
        };
        self.rounds.remove(&request_id);
        self.completed.insert(request_id);

        match self.chain.submit_relay_entry(entry).await {
            Ok(entry) => info!(member = %me, request = request_id, block = entry.timestamp, "relay entry submitted"),
            Err(beacon_chain::Error::EntryAlreadySubmitted(_)) => {
                debug!(member = %me, request = request_id, "relay entry already submitted")
            }
            Err(err) => warn!(member = %me, request = request_id, ?err, "relay entry rejected"),
        }
    }
}
