//! In-process reference chain.
//!
//! Produces a block every `block_time` and keeps the ledger's state in memory.
//! Submissions are validated and applied in the order they acquire the state
//! lock, so the first valid DKG result (and the first valid entry) for a
//! request always wins.
//!
//! # Example
//!
//! ```rust
//! use beacon_chain::{local::{Chain, Config}, BlockCounter};
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().start_paused(true).build().unwrap().block_on(async {
//! let chain = Chain::new(Config {
//!     block_time: Duration::from_millis(100),
//!     group_size: 5,
//!     threshold: 3,
//!     genesis_entry: Bytes::from_static(&[1; 32]),
//! });
//! chain.wait_for_block(10).await.unwrap();
//! assert!(chain.current_block() >= 10);
//! # });
//! ```

use crate::{
    BlockCounter, DkgResult, DkgResultPublication, Entry, Error, Pending, Request, RequestId,
    ThresholdRelay,
};
use beacon_cryptography::bls12381::primitives::{
    group::{self, Element as _},
    ops,
};
use bytes::Bytes;
use futures::channel::mpsc;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio::sync::watch;
use tracing::{debug, info};

/// Configuration for the in-process chain.
#[derive(Clone, Debug)]
pub struct Config {
    /// Time between blocks.
    pub block_time: Duration,

    /// Number of members in every group.
    pub group_size: usize,

    /// Number of members required to produce a signature.
    pub threshold: usize,

    /// Entry the first request extends.
    pub genesis_entry: Bytes,
}

/// Delivers events to subscribers, forgetting those that went away.
struct Subscribers<T: Clone> {
    senders: Vec<mpsc::UnboundedSender<T>>,
}

impl<T: Clone> Subscribers<T> {
    fn new() -> Self {
        Self {
            senders: Vec::new(),
        }
    }

    fn subscribe(&mut self) -> mpsc::UnboundedReceiver<T> {
        let (sender, receiver) = mpsc::unbounded();
        self.senders.push(sender);
        receiver
    }

    fn publish(&mut self, event: &T) {
        self.senders
            .retain(|sender| sender.unbounded_send(event.clone()).is_ok());
    }
}

struct State {
    next_request: RequestId,
    last_entry: Bytes,
    groups: Vec<group::Public>,
    requests: HashMap<RequestId, Request>,
    entries: HashMap<RequestId, Entry>,
    results: HashMap<RequestId, DkgResultPublication>,

    requested: Subscribers<Request>,
    generated: Subscribers<Entry>,
    published: Subscribers<DkgResultPublication>,
}

/// Handle to an in-process chain.
///
/// Clones share the same ledger. Block production stops once every handle
/// has been dropped.
#[derive(Clone)]
pub struct Chain {
    cfg: Config,
    state: Arc<Mutex<State>>,
    height: watch::Receiver<u64>,
}

impl Chain {
    /// Creates a chain at height zero and starts producing blocks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(cfg: Config) -> Self {
        let (sender, height) = watch::channel(0u64);
        let block_time = cfg.block_time;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(block_time);
            interval.tick().await;
            loop {
                interval.tick().await;
                let next = *sender.borrow() + 1;
                if sender.send(next).is_err() {
                    debug!("chain dropped, stopping block production");
                    return;
                }
            }
        });

        let state = State {
            next_request: 1,
            last_entry: cfg.genesis_entry.clone(),
            groups: Vec::new(),
            requests: HashMap::new(),
            entries: HashMap::new(),
            results: HashMap::new(),
            requested: Subscribers::new(),
            generated: Subscribers::new(),
            published: Subscribers::new(),
        };
        Self {
            cfg,
            state: Arc::new(Mutex::new(state)),
            height,
        }
    }

    /// Returns the most recently accepted entry (the genesis entry if none).
    pub fn last_entry(&self) -> Result<Bytes, Error> {
        Ok(self.state()?.last_entry.clone())
    }

    /// Returns the group keys registered so far, oldest first.
    pub fn groups(&self) -> Result<Vec<group::Public>, Error> {
        Ok(self.state()?.groups.clone())
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, Error> {
        self.state.lock().map_err(|_| Error::Closed)
    }

    fn request(&self, seed: Bytes) -> Result<Request, Error> {
        let block = self.current_block();
        let mut state = self.state()?;
        let group_public_key = *state.groups.last().ok_or(Error::NoGroups)?;
        let request = Request {
            request_id: state.next_request,
            seed,
            previous_entry: state.last_entry.clone(),
            group_public_key,
            block,
        };
        state.next_request += 1;
        state.requests.insert(request.request_id, request.clone());
        state.requested.publish(&request);
        info!(request = request.request_id, block, "relay entry requested");
        Ok(request)
    }

    fn submit_entry(&self, mut entry: Entry) -> Result<Entry, Error> {
        let block = self.current_block();
        let mut state = self.state()?;
        if state.entries.contains_key(&entry.request_id) {
            return Err(Error::EntryAlreadySubmitted(entry.request_id));
        }

        // Entries for known requests must come from the assigned group and
        // extend the entry the request was made against. Entries for unknown
        // requests (bootstrap) must extend the latest entry.
        let expected_previous = match state.requests.get(&entry.request_id) {
            Some(request) => {
                if request.group_public_key != entry.group_public_key {
                    return Err(Error::GroupMismatch);
                }
                &request.previous_entry
            }
            None => &state.last_entry,
        };
        if *expected_previous != entry.previous_entry {
            return Err(Error::PreviousEntryMismatch);
        }
        ops::verify(&entry.group_public_key, &entry.previous_entry, &entry.value)
            .map_err(|_| Error::InvalidSignature)?;

        entry.timestamp = block;
        if let Some(request) = state.requests.get(&entry.request_id) {
            entry.seed = request.seed.clone();
        }
        state.last_entry = Bytes::from(entry.value.serialize());
        state.entries.insert(entry.request_id, entry.clone());
        state.generated.publish(&entry);
        info!(request = entry.request_id, block, "relay entry accepted");
        Ok(entry)
    }

    fn submit_result(
        &self,
        request_id: RequestId,
        result: DkgResult,
    ) -> Result<DkgResultPublication, Error> {
        let block = self.current_block();
        let mut state = self.state()?;
        if state.results.contains_key(&request_id) {
            return Err(Error::AlreadySubmitted(request_id));
        }
        result.validate(self.cfg.group_size, self.cfg.threshold)?;

        if let Some(key) = result.group_public_key() {
            state.groups.push(key);
        }
        let publication = DkgResultPublication {
            request_id,
            result,
            block,
        };
        state.results.insert(request_id, publication.clone());
        state.published.publish(&publication);
        info!(
            request = request_id,
            block,
            success = publication.result.success(),
            "dkg result published"
        );
        Ok(publication)
    }
}

impl BlockCounter for Chain {
    fn current_block(&self) -> u64 {
        *self.height.borrow()
    }

    async fn wait_for_block(&self, height: u64) -> Result<(), Error> {
        let mut receiver = self.height.clone();
        loop {
            let current = *receiver.borrow_and_update();
            if current >= height {
                return Ok(());
            }
            receiver.changed().await.map_err(|_| Error::Closed)?;
        }
    }
}

impl ThresholdRelay for Chain {
    fn request_relay_entry(&self, seed: Bytes) -> Pending<Request> {
        Pending::ready(self.request(seed))
    }

    fn submit_relay_entry(&self, entry: Entry) -> Pending<Entry> {
        let request_id = entry.request_id;
        let result = self.submit_entry(entry);
        if let Err(err) = &result {
            debug!(request = request_id, ?err, "relay entry rejected");
        }
        Pending::ready(result)
    }

    fn submit_dkg_result(
        &self,
        request_id: RequestId,
        result: DkgResult,
    ) -> Pending<DkgResultPublication> {
        let result = self.submit_result(request_id, result);
        if let Err(err) = &result {
            debug!(request = request_id, ?err, "dkg result rejected");
        }
        Pending::ready(result)
    }

    fn dkg_result(&self, request_id: RequestId) -> Pending<Option<DkgResultPublication>> {
        Pending::ready(
            self.state()
                .map(|state| state.results.get(&request_id).cloned()),
        )
    }

    fn on_relay_entry_requested(&self) -> mpsc::UnboundedReceiver<Request> {
        match self.state() {
            Ok(mut state) => state.requested.subscribe(),
            Err(_) => mpsc::unbounded().1,
        }
    }

    fn on_relay_entry_generated(&self) -> mpsc::UnboundedReceiver<Entry> {
        match self.state() {
            Ok(mut state) => state.generated.subscribe(),
            Err(_) => mpsc::unbounded().1,
        }
    }

    fn on_dkg_result_published(&self) -> mpsc::UnboundedReceiver<DkgResultPublication> {
        match self.state() {
            Ok(mut state) => state.published.subscribe(),
            Err(_) => mpsc::unbounded().1,
        }
    }
}
