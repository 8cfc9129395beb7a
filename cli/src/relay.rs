//! `relay` subcommands, run against an in-process devnet.

use crate::config::Config;
use beacon_chain::{local::Chain, BlockCounter, Entry, ThresholdRelay};
use beacon_cryptography::{ed25519, Signer};
use beacon_net::local::{self as network, Network};
use beacon_relay::{
    dkg::{self, Run},
    genesis::{bootstrap_entry, genesis_entry},
    node::Node,
    GJKR_CHANNEL, RESULT_CHANNEL, SIGNATURE_CHANNEL,
};
use bytes::Bytes;
use futures::StreamExt;
use rand::{rngs::OsRng, RngCore};
use std::time::Duration;
use thiserror::Error;
use tokio::{select, time::Instant};
use tracing::{info, warn};

pub const CMD: &str = "relay";
pub const REQUEST_CMD: &str = "request";
pub const ENTRY_CMD: &str = "entry";
pub const SUBMIT_CMD: &str = "submit";

/// Request the devnet group is created for.
const GROUP_REQUEST: u64 = 0;

/// Largest message exchanged on the devnet.
const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Interval between progress updates while waiting for an entry.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum Error {
    #[error("chain error: {0}")]
    Chain(#[from] beacon_chain::Error),
    #[error("network error: {0}")]
    Network(#[from] beacon_net::Error),
    #[error("group creation failed: {0}")]
    Dkg(#[from] dkg::Error),
    #[error("no relay entry after {0:?}")]
    Timeout(Duration),
    #[error("not implemented")]
    NotImplemented,
}

/// Starts an in-process chain, creates a group on it and starts a relay node
/// for every member of the group.
async fn devnet(config: &Config) -> Result<Chain, Error> {
    let chain = Chain::new(config.chain());
    let network = Network::new(network::Config {
        max_message_size: MAX_MESSAGE_SIZE,
    });
    let operators = (0..config.devnet.members)
        .map(|_| ed25519::PrivateKey::from_rng(&mut OsRng))
        .collect::<Vec<_>>();
    let members = operators.iter().map(|o| o.public_key()).collect::<Vec<_>>();
    let run = Run {
        request_id: GROUP_REQUEST,
        seed: genesis_entry(),
        members: members.clone(),
        threshold: config.devnet.threshold,
        start_block: chain.current_block() + 1,
    };
    info!(
        members = members.len(),
        threshold = run.threshold,
        "creating devnet group"
    );

    let mut handles = Vec::new();
    for (position, operator) in operators.into_iter().enumerate() {
        let public_key = operator.public_key();
        let gjkr_channel = network.register(public_key.clone(), GJKR_CHANNEL)?;
        let result_channel = network.register(public_key.clone(), RESULT_CHANNEL)?;
        let (dkg_config, run, chain) = (config.dkg(), run.clone(), chain.clone());
        handles.push(tokio::spawn(async move {
            dkg::execute(
                &dkg_config,
                position,
                run,
                &operator,
                &chain,
                &chain,
                gjkr_channel,
                result_channel,
            )
            .await
        }));
    }

    let mut created = 0;
    let mut failure = None;
    for (position, handle) in handles.into_iter().enumerate() {
        let signer = match handle.await {
            Ok(Ok(signer)) => signer,
            Ok(Err(err)) => {
                warn!(?err, "member failed to join group");
                failure = Some(err);
                continue;
            }
            Err(err) => {
                warn!(?err, "member task failed");
                continue;
            }
        };
        let (sender, receiver) = network.register(members[position].clone(), SIGNATURE_CHANNEL)?;
        let node = Node::new(signer, members.clone(), chain.clone(), sender, receiver);
        tokio::spawn(node.run());
        created += 1;
    }
    if created < config.devnet.threshold {
        if let Some(err) = failure {
            return Err(Error::Dkg(err));
        }
        return Err(Error::Chain(beacon_chain::Error::NoGroups));
    }
    info!(members = created, "devnet group created");
    Ok(chain)
}

/// Requests a relay entry and waits for it.
pub async fn request(config: &Config) -> Result<Entry, Error> {
    let chain = devnet(config).await?;
    let mut generated = chain.on_relay_entry_generated();

    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    let request = chain
        .request_relay_entry(Bytes::copy_from_slice(&seed))
        .await?;
    eprintln!(
        "requested relay entry {} at block {}",
        request.request_id, request.block
    );

    let timeout = config.request_timeout();
    let started = Instant::now();
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut progress = tokio::time::interval_at(started + PROGRESS_INTERVAL, PROGRESS_INTERVAL);
    loop {
        select! {
            _ = &mut deadline => {
                return Err(Error::Timeout(timeout));
            },
            _ = progress.tick() => {
                eprintln!(
                    "waiting for relay entry {} ({}s elapsed)",
                    request.request_id,
                    started.elapsed().as_secs()
                );
            },
            entry = generated.next() => {
                let Some(entry) = entry else {
                    return Err(Error::Chain(beacon_chain::Error::Closed));
                };
                if entry.request_id == request.request_id {
                    return Ok(entry);
                }
            },
        }
    }
}

/// Looks up a relay entry.
pub async fn entry() -> Result<Entry, Error> {
    Err(Error::NotImplemented)
}

/// Submits the bootstrap entry for `request_id`.
pub async fn submit(config: &Config, request_id: u64) -> Result<Entry, Error> {
    let chain = Chain::new(config.chain());
    let entry = chain.submit_relay_entry(bootstrap_entry(request_id)).await?;
    Ok(entry)
}
