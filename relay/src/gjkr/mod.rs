//! Joint-Feldman distributed key generation with accusations (GJKR).
//!
//! Every member deals a random polynomial of degree `threshold - 1` to its
//! peers, encrypting each share under a pairwise ephemeral key. Members that
//! receive an invalid share accuse the dealer publicly, and every member
//! resolves each accusation the same way from broadcast data alone. The group
//! key is the sum of the commitments of the members that remain qualified.
//!
//! # Phases
//!
//! 1. Ephemeral key exchange: one ephemeral public key per peer.
//! 2. Dealing: a commitment to the secret polynomial plus one encrypted
//!    share per operating peer.
//! 3. Accusations: the ephemeral private key for every dealer that sent an
//!    invalid share.
//!
//! Each phase lasts `phase_duration` blocks. A member that sends nothing in a
//! phase is marked inactive and a member that sends something malformed
//! (including a message that cannot be decoded) is disqualified. Nothing
//! waits for a silent member.

use crate::group::{self, Group, MemberIndex};
use beacon_chain::{BlockCounter, DkgResult};
use beacon_cryptography::{
    bls12381::primitives::{group::Share, poly},
    PublicKey,
};
use beacon_net::{Receiver, Sender};
use beacon_utils::codec::{Decode, Encode};
use std::collections::BTreeSet;
use thiserror::Error;
use tokio::select;
use tracing::{debug, info, warn};

pub mod adjudicate;
pub mod ephemeral;
mod member;
pub use member::Member;
pub mod wire;

/// Errors that can occur while generating a key.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid group: {0}")]
    Group(#[from] group::Error),
    #[error("unable to send: {0}")]
    Send(String),
    #[error("unable to receive: {0}")]
    Recv(String),
    #[error("chain error: {0}")]
    Chain(#[from] beacon_chain::Error),
}

/// Deviations from the protocol, used to exercise fault handling.
#[derive(Clone, Debug, Default)]
pub struct Faults {
    /// Peers that receive a share that does not match the commitment.
    pub corrupt_shares: BTreeSet<MemberIndex>,
    /// Dealers that are accused even though their share was valid.
    pub false_accusations: BTreeSet<MemberIndex>,
}

/// Configuration for key generation.
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of blocks in each phase.
    pub phase_duration: u64,
    pub faults: Faults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            phase_duration: 5,
            faults: Faults::default(),
        }
    }
}

impl Config {
    /// Block at which the last phase of a run starting at `start_block` ends.
    pub fn end_block(&self, start_block: u64) -> u64 {
        start_block.saturating_add(self.phase_duration.saturating_mul(3))
    }

    /// Block at which phase `phase` (1-based) of a run starting at
    /// `start_block` ends.
    fn phase_end(&self, start_block: u64, phase: u64) -> u64 {
        start_block.saturating_add(self.phase_duration.saturating_mul(phase))
    }
}

/// Outcome of key generation, as seen by one member.
#[derive(Clone, Debug)]
pub struct Output<P: PublicKey> {
    /// The group, with every fault observed during the run recorded.
    pub group: Group<P>,
    /// The group's public polynomial, if enough members stayed qualified.
    pub public: Option<poly::Public>,
    /// This member's share of the group key, if it stayed qualified.
    pub share: Option<Share>,
}

impl<P: PublicKey> Output<P> {
    /// The result this member will propose for publication.
    pub fn result(&self) -> Result<DkgResult, beacon_chain::Error> {
        DkgResult::new(
            self.public.is_some(),
            self.public.as_ref().map(poly::public),
            self.group.disqualified_flags(),
            self.group.inactive_flags(),
        )
    }
}

/// Runs key generation as member `me` of `group`.
///
/// Waits until `start_block` before sending anything and returns once the
/// last phase has ended, regardless of how many peers participated.
#[allow(clippy::too_many_arguments)]
pub async fn execute<P, B, S, R>(
    cfg: &Config,
    me: MemberIndex,
    group: Group<P>,
    request_id: u64,
    seed: &[u8],
    entropy: &[u8; 32],
    start_block: u64,
    blocks: &B,
    sender: &mut S,
    receiver: &mut R,
) -> Result<Output<P>, Error>
where
    P: PublicKey,
    B: BlockCounter,
    S: Sender<PublicKey = P>,
    R: Receiver<PublicKey = P>,
{
    let mut member = Member::new(me, group, request_id, seed, entropy, cfg.faults.clone())?;
    blocks.wait_for_block(start_block).await?;
    info!(member = %me, request = request_id, start_block, "starting key generation");

    // Phase 1
    let payload = member.ephemeral_keys();
    broadcast(sender, request_id, payload).await?;
    collect(&mut member, cfg.phase_end(start_block, 1), blocks, receiver).await?;
    member.finish_ephemeral_keys();
    debug!(member = %me, qualified = member.group().qualified().len(), "ephemeral key exchange complete");

    // Phase 2
    let payload = member.dealing();
    broadcast(sender, request_id, payload).await?;
    collect(&mut member, cfg.phase_end(start_block, 2), blocks, receiver).await?;
    member.finish_dealings();
    debug!(member = %me, qualified = member.group().qualified().len(), "share distribution complete");

    // Phase 3
    let payload = member.accusations();
    broadcast(sender, request_id, payload).await?;
    collect(&mut member, cfg.end_block(start_block), blocks, receiver).await?;
    member.finish_accusations();

    let output = member.finalize();
    info!(
        member = %me,
        request = request_id,
        qualified = output.group.qualified().len(),
        success = output.public.is_some(),
        "key generation complete"
    );
    Ok(output)
}

async fn broadcast<S: Sender>(
    sender: &mut S,
    request_id: u64,
    payload: wire::Payload,
) -> Result<(), Error> {
    let message = wire::Message {
        request_id,
        payload,
    };
    sender
        .send(message.encode().freeze())
        .await
        .map_err(|err| Error::Send(err.to_string()))?;
    Ok(())
}

/// Feeds received messages to `member` until `deadline` is reached.
async fn collect<P, B, R>(
    member: &mut Member<P>,
    deadline: u64,
    blocks: &B,
    receiver: &mut R,
) -> Result<(), Error>
where
    P: PublicKey,
    B: BlockCounter,
    R: Receiver<PublicKey = P>,
{
    let group_size = member.group().size();
    loop {
        select! {
            biased;

            result = blocks.wait_for_block(deadline) => {
                return result.map_err(Error::Chain);
            },
            message = receiver.recv() => {
                let (peer, message) = message.map_err(|err| Error::Recv(err.to_string()))?;
                let message = match wire::Message::decode_cfg(message.clone(), &group_size) {
                    Ok(message) => message,
                    Err(err) => {
                        warn!(member = %member.index(), %peer, ?err, "failed to decode message");
                        if let Some((request_id, phase)) = wire::header(message) {
                            member.reject(&peer, request_id, phase);
                        }
                        continue;
                    }
                };
                member.receive(&peer, message);
            },
        }
    }
}
