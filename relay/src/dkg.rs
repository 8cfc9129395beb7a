//! Run key generation and result publication for one member.
//!
//! [execute] validates the member's slot, runs [gjkr] until the last phase
//! ends, publishes the outcome with [result] and, if the group was created
//! with this member qualified, returns its [ThresholdSigner].

use crate::{
    gjkr,
    group::{self, Group, MemberIndex},
    result::{self, Rotation},
    signer::ThresholdSigner,
};
use beacon_chain::{BlockCounter, RequestId, ThresholdRelay};
use beacon_cryptography::{bls12381::primitives::poly, Signer};
use beacon_net::{Receiver, Sender};
use bytes::Bytes;
use rand::{rngs::OsRng, RngCore};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur while creating a group, tagged with the member
/// that observed them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("[member:{0}] invalid member: {1}")]
    Group(MemberIndex, #[source] group::Error),
    #[error("[member:{0}] key generation failed: {1}")]
    KeyGeneration(MemberIndex, #[source] gjkr::Error),
    #[error("[member:{0}] result publication failed: {1}")]
    Publication(MemberIndex, #[source] result::Error),
    #[error("[member:{0}] published group key differs from own")]
    ResultMismatch(MemberIndex),
    #[error("[member:{0}] group not created")]
    GroupNotCreated(MemberIndex),
    #[error("[member:{0}] member not qualified")]
    NotQualified(MemberIndex),
    #[error("[member:{0}] timed out")]
    Timeout(MemberIndex),
}

/// Configuration for creating a group.
#[derive(Clone, Debug, Default)]
pub struct Config {
    pub gjkr: gjkr::Config,
    pub result: result::Config,

    /// Bound on the whole run, if any.
    pub timeout: Option<Duration>,
}

/// Parameters of one group creation, identical for every member.
#[derive(Clone, Debug)]
pub struct Run<P> {
    pub request_id: RequestId,
    pub seed: Bytes,
    /// Roster in group-selection order.
    pub members: Vec<P>,
    pub threshold: usize,
    pub start_block: u64,
}

/// Creates a group as the member at 0-based `position` of the roster.
///
/// Key generation messages travel over `gjkr_channel` and result submissions
/// over `result_channel`. A run that fails to create the group is still
/// published before [Error::GroupNotCreated] is returned.
#[allow(clippy::too_many_arguments)]
pub async fn execute<C, B, T, S1, R1, S2, R2>(
    cfg: &Config,
    position: usize,
    run: Run<C::PublicKey>,
    operator: &C,
    blocks: &B,
    chain: &T,
    gjkr_channel: (S1, R1),
    result_channel: (S2, R2),
) -> Result<ThresholdSigner, Error>
where
    C: Signer,
    B: BlockCounter,
    T: ThresholdRelay,
    S1: Sender<PublicKey = C::PublicKey>,
    R1: Receiver<PublicKey = C::PublicKey>,
    S2: Sender<PublicKey = C::PublicKey>,
    R2: Receiver<PublicKey = C::PublicKey>,
{
    let me = MemberIndex::from_position(position);
    let creation = create(cfg, me, run, operator, blocks, chain, gjkr_channel, result_channel);
    match cfg.timeout {
        Some(timeout) => tokio::time::timeout(timeout, creation)
            .await
            .map_err(|_| Error::Timeout(me))?,
        None => creation.await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn create<C, B, T, S1, R1, S2, R2>(
    cfg: &Config,
    me: MemberIndex,
    run: Run<C::PublicKey>,
    operator: &C,
    blocks: &B,
    chain: &T,
    (mut gjkr_sender, mut gjkr_receiver): (S1, R1),
    (mut result_sender, mut result_receiver): (S2, R2),
) -> Result<ThresholdSigner, Error>
where
    C: Signer,
    B: BlockCounter,
    T: ThresholdRelay,
    S1: Sender<PublicKey = C::PublicKey>,
    R1: Receiver<PublicKey = C::PublicKey>,
    S2: Sender<PublicKey = C::PublicKey>,
    R2: Receiver<PublicKey = C::PublicKey>,
{
    // Validate our slot before doing anything
    let group = Group::new(run.members, run.threshold).map_err(|err| Error::Group(me, err))?;
    me.validate(group.size()).map_err(|err| Error::Group(me, err))?;
    if group.member(me) != Some(&operator.public_key()) {
        return Err(Error::Group(me, group::Error::NotMember(me)));
    }

    // Generate the key
    let mut entropy = [0u8; 32];
    OsRng.fill_bytes(&mut entropy);
    let output = gjkr::execute(
        &cfg.gjkr,
        me,
        group.clone(),
        run.request_id,
        &run.seed,
        &entropy,
        run.start_block,
        blocks,
        &mut gjkr_sender,
        &mut gjkr_receiver,
    )
    .await
    .map_err(|err| Error::KeyGeneration(me, err))?;

    // Publish the outcome
    let own = output
        .result()
        .map_err(|err| Error::Publication(me, result::Error::Chain(err)))?;
    let publication = result::publish(
        &cfg.result,
        &Rotation,
        operator,
        &group,
        run.request_id,
        &run.seed,
        own,
        cfg.gjkr.end_block(run.start_block),
        blocks,
        chain,
        &mut result_sender,
        &mut result_receiver,
    )
    .await
    .map_err(|err| Error::Publication(me, err))?;

    // Check that we are part of the published group
    let published = publication.result;
    if !published.success() {
        warn!(member = %me, request = run.request_id, "group not created");
        return Err(Error::GroupNotCreated(me));
    }
    let Some(public) = output.public else {
        return Err(Error::ResultMismatch(me));
    };
    if published.group_public_key().as_ref() != Some(poly::public(&public)) {
        return Err(Error::ResultMismatch(me));
    }
    let position = me.position();
    let flagged = |flags: &[bool]| flags.get(position).copied().unwrap_or(true);
    if flagged(published.disqualified()) || flagged(published.inactive()) {
        return Err(Error::NotQualified(me));
    }
    let Some(share) = output.share else {
        return Err(Error::NotQualified(me));
    };
    info!(member = %me, request = run.request_id, "group created");
    Ok(ThresholdSigner::new(me, public, share))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{gjkr::Faults, mocks, GJKR_CHANNEL, RESULT_CHANNEL};
    use beacon_chain::local::Chain;
    use beacon_cryptography::{bls12381::primitives::ops::threshold_signature_recover, ed25519};
    use futures::future::join_all;
    use std::collections::BTreeSet;

    const REQUEST: RequestId = 1;

    /// Creates a group with the members at `running`, returning the outcome of
    /// each (in the order of `running`).
    async fn create_group(
        chain: &Chain,
        n: u64,
        threshold: usize,
        running: &[usize],
        faults: &[(usize, Faults)],
    ) -> Vec<Result<ThresholdSigner, Error>> {
        let network = mocks::network();
        let operators = mocks::signers(n);
        let run = Run {
            request_id: REQUEST,
            seed: Bytes::from_static(b"seed"),
            members: operators.iter().map(|o| o.public_key()).collect(),
            threshold,
            start_block: 1,
        };
        let mut handles = Vec::new();
        for position in running.iter().copied() {
            let operator = operators[position].clone();
            let gjkr_channel = network.register(operator.public_key(), GJKR_CHANNEL).unwrap();
            let result_channel = network.register(operator.public_key(), RESULT_CHANNEL).unwrap();
            let mut cfg = Config::default();
            if let Some((_, faults)) = faults.iter().find(|(p, _)| *p == position) {
                cfg.gjkr.faults = faults.clone();
            }
            let (run, chain) = (run.clone(), chain.clone());
            handles.push(tokio::spawn(async move {
                execute(
                    &cfg,
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
        join_all(handles)
            .await
            .into_iter()
            .map(|handle| handle.unwrap())
            .collect()
    }

    /// Checks that the signers hold shares of one key registered on the chain.
    fn assert_group(chain: &Chain, signers: &[&ThresholdSigner], threshold: u32) {
        let key = *signers[0].group_public_key();
        assert_eq!(chain.groups().unwrap(), vec![key]);
        let partials = signers
            .iter()
            .map(|s| {
                assert_eq!(*s.group_public_key(), key);
                s.sign(b"entry")
            })
            .collect::<Vec<_>>();
        let value = threshold_signature_recover(threshold, &partials).unwrap();
        assert!(crate::signer::verify(&key, b"entry", &value));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_members_honest() {
        let chain = mocks::chain(5, 3);
        let outcomes = create_group(&chain, 5, 3, &[0, 1, 2, 3, 4], &[]).await;
        let signers = outcomes.iter().map(|o| o.as_ref().unwrap()).collect::<Vec<_>>();
        assert_group(&chain, &signers, 3);

        let published = chain.dkg_result(REQUEST).await.unwrap().unwrap().result;
        assert!(published.success());
        assert_eq!(published.qualified(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_dealer_disqualified() {
        let chain = mocks::chain(5, 3);
        let faults = Faults {
            corrupt_shares: BTreeSet::from([MemberIndex::new(2)]),
            ..Default::default()
        };
        let outcomes = create_group(&chain, 5, 3, &[0, 1, 2, 3, 4], &[(0, faults)]).await;
        assert!(matches!(outcomes[0], Err(Error::NotQualified(m)) if m == MemberIndex::new(1)));
        let signers = outcomes[1..].iter().map(|o| o.as_ref().unwrap()).collect::<Vec<_>>();
        assert_group(&chain, &signers, 3);

        let published = chain.dkg_result(REQUEST).await.unwrap().unwrap().result;
        assert_eq!(published.disqualified(), &[true, false, false, false, false]);
        assert_eq!(published.inactive(), &[false; 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_members_inactive() {
        let chain = mocks::chain(5, 3);
        let outcomes = create_group(&chain, 5, 3, &[0, 1, 2], &[]).await;
        let signers = outcomes.iter().map(|o| o.as_ref().unwrap()).collect::<Vec<_>>();
        assert_group(&chain, &signers, 3);

        let published = chain.dkg_result(REQUEST).await.unwrap().unwrap().result;
        assert!(published.success());
        assert_eq!(published.inactive(), &[false, false, false, true, true]);
        assert_eq!(published.disqualified(), &[false; 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_still_published() {
        let chain = mocks::chain(5, 3);
        let outcomes = create_group(&chain, 5, 3, &[0, 1], &[]).await;
        assert!(matches!(outcomes[0], Err(Error::GroupNotCreated(m)) if m == MemberIndex::new(1)));
        assert!(matches!(outcomes[1], Err(Error::GroupNotCreated(m)) if m == MemberIndex::new(2)));

        let published = chain.dkg_result(REQUEST).await.unwrap().unwrap().result;
        assert!(!published.success());
        assert!(published.group_public_key().is_none());
        assert_eq!(published.inactive(), &[false, false, true, true, true]);
        assert!(chain.groups().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_slot() {
        let chain = mocks::chain(3, 2);
        let network = mocks::network();
        let operators = mocks::signers(3);
        let run = Run {
            request_id: REQUEST,
            seed: Bytes::from_static(b"seed"),
            members: operators.iter().map(|o| o.public_key()).collect(),
            threshold: 2,
            start_block: 1,
        };
        let channels = |seed: u64| {
            let key = ed25519::PrivateKey::from_seed(seed).public_key();
            (
                network.register(key.clone(), GJKR_CHANNEL).unwrap(),
                network.register(key, RESULT_CHANNEL).unwrap(),
            )
        };

        // Past the end of the roster
        let (gjkr_channel, result_channel) = channels(0);
        let outcome = execute(
            &Config::default(),
            3,
            run.clone(),
            &operators[0],
            &chain,
            &chain,
            gjkr_channel,
            result_channel,
        )
        .await;
        assert!(matches!(
            outcome,
            Err(Error::Group(_, group::Error::InvalidIndex(4, 3)))
        ));

        // Someone else's slot
        let (gjkr_channel, result_channel) = channels(1);
        let outcome = execute(
            &Config::default(),
            2,
            run,
            &operators[1],
            &chain,
            &chain,
            gjkr_channel,
            result_channel,
        )
        .await;
        assert!(matches!(
            outcome,
            Err(Error::Group(_, group::Error::NotMember(m))) if m == MemberIndex::new(3)
        ));

        // Nothing ran
        assert_eq!(chain.current_block(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let chain = mocks::chain(3, 2);
        let network = mocks::network();
        let operators = mocks::signers(3);
        let run = Run {
            request_id: REQUEST,
            seed: Bytes::from_static(b"seed"),
            members: operators.iter().map(|o| o.public_key()).collect(),
            threshold: 2,
            start_block: 1_000,
        };
        let cfg = Config {
            timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let gjkr_channel = network.register(operators[0].public_key(), GJKR_CHANNEL).unwrap();
        let result_channel = network.register(operators[0].public_key(), RESULT_CHANNEL).unwrap();
        let outcome = execute(
            &cfg,
            0,
            run,
            &operators[0],
            &chain,
            &chain,
            gjkr_channel,
            result_channel,
        )
        .await;
        assert!(matches!(outcome, Err(Error::Timeout(m)) if m == MemberIndex::new(1)));
    }
}
