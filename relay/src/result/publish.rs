use super::{wire::Submission, Config, Error, SubmissionPolicy, Tally};
use crate::group::{Group, MemberIndex};
use beacon_chain::{BlockCounter, DkgResult, DkgResultPublication, RequestId, ThresholdRelay};
use beacon_cryptography::Signer;
use beacon_net::{Receiver, Sender};
use beacon_utils::codec::{Decode, Encode};
use futures::{channel::mpsc, StreamExt};
use tokio::select;
use tracing::{debug, info, warn};

/// Members allowed to submit `result`: its qualified members, or every member
/// if it has none.
fn submitters(result: &DkgResult) -> Vec<MemberIndex> {
    let qualified = result
        .disqualified()
        .iter()
        .zip(result.inactive())
        .enumerate()
        .filter(|(_, (disqualified, inactive))| !**disqualified && !**inactive)
        .map(|(position, _)| MemberIndex::from_position(position))
        .collect::<Vec<_>>();
    if !qualified.is_empty() {
        return qualified;
    }
    (0..result.group_size())
        .map(MemberIndex::from_position)
        .collect()
}

/// Resolves with the next publication for `request_id`.
async fn published(
    events: &mut mpsc::UnboundedReceiver<DkgResultPublication>,
    request_id: RequestId,
) -> Result<DkgResultPublication, Error> {
    while let Some(publication) = events.next().await {
        if publication.request_id == request_id {
            return Ok(publication);
        }
    }
    Err(Error::Chain(beacon_chain::Error::Closed))
}

/// Compares the published result with this member's own.
fn accept(
    me: MemberIndex,
    own: &DkgResult,
    publication: DkgResultPublication,
) -> Result<DkgResultPublication, Error> {
    if !DkgResult::equals(Some(&publication.result), Some(own)) {
        warn!(member = %me, request = publication.request_id, "published result differs from own result");
    }
    info!(
        member = %me,
        request = publication.request_id,
        block = publication.block,
        success = publication.result.success(),
        "dkg result published"
    );
    Ok(publication)
}

/// Broadcasts `own`, agrees on a result with the other members of `group`
/// and makes sure one result is published for `request_id`.
///
/// Returns the publication accepted by the ledger, whoever submitted it. A
/// rejected submission is returned as an error (it is not retried). If
/// nothing is published by the end of the last submitter's window,
/// [Error::Timeout] is returned.
#[allow(clippy::too_many_arguments)]
pub async fn publish<C, Pol, B, T, S, R>(
    cfg: &Config,
    policy: &Pol,
    signer: &C,
    group: &Group<C::PublicKey>,
    request_id: RequestId,
    seed: &[u8],
    own: DkgResult,
    dkg_end: u64,
    blocks: &B,
    chain: &T,
    sender: &mut S,
    receiver: &mut R,
) -> Result<DkgResultPublication, Error>
where
    C: Signer,
    Pol: SubmissionPolicy,
    B: BlockCounter,
    T: ThresholdRelay,
    S: Sender<PublicKey = C::PublicKey>,
    R: Receiver<PublicKey = C::PublicKey>,
{
    let public_key = signer.public_key();
    let me = group.index_of(&public_key).ok_or(Error::NotMember)?;

    // Subscribe before anything can be published
    let mut events = chain.on_dkg_result_published();

    // Share our result
    let submission = Submission::sign(signer, request_id, own.clone());
    sender
        .send(submission.encode().freeze())
        .await
        .map_err(|err| Error::Send(err.to_string()))?;
    let mut tally = Tally::new(request_id, group);
    if let Err(reason) = tally.add(&public_key, submission) {
        warn!(member = %me, ?reason, "own submission rejected");
    }

    // Collect the results of others
    let collection_end = cfg.collection_end(dkg_end);
    loop {
        select! {
            biased;

            result = blocks.wait_for_block(collection_end) => {
                result.map_err(Error::Chain)?;
                break;
            },
            message = receiver.recv() => {
                let (peer, message) = message.map_err(|err| Error::Recv(err.to_string()))?;
                if peer == public_key {
                    continue;
                }
                let submission = match Submission::<C::Signature>::decode_cfg(message, &group.size()) {
                    Ok(submission) => submission,
                    Err(err) => {
                        warn!(member = %me, %peer, ?err, "failed to decode submission");
                        continue;
                    }
                };
                match tally.add(&peer, submission) {
                    Ok(()) => debug!(member = %me, %peer, "counted submission"),
                    Err(reason) => debug!(member = %me, %peer, ?reason, "ignored submission"),
                }
            },
        }
    }
    let winner = tally.winner(&own);
    if winner != own {
        warn!(member = %me, request = request_id, "majority disagrees with own result");
    }
    debug!(member = %me, submissions = tally.len(), "collection complete");

    // Wait for our turn (if we have one)
    let submitters = submitters(&winner);
    let last = cfg.eligible_block(dkg_end, submitters.len());
    if let Some(position) = policy.position(seed, &submitters, me) {
        let eligible = cfg.eligible_block(dkg_end, position);
        select! {
            biased;

            publication = published(&mut events, request_id) => {
                return accept(me, &own, publication?);
            },
            result = blocks.wait_for_block(eligible) => {
                result.map_err(Error::Chain)?;
            },
        }

        // Skip submission if someone beat us to it
        if let Some(publication) = chain.dkg_result(request_id).await.map_err(Error::Chain)? {
            return accept(me, &own, publication);
        }
        info!(member = %me, request = request_id, position, "submitting dkg result");
        match chain.submit_dkg_result(request_id, winner).await {
            Ok(publication) => return accept(me, &own, publication),
            Err(beacon_chain::Error::AlreadySubmitted(_)) => {
                debug!(member = %me, request = request_id, "result already submitted");
                if let Some(publication) =
                    chain.dkg_result(request_id).await.map_err(Error::Chain)?
                {
                    return accept(me, &own, publication);
                }
            }
            Err(err) => {
                warn!(member = %me, request = request_id, ?err, "result submission failed");
                return Err(Error::Chain(err));
            }
        }
    }

    // Wait for another member to publish
    select! {
        biased;

        publication = published(&mut events, request_id) => {
            accept(me, &own, publication?)
        },
        result = blocks.wait_for_block(last) => {
            result.map_err(Error::Chain)?;
            match chain.dkg_result(request_id).await.map_err(Error::Chain)? {
                Some(publication) => accept(me, &own, publication),
                None => {
                    warn!(member = %me, request = request_id, block = last, "no result published");
                    Err(Error::Timeout(last))
                }
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mocks, result::Rotation, RESULT_CHANNEL};
    use beacon_chain::local::Chain;
    use beacon_cryptography::{
        bls12381::primitives::{group::Scalar, ops::compute_public},
        ed25519,
    };
    use futures::future::join_all;

    const REQUEST: RequestId = 1;

    fn success(disqualified: usize) -> DkgResult {
        let key = compute_public(&Scalar::from_u32(9));
        let mut flags = vec![false; 5];
        flags[disqualified] = true;
        DkgResult::new(true, Some(&key), flags, vec![false; 5]).unwrap()
    }

    /// Runs publication for every signer with a result, over one network.
    async fn run(
        chain: &Chain,
        signers: &[ed25519::PrivateKey],
        threshold: usize,
        results: Vec<Option<DkgResult>>,
    ) -> Vec<Result<DkgResultPublication, Error>> {
        let network = mocks::network();
        let group = mocks::group(signers, threshold);
        let mut handles = Vec::new();
        for (signer, result) in signers.iter().zip(results) {
            let Some(result) = result else {
                continue;
            };
            let (mut sender, mut receiver) =
                network.register(signer.public_key(), RESULT_CHANNEL).unwrap();
            let (signer, group, chain) = (signer.clone(), group.clone(), chain.clone());
            handles.push(tokio::spawn(async move {
                publish(
                    &Config::default(),
                    &Rotation,
                    &signer,
                    &group,
                    REQUEST,
                    b"seed",
                    result,
                    0,
                    &chain,
                    &chain,
                    &mut sender,
                    &mut receiver,
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

    #[tokio::test(start_paused = true)]
    async fn test_single_publication() {
        let chain = mocks::chain(5, 3);
        let mut events = chain.on_dkg_result_published();
        let signers = mocks::signers(5);

        let outcomes = run(&chain, &signers, 3, vec![Some(success(4)); 5]).await;
        let first = outcomes[0].as_ref().unwrap();
        assert_eq!(first.result, success(4));
        for outcome in &outcomes {
            assert_eq!(outcome.as_ref().unwrap(), first);
        }

        // Published exactly once
        assert!(events.try_next().unwrap().is_some());
        assert!(events.try_next().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_majority_result_published() {
        let chain = mocks::chain(5, 3);
        let signers = mocks::signers(5);
        let results = vec![
            Some(success(4)),
            Some(success(4)),
            Some(success(4)),
            Some(success(0)),
            Some(success(0)),
        ];
        let outcomes = run(&chain, &signers, 3, results).await;
        for outcome in outcomes {
            assert_eq!(outcome.unwrap().result, success(4));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_absent_submitter_skipped() {
        let config = Config::default();
        let signers = mocks::signers(5);
        let eligible = submitters(&success(4));
        assert_eq!(eligible.len(), 4);
        for absent in 0..eligible.len() {
            let chain = mocks::chain(5, 3);
            let mut results = vec![Some(success(4)); 5];
            results[absent] = None;
            let outcomes = run(&chain, &signers, 3, results).await;
            assert_eq!(outcomes.len(), 4);

            // The next member in line publishes instead
            let position = Rotation
                .position(b"seed", &eligible, MemberIndex::from_position(absent))
                .unwrap();
            let first = if position == 0 { 1 } else { 0 };
            let publication = chain.dkg_result(REQUEST).await.unwrap().unwrap();
            assert_eq!(publication.result, success(4));
            assert!(publication.block >= config.eligible_block(0, first));
            for outcome in outcomes {
                assert_eq!(outcome.unwrap(), publication);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_submission_not_retried() {
        let chain = mocks::chain(3, 2);
        let signers = mocks::signers(3);
        let key = compute_public(&Scalar::from_u32(9));

        // Claims success without a quorum
        let invalid =
            DkgResult::new(true, Some(&key), vec![false, true, true], vec![false; 3]).unwrap();
        let outcomes = run(&chain, &signers, 2, vec![Some(invalid), None, None]).await;
        assert!(matches!(
            outcomes[0],
            Err(Error::Chain(beacon_chain::Error::InvalidResult(_)))
        ));
        assert!(chain.dkg_result(REQUEST).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_without_publication() {
        let chain = mocks::chain(3, 2);
        let signers = mocks::signers(3);

        // Excluded from its own result, so never eligible to submit
        let excluded =
            DkgResult::new(false, None, vec![true, false, false], vec![false; 3]).unwrap();
        let outcomes = run(&chain, &signers, 2, vec![Some(excluded), None, None]).await;
        let config = Config::default();
        assert!(matches!(
            outcomes[0],
            Err(Error::Timeout(block)) if block == config.eligible_block(0, 2)
        ));
    }

    #[test]
    fn test_submitters() {
        let result = DkgResult::new(false, None, vec![true, false, false], vec![false, false, true])
            .unwrap();
        assert_eq!(submitters(&result), vec![MemberIndex::new(2)]);

        let result = DkgResult::new(false, None, vec![true, true], vec![false; 2]).unwrap();
        assert_eq!(
            submitters(&result),
            vec![MemberIndex::new(1), MemberIndex::new(2)]
        );
    }
}
