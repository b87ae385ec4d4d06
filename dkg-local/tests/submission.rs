use std::{collections::BTreeMap, sync::Arc};

use dkg_core::{
    ChainConfig, DkgResult, DkgResultSubmittedEvent, DkgState, Error, ExclusionReason, Group,
    MemberIndex, PrivateKeyShare, ResultSubmitter,
};
use dkg_local::{LocalBlockCounter, LocalChain};
use tokio::sync::mpsc;

const PRE_PUBLICATION_BLOCKS: u64 = 10;

fn index(n: u8) -> MemberIndex {
    MemberIndex::new(n).unwrap()
}

fn chain() -> Arc<LocalChain> {
    let chain = LocalChain::new(
        dkg_core::Address([1; 20]),
        ChainConfig {
            group_size: 5,
            honest_threshold: 3,
            group_quorum: 4,
            result_publication_block_step: 10,
            relay_entry_timeout: 20,
        },
        Arc::new(LocalBlockCounter::new(100)),
    );
    chain.set_dkg_state(DkgState::AwaitingResult);
    Arc::new(chain)
}

fn result() -> DkgResult {
    DkgResult::new(
        Group::with_members(2, 5).unwrap(),
        vec![0xaa; 33],
        PrivateKeyShare::new(vec![3]),
    )
}

fn signatures(count: u8) -> BTreeMap<MemberIndex, Vec<u8>> {
    (1..=count).map(|n| (index(n), vec![n; 65])).collect()
}

fn event(group_public_key: Vec<u8>, misbehaved: Vec<MemberIndex>) -> DkgResultSubmittedEvent {
    DkgResultSubmittedEvent {
        block_number: 110,
        submitter: index(1),
        group_public_key,
        misbehaved,
    }
}

async fn wait_for_subscription(chain: &LocalChain) {
    while chain.handler_count() == 0 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn withdraws_when_other_member_submits_first() {
    let chain = chain();
    let submitter = ResultSubmitter::new(chain.clone(), PRE_PUBLICATION_BLOCKS);

    let submission = tokio::spawn(async move {
        submitter
            .submit_result(index(3), &result(), &signatures(3), 100)
            .await
    });

    wait_for_subscription(&chain).await;
    chain.emit_dkg_result_submitted(event(vec![0xaa; 33], vec![]));

    assert_eq!(submission.await.unwrap(), Ok(()));
    assert!(chain.submissions().is_empty());
    assert_eq!(chain.handler_count(), 0);
}

#[tokio::test]
async fn submits_once_eligible() {
    let chain = chain();
    let submitter = ResultSubmitter::new(chain.clone(), PRE_PUBLICATION_BLOCKS);

    let submission = tokio::spawn(async move {
        submitter
            .submit_result(index(3), &result(), &signatures(4), 100)
            .await
    });

    wait_for_subscription(&chain).await;
    chain.local_block_counter().mine(19);
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!submission.is_finished());

    chain.local_block_counter().mine(1);
    assert_eq!(submission.await.unwrap(), Ok(()));

    let submissions = chain.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].submitter, index(3));
    assert_eq!(submissions[0].block_number, 120);
    assert_eq!(submissions[0].signers.len(), 4);
    assert_eq!(chain.handler_count(), 0);
}

#[tokio::test]
async fn first_member_submits_at_start_block() {
    let chain = chain();
    let submitter = ResultSubmitter::new(chain.clone(), PRE_PUBLICATION_BLOCKS);

    submitter
        .submit_result(index(1), &result(), &signatures(3), 100)
        .await
        .unwrap();

    assert_eq!(chain.submissions()[0].block_number, 100);
}

#[tokio::test]
async fn skips_submission_when_result_no_longer_awaited() {
    let chain = chain();
    chain.set_dkg_state(DkgState::Challenge);
    let submitter = ResultSubmitter::new(chain.clone(), PRE_PUBLICATION_BLOCKS);

    assert_eq!(
        submitter
            .submit_result(index(1), &result(), &signatures(3), 100)
            .await,
        Ok(())
    );
    assert!(chain.submissions().is_empty());
    assert_eq!(chain.handler_count(), 0);
}

#[tokio::test]
async fn rejects_insufficient_signatures() {
    let chain = chain();
    let submitter = ResultSubmitter::new(chain.clone(), PRE_PUBLICATION_BLOCKS);

    assert_eq!(
        submitter
            .submit_result(index(1), &result(), &signatures(2), 100)
            .await,
        Err(Error::InsufficientSignatures {
            signatures: 2,
            honest_threshold: 3
        })
    );
    assert!(chain.submissions().is_empty());
}

#[tokio::test]
async fn chain_rejection_is_reported() {
    let chain = chain();
    chain.fail_submissions(true);
    let submitter = ResultSubmitter::new(chain.clone(), PRE_PUBLICATION_BLOCKS);

    assert!(matches!(
        submitter
            .submit_result(index(1), &result(), &signatures(3), 100)
            .await,
        Err(Error::Chain(_))
    ));
}

#[tokio::test]
async fn fate_times_out_without_published_result() {
    let chain = chain();
    let submitter = ResultSubmitter::new(chain.clone(), PRE_PUBLICATION_BLOCKS);
    let (_events_tx, mut events_rx) = mpsc::unbounded_channel();

    // 100 + 10 pre-publication blocks + 5 members * 10 blocks
    chain.local_block_counter().set_height(160);

    assert_eq!(
        submitter
            .decide_member_fate(index(3), &mut events_rx, 100, &result())
            .await,
        Err(Error::DkgResultTimeout { timeout_block: 160 })
    );
}

#[tokio::test]
async fn fate_waits_until_timeout_block() {
    let chain = chain();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let fate = tokio::spawn({
        let chain = chain.clone();
        async move {
            ResultSubmitter::new(chain, PRE_PUBLICATION_BLOCKS)
                .decide_member_fate(index(3), &mut events_rx, 100, &result())
                .await
        }
    });

    chain.local_block_counter().set_height(159);
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!fate.is_finished());

    events_tx
        .send(event(vec![0xaa; 33], vec![index(5)]))
        .unwrap();
    assert_eq!(
        fate.await.unwrap(),
        Ok(vec![index(1), index(2), index(3), index(4)])
    );
}

#[tokio::test]
async fn member_leaves_group_on_public_key_mismatch() {
    let chain = chain();
    let submitter = ResultSubmitter::new(chain.clone(), PRE_PUBLICATION_BLOCKS);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    events_tx.send(event(vec![0xbb; 33], vec![])).unwrap();

    assert_eq!(
        submitter
            .decide_member_fate(index(3), &mut events_rx, 100, &result())
            .await,
        Err(Error::ExcludedFromGroup {
            member: index(3),
            reason: ExclusionReason::GroupPublicKeyMismatch,
        })
    );
}

#[tokio::test]
async fn member_leaves_group_when_reported_misbehaving() {
    let chain = chain();
    let submitter = ResultSubmitter::new(chain.clone(), PRE_PUBLICATION_BLOCKS);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    events_tx
        .send(event(vec![0xaa; 33], vec![index(2), index(3)]))
        .unwrap();

    assert_eq!(
        submitter
            .decide_member_fate(index(3), &mut events_rx, 100, &result())
            .await,
        Err(Error::ExcludedFromGroup {
            member: index(3),
            reason: ExclusionReason::Misbehaved,
        })
    );
}

#[tokio::test]
async fn member_stays_without_misbehaved_members() {
    let chain = chain();
    let submitter = ResultSubmitter::new(chain.clone(), PRE_PUBLICATION_BLOCKS);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    events_tx
        .send(event(vec![0xaa; 33], vec![index(2), index(5)]))
        .unwrap();

    assert_eq!(
        submitter
            .decide_member_fate(index(3), &mut events_rx, 100, &result())
            .await,
        Ok(vec![index(1), index(3), index(4)])
    );
}
