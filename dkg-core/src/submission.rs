//! On-chain publication of the DKG result.
//!
//! Members become eligible to submit one after another, `step` blocks apart,
//! starting with member 1. The first member whose submission lands wins and
//! everybody else withdraws once they see the result submitted event. A
//! member whose own submission failed uses [`ResultSubmitter::decide_member_fate`]
//! to find out whether it is part of the published group.

use std::{collections::BTreeMap, sync::Arc};

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{
    Chain, DkgResult, DkgResultSubmittedEvent, DkgState, Error, ExclusionReason, MemberIndex,
};

/// The block at which `member_index` may submit the result.
pub fn eligibility_block(start_block: u64, member_index: MemberIndex, step: u64) -> u64 {
    start_block + (u64::from(member_index.get()) - 1) * step
}

/// The last block at which a submitted result is still expected. By then
/// every member has been eligible to submit.
pub fn result_timeout_block(
    publication_start_block: u64,
    pre_publication_blocks: u64,
    group_size: usize,
    step: u64,
) -> u64 {
    publication_start_block + pre_publication_blocks + group_size as u64 * step
}

/// Submits DKG results to the chain.
#[derive(Debug)]
pub struct ResultSubmitter<C: ?Sized> {
    chain: Arc<C>,
    pre_publication_blocks: u64,
}

impl<C: Chain + ?Sized> ResultSubmitter<C> {
    /// Create a submitter. `pre_publication_blocks` is the number of blocks
    /// between the end of DKG and the publication start block.
    pub fn new(chain: Arc<C>, pre_publication_blocks: u64) -> Self {
        Self {
            chain,
            pre_publication_blocks,
        }
    }

    /// Submit `result` once `member_index` becomes eligible, unless another
    /// member's result is submitted first.
    ///
    /// Returns `Ok(())` both when this member submitted and when it withdrew
    /// because the chain no longer awaits a result.
    pub async fn submit_result(
        &self,
        member_index: MemberIndex,
        result: &DkgResult,
        signatures: &BTreeMap<MemberIndex, Vec<u8>>,
        start_block: u64,
    ) -> Result<(), Error> {
        let config = self.chain.config();

        if signatures.len() < config.honest_threshold {
            return Err(Error::InsufficientSignatures {
                signatures: signatures.len(),
                honest_threshold: config.honest_threshold,
            });
        }

        let (submitted_tx, mut submitted_rx) = mpsc::unbounded_channel();
        let mut subscription =
            self.chain
                .on_dkg_result_submitted(Box::new(move |event: DkgResultSubmittedEvent| {
                    let _ = submitted_tx.send(event.block_number);
                }));

        if self.chain.dkg_state().await? != DkgState::AwaitingResult {
            info!(
                member = %member_index,
                "dkg is no longer awaiting the result; aborting dkg result submission"
            );
            return Ok(());
        }

        let eligible_block =
            eligibility_block(start_block, member_index, config.result_publication_block_step);
        info!(
            member = %member_index,
            block = eligible_block,
            "waiting for block to submit"
        );
        let eligible = self
            .chain
            .block_counter()?
            .block_height_waiter(eligible_block)?;

        tokio::select! {
            biased;

            Some(block) = submitted_rx.recv() => {
                info!(
                    member = %member_index,
                    block,
                    "leaving dkg result submission; result already submitted by other member"
                );
                Ok(())
            }
            height = eligible => {
                let height = height.map_err(|_| Error::BlockWaiterClosed {
                    height: eligible_block,
                })?;

                // The handler would keep sending to a channel nobody reads
                // anymore once the own submission fires the event.
                subscription.unsubscribe();

                info!(
                    member = %member_index,
                    block = height,
                    group_public_key = %hex::encode(result.group_public_key()),
                    signatures = signatures.len(),
                    "submitting dkg result"
                );
                self.chain
                    .submit_dkg_result(member_index, result, signatures)
                    .await
            }
        }
    }

    /// Wait for the published result and check whether `member_index` is
    /// part of it.
    ///
    /// Returns the operating members of the published group: every member of
    /// the local group except those the published result marks as misbehaved.
    pub async fn decide_member_fate(
        &self,
        member_index: MemberIndex,
        events: &mut mpsc::UnboundedReceiver<DkgResultSubmittedEvent>,
        publication_start_block: u64,
        result: &DkgResult,
    ) -> Result<Vec<MemberIndex>, Error> {
        let config = self.chain.config();
        let timeout_block = result_timeout_block(
            publication_start_block,
            self.pre_publication_blocks,
            config.group_size,
            config.result_publication_block_step,
        );

        let timeout = self
            .chain
            .block_counter()?
            .block_height_waiter(timeout_block)?;

        let event = tokio::select! {
            biased;

            Some(event) = events.recv() => event,
            height = timeout => {
                return Err(match height {
                    Ok(_) => Error::DkgResultTimeout { timeout_block },
                    Err(_) => Error::BlockWaiterClosed { height: timeout_block },
                });
            }
        };

        info!(
            member = %member_index,
            block = event.block_number,
            submitter = %event.submitter,
            "dkg result submitted by other member"
        );

        if event.group_public_key != *result.group_public_key() {
            warn!(
                member = %member_index,
                published = %hex::encode(&event.group_public_key),
                local = %hex::encode(result.group_public_key()),
                "published group public key differs from the local one"
            );
            return Err(Error::ExcludedFromGroup {
                member: member_index,
                reason: ExclusionReason::GroupPublicKeyMismatch,
            });
        }

        if event.misbehaved.contains(&member_index) {
            return Err(Error::ExcludedFromGroup {
                member: member_index,
                reason: ExclusionReason::Misbehaved,
            });
        }

        Ok(result
            .group()
            .member_ids()
            .iter()
            .copied()
            .filter(|member| !event.misbehaved.contains(member))
            .collect())
    }
}
