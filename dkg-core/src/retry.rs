//! The DKG retry loop.
//!
//! A DKG attempt fails whenever some selected member does not behave. The
//! retry loop keeps running attempts until one succeeds or the loop is
//! cancelled, changing the set of qualified operators between attempts.
//!
//! There is no coordinator. Every member runs its own loop and all honest
//! members must end up with the same qualified operators for every attempt.
//! The loop therefore only uses inputs all of them share:
//!
//! - the selected operators and the DKG seed,
//! - the inactive members reported by failed attempts,
//! - the number of attempts and random retries so far.
//!
//! During the first few attempts, operators reported as inactive are simply
//! excluded as long as the group quorum holds. Otherwise a random retry picks
//! a quorum-sized subset with [`evaluate_retry_participants`], keyed by a seed
//! derived from the DKG seed and by the random retry counter.
//!
//! Members not qualified for an attempt skip it but still advance their loop,
//! so they stay in step with the rest of the group.

use std::{collections::BTreeSet, future::Future, sync::Arc};

use derive_getters::Getters;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    selection::evaluate_retry_participants, Address, ChainConfig, DkgSeed, Error, MemberIndex,
    RetryConfig,
};

/// Parameters of a single DKG attempt.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
pub struct AttemptParams {
    /// Attempt number, starting at 1.
    index: u32,
    /// Block at which the attempt's protocol timing starts.
    start_block: u64,
    /// Members not qualified for this attempt, in ascending order.
    excluded_members: Vec<MemberIndex>,
}

/// Why a DKG attempt did not produce a result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// Some members did not take part in the attempt.
    #[error("inactive members detected: {0:?}")]
    InactiveMembers(Vec<MemberIndex>),
    /// The attempt failed without pointing at anyone; retrying may help.
    #[error("attempt failed: {0}")]
    Failed(String),
    /// The attempt failed in a way retrying cannot fix.
    #[error("attempt failed unrecoverably: {0}")]
    Unrecoverable(String),
}

/// Lifecycle of a [`RetryLoop`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RetryLoopState {
    /// Attempts are still being made.
    Running,
    /// An attempt produced a result.
    Succeeded,
    /// The loop was cancelled.
    Aborted,
    /// The loop stopped on an unrecoverable error.
    Failed,
}

/// Retry state of one member for one DKG seed.
#[derive(Debug)]
pub struct RetryLoop {
    member_index: MemberIndex,
    selected_operators: Arc<[Address]>,
    inactive_operators: BTreeSet<Address>,

    chain_config: ChainConfig,
    config: RetryConfig,

    attempt_counter: u32,
    attempt_start_block: u64,

    random_retry_counter: u32,
    random_retry_seed: i64,

    state: RetryLoopState,
}

impl RetryLoop {
    /// Create the retry loop of `member_index`. The first attempt starts at
    /// `initial_start_block`.
    pub fn new(
        seed: &DkgSeed,
        initial_start_block: u64,
        member_index: MemberIndex,
        selected_operators: impl Into<Arc<[Address]>>,
        chain_config: ChainConfig,
        config: RetryConfig,
    ) -> Self {
        Self {
            member_index,
            selected_operators: selected_operators.into(),
            inactive_operators: BTreeSet::new(),
            chain_config,
            config,
            attempt_counter: 0,
            attempt_start_block: initial_start_block,
            random_retry_counter: 0,
            random_retry_seed: seed.random_retry_seed(),
            state: RetryLoopState::Running,
        }
    }

    /// The current lifecycle state.
    pub fn state(&self) -> RetryLoopState {
        self.state
    }

    /// Number of attempts started so far, skipped ones included.
    pub fn attempt_counter(&self) -> u32 {
        self.attempt_counter
    }

    /// Number of random retries so far.
    pub fn random_retry_counter(&self) -> u32 {
        self.random_retry_counter
    }

    /// Operators reported as inactive by any attempt so far.
    pub fn inactive_operators(&self) -> &BTreeSet<Address> {
        &self.inactive_operators
    }

    /// Run attempts until one produces a result or `cancel` fires.
    ///
    /// Returns the result and the block at which its execution ended. The
    /// stop signal is checked once before every attempt; a running attempt
    /// is never interrupted.
    pub async fn start<R, F, Fut>(
        &mut self,
        cancel: &CancellationToken,
        mut attempt_fn: F,
    ) -> Result<(R, u64), Error>
    where
        F: FnMut(AttemptParams) -> Fut,
        Fut: Future<Output = Result<(R, u64), AttemptError>>,
    {
        // All selected operators are qualified for the first attempt.
        let mut qualified_operators: BTreeSet<Address> =
            self.selected_operators.iter().copied().collect();

        loop {
            self.attempt_counter += 1;

            if cancel.is_cancelled() {
                self.state = RetryLoopState::Aborted;
                info!(
                    member = %self.member_index,
                    attempt = self.attempt_counter,
                    "dkg retry loop received stop signal"
                );
                return Err(Error::RetryLoopAborted {
                    attempt: self.attempt_counter,
                });
            }

            // Assume every previous attempt ran until the very end of the
            // protocol and add the delay on top of it.
            if self.attempt_counter > 1 {
                self.attempt_start_block += self.config.protocol_blocks
                    + self.config.delay_blocks_for(self.attempt_counter);
            }

            let excluded_members = self.excluded_members(&qualified_operators)?;

            if excluded_members.contains(&self.member_index) {
                debug!(
                    member = %self.member_index,
                    attempt = self.attempt_counter,
                    block = self.attempt_start_block,
                    "member not qualified; skipping dkg attempt"
                );
                // Nothing else may await in a long run of skips.
                tokio::task::yield_now().await;
            } else {
                let params = AttemptParams {
                    index: self.attempt_counter,
                    start_block: self.attempt_start_block,
                    excluded_members,
                };

                match attempt_fn(params).await {
                    Ok((result, execution_end_block)) => {
                        self.state = RetryLoopState::Succeeded;
                        return Ok((result, execution_end_block));
                    }
                    Err(AttemptError::InactiveMembers(members)) => {
                        self.record_inactive_members(&members);
                        let evidence = Error::InactiveMembersDetected { members };
                        warn!(
                            member = %self.member_index,
                            attempt = self.attempt_counter,
                            "dkg attempt failed: {evidence}"
                        );
                    }
                    Err(AttemptError::Failed(reason)) => {
                        warn!(
                            member = %self.member_index,
                            attempt = self.attempt_counter,
                            %reason,
                            "dkg attempt failed"
                        );
                    }
                    Err(AttemptError::Unrecoverable(reason)) => {
                        self.state = RetryLoopState::Failed;
                        error!(
                            member = %self.member_index,
                            attempt = self.attempt_counter,
                            %reason,
                            "dkg attempt failed unrecoverably"
                        );
                        return Err(Error::AttemptUnrecoverable {
                            attempt: self.attempt_counter,
                            block: self.attempt_start_block,
                            reason,
                        });
                    }
                }
            }

            qualified_operators = match self.qualified_operators_set() {
                Ok(qualified_operators) => qualified_operators,
                Err(err) => {
                    self.state = RetryLoopState::Failed;
                    error!(
                        member = %self.member_index,
                        attempt = self.attempt_counter + 1,
                        "cannot get qualified operators: {err}"
                    );
                    return Err(err);
                }
            };
        }
    }

    /// Members whose operators are not qualified, in ascending order.
    fn excluded_members(
        &self,
        qualified_operators: &BTreeSet<Address>,
    ) -> Result<Vec<MemberIndex>, Error> {
        let mut excluded_members = Vec::new();
        for (position, operator) in self.selected_operators.iter().enumerate() {
            if !qualified_operators.contains(operator) {
                excluded_members.push(MemberIndex::from_position(position)?);
            }
        }
        Ok(excluded_members)
    }

    /// Remember the operators of the given members as inactive. Indexes
    /// outside the selected group are ignored.
    fn record_inactive_members(&mut self, members: &[MemberIndex]) {
        for member in members {
            if let Some(operator) = self.selected_operators.get(member.position()) {
                self.inactive_operators.insert(*operator);
            }
        }
    }

    /// The operators qualified for the next attempt.
    fn qualified_operators_set(&mut self) -> Result<BTreeSet<Address>, Error> {
        let quorum = self.chain_config.group_quorum;

        // Early on, and before any random retry, just drop the operators known
        // to be inactive if that keeps the quorum.
        if self.attempt_counter <= self.config.inactivity_exclusion_window
            && self.random_retry_counter == 0
            && !self.inactive_operators.is_empty()
        {
            let qualified_operators: Vec<Address> = self
                .selected_operators
                .iter()
                .copied()
                .filter(|operator| !self.inactive_operators.contains(operator))
                .collect();

            let exclusion_quorum = self.config.inactivity_exclusion_quorum.unwrap_or(quorum);
            if qualified_operators.len() >= exclusion_quorum {
                return Ok(qualified_operators.into_iter().collect());
            }
        }

        let qualified_operators = evaluate_retry_participants(
            &self.selected_operators,
            self.random_retry_seed,
            self.random_retry_counter,
            quorum,
        )?;

        self.random_retry_counter += 1;
        Ok(qualified_operators.into_iter().collect())
    }
}
