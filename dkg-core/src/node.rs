//! Taking part in DKG as an operator.
//!
//! An operator may be selected to a group more than once. It then controls
//! several members and runs an independent task for each of them. Tasks of
//! one process never execute DKG at the same time; they take turns through a
//! shared [`ProtocolLatch`].

use core::fmt;
use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use derive_getters::Getters;
use itertools::Itertools;
use parking_lot::RwLock;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    final_signing_group, Address, AttemptError, AttemptParams, Chain, ChainConfig, Config,
    DkgResult, DkgSeed, Error, MemberIndex, PrivateKeyShare, ProtocolLatch, ResultSubmitter,
    RetryLoop,
};

/// Prefix of the broadcast channel used for the DKG of a seed.
pub const PROTOCOL_NAME: &str = "dkg";

/// Runs the cryptographic part of DKG.
#[async_trait]
pub trait DkgExecutor: Send + Sync {
    /// Run one DKG attempt for `member_index`, with `excluded_members` not
    /// taking part. Returns the result and the block at which execution
    /// ended.
    async fn execute(
        &self,
        session_id: &str,
        start_block: u64,
        member_index: MemberIndex,
        group_size: usize,
        dishonest_threshold: usize,
        excluded_members: &[MemberIndex],
    ) -> Result<(DkgResult, u64), AttemptError>;

    /// Collect the group's signatures supporting `result`.
    async fn sign_result(
        &self,
        member_index: MemberIndex,
        publication_start_block: u64,
        result: &DkgResult,
    ) -> Result<BTreeMap<MemberIndex, Vec<u8>>, Error>;
}

/// A member of a final signing group.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
pub struct Signer {
    /// The group public key.
    group_public_key: Vec<u8>,
    /// Operators of the signing group, in signing group index order.
    signing_group_operators: Vec<Address>,
    /// This signer's index within the signing group.
    signing_group_member_index: MemberIndex,
    /// This signer's share of the group private key.
    private_key_share: PrivateKeyShare,
}

impl Signer {
    /// Create a new [`Signer`].
    pub fn new(
        group_public_key: Vec<u8>,
        signing_group_operators: Vec<Address>,
        signing_group_member_index: MemberIndex,
        private_key_share: PrivateKeyShare,
    ) -> Self {
        Self {
            group_public_key,
            signing_group_operators,
            signing_group_member_index,
            private_key_share,
        }
    }
}

impl fmt::Display for Signer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "signer with index [{}] of group with public key [0x{}]",
            self.signing_group_member_index,
            hex::encode(&self.group_public_key)
        )
    }
}

/// Signers known to this node, by group public key.
#[derive(Debug, Default)]
pub struct SignerRegistry {
    signers: RwLock<BTreeMap<Vec<u8>, Vec<Signer>>>,
}

impl SignerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a signer. A signer with the same group and index is replaced.
    pub fn register_signer(&self, signer: Signer) {
        let mut signers = self.signers.write();
        let group = signers.entry(signer.group_public_key.clone()).or_default();
        group.retain(|known| known.signing_group_member_index != signer.signing_group_member_index);
        group.push(signer);
        group.sort_by_key(|known| known.signing_group_member_index);
    }

    /// Signers of the group with the given public key.
    pub fn signers_for(&self, group_public_key: &[u8]) -> Vec<Signer> {
        self.signers
            .read()
            .get(group_public_key)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of groups with at least one signer.
    pub fn group_count(&self) -> usize {
        self.signers.read().len()
    }
}

/// A node taking part in DKG.
pub struct Node {
    chain: Arc<dyn Chain>,
    executor: Arc<dyn DkgExecutor>,
    config: Config,
    latch: ProtocolLatch,
    signers: Arc<SignerRegistry>,
}

impl Node {
    /// Create a node.
    pub fn new(chain: Arc<dyn Chain>, executor: Arc<dyn DkgExecutor>, config: Config) -> Self {
        Self {
            chain,
            executor,
            config,
            latch: ProtocolLatch::new(),
            signers: Arc::new(SignerRegistry::new()),
        }
    }

    /// The latch DKG executions of this node take turns on.
    pub fn protocol_latch(&self) -> &ProtocolLatch {
        &self.latch
    }

    /// Signers registered by finished DKGs.
    pub fn signers(&self) -> &Arc<SignerRegistry> {
        &self.signers
    }

    /// Start DKG for every member this operator controls in the group
    /// selected for `seed`.
    ///
    /// Returns one handle per controlled member, empty if the operator was
    /// not selected. Each task resolves with the registered signer.
    pub async fn join_dkg_if_eligible(
        &self,
        seed: DkgSeed,
        start_block: u64,
    ) -> Result<Vec<JoinHandle<Result<Signer, Error>>>, Error> {
        info!(%seed, "checking eligibility for dkg");

        let selected_operators = self.chain.select_group(&seed).await?;
        let chain_config = self.chain.config();

        if selected_operators.len() > chain_config.group_size {
            error!(
                %seed,
                selected = selected_operators.len(),
                "group size larger than supported"
            );
            return Err(Error::GroupTooLarge {
                selected: selected_operators.len(),
                group_size: chain_config.group_size,
            });
        }

        let operator = self.chain.operator_address();
        let member_indexes: Vec<MemberIndex> = selected_operators
            .iter()
            .positions(|selected| *selected == operator)
            .map(MemberIndex::from_position)
            .collect::<Result<_, _>>()?;

        if member_indexes.is_empty() {
            info!(%seed, "not eligible for dkg");
            return Ok(Vec::new());
        }

        info!(
            %seed,
            members = member_indexes.len(),
            channel = %seed.channel_name(PROTOCOL_NAME),
            "joining dkg"
        );

        let task = MemberTask {
            chain: self.chain.clone(),
            executor: self.executor.clone(),
            config: self.config.clone(),
            latch: self.latch.clone(),
            signers: self.signers.clone(),
            seed,
            start_block,
            selected_operators: selected_operators.into(),
            chain_config,
        };

        Ok(member_indexes
            .into_iter()
            .map(|member_index| {
                let task = task.clone();
                tokio::spawn(async move { task.run(member_index).await })
            })
            .collect())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Node")
            .field("operator", &self.chain.operator_address())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Everything one member's task needs, shared by the tasks of one seed.
#[derive(Clone)]
struct MemberTask {
    chain: Arc<dyn Chain>,
    executor: Arc<dyn DkgExecutor>,
    config: Config,
    latch: ProtocolLatch,
    signers: Arc<SignerRegistry>,
    seed: DkgSeed,
    start_block: u64,
    selected_operators: Arc<[Address]>,
    chain_config: ChainConfig,
}

impl MemberTask {
    async fn run(self, member_index: MemberIndex) -> Result<Signer, Error> {
        let (result, execution_end_block) = match self.generate(member_index).await {
            Ok(generated) => generated,
            // The retry loop logs its own stop signal.
            Err(err @ Error::RetryLoopAborted { .. }) => return Err(err),
            Err(err) => {
                error!(member = %member_index, "failed to execute dkg: {err}");
                return Err(err);
            }
        };

        let publication_start_block = execution_end_block;
        let mut operating_member_indexes = result.group().operating_member_ids();

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let _subscription = self.chain.on_dkg_result_submitted(Box::new(move |event| {
            let _ = events_tx.send(event);
        }));

        let submitter = ResultSubmitter::new(self.chain.clone(), self.config.pre_publication_blocks);

        if let Err(err) = self
            .publish(&submitter, member_index, publication_start_block, &result)
            .await
        {
            // Either the group does not support this member's result or the
            // chain interaction failed. The published result decides whether
            // the member stays.
            warn!(
                member = %member_index,
                "dkg result publication process failed: {err}"
            );

            operating_member_indexes = submitter
                .decide_member_fate(member_index, &mut events_rx, publication_start_block, &result)
                .await
                .inspect_err(|err| {
                    error!(
                        member = %member_index,
                        "failed to handle dkg result publishing failure: {err}"
                    )
                })?;
        }

        let signing_group = final_signing_group(
            &self.selected_operators,
            &operating_member_indexes,
            &self.chain_config,
        )
        .inspect_err(|err| {
            error!(member = %member_index, "failed to get final signing group: {err}")
        })?;

        let signing_group_member_index = signing_group
            .member_index_for(member_index)
            .ok_or(Error::SigningGroupIndexMissing {
                member: member_index,
            })?;

        let signer = Signer::new(
            result.group_public_key().clone(),
            signing_group.operators().clone(),
            signing_group_member_index,
            result.private_key_share().clone(),
        );
        self.signers.register_signer(signer.clone());
        info!(member = %member_index, "registered {signer}");

        Ok(signer)
    }

    /// Run the retry loop while holding the protocol latch.
    async fn generate(&self, member_index: MemberIndex) -> Result<(DkgResult, u64), Error> {
        let _guard = self.latch.lock().await;

        let cancel = CancellationToken::new();
        let deadline = tokio::spawn({
            let cancel = cancel.clone();
            let timeout = self.config.dkg_timeout;
            async move {
                tokio::time::sleep(timeout).await;
                cancel.cancel();
            }
        });

        let mut retry_loop = RetryLoop::new(
            &self.seed,
            self.start_block,
            member_index,
            self.selected_operators.clone(),
            self.chain_config.clone(),
            self.config.retry.clone(),
        );

        let outcome = retry_loop
            .start(&cancel, move |attempt| self.attempt(member_index, attempt))
            .await;

        deadline.abort();
        outcome
    }

    async fn attempt(
        &self,
        member_index: MemberIndex,
        attempt: AttemptParams,
    ) -> Result<(DkgResult, u64), AttemptError> {
        let group_size = self.chain_config.group_size;

        info!(
            member = %member_index,
            attempt = attempt.index(),
            block = attempt.start_block(),
            "starting dkg attempt with [{}] group members (excluded: {:?})",
            group_size.saturating_sub(attempt.excluded_members().len()),
            attempt.excluded_members(),
        );

        self.executor
            .execute(
                &self.seed.session_id(*attempt.index()),
                *attempt.start_block(),
                member_index,
                group_size,
                self.chain_config.dishonest_threshold(),
                attempt.excluded_members(),
            )
            .await
            .inspect_err(|err| {
                error!(
                    member = %member_index,
                    attempt = attempt.index(),
                    "dkg attempt failed: {err}"
                )
            })
    }

    /// Sign the result with the group and submit it.
    async fn publish(
        &self,
        submitter: &ResultSubmitter<dyn Chain>,
        member_index: MemberIndex,
        publication_start_block: u64,
        result: &DkgResult,
    ) -> Result<(), Error> {
        let signatures = self
            .executor
            .sign_result(member_index, publication_start_block, result)
            .await?;

        submitter
            .submit_result(
                member_index,
                result,
                &signatures,
                publication_start_block + self.config.pre_publication_blocks,
            )
            .await
    }
}
