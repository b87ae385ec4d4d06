use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use dkg_core::{
    Address, BlockCounter, Chain, ChainConfig, DkgResult, DkgResultHandler,
    DkgResultSubmittedEvent, DkgSeed, DkgState, Error, MemberIndex, Subscription,
    SubscriptionGuard,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::LocalBlockCounter;

type SharedHandler = Arc<dyn Fn(DkgResultSubmittedEvent) + Send + Sync>;

/// A DKG result accepted by a [`LocalChain`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    /// Block the result was accepted at.
    pub block_number: u64,
    /// The member that submitted it.
    pub submitter: MemberIndex,
    /// The submitted group public key.
    pub group_public_key: Vec<u8>,
    /// Members the result reports as misbehaved.
    pub misbehaved: Vec<MemberIndex>,
    /// Members whose signatures support the result.
    pub signers: Vec<MemberIndex>,
}

#[derive(Default)]
struct Handlers {
    next_id: u64,
    registered: BTreeMap<u64, SharedHandler>,
}

struct State {
    config: RwLock<ChainConfig>,
    groups: RwLock<BTreeMap<DkgSeed, Vec<Address>>>,
    dkg_state: RwLock<DkgState>,
    handlers: Arc<Mutex<Handlers>>,
    submissions: Mutex<Vec<Submission>>,
    fail_submissions: AtomicBool,
    competing_result: Mutex<Option<DkgResultSubmittedEvent>>,
    block_counter: Arc<LocalBlockCounter>,
}

/// An in-memory chain.
///
/// Handles returned by [`LocalChain::connect`] share the chain state and
/// differ only in the operator they act for.
#[derive(Clone)]
pub struct LocalChain {
    operator: Address,
    state: Arc<State>,
}

impl LocalChain {
    /// Create a chain acting for `operator`.
    pub fn new(operator: Address, config: ChainConfig, block_counter: Arc<LocalBlockCounter>) -> Self {
        Self {
            operator,
            state: Arc::new(State {
                config: RwLock::new(config),
                groups: RwLock::new(BTreeMap::new()),
                dkg_state: RwLock::new(DkgState::Idle),
                handlers: Arc::new(Mutex::new(Handlers::default())),
                submissions: Mutex::new(Vec::new()),
                fail_submissions: AtomicBool::new(false),
                competing_result: Mutex::new(None),
                block_counter,
            }),
        }
    }

    /// Another handle to the same chain, acting for `operator`.
    pub fn connect(&self, operator: Address) -> Self {
        Self {
            operator,
            state: self.state.clone(),
        }
    }

    /// The chain's block counter.
    pub fn local_block_counter(&self) -> &Arc<LocalBlockCounter> {
        &self.state.block_counter
    }

    /// Set the group selected for `seed`.
    pub fn set_selected_group(&self, seed: DkgSeed, operators: Vec<Address>) {
        self.state.groups.write().insert(seed, operators);
    }

    /// Replace the chain configuration.
    pub fn set_config(&self, config: ChainConfig) {
        *self.state.config.write() = config;
    }

    /// Move the on-chain DKG to `state`.
    pub fn set_dkg_state(&self, state: DkgState) {
        *self.state.dkg_state.write() = state;
    }

    /// Make every following submission fail.
    pub fn fail_submissions(&self, fail: bool) {
        self.state.fail_submissions.store(fail, Ordering::SeqCst);
    }

    /// Let another member win the next submission: instead of accepting the
    /// next result, the chain publishes `event` in the same block and
    /// rejects the submitted result.
    pub fn set_competing_result(&self, event: DkgResultSubmittedEvent) {
        *self.state.competing_result.lock() = Some(event);
    }

    /// Results accepted so far.
    pub fn submissions(&self) -> Vec<Submission> {
        self.state.submissions.lock().clone()
    }

    /// Number of registered result submitted handlers.
    pub fn handler_count(&self) -> usize {
        self.state.handlers.lock().registered.len()
    }

    /// Deliver `event` to every registered handler.
    pub fn emit_dkg_result_submitted(&self, event: DkgResultSubmittedEvent) {
        // Handlers may unsubscribe themselves; call them outside the lock.
        let handlers: Vec<SharedHandler> =
            self.state.handlers.lock().registered.values().cloned().collect();

        debug!(
            handlers = handlers.len(),
            block = event.block_number,
            "emitting dkg result submitted event"
        );
        for handler in handlers {
            handler(event.clone());
        }
    }

    fn current_block(&self) -> Result<u64, Error> {
        self.state.block_counter.current_block()
    }
}

#[async_trait]
impl Chain for LocalChain {
    async fn select_group(&self, seed: &DkgSeed) -> Result<Vec<Address>, Error> {
        self.state
            .groups
            .read()
            .get(seed)
            .cloned()
            .ok_or_else(|| Error::Chain(format!("no group selected for seed [0x{seed}]")))
    }

    fn config(&self) -> ChainConfig {
        self.state.config.read().clone()
    }

    fn operator_address(&self) -> Address {
        self.operator
    }

    fn block_counter(&self) -> Result<Arc<dyn BlockCounter>, Error> {
        let block_counter: Arc<dyn BlockCounter> = self.state.block_counter.clone();
        Ok(block_counter)
    }

    fn on_dkg_result_submitted(&self, handler: DkgResultHandler) -> SubscriptionGuard {
        let mut handlers = self.state.handlers.lock();
        let id = handlers.next_id;
        handlers.next_id += 1;
        handlers.registered.insert(id, Arc::from(handler));

        SubscriptionGuard::new(Box::new(LocalSubscription {
            id,
            handlers: self.state.handlers.clone(),
        }))
    }

    async fn dkg_state(&self) -> Result<DkgState, Error> {
        Ok(*self.state.dkg_state.read())
    }

    async fn submit_dkg_result(
        &self,
        member_index: MemberIndex,
        result: &DkgResult,
        signatures: &BTreeMap<MemberIndex, Vec<u8>>,
    ) -> Result<(), Error> {
        if self.state.fail_submissions.load(Ordering::SeqCst) {
            return Err(Error::Chain("dkg result submission rejected".into()));
        }

        let block_number = self.current_block()?;

        let competing = self.state.competing_result.lock().take();
        if let Some(mut competing) = competing {
            competing.block_number = block_number;
            *self.state.dkg_state.write() = DkgState::Challenge;
            info!(
                member = %member_index,
                submitter = %competing.submitter,
                "competing dkg result accepted first"
            );
            self.emit_dkg_result_submitted(competing);
            return Err(Error::Chain(
                "dkg result already submitted in this block".into(),
            ));
        }

        {
            let mut dkg_state = self.state.dkg_state.write();
            if *dkg_state != DkgState::AwaitingResult {
                return Err(Error::Chain(format!(
                    "dkg is not awaiting the result; current state: {:?}",
                    *dkg_state
                )));
            }
            *dkg_state = DkgState::Challenge;
        }

        let submission = Submission {
            block_number,
            submitter: member_index,
            group_public_key: result.group_public_key().clone(),
            misbehaved: result.misbehaved_member_ids(),
            signers: signatures.keys().copied().collect(),
        };
        self.state.submissions.lock().push(submission.clone());

        info!(
            member = %member_index,
            block = block_number,
            "dkg result accepted"
        );

        self.emit_dkg_result_submitted(DkgResultSubmittedEvent {
            block_number,
            submitter: submission.submitter,
            group_public_key: submission.group_public_key,
            misbehaved: submission.misbehaved,
        });

        Ok(())
    }
}

struct LocalSubscription {
    id: u64,
    handlers: Arc<Mutex<Handlers>>,
}

impl Subscription for LocalSubscription {
    fn unsubscribe(&mut self) {
        self.handlers.lock().registered.remove(&self.id);
    }
}
