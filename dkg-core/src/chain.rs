//! The narrow view of the chain the DKG coordination depends on.
//!
//! Group selection, block heights, the DKG state and result submission are
//! owned by the chain. Implementations are expected to be cheap to share
//! between the per-member tasks of a node.

use core::fmt;
use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::{DkgResult, DkgSeed, Error, MemberIndex};

/// An on-chain operator address.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Create an address from a byte slice, which must be 20 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 20]>::try_from(bytes).ok().map(Self)
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Address").field(&self.to_string()).finish()
    }
}

/// Group and result publication parameters read from the chain.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChainConfig {
    /// Number of members selected to a group.
    pub group_size: usize,
    /// Minimum number of honest members the protocol security relies on.
    pub honest_threshold: usize,
    /// Minimum number of qualified members a DKG attempt needs.
    pub group_quorum: usize,
    /// Number of blocks between two consecutive members becoming eligible to
    /// submit the DKG result.
    pub result_publication_block_step: u64,
    /// Number of blocks a relay entry may take before it times out.
    pub relay_entry_timeout: u64,
}

impl ChainConfig {
    /// The maximum number of dishonest members the group tolerates.
    pub fn dishonest_threshold(&self) -> usize {
        self.group_size.saturating_sub(self.honest_threshold)
    }
}

/// The stage of the on-chain DKG.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DkgState {
    /// No DKG is running.
    Idle,
    /// The DKG waits for its seed.
    AwaitingSeed,
    /// The DKG waits for a member to submit the result.
    AwaitingResult,
    /// A result was submitted and may be challenged.
    Challenge,
}

/// Emitted when any member's DKG result was accepted on-chain.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DkgResultSubmittedEvent {
    /// Block the result was submitted at.
    pub block_number: u64,
    /// The member that submitted the result.
    pub submitter: MemberIndex,
    /// The group public key from the submitted result.
    pub group_public_key: Vec<u8>,
    /// Members the submitted result reports as misbehaving.
    pub misbehaved: Vec<MemberIndex>,
}

/// Callback invoked for every [`DkgResultSubmittedEvent`].
///
/// Runs on the chain's notification task, so it must not block.
pub type DkgResultHandler = Box<dyn Fn(DkgResultSubmittedEvent) + Send + Sync>;

/// A registered event handler.
pub trait Subscription: Send {
    /// Stop delivering events to the handler. Calling it more than once is a
    /// no-op.
    fn unsubscribe(&mut self);
}

/// Owns a [`Subscription`] and unsubscribes when dropped, on every exit path.
pub struct SubscriptionGuard(Option<Box<dyn Subscription>>);

impl SubscriptionGuard {
    /// Wrap a subscription.
    pub fn new(subscription: Box<dyn Subscription>) -> Self {
        Self(Some(subscription))
    }

    /// Unsubscribe now instead of on drop.
    pub fn unsubscribe(&mut self) {
        if let Some(mut subscription) = self.0.take() {
            subscription.unsubscribe();
        }
    }

    /// Whether the handler is still registered through this guard.
    pub fn is_active(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SubscriptionGuard")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Block height observer.
pub trait BlockCounter: Send + Sync {
    /// The current block height.
    fn current_block(&self) -> Result<u64, Error>;

    /// A receiver resolved with the height once the chain reaches `height`.
    /// Resolves immediately if the height was already reached.
    fn block_height_waiter(&self, height: u64) -> Result<oneshot::Receiver<u64>, Error>;
}

/// Chain operations used by DKG coordination.
#[async_trait]
pub trait Chain: Send + Sync {
    /// The operators selected to the group for the given seed, in member
    /// index order.
    async fn select_group(&self, seed: &DkgSeed) -> Result<Vec<Address>, Error>;

    /// The current chain configuration.
    fn config(&self) -> ChainConfig;

    /// The address of the operator running this node.
    fn operator_address(&self) -> Address;

    /// The chain's block counter.
    fn block_counter(&self) -> Result<Arc<dyn BlockCounter>, Error>;

    /// Register a handler for [`DkgResultSubmittedEvent`]s.
    fn on_dkg_result_submitted(&self, handler: DkgResultHandler) -> SubscriptionGuard;

    /// The current stage of the on-chain DKG.
    async fn dkg_state(&self) -> Result<DkgState, Error>;

    /// Submit the DKG result together with the supporting members'
    /// signatures.
    async fn submit_dkg_result(
        &self,
        member_index: MemberIndex,
        result: &DkgResult,
        signatures: &BTreeMap<MemberIndex, Vec<u8>>,
    ) -> Result<(), Error>;
}
