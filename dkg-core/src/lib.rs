#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]
#![doc = document_features::document_features!()]

mod chain;
mod config;
mod error;
mod group;
mod latch;
mod member;
pub mod node;
mod pool;
mod result;
mod retry;
mod seed;
pub mod selection;
mod signing_group;
pub mod submission;

pub use chain::{
    Address, BlockCounter, Chain, ChainConfig, DkgResultHandler, DkgResultSubmittedEvent,
    DkgState, Subscription, SubscriptionGuard,
};
pub use config::{Config, RetryConfig};
pub use error::{Error, ExclusionReason};
pub use group::Group;
pub use latch::{ProtocolGuard, ProtocolLatch};
pub use member::{MemberIndex, MAX_MEMBER_INDEX};
pub use node::{DkgExecutor, Node, Signer, SignerRegistry};
pub use pool::ParamsPool;
pub use result::{DkgResult, PrivateKeyShare};
pub use retry::{AttemptError, AttemptParams, RetryLoop, RetryLoopState};
pub use seed::DkgSeed;
pub use selection::evaluate_retry_participants;
pub use signing_group::{final_signing_group, FinalSigningGroup};
pub use submission::{eligibility_block, result_timeout_block, ResultSubmitter};
