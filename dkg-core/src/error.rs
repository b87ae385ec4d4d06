//! DKG coordination error types

use thiserror::Error;

use crate::MemberIndex;

/// An error related to DKG retries, signing group finalization or result
/// submission.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum Error {
    /// The member index is zero or larger than the group allows.
    #[error("invalid member index [{index}], must be in range [1, {max}]")]
    InvalidMemberIndex {
        /// The rejected index value.
        index: usize,
        /// The largest index accepted in this context.
        max: usize,
    },
    /// The retry loop observed its stop signal.
    #[error("dkg retry loop received stop signal on attempt [{attempt}]")]
    RetryLoopAborted {
        /// The attempt that was about to start.
        attempt: u32,
    },
    /// An attempt reported members that were inactive.
    ///
    /// Recoverable: the retry loop raises it from
    /// [`crate::AttemptError::InactiveMembers`], records the members as
    /// exclusion evidence and logs it. It never reaches the caller of
    /// [`crate::RetryLoop::start`].
    #[error("inactive members detected: {members:?}")]
    InactiveMembersDetected {
        /// Indexes of the inactive members.
        members: Vec<MemberIndex>,
    },
    /// The attempt function failed in a way retrying cannot fix.
    #[error("dkg attempt [{attempt}] failed unrecoverably at block [{block}]: {reason}")]
    AttemptUnrecoverable {
        /// Index of the failed attempt.
        attempt: u32,
        /// Start block of the failed attempt.
        block: u64,
        /// Reason reported by the attempt function.
        reason: String,
    },
    /// The random retry selection cannot produce a qualified set.
    #[error("random operator selection failed for [{operators}] operators and quorum [{quorum}]")]
    InvalidSelectionParameters {
        /// Number of selected operator seats.
        operators: usize,
        /// Requested quorum.
        quorum: usize,
    },
    /// Not enough operating members to form the final signing group, or the
    /// selected operators do not match the configured group size.
    #[error(
        "invalid input parameters: [{selected}] selected operators for group size \
         [{group_size}], [{operating}] operating members for honest threshold \
         [{honest_threshold}]"
    )]
    InsufficientOperatingMembers {
        /// Number of selected operators.
        selected: usize,
        /// Configured group size.
        group_size: usize,
        /// Number of operating members.
        operating: usize,
        /// Configured honest threshold.
        honest_threshold: usize,
    },
    /// The group returned by the chain is larger than supported.
    #[error("group size larger than supported: [{selected}] > [{group_size}]")]
    GroupTooLarge {
        /// Number of selected operators.
        selected: usize,
        /// Configured group size.
        group_size: usize,
    },
    /// The final signing group has no index for this member.
    #[error("[member:{member}] failed to get final signing group member index")]
    SigningGroupIndexMissing {
        /// The DKG member index.
        member: MemberIndex,
    },
    /// Not enough supporting signatures were collected for the result.
    #[error(
        "could not submit result with [{signatures}] signatures for signature \
         honest threshold [{honest_threshold}]"
    )]
    InsufficientSignatures {
        /// Number of collected signatures.
        signatures: usize,
        /// Configured honest threshold.
        honest_threshold: usize,
    },
    /// No result was published on-chain before the timeout block.
    #[error("dkg result publication timed out at block [{timeout_block}]")]
    DkgResultTimeout {
        /// Block at which waiting stopped.
        timeout_block: u64,
    },
    /// The member cannot stay in the group established on-chain.
    #[error("[member:{member}] could not stay in the group because {reason}")]
    ExcludedFromGroup {
        /// The excluded member.
        member: MemberIndex,
        /// Why the member was excluded.
        reason: ExclusionReason,
    },
    /// The block height waiter stopped before the height was reached.
    #[error("block height waiter for block [{height}] closed")]
    BlockWaiterClosed {
        /// The awaited height.
        height: u64,
    },
    /// A chain read or write failed.
    #[error("chain interaction failed: {0}")]
    Chain(String),
}

/// Why a member has to leave the group after losing the submission race.
#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum ExclusionReason {
    /// The on-chain group public key differs from the local one.
    #[error("the member does not support the same group public key")]
    GroupPublicKeyMismatch,
    /// The on-chain result lists the member as misbehaved.
    #[error("the member is considered as misbehaving")]
    Misbehaved,
}
