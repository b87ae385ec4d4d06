//! Output of a successful DKG attempt.

use core::fmt;

use derive_getters::Getters;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::Group;

/// This member's share of the group private key, in whatever encoding the
/// DKG implementation produced.
///
/// # Security
///
/// This value MUST NOT be sent to other participants!
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKeyShare(Vec<u8>);

impl PrivateKeyShare {
    /// Wrap the serialized share.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The serialized share.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PrivateKeyShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PrivateKeyShare").field(&"<redacted>").finish()
    }
}

/// The result of a DKG attempt that completed.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
pub struct DkgResult {
    /// The attempt's group, with the members excluded during the attempt.
    group: Group,
    /// The serialized group public key.
    group_public_key: Vec<u8>,
    /// This member's share of the group private key.
    private_key_share: PrivateKeyShare,
}

impl DkgResult {
    /// Create a new [`DkgResult`].
    pub fn new(group: Group, group_public_key: Vec<u8>, private_key_share: PrivateKeyShare) -> Self {
        Self {
            group,
            group_public_key,
            private_key_share,
        }
    }

    /// Indexes of members excluded during the attempt, in ascending order.
    pub fn misbehaved_member_ids(&self) -> Vec<crate::MemberIndex> {
        let mut misbehaved: Vec<_> = self
            .group
            .disqualified_member_ids()
            .union(self.group.inactive_member_ids())
            .copied()
            .collect();
        misbehaved.sort();
        misbehaved
    }
}
