//! Membership bookkeeping for a single DKG run.
//!
//! A [`Group`] tracks which members joined the run and which of them were
//! excluded, either as disqualified (provably misbehaving) or inactive (went
//! silent). Exclusions are permanent and a member is excluded by at most one
//! mechanism: the first exclusion wins and later calls are no-ops.

use std::collections::BTreeSet;

use crate::{Error, MemberIndex};

/// The protocol's members group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    /// The maximum number of group members who could be dishonest in order
    /// for the generated key to be uncompromised.
    dishonest_threshold: usize,
    /// The largest member index accepted by [`Group::register_member_id`].
    max_index: usize,
    /// IDs of all members of the group, in join order.
    member_ids: Vec<MemberIndex>,
    disqualified_member_ids: BTreeSet<MemberIndex>,
    inactive_member_ids: BTreeSet<MemberIndex>,
}

impl Group {
    /// Create an empty group accepting member indexes in `[1, max_index]`.
    pub fn new(dishonest_threshold: usize, max_index: usize) -> Self {
        Self {
            dishonest_threshold,
            max_index,
            member_ids: Vec::new(),
            disqualified_member_ids: BTreeSet::new(),
            inactive_member_ids: BTreeSet::new(),
        }
    }

    /// Create a group of `size` members with indexes `1..=size` already
    /// registered.
    pub fn with_members(dishonest_threshold: usize, size: usize) -> Result<Self, Error> {
        let mut group = Self::new(dishonest_threshold, size);
        for position in 0..size {
            group.register_member_id(MemberIndex::from_position(position)?)?;
        }
        Ok(group)
    }

    /// The dishonest threshold this group was created with.
    pub fn dishonest_threshold(&self) -> usize {
        self.dishonest_threshold
    }

    /// IDs of all group members, including those marked as inactive or
    /// disqualified.
    pub fn member_ids(&self) -> &[MemberIndex] {
        &self.member_ids
    }

    /// IDs of disqualified members.
    pub fn disqualified_member_ids(&self) -> &BTreeSet<MemberIndex> {
        &self.disqualified_member_ids
    }

    /// IDs of inactive members.
    pub fn inactive_member_ids(&self) -> &BTreeSet<MemberIndex> {
        &self.inactive_member_ids
    }

    /// Add a member to the group. Registering a member twice is a no-op.
    pub fn register_member_id(&mut self, member_id: MemberIndex) -> Result<(), Error> {
        member_id.validate(self.max_index)?;

        if !self.member_ids.contains(&member_id) {
            self.member_ids.push(member_id);
        }

        Ok(())
    }

    /// IDs of all members that are neither inactive nor disqualified, in join
    /// order.
    pub fn operating_member_ids(&self) -> Vec<MemberIndex> {
        self.member_ids
            .iter()
            .copied()
            .filter(|member_id| self.is_operating(*member_id))
            .collect()
    }

    /// Mark the member as disqualified. Does nothing unless the member is
    /// currently operating.
    pub fn mark_member_as_disqualified(&mut self, member_id: MemberIndex) {
        if self.is_operating(member_id) {
            self.disqualified_member_ids.insert(member_id);
        }
    }

    /// Mark the member as inactive. Does nothing unless the member is
    /// currently operating.
    pub fn mark_member_as_inactive(&mut self, member_id: MemberIndex) {
        if self.is_operating(member_id) {
            self.inactive_member_ids.insert(member_id);
        }
    }

    /// Whether the member belongs to the group and was not excluded.
    pub fn is_operating(&self, member_id: MemberIndex) -> bool {
        self.member_ids.contains(&member_id)
            && !self.inactive_member_ids.contains(&member_id)
            && !self.disqualified_member_ids.contains(&member_id)
    }

    /// Number of disqualified and inactive members.
    pub fn eliminated_members_count(&self) -> usize {
        self.disqualified_member_ids.len() + self.inactive_member_ids.len()
    }

    /// Returns true if the number of eliminated members is at most half of
    /// the dishonest threshold.
    pub fn is_threshold_satisfied(&self) -> bool {
        self.eliminated_members_count() <= self.dishonest_threshold / 2
    }
}
