//! Compaction of the DKG group into the final signing group.
//!
//! DKG may exclude any members, leaving gaps between the operating member
//! indexes. Signing expects dense indexes, so the operating members are
//! renumbered `1..=n` in ascending order of their DKG index.

use std::collections::BTreeMap;

use derive_getters::Getters;
use itertools::Itertools;

use crate::{Address, ChainConfig, Error, MemberIndex};

/// The operators that keep a key share after DKG, with their new indexes.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
pub struct FinalSigningGroup {
    /// Operators of the signing group, in signing group index order.
    operators: Vec<Address>,
    /// Maps the DKG member index of each operating member to its 1-based
    /// index within the signing group.
    member_indexes: BTreeMap<MemberIndex, MemberIndex>,
}

impl FinalSigningGroup {
    /// The signing group index of the member with the given DKG index.
    pub fn member_index_for(&self, dkg_member_index: MemberIndex) -> Option<MemberIndex> {
        self.member_indexes.get(&dkg_member_index).copied()
    }

    /// Number of operators in the signing group.
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    /// Whether the signing group is empty.
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

/// Build the final signing group from the selected operators and the members
/// still operating at the end of DKG.
///
/// `operating_member_indexes` may come in any order.
pub fn final_signing_group(
    selected_operators: &[Address],
    operating_member_indexes: &[MemberIndex],
    chain_config: &ChainConfig,
) -> Result<FinalSigningGroup, Error> {
    if selected_operators.len() != chain_config.group_size
        || operating_member_indexes.len() < chain_config.honest_threshold
    {
        return Err(Error::InsufficientOperatingMembers {
            selected: selected_operators.len(),
            group_size: chain_config.group_size,
            operating: operating_member_indexes.len(),
            honest_threshold: chain_config.honest_threshold,
        });
    }

    let mut operators = Vec::with_capacity(operating_member_indexes.len());
    let mut member_indexes = BTreeMap::new();

    for (position, dkg_member_index) in operating_member_indexes
        .iter()
        .copied()
        .sorted()
        .dedup()
        .enumerate()
    {
        let operator = selected_operators
            .get(dkg_member_index.position())
            .ok_or(Error::InvalidMemberIndex {
                index: dkg_member_index.get().into(),
                max: chain_config.group_size,
            })?;

        operators.push(*operator);
        member_indexes.insert(dkg_member_index, MemberIndex::from_position(position)?);
    }

    Ok(FinalSigningGroup {
        operators,
        member_indexes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(tag: u8) -> Address {
        Address([tag; 20])
    }

    fn index(n: u8) -> MemberIndex {
        MemberIndex::new(n).unwrap()
    }

    fn chain_config(group_size: usize, honest_threshold: usize) -> ChainConfig {
        ChainConfig {
            group_size,
            honest_threshold,
            group_quorum: group_size,
            result_publication_block_step: 6,
            relay_entry_timeout: 40,
        }
    }

    #[test]
    fn compacts_operating_members() {
        let [a, b, c, d, e] = [b'a', b'b', b'c', b'd', b'e'].map(address);
        let selected = vec![a, b, c, d, e];

        let group =
            final_signing_group(&selected, &[index(5), index(1), index(3)], &chain_config(5, 3))
                .unwrap();

        assert_eq!(group.operators(), &vec![a, c, e]);
        assert_eq!(
            group.member_indexes(),
            &BTreeMap::from([
                (index(1), index(1)),
                (index(3), index(2)),
                (index(5), index(3)),
            ])
        );
        assert_eq!(group.member_index_for(index(5)), Some(index(3)));
        assert_eq!(group.member_index_for(index(2)), None);
    }

    #[test]
    fn rejects_too_few_operating_members() {
        let selected: Vec<_> = (1..=5).map(address).collect();
        assert_eq!(
            final_signing_group(&selected, &[index(1), index(2)], &chain_config(5, 3)),
            Err(Error::InsufficientOperatingMembers {
                selected: 5,
                group_size: 5,
                operating: 2,
                honest_threshold: 3,
            })
        );
    }

    #[test]
    fn rejects_selected_operators_not_matching_group_size() {
        let selected: Vec<_> = (1..=4).map(address).collect();
        assert!(matches!(
            final_signing_group(&selected, &[index(1), index(2), index(3)], &chain_config(5, 3)),
            Err(Error::InsufficientOperatingMembers { selected: 4, .. })
        ));
    }

    #[test]
    fn rejects_index_outside_group() {
        let selected: Vec<_> = (1..=3).map(address).collect();
        assert_eq!(
            final_signing_group(&selected, &[index(1), index(7)], &chain_config(3, 2)),
            Err(Error::InvalidMemberIndex { index: 7, max: 3 })
        );
    }

    #[test]
    fn all_members_operating_keeps_indexes() {
        let selected: Vec<_> = (1..=4).map(address).collect();
        let operating: Vec<_> = (1..=4).map(index).collect();
        let group = final_signing_group(&selected, &operating, &chain_config(4, 3)).unwrap();

        assert_eq!(group.operators(), &selected);
        assert!(group
            .member_indexes()
            .iter()
            .all(|(dkg_index, signing_index)| dkg_index == signing_index));
    }
}
