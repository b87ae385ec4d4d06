use std::collections::BTreeSet;

use proptest::prelude::*;

use dkg_core::{
    evaluate_retry_participants, final_signing_group, Address, ChainConfig, Group, MemberIndex,
};

const GROUP_SIZE: u8 = 20;

/// An exclusion decided during a DKG attempt.
#[derive(Copy, Clone, Debug)]
enum Exclusion {
    Disqualify(u8),
    Inactivate(u8),
}

impl Exclusion {
    fn apply(&self, group: &mut Group) {
        match *self {
            Exclusion::Disqualify(n) => group.mark_member_as_disqualified(index(n)),
            Exclusion::Inactivate(n) => group.mark_member_as_inactive(index(n)),
        }
    }
}

fn index(n: u8) -> MemberIndex {
    MemberIndex::new(n).unwrap()
}

fn exclusion_strategy() -> impl Strategy<Value = Exclusion> {
    // Indexes past the group size exercise exclusions of unknown members.
    prop_oneof![
        (1..=GROUP_SIZE + 2).prop_map(Exclusion::Disqualify),
        (1..=GROUP_SIZE + 2).prop_map(Exclusion::Inactivate),
    ]
}

fn operators(n: usize) -> Vec<Address> {
    (0..n)
        .map(|i| {
            let mut bytes = [0u8; 20];
            bytes[..8].copy_from_slice(&(i as u64).to_be_bytes());
            Address(bytes)
        })
        .collect()
}

proptest! {
    #[test]
    fn exclusions_only_grow_and_stay_disjoint(
        exclusions in prop::collection::vec(exclusion_strategy(), 0..40),
    ) {
        let mut group = Group::with_members(9, GROUP_SIZE as usize).unwrap();

        for exclusion in &exclusions {
            let disqualified = group.disqualified_member_ids().clone();
            let inactive = group.inactive_member_ids().clone();

            exclusion.apply(&mut group);

            prop_assert!(group.disqualified_member_ids().is_superset(&disqualified));
            prop_assert!(group.inactive_member_ids().is_superset(&inactive));
            prop_assert!(group
                .disqualified_member_ids()
                .is_disjoint(group.inactive_member_ids()));

            let members: BTreeSet<_> = group.member_ids().iter().copied().collect();
            prop_assert!(group.disqualified_member_ids().is_subset(&members));
            prop_assert!(group.inactive_member_ids().is_subset(&members));
            prop_assert_eq!(
                group.operating_member_ids().len() + group.eliminated_members_count(),
                GROUP_SIZE as usize
            );
        }
    }

    #[test]
    fn threshold_holds_while_eliminations_are_few(
        dishonest_threshold in 0usize..20,
        disqualified in 0u8..10,
        inactive in 0u8..10,
    ) {
        let mut group = Group::with_members(dishonest_threshold, GROUP_SIZE as usize).unwrap();
        for n in 1..=disqualified {
            group.mark_member_as_disqualified(index(n));
        }
        for n in 10..10 + inactive {
            group.mark_member_as_inactive(index(n + 1));
        }

        let eliminated = (disqualified + inactive) as usize;
        prop_assert_eq!(group.eliminated_members_count(), eliminated);
        prop_assert_eq!(
            group.is_threshold_satisfied(),
            eliminated <= dishonest_threshold / 2
        );
    }

    #[test]
    fn retry_participants_form_quorum(
        size in 1usize..64,
        quorum_ratio in 0.01f64..=1.0,
        seed in any::<i64>(),
        retry_count in any::<u32>(),
    ) {
        let quorum = ((size as f64 * quorum_ratio).ceil() as usize).clamp(1, size);
        let operators = operators(size);

        let selected = evaluate_retry_participants(&operators, seed, retry_count, quorum).unwrap();

        prop_assert_eq!(selected.len(), quorum);
        // A subsequence of the operators, in their original order.
        let mut remaining = operators.iter();
        for operator in &selected {
            prop_assert!(remaining.any(|candidate| candidate == operator));
        }
        prop_assert_eq!(
            &selected,
            &evaluate_retry_participants(&operators, seed, retry_count, quorum).unwrap()
        );
    }

    #[test]
    fn signing_group_indexes_are_dense(
        operating in prop::collection::btree_set(1..=GROUP_SIZE, 11..=GROUP_SIZE as usize),
    ) {
        let selected = operators(GROUP_SIZE as usize);
        let operating: Vec<_> = operating.into_iter().rev().map(index).collect();
        let config = ChainConfig {
            group_size: GROUP_SIZE as usize,
            honest_threshold: 11,
            group_quorum: 15,
            result_publication_block_step: 6,
            relay_entry_timeout: 40,
        };

        let signing_group = final_signing_group(&selected, &operating, &config).unwrap();

        prop_assert_eq!(signing_group.len(), operating.len());
        for (position, (dkg_index, signing_index)) in
            signing_group.member_indexes().iter().enumerate()
        {
            prop_assert_eq!(signing_index.position(), position);
            prop_assert_eq!(
                signing_group.operators()[position],
                selected[dkg_index.position()]
            );
        }
    }
}
