//! Deterministic selection of the participants of a random retry.
//!
//! Every honest member holds the same selected operators, the same seed and
//! counts random retries the same way, so each of them computes the same
//! qualified subset without exchanging any message.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore, SeedableRng};

use crate::{Address, Error};

/// Pick the operator seats that take part in a random retry.
///
/// Distinct operators are shuffled with a generator keyed by `seed` and
/// `retry_count`, then excluded in shuffled order as long as the remaining
/// seats still reach `quorum`. An operator holding several seats is always
/// kept or excluded as a whole. The returned seats keep the order of
/// `operators`.
pub fn evaluate_retry_participants(
    operators: &[Address],
    seed: i64,
    retry_count: u32,
    quorum: usize,
) -> Result<Vec<Address>, Error> {
    if quorum == 0 || quorum > operators.len() {
        return Err(Error::InvalidSelectionParameters {
            operators: operators.len(),
            quorum,
        });
    }

    let mut seats: BTreeMap<Address, usize> = BTreeMap::new();
    for operator in operators {
        *seats.entry(*operator).or_default() += 1;
    }

    let mut candidates: Vec<Address> = operators.iter().copied().unique().collect();
    shuffle(&mut candidates, &mut retry_rng(seed, retry_count));

    let mut remaining = operators.len();
    let mut excluded = BTreeSet::new();
    for operator in candidates {
        let operator_seats = seats[&operator];
        if remaining - operator_seats >= quorum {
            excluded.insert(operator);
            remaining -= operator_seats;
        }
    }

    Ok(operators
        .iter()
        .copied()
        .filter(|operator| !excluded.contains(operator))
        .collect())
}

fn retry_rng(seed: i64, retry_count: u32) -> ChaCha20Rng {
    let mut key = [0u8; 32];
    key[..8].copy_from_slice(&seed.to_be_bytes());
    key[8..16].copy_from_slice(&u64::from(retry_count).to_be_bytes());
    ChaCha20Rng::from_seed(key)
}

/// Fisher-Yates shuffle. Kept local so the permutation only depends on the
/// ChaCha20 stream and not on the sampling strategy of a `rand` release.
fn shuffle<T, R: RngCore>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = uniform_below(rng, i as u64 + 1) as usize;
        items.swap(i, j);
    }
}

/// A uniform value in `[0, bound)`, rejecting the biased tail of the range.
fn uniform_below<R: RngCore>(rng: &mut R, bound: u64) -> u64 {
    let threshold = bound.wrapping_neg() % bound;
    loop {
        let value = rng.next_u64();
        if value >= threshold {
            return value % bound;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operators(n: u8) -> Vec<Address> {
        (1..=n)
            .map(|i| {
                let mut bytes = [0u8; 20];
                bytes[0] = i;
                Address(bytes)
            })
            .collect()
    }

    #[test]
    fn selects_exactly_quorum_single_seat_operators() {
        let operators = operators(10);
        let selected = evaluate_retry_participants(&operators, 42, 0, 7).unwrap();
        assert_eq!(selected.len(), 7);
        assert!(selected.iter().all(|operator| operators.contains(operator)));
    }

    #[test]
    fn selection_keeps_original_order() {
        let operators = operators(10);
        let selected = evaluate_retry_participants(&operators, -7, 3, 6).unwrap();
        let positions: Vec<_> = selected
            .iter()
            .map(|s| operators.iter().position(|o| o == s).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn selection_is_deterministic() {
        let operators = operators(20);
        for retry_count in 0..10 {
            assert_eq!(
                evaluate_retry_participants(&operators, 1234, retry_count, 12).unwrap(),
                evaluate_retry_participants(&operators, 1234, retry_count, 12).unwrap(),
            );
        }
    }

    #[test]
    fn retry_counter_changes_selection() {
        let operators = operators(20);
        let selections: BTreeSet<Vec<Address>> = (0..10)
            .map(|retry_count| {
                evaluate_retry_participants(&operators, 99, retry_count, 12).unwrap()
            })
            .collect();
        assert!(selections.len() > 1);
    }

    #[test]
    fn multi_seat_operators_stay_whole() {
        let single = operators(4);
        let heavy = single[0];
        // heavy holds seats 1, 2 and 3
        let mut seats = vec![heavy, heavy, heavy];
        seats.extend_from_slice(&single[1..]);

        for retry_count in 0..20 {
            let selected = evaluate_retry_participants(&seats, 5, retry_count, 4).unwrap();
            let heavy_seats = selected.iter().filter(|o| **o == heavy).count();
            assert!(heavy_seats == 0 || heavy_seats == 3);
            assert!(selected.len() >= 4);
        }
    }

    #[test]
    fn rejects_unreachable_quorum() {
        let operators = operators(3);
        assert_eq!(
            evaluate_retry_participants(&operators, 0, 0, 4),
            Err(Error::InvalidSelectionParameters {
                operators: 3,
                quorum: 4
            })
        );
        assert!(evaluate_retry_participants(&operators, 0, 0, 0).is_err());
    }

    #[test]
    fn uniform_below_stays_in_bounds() {
        let mut rng = ChaCha20Rng::from_seed([7u8; 32]);
        for bound in 1..50 {
            assert!(uniform_below(&mut rng, bound) < bound);
        }
    }
}
