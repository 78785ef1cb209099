//! Side-pot construction: partitions cumulative contributions into a main
//! pot plus zero or more side pots whenever an all-in splits the table
//! into different eligibility tiers (§3, §4.3 S4).

use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Pot {
    pub amount: i64,
    pub eligible_seats: BTreeSet<u8>,
}

/// `contributed` is each seat's cumulative chips committed to the pot this
/// hand (blinds + every street's bets), independent of whether they have
/// since folded. `folded` marks seats ineligible to win despite having
/// contributed — their chips still fund the pot (dead money).
pub fn build_pots(contributed: &BTreeMap<u8, i64>, folded: &BTreeSet<u8>) -> Vec<Pot> {
    let mut levels: Vec<i64> = contributed.values().copied().filter(|&v| v > 0).collect();
    levels.sort_unstable();
    levels.dedup();

    let mut pots: Vec<Pot> = Vec::new();
    let mut prev = 0i64;
    for level in levels {
        let layer = level - prev;
        let contributors: Vec<u8> = contributed
            .iter()
            .filter(|(_, &amt)| amt >= level)
            .map(|(&seat, _)| seat)
            .collect();
        let amount = layer * contributors.len() as i64;
        let eligible: BTreeSet<u8> = contributors.into_iter().filter(|s| !folded.contains(s)).collect();
        prev = level;
        if amount == 0 {
            continue;
        }
        if eligible.is_empty() {
            // every contributor at this layer has folded: the chips are
            // dead money, fold them into the most recent eligible pot.
            if let Some(last) = pots.last_mut() {
                last.amount += amount;
            }
            continue;
        }
        if let Some(last) = pots.last_mut() {
            if last.eligible_seats == eligible {
                last.amount += amount;
                continue;
            }
        }
        pots.push(Pot {
            amount,
            eligible_seats: eligible,
        });
    }
    pots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(seats: &[u8]) -> BTreeSet<u8> {
        seats.iter().copied().collect()
    }

    #[test]
    fn equal_contributions_form_a_single_pot() {
        let contributed: BTreeMap<u8, i64> = [(0, 100), (1, 100), (2, 100)].into_iter().collect();
        let pots = build_pots(&contributed, &BTreeSet::new());
        assert_eq!(pots.len(), 1);
        assert_eq!(pots[0].amount, 300);
        assert_eq!(pots[0].eligible_seats, set(&[0, 1, 2]));
    }

    #[test]
    fn short_all_in_creates_a_side_pot() {
        // Scenario S4: stacks {100, 500, 500}, all three put in 100.
        let contributed: BTreeMap<u8, i64> = [(0, 100), (1, 500), (2, 500)].into_iter().collect();
        let pots = build_pots(&contributed, &BTreeSet::new());
        assert_eq!(pots.len(), 2);
        assert_eq!(pots[0].amount, 300); // 100 * 3
        assert_eq!(pots[0].eligible_seats, set(&[0, 1, 2]));
        assert_eq!(pots[1].amount, 800); // 400 * 2
        assert_eq!(pots[1].eligible_seats, set(&[1, 2]));
        let total: i64 = pots.iter().map(|p| p.amount).sum();
        assert_eq!(total, 1100);
    }

    #[test]
    fn folded_contribution_is_dead_money_in_the_most_recent_pot() {
        let contributed: BTreeMap<u8, i64> = [(0, 50), (1, 100), (2, 100)].into_iter().collect();
        let pots = build_pots(&contributed, &set(&[0]));
        assert_eq!(pots.len(), 1);
        assert_eq!(pots[0].amount, 250);
        assert_eq!(pots[0].eligible_seats, set(&[1, 2]));
    }
}
