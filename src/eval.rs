//! Hand evaluator (C2): best 5-of-7, total order, kicker tiebreaks.
//!
//! No side effects; `compare` is reflexive, antisymmetric, and transitive
//! because it reduces to a lexicographic comparison over
//! `(category, kickers)`, both of which are themselves totally ordered.

use crate::card::{Card, Rank};
use serde::Serialize;
use std::cmp::Ordering;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandCategory {
    HighCard,
    Pair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
    RoyalFlush,
}

#[derive(Serialize, Debug, Clone)]
pub struct Evaluation {
    pub category: HandCategory,
    pub best_five: [Card; 5],
    /// Ranks in comparison order (highest-impact first); a pure tiebreak
    /// vector, insensitive to suit or input ordering.
    pub kickers: Vec<u8>,
    pub description: String,
}

impl Evaluation {
    /// `-1 / 0 / +1`, matching §4.2's `compare(a, b)` contract.
    pub fn compare(a: &Evaluation, b: &Evaluation) -> i32 {
        match a.category.cmp(&b.category).then_with(|| a.kickers.cmp(&b.kickers)) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }
    }
}

/// Evaluates the best 5-card hand out of 2..=7 cards (hole + community).
pub fn evaluate(cards: &[Card]) -> Evaluation {
    assert!(
        (5..=7).contains(&cards.len()),
        "evaluator needs 5 to 7 cards, got {}",
        cards.len()
    );
    combinations_of_five(cards)
        .into_iter()
        .map(score_five)
        .max_by(|a, b| a.category.cmp(&b.category).then_with(|| a.kickers.cmp(&b.kickers)))
        .expect("at least one 5-card combination exists")
}

fn combinations_of_five(cards: &[Card]) -> Vec<[Card; 5]> {
    let n = cards.len();
    let mut out = Vec::new();
    let mut idx = [0usize; 5];
    for i in 0..5 {
        idx[i] = i;
    }
    loop {
        out.push([
            cards[idx[0]],
            cards[idx[1]],
            cards[idx[2]],
            cards[idx[3]],
            cards[idx[4]],
        ]);
        // advance like an odometer with the combinatorial constraint
        let mut i = 4isize;
        while i >= 0 && idx[i as usize] == i as usize + n - 5 {
            i -= 1;
        }
        if i < 0 {
            break;
        }
        idx[i as usize] += 1;
        for j in (i as usize + 1)..5 {
            idx[j] = idx[j - 1] + 1;
        }
    }
    out
}

fn score_five(cards: [Card; 5]) -> Evaluation {
    let mut by_rank: Vec<u8> = cards.iter().map(|c| c.rank.value()).collect();
    by_rank.sort_unstable_by(|a, b| b.cmp(a));

    let flush = cards.iter().all(|c| c.suit == cards[0].suit);
    let straight_high = straight_high_card(&by_rank);

    let mut counts: Vec<(u8, u8)> = Vec::new(); // (rank, count)
    for &r in &by_rank {
        if let Some(entry) = counts.iter_mut().find(|(rank, _)| *rank == r) {
            entry.1 += 1;
        } else {
            counts.push((r, 1));
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));

    let (category, kickers) = if flush && straight_high.is_some() {
        let high = straight_high.unwrap();
        if high == 14 {
            (HandCategory::RoyalFlush, vec![high])
        } else {
            (HandCategory::StraightFlush, vec![high])
        }
    } else if counts[0].1 == 4 {
        (HandCategory::FourOfAKind, vec![counts[0].0, counts[1].0])
    } else if counts[0].1 == 3 && counts.len() > 1 && counts[1].1 == 2 {
        (HandCategory::FullHouse, vec![counts[0].0, counts[1].0])
    } else if flush {
        (HandCategory::Flush, by_rank.clone())
    } else if let Some(high) = straight_high {
        (HandCategory::Straight, vec![high])
    } else if counts[0].1 == 3 {
        let mut kick: Vec<u8> = counts[1..].iter().map(|(r, _)| *r).collect();
        kick.sort_unstable_by(|a, b| b.cmp(a));
        (HandCategory::ThreeOfAKind, [vec![counts[0].0], kick].concat())
    } else if counts[0].1 == 2 && counts.len() > 1 && counts[1].1 == 2 {
        let mut pair_ranks = vec![counts[0].0, counts[1].0];
        pair_ranks.sort_unstable_by(|a, b| b.cmp(a));
        let kicker = counts[2].0;
        (HandCategory::TwoPair, [pair_ranks, vec![kicker]].concat())
    } else if counts[0].1 == 2 {
        let mut kick: Vec<u8> = counts[1..].iter().map(|(r, _)| *r).collect();
        kick.sort_unstable_by(|a, b| b.cmp(a));
        (HandCategory::Pair, [vec![counts[0].0], kick].concat())
    } else {
        (HandCategory::HighCard, by_rank.clone())
    };

    Evaluation {
        description: describe(category, &kickers),
        category,
        best_five: cards,
        kickers,
    }
}

/// Returns the straight's high card rank value, if the five ranks form a
/// straight. The wheel (A-2-3-4-5) is treated as 5-high.
fn straight_high_card(ranks_desc: &[u8]) -> Option<u8> {
    let mut unique: Vec<u8> = ranks_desc.to_vec();
    unique.dedup();
    if unique.len() != 5 {
        return None;
    }
    if unique[0] - unique[4] == 4 {
        return Some(unique[0]);
    }
    if unique == [14, 5, 4, 3, 2] {
        return Some(5);
    }
    None
}

fn rank_name(value: u8) -> &'static str {
    match value {
        2 => "Two",
        3 => "Three",
        4 => "Four",
        5 => "Five",
        6 => "Six",
        7 => "Seven",
        8 => "Eight",
        9 => "Nine",
        10 => "Ten",
        11 => "Jack",
        12 => "Queen",
        13 => "King",
        14 => "Ace",
        _ => "?",
    }
}

fn describe(category: HandCategory, kickers: &[u8]) -> String {
    match category {
        HandCategory::RoyalFlush => "Royal Flush".to_string(),
        HandCategory::StraightFlush => format!("Straight Flush, {} high", rank_name(kickers[0])),
        HandCategory::FourOfAKind => format!("Four of a Kind, {}s", rank_name(kickers[0])),
        HandCategory::FullHouse => format!(
            "Full House, {}s over {}s",
            rank_name(kickers[0]),
            rank_name(kickers[1])
        ),
        HandCategory::Flush => format!("Flush, {} high", rank_name(kickers[0])),
        HandCategory::Straight => format!("Straight, {} high", rank_name(kickers[0])),
        HandCategory::ThreeOfAKind => format!("Three of a Kind, {}s", rank_name(kickers[0])),
        HandCategory::TwoPair => format!(
            "Two Pair, {}s and {}s",
            rank_name(kickers[0]),
            rank_name(kickers[1])
        ),
        HandCategory::Pair => format!("Pair of {}s", rank_name(kickers[0])),
        HandCategory::HighCard => format!("High Card, {}", rank_name(kickers[0])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{Rank, Suit};

    fn c(rank: Rank, suit: Suit) -> Card {
        Card::new(rank, suit)
    }

    #[test]
    fn royal_flush_beats_straight_flush() {
        let royal = evaluate(&[
            c(Rank::Ace, Suit::Spades),
            c(Rank::King, Suit::Spades),
            c(Rank::Queen, Suit::Spades),
            c(Rank::Jack, Suit::Spades),
            c(Rank::Ten, Suit::Spades),
        ]);
        let sf = evaluate(&[
            c(Rank::Nine, Suit::Hearts),
            c(Rank::Eight, Suit::Hearts),
            c(Rank::Seven, Suit::Hearts),
            c(Rank::Six, Suit::Hearts),
            c(Rank::Five, Suit::Hearts),
        ]);
        assert_eq!(royal.category, HandCategory::RoyalFlush);
        assert_eq!(Evaluation::compare(&royal, &sf), 1);
    }

    #[test]
    fn wheel_straight_is_five_high() {
        let wheel = evaluate(&[
            c(Rank::Ace, Suit::Clubs),
            c(Rank::Two, Suit::Diamonds),
            c(Rank::Three, Suit::Hearts),
            c(Rank::Four, Suit::Spades),
            c(Rank::Five, Suit::Clubs),
        ]);
        assert_eq!(wheel.category, HandCategory::Straight);
        assert_eq!(wheel.kickers, vec![5]);

        let six_high = evaluate(&[
            c(Rank::Two, Suit::Clubs),
            c(Rank::Three, Suit::Diamonds),
            c(Rank::Four, Suit::Hearts),
            c(Rank::Five, Suit::Spades),
            c(Rank::Six, Suit::Clubs),
        ]);
        assert_eq!(Evaluation::compare(&six_high, &wheel), 1);
    }

    #[test]
    fn straight_flush_beats_four_of_a_kind() {
        let quads = evaluate(&[
            c(Rank::King, Suit::Clubs),
            c(Rank::King, Suit::Diamonds),
            c(Rank::King, Suit::Hearts),
            c(Rank::King, Suit::Spades),
            c(Rank::Two, Suit::Clubs),
        ]);
        let sf = evaluate(&[
            c(Rank::Nine, Suit::Hearts),
            c(Rank::Eight, Suit::Hearts),
            c(Rank::Seven, Suit::Hearts),
            c(Rank::Six, Suit::Hearts),
            c(Rank::Five, Suit::Hearts),
        ]);
        assert_eq!(Evaluation::compare(&sf, &quads), 1);
    }

    #[test]
    fn comparator_laws_hold_over_random_seven_card_hands() {
        use rand::seq::SliceRandom;
        use rand::SeedableRng;
        let mut deck = Vec::new();
        for suit in Suit::ALL {
            for rank in Rank::ALL {
                deck.push(Card::new(rank, suit));
            }
        }
        let mut rng = rand_chacha::ChaCha20Rng::seed_from_u64(7);
        for _ in 0..50 {
            deck.shuffle(&mut rng);
            let hand_a: Vec<Card> = deck[0..7].to_vec();
            let hand_b: Vec<Card> = deck[7..14].to_vec();
            let hand_c: Vec<Card> = deck[14..21].to_vec();
            let (a, b, cc) = (evaluate(&hand_a), evaluate(&hand_b), evaluate(&hand_c));

            // reflexivity
            assert_eq!(Evaluation::compare(&a, &a), 0);
            // antisymmetry
            assert_eq!(
                Evaluation::compare(&a, &b) + Evaluation::compare(&b, &a),
                0
            );
            // transitivity
            let ab = Evaluation::compare(&a, &b);
            let bc = Evaluation::compare(&b, &cc);
            let ac = Evaluation::compare(&a, &cc);
            if ab >= 0 && bc >= 0 {
                assert!(ac >= 0);
            }
            if ab <= 0 && bc <= 0 {
                assert!(ac <= 0);
            }
        }
    }

    #[test]
    fn evaluation_insensitive_to_input_order() {
        let ordered = vec![
            c(Rank::Ace, Suit::Spades),
            c(Rank::King, Suit::Spades),
            c(Rank::Two, Suit::Clubs),
            c(Rank::Seven, Suit::Hearts),
            c(Rank::Nine, Suit::Diamonds),
        ];
        let mut shuffled = ordered.clone();
        shuffled.reverse();
        assert_eq!(
            Evaluation::compare(&evaluate(&ordered), &evaluate(&shuffled)),
            0
        );
    }
}
