//! Property-based tests for standings computation.
//!
//! Verifies the bookkeeping laws over arbitrary result sets: no point
//! leaks or duplication, fully deterministic ordering, and dense ranks.

use chess_championship::adjudicator::DrawReason;
use chess_championship::config::DoubleForfeitScoring;
use chess_championship::tournament::models::{
    Match, MatchResult, MatchSlot, Participant, Standing,
};
use chess_championship::tournament::standings;
use proptest::prelude::*;

fn participants(n: usize) -> Vec<Participant> {
    (1..=n as i64)
        .map(|id| Participant {
            id,
            seed: id as u32,
            withdrawn: false,
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
enum ResultShape {
    WinFirst,
    WinSecond,
    Draw,
    ForfeitFirst,
    ForfeitSecond,
    DoubleForfeit,
    Bye,
}

fn result_shape_strategy() -> impl Strategy<Value = ResultShape> {
    prop_oneof![
        Just(ResultShape::WinFirst),
        Just(ResultShape::WinSecond),
        Just(ResultShape::Draw),
        Just(ResultShape::ForfeitFirst),
        Just(ResultShape::ForfeitSecond),
        Just(ResultShape::DoubleForfeit),
        Just(ResultShape::Bye),
    ]
}

/// Random completed matches over a field of `n` participants.
fn matches_strategy(n: usize) -> impl Strategy<Value = Vec<Match>> {
    prop::collection::vec(
        (0..n, 0..n, result_shape_strategy()),
        0..40,
    )
    .prop_map(move |raw| {
        raw.into_iter()
            .enumerate()
            .filter(|(_, (a, b, shape))| a != b || matches!(shape, ResultShape::Bye))
            .map(|(i, (a, b, shape))| {
                let a = (a + 1) as i64;
                let b = (b + 1) as i64;
                let (slots, bye, result) = match shape {
                    ResultShape::Bye => (
                        [MatchSlot::Resolved(a), MatchSlot::Empty],
                        true,
                        MatchResult::Decisive { winner: a },
                    ),
                    ResultShape::WinFirst => (
                        [MatchSlot::Resolved(a), MatchSlot::Resolved(b)],
                        false,
                        MatchResult::Decisive { winner: a },
                    ),
                    ResultShape::WinSecond => (
                        [MatchSlot::Resolved(a), MatchSlot::Resolved(b)],
                        false,
                        MatchResult::Decisive { winner: b },
                    ),
                    ResultShape::Draw => (
                        [MatchSlot::Resolved(a), MatchSlot::Resolved(b)],
                        false,
                        MatchResult::Draw {
                            reason: DrawReason::Agreement,
                        },
                    ),
                    ResultShape::ForfeitFirst => (
                        [MatchSlot::Resolved(a), MatchSlot::Resolved(b)],
                        false,
                        MatchResult::Forfeit { absentee: a },
                    ),
                    ResultShape::ForfeitSecond => (
                        [MatchSlot::Resolved(a), MatchSlot::Resolved(b)],
                        false,
                        MatchResult::Forfeit { absentee: b },
                    ),
                    ResultShape::DoubleForfeit => (
                        [MatchSlot::Resolved(a), MatchSlot::Resolved(b)],
                        false,
                        MatchResult::DoubleForfeit,
                    ),
                };
                Match {
                    id: (i + 1) as i64,
                    round_id: 1,
                    slots,
                    bye,
                    scheduled_start: None,
                    deadline: None,
                    warning_sent: false,
                    auto_generated: true,
                    result: Some(result),
                }
            })
            .collect()
    })
}

fn expected_half_points(matches: &[Match]) -> u32 {
    matches
        .iter()
        .map(|m| match m.result {
            Some(MatchResult::DoubleForfeit) => 0,
            Some(_) => 2,
            None => 0,
        })
        .sum()
}

fn total_points(table: &[Standing]) -> u32 {
    table.iter().map(|s| s.points).sum()
}

proptest! {
    #[test]
    fn points_are_conserved(matches in matches_strategy(8)) {
        let field = participants(8);
        let table = standings::compute(1, &field, &matches, DoubleForfeitScoring::ZeroZero)
            .expect("valid inputs");
        prop_assert_eq!(total_points(&table), expected_half_points(&matches));
    }

    #[test]
    fn shared_loss_policy_conserves_points_too(matches in matches_strategy(6)) {
        let field = participants(6);
        let table = standings::compute(1, &field, &matches, DoubleForfeitScoring::SharedLoss)
            .expect("valid inputs");
        prop_assert_eq!(total_points(&table), expected_half_points(&matches));
    }

    #[test]
    fn ordering_is_deterministic_and_input_order_independent(
        matches in matches_strategy(8),
        rotation in 0usize..8,
    ) {
        let field = participants(8);
        let baseline = standings::compute(1, &field, &matches, DoubleForfeitScoring::ZeroZero)
            .expect("valid inputs");

        let mut shuffled = matches.clone();
        shuffled.reverse();
        if !shuffled.is_empty() {
            let pivot = rotation % shuffled.len();
            shuffled.rotate_left(pivot);
        }
        let reordered = standings::compute(1, &field, &shuffled, DoubleForfeitScoring::ZeroZero)
            .expect("valid inputs");

        prop_assert_eq!(baseline, reordered);
    }

    #[test]
    fn ranks_are_dense_and_unique(matches in matches_strategy(8)) {
        let field = participants(8);
        let table = standings::compute(1, &field, &matches, DoubleForfeitScoring::ZeroZero)
            .expect("valid inputs");

        prop_assert_eq!(table.len(), 8);
        let ranks: Vec<u32> = table.iter().map(|s| s.rank).collect();
        prop_assert_eq!(ranks, (1..=8).collect::<Vec<u32>>());
    }

    #[test]
    fn wins_losses_draws_balance(matches in matches_strategy(8)) {
        let field = participants(8);
        let table = standings::compute(1, &field, &matches, DoubleForfeitScoring::ZeroZero)
            .expect("valid inputs");

        let wins: u32 = table.iter().map(|s| s.wins).sum();
        let losses: u32 = table.iter().map(|s| s.losses).sum();
        let draws: u32 = table.iter().map(|s| s.draws).sum();

        let byes = matches.iter().filter(|m| m.bye).count() as u32;
        let decisive = matches
            .iter()
            .filter(|m| {
                !m.bye
                    && matches!(
                        m.result,
                        Some(MatchResult::Decisive { .. }) | Some(MatchResult::Forfeit { .. })
                    )
            })
            .count() as u32;
        let drawn = matches
            .iter()
            .filter(|m| matches!(m.result, Some(MatchResult::Draw { .. })))
            .count() as u32;

        // Every decisive match produces one win and one loss; byes
        // produce a win without a loss; draws produce two draw entries.
        prop_assert_eq!(wins, decisive + byes);
        prop_assert_eq!(losses, decisive);
        prop_assert_eq!(draws, 2 * drawn);
    }
}
