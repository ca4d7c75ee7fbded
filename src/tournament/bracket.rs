//! Elimination bracket construction and placeholder resolution.
//!
//! The whole bracket skeleton is created the moment the Swiss phase
//! ends: a round of K whose slots cut the final Swiss standings, then
//! one placeholder round per elimination stage down to the final, plus a
//! third-place match when the bracket is big enough. Placeholders stay
//! locked until their determining round completes; all resolution logic
//! lives in [`resolve_placeholder`].

use thiserror::Error;

use super::models::{
    Match, MatchSlot, ParticipantId, Placeholder, RoundId, RoundKind, Standing, round_complete,
};

/// Bracket errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BracketError {
    /// K is not a power of two the field can fill.
    #[error("bracket size {requested} is not achievable from {field} participants")]
    InvalidBracketSize { requested: u32, field: usize },

    /// A placeholder points at a seed rank the standings cannot supply.
    #[error("no standing at rank {position} for a top-{top_k} cut")]
    SeedOutOfRange { position: u32, top_k: u32 },

    /// A determining match produced no advancer (e.g. a double forfeit in
    /// an elimination round).
    #[error("match {match_id} has no participant to advance")]
    NoAdvancer { match_id: i64 },

    /// A placeholder references a match index missing from the
    /// determining round.
    #[error("determining round has no match at position {position}")]
    SourceMatchMissing { position: u32 },
}

pub type BracketResult<T> = Result<T, BracketError>;

/// Check that `k` is a power of two, at least 2, that the field can fill.
pub fn validate_bracket_size(k: u32, field: usize) -> BracketResult<()> {
    if k < 2 || !k.is_power_of_two() || (k as usize) > field {
        return Err(BracketError::InvalidBracketSize {
            requested: k,
            field,
        });
    }
    Ok(())
}

/// Slots for the round of K: standard seeding, rank i vs rank K+1-i.
/// Matches come out in bracket order, so pairing consecutive winners in
/// the next stage keeps the top seeds apart until the final (for K=8:
/// 1v8, 4v5, 2v7, 3v6, giving semifinals of 1v4 and 2v3). Every slot is
/// a standings-cut placeholder on `determined_by_round` (the final
/// Swiss round).
pub fn seeded_round_slots(k: u32, determined_by_round: RoundId) -> Vec<[MatchSlot; 2]> {
    bracket_seed_order(k)
        .chunks(2)
        .map(|pair| {
            [
                MatchSlot::Placeholder(Placeholder {
                    requires_top_k: k,
                    determined_by_round,
                    bracket_position: pair[0],
                }),
                MatchSlot::Placeholder(Placeholder {
                    requires_top_k: k,
                    determined_by_round,
                    bracket_position: pair[1],
                }),
            ]
        })
        .collect()
}

/// Seed sequence of a standard bracket, built by repeated mirroring:
/// [1], [1,2], [1,4,2,3], [1,8,4,5,2,7,3,6], ...
fn bracket_seed_order(k: u32) -> Vec<u32> {
    let mut order = vec![1u32];
    let mut size = 1;
    while size < k {
        size *= 2;
        order = order.iter().flat_map(|&s| [s, size + 1 - s]).collect();
    }
    order
}

/// Slots for the stage after a round with `prev_match_count` matches:
/// winners of matches 1 and 2 meet, 3 and 4 meet, and so on.
pub fn advancement_round_slots(
    prev_match_count: u32,
    determined_by_round: RoundId,
) -> Vec<[MatchSlot; 2]> {
    (0..prev_match_count / 2)
        .map(|i| {
            [
                advancement_slot(determined_by_round, 2 * i + 1),
                advancement_slot(determined_by_round, 2 * i + 2),
            ]
        })
        .collect()
}

/// Slots for the third-place match: both semifinal losers.
pub fn third_place_slots(semifinal_round: RoundId) -> [MatchSlot; 2] {
    [
        advancement_slot(semifinal_round, 1),
        advancement_slot(semifinal_round, 2),
    ]
}

fn advancement_slot(determined_by_round: RoundId, position: u32) -> MatchSlot {
    MatchSlot::Placeholder(Placeholder {
        requires_top_k: 0,
        determined_by_round,
        bracket_position: position,
    })
}

/// Everything a placeholder may resolve against.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionSnapshot<'a> {
    /// Standings as of the determining round's completion, ranked.
    pub standings: &'a [Standing],
    /// The determining round's matches, in creation order.
    pub determining_matches: &'a [Match],
}

/// Resolve a placeholder against a snapshot of its determining round.
///
/// Returns `Ok(None)` while the determining round is incomplete; the
/// slot stays locked. `take_losers` selects the losing side of the
/// source match and is set for third-place matches.
pub fn resolve_placeholder(
    placeholder: &Placeholder,
    take_losers: bool,
    snapshot: &ResolutionSnapshot<'_>,
) -> BracketResult<Option<ParticipantId>> {
    if !round_complete(snapshot.determining_matches) {
        return Ok(None);
    }

    if placeholder.requires_top_k > 0 {
        if placeholder.bracket_position > placeholder.requires_top_k {
            return Err(BracketError::SeedOutOfRange {
                position: placeholder.bracket_position,
                top_k: placeholder.requires_top_k,
            });
        }
        let standing = snapshot
            .standings
            .iter()
            .find(|s| s.rank == placeholder.bracket_position)
            .ok_or(BracketError::SeedOutOfRange {
                position: placeholder.bracket_position,
                top_k: placeholder.requires_top_k,
            })?;
        return Ok(Some(standing.participant_id));
    }

    let index = placeholder.bracket_position as usize;
    let source = snapshot
        .determining_matches
        .get(index.wrapping_sub(1))
        .ok_or(BracketError::SourceMatchMissing {
            position: placeholder.bracket_position,
        })?;
    let advancer = if take_losers {
        source.loser()
    } else {
        source.winner()
    };
    advancer
        .map(Some)
        .ok_or(BracketError::NoAdvancer { match_id: source.id })
}

/// Resolve every placeholder slot of a match. Returns `None` if any slot
/// is still locked. `kind` is the containing round's kind; third-place
/// matches advance the losers of their determining matches.
pub fn resolve_match_slots(
    m: &Match,
    kind: RoundKind,
    snapshot: &ResolutionSnapshot<'_>,
) -> BracketResult<Option<[MatchSlot; 2]>> {
    let take_losers = kind == RoundKind::ThirdPlace;
    let mut slots = m.slots;
    for slot in &mut slots {
        if let MatchSlot::Placeholder(ph) = slot {
            match resolve_placeholder(ph, take_losers, snapshot)? {
                Some(participant) => *slot = MatchSlot::Resolved(participant),
                None => return Ok(None),
            }
        }
    }
    Ok(Some(slots))
}
