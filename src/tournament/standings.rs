//! Standings computation with deterministic tiebreak ordering.
//!
//! Standings are recomputed wholesale from the full result set after
//! every round completion, never patched incrementally. The tiebreak
//! chain is: points, Buchholz, Sonnenborn-Berger, head-to-head (two-way
//! ties only), initial seed. The seed step makes the ordering a total
//! order, so identical inputs always produce identical tables.

use std::collections::HashMap;

use thiserror::Error;

use super::models::{
    DRAW_HALF_POINTS, HalfPoints, Match, MatchResult, Participant, ParticipantId, Standing,
    TournamentId, WIN_HALF_POINTS,
};
use crate::config::DoubleForfeitScoring;

/// Standings errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StandingsError {
    /// A result references a participant that is not registered. Fatal:
    /// round progression is blocked until the data is corrected.
    #[error("result references unknown participant {0}")]
    UnknownParticipant(ParticipantId),

    /// A result names a winner or absentee that is not in the match.
    #[error("match {match_id} carries a result naming a non-member")]
    InvalidResult { match_id: i64 },
}

pub type StandingsResult<T> = Result<T, StandingsError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Won,
    Lost,
    Drew,
}

#[derive(Debug, Default)]
struct Tally {
    points: HalfPoints,
    wins: u32,
    losses: u32,
    draws: u32,
    /// Opponents actually faced, with the holder's outcome. Byes have no
    /// opponent and therefore never appear here, which keeps bye points
    /// out of everyone's Buchholz and Sonnenborn-Berger sums.
    opponents: Vec<(ParticipantId, Outcome)>,
}

/// Compute the full standings table for a tournament.
///
/// `matches` is every match generated so far; unresolved ones are
/// ignored. Byes count as a full win for the recipient but contribute to
/// no tiebreak sum.
///
/// # Errors
///
/// [`StandingsError::UnknownParticipant`] if a resolved match references
/// a participant id missing from `participants`.
pub fn compute(
    tournament_id: TournamentId,
    participants: &[Participant],
    matches: &[Match],
    double_forfeit: DoubleForfeitScoring,
) -> StandingsResult<Vec<Standing>> {
    let seeds: HashMap<ParticipantId, u32> =
        participants.iter().map(|p| (p.id, p.seed)).collect();

    let mut tallies: HashMap<ParticipantId, Tally> = participants
        .iter()
        .map(|p| (p.id, Tally::default()))
        .collect();

    for m in matches {
        let Some(result) = m.result else { continue };

        if m.bye {
            let Some(recipient) = m.slots[0].participant() else {
                return Err(StandingsError::InvalidResult { match_id: m.id });
            };
            let tally = tallies
                .get_mut(&recipient)
                .ok_or(StandingsError::UnknownParticipant(recipient))?;
            tally.points += WIN_HALF_POINTS;
            tally.wins += 1;
            continue;
        }

        let Some((a, b)) = m.participants() else {
            return Err(StandingsError::InvalidResult { match_id: m.id });
        };
        for id in [a, b] {
            if !seeds.contains_key(&id) {
                return Err(StandingsError::UnknownParticipant(id));
            }
        }

        match result {
            MatchResult::Decisive { winner } => {
                let loser = m
                    .opponent_of(winner)
                    .ok_or(StandingsError::InvalidResult { match_id: m.id })?;
                score_decisive(&mut tallies, winner, loser);
            }
            MatchResult::Forfeit { absentee } => {
                let winner = m
                    .opponent_of(absentee)
                    .ok_or(StandingsError::InvalidResult { match_id: m.id })?;
                score_decisive(&mut tallies, winner, absentee);
            }
            MatchResult::Draw { .. } => {
                for (me, them) in [(a, b), (b, a)] {
                    let tally = tallies.get_mut(&me).expect("validated above");
                    tally.points += DRAW_HALF_POINTS;
                    tally.draws += 1;
                    tally.opponents.push((them, Outcome::Drew));
                }
            }
            MatchResult::DoubleForfeit => match double_forfeit {
                // Treated as unplayed: no points, no record, no sums.
                DoubleForfeitScoring::ZeroZero => {}
                DoubleForfeitScoring::SharedLoss => {
                    for (me, them) in [(a, b), (b, a)] {
                        let tally = tallies.get_mut(&me).expect("validated above");
                        tally.losses += 1;
                        tally.opponents.push((them, Outcome::Lost));
                    }
                }
            },
        }
    }

    let final_points: HashMap<ParticipantId, HalfPoints> =
        tallies.iter().map(|(id, t)| (*id, t.points)).collect();

    let mut standings: Vec<Standing> = participants
        .iter()
        .map(|p| {
            let tally = &tallies[&p.id];
            let buchholz = tally
                .opponents
                .iter()
                .map(|(opp, _)| final_points[opp])
                .sum();
            // Quarter-point units: a beaten opponent contributes their
            // full points, a drawn opponent half.
            let sonnenborn_berger = tally
                .opponents
                .iter()
                .map(|(opp, outcome)| match outcome {
                    Outcome::Won => 2 * final_points[opp],
                    Outcome::Drew => final_points[opp],
                    Outcome::Lost => 0,
                })
                .sum();
            Standing {
                tournament_id,
                participant_id: p.id,
                points: tally.points,
                wins: tally.wins,
                losses: tally.losses,
                draws: tally.draws,
                buchholz,
                sonnenborn_berger,
                rank: 0,
            }
        })
        .collect();

    standings.sort_by(|x, y| {
        y.points
            .cmp(&x.points)
            .then(y.buchholz.cmp(&x.buchholz))
            .then(y.sonnenborn_berger.cmp(&x.sonnenborn_berger))
            .then(seeds[&x.participant_id].cmp(&seeds[&y.participant_id]))
    });

    apply_head_to_head(&mut standings, matches);

    for (i, standing) in standings.iter_mut().enumerate() {
        standing.rank = (i + 1) as u32;
    }

    Ok(standings)
}

fn score_decisive(
    tallies: &mut HashMap<ParticipantId, Tally>,
    winner: ParticipantId,
    loser: ParticipantId,
) {
    let tally = tallies.get_mut(&winner).expect("validated above");
    tally.points += WIN_HALF_POINTS;
    tally.wins += 1;
    tally.opponents.push((loser, Outcome::Won));

    let tally = tallies.get_mut(&loser).expect("validated above");
    tally.losses += 1;
    tally.opponents.push((winner, Outcome::Lost));
}

/// Reorder exact two-way ties by their mutual result, when they met and
/// one of them won the meeting. Larger tie groups fall through to the
/// seed order already in place.
fn apply_head_to_head(standings: &mut [Standing], matches: &[Match]) {
    let mut i = 0;
    while i < standings.len() {
        let tie_key = |s: &Standing| (s.points, s.buchholz, s.sonnenborn_berger);
        let mut j = i + 1;
        while j < standings.len() && tie_key(&standings[j]) == tie_key(&standings[i]) {
            j += 1;
        }
        if j - i == 2 {
            let upper = standings[i].participant_id;
            let lower = standings[i + 1].participant_id;
            let mut upper_wins = 0i32;
            let mut lower_wins = 0i32;
            for m in matches {
                if m.bye || !m.has_participant(upper) || !m.has_participant(lower) {
                    continue;
                }
                match m.winner() {
                    Some(w) if w == upper => upper_wins += 1,
                    Some(w) if w == lower => lower_wins += 1,
                    _ => {}
                }
            }
            if lower_wins > upper_wins {
                standings.swap(i, i + 1);
            }
        }
        i = j;
    }
}
