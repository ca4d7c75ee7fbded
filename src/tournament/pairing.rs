//! Swiss pairing.
//!
//! Greedy nearest-rank pairing over the standings order: each unpaired
//! participant, highest-ranked first, meets the nearest-ranked opponent
//! they have not already played within the lookback window. When no
//! fresh opponent remains the engine falls back to a repeat pairing
//! rather than leaving anyone unpaired.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use super::models::{Match, Participant, ParticipantId, Round, Standing};

/// Pairing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PairingError {
    /// Fewer than two active participants remain; round generation halts
    /// for manual intervention.
    #[error("no valid pairing exists for {active} active participants")]
    NoValidPairing { active: usize },
}

pub type PairingResult<T> = Result<T, PairingError>;

/// Who has played whom, who has had a bye, and everyone's side counts.
#[derive(Debug, Clone, Default)]
pub struct PairingHistory {
    /// Normalized pair to the most recent round number they met in.
    last_met: HashMap<(ParticipantId, ParticipantId), u32>,
    byes: HashSet<ParticipantId>,
    /// Participant to (white games, black games).
    sides: HashMap<ParticipantId, (u32, u32)>,
}

impl PairingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one stored round into the history. Placeholder matches are
    /// skipped; they carry no pairing information yet.
    pub fn record_round(&mut self, round: &Round, matches: &[Match]) {
        for m in matches {
            if m.bye {
                if let Some(p) = m.slots[0].participant() {
                    self.record_bye(p);
                }
            } else if let Some((white, black)) = m.participants() {
                self.record_match(round.number, white, black);
            }
        }
    }

    pub fn record_match(&mut self, round_number: u32, white: ParticipantId, black: ParticipantId) {
        let key = pair_key(white, black);
        let entry = self.last_met.entry(key).or_insert(round_number);
        *entry = (*entry).max(round_number);
        let w = self.sides.entry(white).or_default();
        w.0 += 1;
        let b = self.sides.entry(black).or_default();
        b.1 += 1;
    }

    pub fn record_bye(&mut self, participant: ParticipantId) {
        self.byes.insert(participant);
    }

    pub fn has_bye(&self, participant: ParticipantId) -> bool {
        self.byes.contains(&participant)
    }

    /// Whether the pair met within `lookback` rounds of the round being
    /// generated.
    fn met_recently(&self, a: ParticipantId, b: ParticipantId, next_round: u32, lookback: u32) -> bool {
        match self.last_met.get(&pair_key(a, b)) {
            Some(met) => next_round.saturating_sub(*met) <= lookback,
            None => false,
        }
    }

    /// White games minus black games.
    fn side_balance(&self, participant: ParticipantId) -> i64 {
        let (white, black) = self.sides.get(&participant).copied().unwrap_or((0, 0));
        i64::from(white) - i64::from(black)
    }
}

fn pair_key(a: ParticipantId, b: ParticipantId) -> (ParticipantId, ParticipantId) {
    (a.min(b), a.max(b))
}

/// One proposed pairing, sides already assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pairing {
    pub white: ParticipantId,
    pub black: ParticipantId,
    /// The pair already met within the lookback window and no
    /// alternative existed.
    pub repeat: bool,
}

/// A full round proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundPairings {
    pub pairings: Vec<Pairing>,
    pub bye: Option<ParticipantId>,
}

/// Produce the pairings for the given round.
///
/// The pairing order follows `standings` when present (rounds two and
/// up) and seed order otherwise. Withdrawn participants are skipped
/// entirely: no pairing and no bye. With an odd field the lowest-ranked
/// active participant without a prior bye sits out; when everyone has
/// had one, the lowest-ranked sits out again.
///
/// # Errors
///
/// [`PairingError::NoValidPairing`] when fewer than two active
/// participants remain.
pub fn pair_round(
    standings: &[Standing],
    participants: &[Participant],
    history: &PairingHistory,
    round_number: u32,
    lookback: u32,
) -> PairingResult<RoundPairings> {
    let active: HashSet<ParticipantId> = participants
        .iter()
        .filter(|p| !p.withdrawn)
        .map(|p| p.id)
        .collect();

    // Standings order when available, seed order for the first round.
    let mut order: Vec<ParticipantId> = if standings.is_empty() {
        let mut by_seed: Vec<&Participant> =
            participants.iter().filter(|p| !p.withdrawn).collect();
        by_seed.sort_by_key(|p| p.seed);
        by_seed.iter().map(|p| p.id).collect()
    } else {
        standings
            .iter()
            .filter(|s| active.contains(&s.participant_id))
            .map(|s| s.participant_id)
            .collect()
    };

    if order.len() < 2 {
        return Err(PairingError::NoValidPairing {
            active: order.len(),
        });
    }

    let bye = if order.len() % 2 == 1 {
        let candidate = order
            .iter()
            .rev()
            .find(|p| !history.has_bye(**p))
            .or_else(|| order.last())
            .copied()
            .expect("non-empty order");
        order.retain(|p| *p != candidate);
        Some(candidate)
    } else {
        None
    };

    let fresh = |i: usize, j: usize| {
        !history.met_recently(order[i], order[j], round_number, lookback)
    };

    let pairs = match fresh_matching(order.len(), &fresh) {
        Some(pairs) => pairs
            .into_iter()
            .map(|(i, j)| (i, j, false))
            .collect::<Vec<_>>(),
        // No repeat-free pairing exists at all; pair greedily and let the
        // stuck tail repeat rather than leaving anyone unpaired.
        None => greedy_with_repeats(order.len(), &fresh, round_number, &order),
    };

    let pairings = pairs
        .into_iter()
        .map(|(i, j, repeat)| {
            let (white, black) = assign_sides(order[i], order[j], history);
            Pairing {
                white,
                black,
                repeat,
            }
        })
        .collect();

    Ok(RoundPairings { pairings, bye })
}

/// Depth-first search for a complete pairing with no repeats, trying
/// nearest-ranked opponents first so the found matching stays close to
/// the plain greedy one. Fields are small enough that the backtracking
/// cost is irrelevant in practice.
fn fresh_matching(
    n: usize,
    fresh: &impl Fn(usize, usize) -> bool,
) -> Option<Vec<(usize, usize)>> {
    fn step(
        paired: &mut [bool],
        acc: &mut Vec<(usize, usize)>,
        fresh: &impl Fn(usize, usize) -> bool,
    ) -> bool {
        let Some(i) = paired.iter().position(|p| !p) else {
            return true;
        };
        paired[i] = true;
        for j in i + 1..paired.len() {
            if !paired[j] && fresh(i, j) {
                paired[j] = true;
                acc.push((i, j));
                if step(paired, acc, fresh) {
                    return true;
                }
                acc.pop();
                paired[j] = false;
            }
        }
        paired[i] = false;
        false
    }

    let mut paired = vec![false; n];
    let mut acc = Vec::with_capacity(n / 2);
    step(&mut paired, &mut acc, fresh).then_some(acc)
}

fn greedy_with_repeats(
    n: usize,
    fresh: &impl Fn(usize, usize) -> bool,
    round_number: u32,
    order: &[ParticipantId],
) -> Vec<(usize, usize, bool)> {
    let mut paired = vec![false; n];
    let mut pairs = Vec::with_capacity(n / 2);
    for i in 0..n {
        if paired[i] {
            continue;
        }
        paired[i] = true;
        let pick = (i + 1..n)
            .find(|j| !paired[*j] && fresh(i, *j))
            .map(|j| (j, false))
            .or_else(|| (i + 1..n).find(|j| !paired[*j]).map(|j| (j, true)));
        let Some((j, repeat)) = pick else { continue };
        if repeat {
            log::warn!(
                "round {round_number}: no fresh opponent for participant {}, repeating pairing with {}",
                order[i],
                order[j]
            );
        }
        paired[j] = true;
        pairs.push((i, j, repeat));
    }
    pairs
}

/// Balance cumulative side counts; the participant with fewer white
/// games gets white. Equal balance gives white to the higher-ranked
/// participant (`upper`).
fn assign_sides(
    upper: ParticipantId,
    lower: ParticipantId,
    history: &PairingHistory,
) -> (ParticipantId, ParticipantId) {
    let upper_balance = history.side_balance(upper);
    let lower_balance = history.side_balance(lower);
    if upper_balance > lower_balance {
        (lower, upper)
    } else {
        (upper, lower)
    }
}

/// Recommended Swiss round count for a field: `ceil(log2(n))`.
pub fn recommended_swiss_rounds(field_size: usize) -> u32 {
    if field_size <= 2 {
        1
    } else {
        (field_size - 1).ilog2() + 1
    }
}
