//! Tournament data models for Swiss and elimination play.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adjudicator::DrawReason;

/// Tournament ID type
pub type TournamentId = i64;
/// Participant ID type
pub type ParticipantId = i64;
/// Round ID type
pub type RoundId = i64;
/// Match ID type
pub type MatchId = i64;

/// Points are tracked in half-point units so the tiebreak chain compares
/// exactly: a win is 2, a draw 1, a loss 0.
pub type HalfPoints = u32;

pub const WIN_HALF_POINTS: HalfPoints = 2;
pub const DRAW_HALF_POINTS: HalfPoints = 1;

/// Tournament lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TournamentLifecycle {
    /// Announced, registration not yet open
    Upcoming,
    /// Accepting registrations
    RegistrationOpen,
    /// Rounds being played
    InProgress,
    /// Suspended by an operator; heartbeat skips it
    Paused,
    /// All rounds complete
    Completed,
    /// Cancelled
    Cancelled,
}

/// Which phase the tournament is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TournamentPhase {
    Swiss,
    Elimination,
}

/// Phase configuration fixed at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatConfig {
    /// Number of Swiss rounds before the cut.
    pub swiss_rounds: u32,
    /// Bracket size for the elimination phase, if any. Must be a power of
    /// two that the field can fill.
    pub elimination_size: Option<u32>,
    /// Two participants may not meet again within this many rounds unless
    /// no alternative pairing exists.
    pub pairing_lookback: u32,
}

impl FormatConfig {
    /// Swiss-only event; the lookback spans the whole event.
    pub fn swiss_only(swiss_rounds: u32) -> Self {
        Self {
            swiss_rounds,
            elimination_size: None,
            pairing_lookback: swiss_rounds,
        }
    }

    /// Swiss phase followed by a top-K single-elimination bracket.
    pub fn with_elimination(swiss_rounds: u32, bracket_size: u32) -> Self {
        Self {
            swiss_rounds,
            elimination_size: Some(bracket_size),
            pairing_lookback: swiss_rounds,
        }
    }
}

/// Tournament record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub format: FormatConfig,
    pub lifecycle: TournamentLifecycle,
    pub phase: TournamentPhase,
    /// Number of the round currently awaiting results; 0 before the first
    /// round is generated.
    pub current_round: u32,
}

/// Tournament participant.
///
/// Immutable once paired into a round, except for withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    /// Initial seed, 1 is strongest. Final deterministic tiebreak.
    pub seed: u32,
    pub withdrawn: bool,
}

/// Round kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundKind {
    Swiss,
    Elimination,
    ThirdPlace,
    Final,
}

impl RoundKind {
    pub fn is_elimination_phase(self) -> bool {
        !matches!(self, Self::Swiss)
    }
}

/// A round of play. Complete iff every non-bye match has a final result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub tournament_id: TournamentId,
    pub number: u32,
    pub kind: RoundKind,
}

/// A bracket slot not yet bound to a concrete participant.
///
/// `requires_top_k > 0` marks a standings cut: the slot resolves to the
/// participant ranked `bracket_position` among the top K once
/// `determined_by_round` is complete. `requires_top_k == 0` marks an
/// advancement slot: it resolves to the winner (or, in a third-place
/// match, the loser) of the `bracket_position`-th match of
/// `determined_by_round`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placeholder {
    pub requires_top_k: u32,
    pub determined_by_round: RoundId,
    /// 1-based seed rank or source-match index, see above.
    pub bracket_position: u32,
}

/// One side of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchSlot {
    Resolved(ParticipantId),
    Placeholder(Placeholder),
    /// The unused side of a bye match.
    Empty,
}

impl MatchSlot {
    pub fn participant(&self) -> Option<ParticipantId> {
        match self {
            Self::Resolved(id) => Some(*id),
            _ => None,
        }
    }
}

/// Final outcome of a match. Immutable once recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchResult {
    /// One side won over the board.
    Decisive { winner: ParticipantId },
    /// Drawn, with the adjudicated or agreed reason.
    Draw { reason: DrawReason },
    /// One side failed to appear; the other side wins.
    Forfeit { absentee: ParticipantId },
    /// Neither side appeared.
    DoubleForfeit,
}

impl MatchResult {
    pub fn is_draw(&self) -> bool {
        matches!(self, Self::Draw { .. })
    }
}

/// A match between two participant slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub round_id: RoundId,
    /// White's slot first, black's second. Side assignment is decided at
    /// pairing time.
    pub slots: [MatchSlot; 2],
    pub bye: bool,
    /// Confirmed start time from schedule negotiation.
    pub scheduled_start: Option<DateTime<Utc>>,
    /// End of the round's play window.
    pub deadline: Option<DateTime<Utc>>,
    /// Idempotency guard for the "starting soon" notification.
    pub warning_sent: bool,
    /// Created by the engine rather than an operator.
    pub auto_generated: bool,
    pub result: Option<MatchResult>,
}

impl Match {
    /// Both participant ids, if both slots are resolved. `None` for byes
    /// and unresolved placeholders.
    pub fn participants(&self) -> Option<(ParticipantId, ParticipantId)> {
        match (self.slots[0].participant(), self.slots[1].participant()) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        }
    }

    pub fn has_participant(&self, id: ParticipantId) -> bool {
        self.slots.iter().any(|s| s.participant() == Some(id))
    }

    pub fn opponent_of(&self, id: ParticipantId) -> Option<ParticipantId> {
        let (a, b) = self.participants()?;
        if a == id {
            Some(b)
        } else if b == id {
            Some(a)
        } else {
            None
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.result.is_some()
    }

    pub fn has_placeholder(&self) -> bool {
        self.slots
            .iter()
            .any(|s| matches!(s, MatchSlot::Placeholder(_)))
    }

    /// The winner, if the result names one. Forfeits award the present
    /// side; draws and double forfeits have no winner.
    pub fn winner(&self) -> Option<ParticipantId> {
        match self.result? {
            MatchResult::Decisive { winner } => Some(winner),
            MatchResult::Forfeit { absentee } => self.opponent_of(absentee),
            MatchResult::Draw { .. } | MatchResult::DoubleForfeit => None,
        }
    }

    /// The loser of a decisive or forfeited match.
    pub fn loser(&self) -> Option<ParticipantId> {
        match self.result? {
            MatchResult::Decisive { winner } => self.opponent_of(winner),
            MatchResult::Forfeit { absentee } => Some(absentee),
            MatchResult::Draw { .. } | MatchResult::DoubleForfeit => None,
        }
    }
}

/// A freshly generated match, before the store assigns it an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMatch {
    pub slots: [MatchSlot; 2],
    pub bye: bool,
    pub deadline: Option<DateTime<Utc>>,
    pub auto_generated: bool,
    /// Pre-recorded result; byes are born decided.
    pub result: Option<MatchResult>,
}

impl NewMatch {
    pub fn pairing(white: ParticipantId, black: ParticipantId, deadline: DateTime<Utc>) -> Self {
        Self {
            slots: [MatchSlot::Resolved(white), MatchSlot::Resolved(black)],
            bye: false,
            deadline: Some(deadline),
            auto_generated: true,
            result: None,
        }
    }

    pub fn bye(participant: ParticipantId) -> Self {
        Self {
            slots: [MatchSlot::Resolved(participant), MatchSlot::Empty],
            bye: true,
            deadline: None,
            auto_generated: true,
            result: Some(MatchResult::Decisive {
                winner: participant,
            }),
        }
    }

    pub fn placeholder(slots: [MatchSlot; 2], deadline: Option<DateTime<Utc>>) -> Self {
        Self {
            slots,
            bye: false,
            deadline,
            auto_generated: true,
            result: None,
        }
    }
}

/// Whether a set of matches completes its round: every non-bye match has
/// a final result.
pub fn round_complete(matches: &[Match]) -> bool {
    matches.iter().all(|m| m.bye || m.is_resolved())
}

/// A participant's row in the standings table.
///
/// Points and Buchholz are in half-point units; Sonnenborn-Berger is in
/// quarter-point units so that "half of a drawn opponent's points" stays
/// integral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub tournament_id: TournamentId,
    pub participant_id: ParticipantId,
    pub points: HalfPoints,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub buchholz: HalfPoints,
    pub sonnenborn_berger: u32,
    pub rank: u32,
}

impl Standing {
    pub fn points_f64(&self) -> f64 {
        f64::from(self.points) / 2.0
    }

    pub fn buchholz_f64(&self) -> f64 {
        f64::from(self.buchholz) / 2.0
    }

    pub fn sonnenborn_berger_f64(&self) -> f64 {
        f64::from(self.sonnenborn_berger) / 4.0
    }
}
