//! Tournament orchestration: data model, standings, pairing, brackets,
//! and round progression.
//!
//! The pure engines ([`standings`], [`pairing`], [`bracket`]) are plain
//! functions over in-memory data; [`progression`] drives them against
//! the store and owns every phase transition.

pub mod bracket;
pub mod models;
pub mod pairing;
pub mod progression;
pub mod standings;

pub use bracket::{BracketError, BracketResult, ResolutionSnapshot};
pub use models::{
    FormatConfig, HalfPoints, Match, MatchId, MatchResult, MatchSlot, NewMatch, Participant,
    ParticipantId, Placeholder, Round, RoundId, RoundKind, Standing, Tournament, TournamentId,
    TournamentLifecycle, TournamentPhase,
};
pub use pairing::{PairingError, PairingHistory, PairingResult, RoundPairings};
pub use progression::{
    Progression, ProgressionError, ProgressionResult, RoundProgressionCoordinator,
};
pub use standings::{StandingsError, StandingsResult};
