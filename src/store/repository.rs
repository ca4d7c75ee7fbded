//! Repository trait definitions for testability and dependency injection.
//!
//! The coordinators talk to storage exclusively through these traits,
//! enabling the in-memory backend for tests and embedding alongside the
//! PostgreSQL backend for production.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::StoreResult;
use crate::scheduling::models::{ProposalStatus, ScheduleProposal};
use crate::tournament::models::{
    FormatConfig, Match, MatchId, MatchResult, MatchSlot, NewMatch, Participant, ParticipantId,
    Round, RoundId, RoundKind, Standing, Tournament, TournamentId, TournamentLifecycle,
    TournamentPhase,
};

/// Trait for tournament, participant, and standings operations
#[async_trait]
pub trait TournamentRepository: Send + Sync {
    /// Create a tournament in the `Upcoming` lifecycle state.
    async fn insert_tournament(
        &self,
        name: &str,
        format: &FormatConfig,
    ) -> StoreResult<TournamentId>;

    async fn tournament(&self, id: TournamentId) -> StoreResult<Option<Tournament>>;

    async fn set_lifecycle(
        &self,
        id: TournamentId,
        lifecycle: TournamentLifecycle,
    ) -> StoreResult<()>;

    /// Update the phase and current-round pointer together.
    async fn set_phase(
        &self,
        id: TournamentId,
        phase: TournamentPhase,
        current_round: u32,
    ) -> StoreResult<()>;

    /// Tournaments whose rounds and matches the heartbeat should scan.
    async fn in_progress_tournaments(&self) -> StoreResult<Vec<Tournament>>;

    async fn insert_participant(
        &self,
        tournament_id: TournamentId,
        seed: u32,
    ) -> StoreResult<ParticipantId>;

    async fn participants(&self, tournament_id: TournamentId) -> StoreResult<Vec<Participant>>;

    async fn set_withdrawn(
        &self,
        tournament_id: TournamentId,
        participant_id: ParticipantId,
    ) -> StoreResult<()>;

    /// Atomic claim-for-advancement primitive. At most one caller per
    /// tournament holds the claim at a time; a second claim while the
    /// first is outstanding returns `false`. `round` must match the
    /// tournament's current round pointer, so a claimant that lost the
    /// race and retries against advanced state also gets `false`.
    async fn claim_advancement(&self, id: TournamentId, round: u32) -> StoreResult<bool>;

    async fn release_advancement(&self, id: TournamentId) -> StoreResult<()>;

    /// Replace the standings table wholesale.
    async fn replace_standings(
        &self,
        id: TournamentId,
        standings: &[Standing],
    ) -> StoreResult<()>;

    async fn standings(&self, id: TournamentId) -> StoreResult<Vec<Standing>>;
}

/// Trait for round and match operations
#[async_trait]
pub trait MatchRepository: Send + Sync {
    /// Insert a round and all of its matches atomically. No round is
    /// half-created: on error nothing is persisted.
    async fn insert_round(
        &self,
        tournament_id: TournamentId,
        number: u32,
        kind: RoundKind,
        matches: Vec<NewMatch>,
    ) -> StoreResult<RoundId>;

    /// Rounds of a tournament, ordered by number.
    async fn rounds(&self, tournament_id: TournamentId) -> StoreResult<Vec<Round>>;

    async fn round(&self, id: RoundId) -> StoreResult<Option<Round>>;

    /// Matches of a round, in creation order.
    async fn round_matches(&self, round_id: RoundId) -> StoreResult<Vec<Match>>;

    async fn match_by_id(&self, id: MatchId) -> StoreResult<Option<Match>>;

    /// First-writer-wins result recording. Returns `false` if a result
    /// was already present; the stored result is never overwritten.
    async fn record_result(&self, id: MatchId, result: &MatchResult) -> StoreResult<bool>;

    async fn set_schedule(&self, id: MatchId, start: DateTime<Utc>) -> StoreResult<()>;

    /// Set the play-window deadline, assigned when a placeholder match
    /// becomes concrete.
    async fn set_deadline(&self, id: MatchId, deadline: DateTime<Utc>) -> StoreResult<()>;

    /// Set the warning flag. Returns `false` if it was already set, so
    /// concurrent ticks send at most one warning.
    async fn mark_warning_sent(&self, id: MatchId) -> StoreResult<bool>;

    /// Overwrite a match's slots (placeholder resolution).
    async fn set_slots(&self, id: MatchId, slots: &[MatchSlot; 2]) -> StoreResult<()>;

    /// All matches of a tournament without a final result.
    async fn unresolved_matches(&self, tournament_id: TournamentId) -> StoreResult<Vec<Match>>;

    /// Whether the participant already has a confirmed, unplayed match
    /// scheduled within `window` of `start`.
    async fn confirmed_overlap(
        &self,
        participant: ParticipantId,
        start: DateTime<Utc>,
        window: Duration,
    ) -> StoreResult<bool>;
}

/// Trait for schedule proposal operations
#[async_trait]
pub trait ProposalRepository: Send + Sync {
    async fn insert_proposal(&self, proposal: &ScheduleProposal) -> StoreResult<()>;

    async fn proposal(&self, id: Uuid) -> StoreResult<Option<ScheduleProposal>>;

    /// The pending proposal for a match, if any. Per-match serialization
    /// guarantees at most one.
    async fn pending_proposal(&self, match_id: MatchId)
    -> StoreResult<Option<ScheduleProposal>>;

    /// Optimistic status transition. Returns `false` when the stored
    /// status no longer matches `expected`; the caller surfaces that as
    /// a state conflict.
    async fn transition_status(
        &self,
        id: Uuid,
        expected: ProposalStatus,
        next: ProposalStatus,
    ) -> StoreResult<bool>;

    /// Attach an alternative time while transitioning
    /// `Proposed -> AlternativeProposed`. Optimistic like
    /// [`Self::transition_status`].
    async fn set_alternative(
        &self,
        id: Uuid,
        alternative: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Pending proposals whose effective time has already passed.
    async fn stale_pending_proposals(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<ScheduleProposal>>;
}

/// Everything the engine needs from storage, in one object-safe bound.
pub trait ChampionshipStore:
    TournamentRepository + MatchRepository + ProposalRepository
{
}

impl<T: TournamentRepository + MatchRepository + ProposalRepository> ChampionshipStore for T {}
