//! Round and phase progression.
//!
//! The top-level driver: detects round completion, recomputes standings,
//! generates the next Swiss round or the elimination bracket, resolves
//! bracket placeholders, and decides when the tournament is over.
//! `evaluate` is idempotent and guarded by the store's atomic
//! advancement claim, so concurrent heartbeat ticks agree on a single
//! winner and the losers observe the advanced state.

use std::sync::Arc;
use thiserror::Error;

use super::bracket::{self, BracketError};
use super::models::{
    Match, MatchId, MatchResult, NewMatch, Participant, Round, RoundKind, Standing, Tournament,
    TournamentId, TournamentLifecycle, TournamentPhase, round_complete,
};
use super::pairing::{self, PairingError, PairingHistory};
use super::standings::{self, StandingsError};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::notify::{EngineEvent, Notifier};
use crate::presence::PresenceProvider;
use crate::store::{ChampionshipStore, StoreError};

/// Progression errors
#[derive(Debug, Error)]
pub enum ProgressionError {
    #[error("tournament {0} not found")]
    TournamentNotFound(TournamentId),

    #[error("match {0} not found")]
    MatchNotFound(MatchId),

    /// The match is a bye or still has placeholder slots.
    #[error("match {0} cannot take a result")]
    MatchNotPlayable(MatchId),

    /// The reported result names a participant not in the match.
    #[error("result for match {0} names a non-member")]
    InvalidResult(MatchId),

    #[error("tournament not in correct state: expected {expected:?}, got {actual:?}")]
    InvalidLifecycle {
        expected: TournamentLifecycle,
        actual: TournamentLifecycle,
    },

    #[error("insufficient participants: need {needed}, have {current}")]
    InsufficientParticipants { needed: usize, current: usize },

    #[error("invalid format: {0}")]
    InvalidFormat(&'static str),

    #[error(transparent)]
    Standings(#[from] StandingsError),

    #[error(transparent)]
    Pairing(#[from] PairingError),

    #[error(transparent)]
    Bracket(#[from] BracketError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type ProgressionResult<T> = Result<T, ProgressionError>;

/// Outcome of one `evaluate` pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progression {
    /// The current round still has open matches.
    NotReady,
    /// Another worker holds the advancement claim, or the state moved on
    /// under us. The observer no-ops.
    Contended,
    /// The tournament is not in progress (paused, finished, or not yet
    /// started); the tick skips it.
    Skipped,
    /// A new round is live.
    Advanced { round: u32 },
    Finished,
}

/// Orchestrates transitions between rounds and phases.
pub struct RoundProgressionCoordinator {
    store: Arc<dyn ChampionshipStore>,
    notifier: Arc<dyn Notifier>,
    presence: Arc<dyn PresenceProvider>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl RoundProgressionCoordinator {
    pub fn new(
        store: Arc<dyn ChampionshipStore>,
        notifier: Arc<dyn Notifier>,
        presence: Arc<dyn PresenceProvider>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            presence,
            clock,
            config,
        }
    }

    /// Create a tournament in the `Upcoming` state.
    pub async fn create_tournament(
        &self,
        name: &str,
        format: &super::models::FormatConfig,
    ) -> ProgressionResult<TournamentId> {
        let id = self.store.insert_tournament(name, format).await?;
        log::info!("created tournament {id} '{name}'");
        Ok(id)
    }

    /// Open registration.
    pub async fn open_registration(&self, id: TournamentId) -> ProgressionResult<()> {
        let t = self.tournament(id).await?;
        self.expect_lifecycle(&t, TournamentLifecycle::Upcoming)?;
        self.store
            .set_lifecycle(id, TournamentLifecycle::RegistrationOpen)
            .await?;
        Ok(())
    }

    /// Register a participant with their initial seed.
    pub async fn register_participant(
        &self,
        id: TournamentId,
        seed: u32,
    ) -> ProgressionResult<super::models::ParticipantId> {
        let t = self.tournament(id).await?;
        self.expect_lifecycle(&t, TournamentLifecycle::RegistrationOpen)?;
        Ok(self.store.insert_participant(id, seed).await?)
    }

    /// Close registration, validate the format against the field, and
    /// generate the first round.
    pub async fn start_tournament(&self, id: TournamentId) -> ProgressionResult<Progression> {
        let t = self.tournament(id).await?;
        self.expect_lifecycle(&t, TournamentLifecycle::RegistrationOpen)?;

        if t.format.swiss_rounds == 0 {
            return Err(ProgressionError::InvalidFormat(
                "at least one swiss round is required",
            ));
        }
        let participants = self.store.participants(id).await?;
        let field = participants.iter().filter(|p| !p.withdrawn).count();
        if field < 2 {
            return Err(ProgressionError::InsufficientParticipants {
                needed: 2,
                current: field,
            });
        }
        if let Some(k) = t.format.elimination_size {
            bracket::validate_bracket_size(k, field)?;
        }

        self.store
            .set_lifecycle(id, TournamentLifecycle::InProgress)
            .await?;
        log::info!("tournament {id} started with {field} participants");
        self.evaluate(id).await
    }

    /// Withdraw a participant. Future rounds pair around them; already
    /// scheduled matches run their course (or time out).
    pub async fn withdraw_participant(
        &self,
        id: TournamentId,
        participant: super::models::ParticipantId,
    ) -> ProgressionResult<()> {
        self.store.set_withdrawn(id, participant).await?;
        log::info!("tournament {id}: participant {participant} withdrew");
        Ok(())
    }

    /// Operator override: suspend heartbeat evaluation for a tournament.
    /// In-flight schedule negotiations stay valid.
    pub async fn pause_tournament(&self, id: TournamentId) -> ProgressionResult<()> {
        let t = self.tournament(id).await?;
        self.expect_lifecycle(&t, TournamentLifecycle::InProgress)?;
        self.store
            .set_lifecycle(id, TournamentLifecycle::Paused)
            .await?;
        log::info!("tournament {id} paused");
        Ok(())
    }

    /// Operator override: resume a paused tournament.
    pub async fn resume_tournament(&self, id: TournamentId) -> ProgressionResult<()> {
        let t = self.tournament(id).await?;
        self.expect_lifecycle(&t, TournamentLifecycle::Paused)?;
        self.store
            .set_lifecycle(id, TournamentLifecycle::InProgress)
            .await?;
        log::info!("tournament {id} resumed");
        Ok(())
    }

    /// Record a game result reported by the live-play engine.
    ///
    /// Returns `false` when the match already had a result; the stored
    /// result is immutable and the duplicate report is treated as
    /// success.
    pub async fn report_result(
        &self,
        match_id: MatchId,
        result: MatchResult,
    ) -> ProgressionResult<bool> {
        let m = self
            .store
            .match_by_id(match_id)
            .await?
            .ok_or(ProgressionError::MatchNotFound(match_id))?;
        if m.bye || m.participants().is_none() {
            return Err(ProgressionError::MatchNotPlayable(match_id));
        }
        let member = |p| m.has_participant(p);
        let valid = match result {
            MatchResult::Decisive { winner } => member(winner),
            MatchResult::Forfeit { absentee } => member(absentee),
            MatchResult::Draw { .. } | MatchResult::DoubleForfeit => true,
        };
        if !valid {
            return Err(ProgressionError::InvalidResult(match_id));
        }
        let recorded = self.store.record_result(match_id, &result).await?;
        if recorded {
            log::info!("match {match_id}: result recorded ({result:?})");
        }
        Ok(recorded)
    }

    /// Check the tournament for an actionable transition and perform it.
    ///
    /// Idempotent: a tournament with open matches, a paused tournament,
    /// or a lost advancement claim all leave state untouched.
    pub async fn evaluate(&self, id: TournamentId) -> ProgressionResult<Progression> {
        let t = self.tournament(id).await?;
        if t.lifecycle != TournamentLifecycle::InProgress {
            return Ok(Progression::Skipped);
        }

        let rounds = self.load_rounds(id).await?;
        let pending = rounds.iter().find(|(_, ms)| !round_complete(ms));

        // Cheap pre-checks before taking the claim.
        if let Some((_, matches)) = pending
            && !matches.iter().any(Match::has_placeholder)
        {
            return Ok(Progression::NotReady);
        }

        if !self.store.claim_advancement(id, t.current_round).await? {
            return Ok(Progression::Contended);
        }
        let outcome = self.advance_locked(&t, rounds).await;
        self.store.release_advancement(id).await?;
        outcome
    }

    /// Administrative override: score every open match of the pending
    /// round as a forfeit (by presence; with nobody clearly present, a
    /// double forfeit) and advance.
    pub async fn force_evaluate(&self, id: TournamentId) -> ProgressionResult<Progression> {
        let t = self.tournament(id).await?;
        if t.lifecycle != TournamentLifecycle::InProgress {
            return Ok(Progression::Skipped);
        }

        let rounds = self.load_rounds(id).await?;
        if let Some((round, matches)) = rounds.iter().find(|(_, ms)| !round_complete(ms)) {
            for m in matches {
                if m.bye || m.is_resolved() {
                    continue;
                }
                let Some((a, b)) = m.participants() else {
                    continue;
                };
                let a_present = self.presence.is_online(a).await;
                let b_present = self.presence.is_online(b).await;
                let result = match (a_present, b_present) {
                    (true, false) => MatchResult::Forfeit { absentee: b },
                    (false, true) => MatchResult::Forfeit { absentee: a },
                    _ => MatchResult::DoubleForfeit,
                };
                self.store.record_result(m.id, &result).await?;
                log::warn!(
                    "tournament {id}: round {} match {} force-scored as {result:?}",
                    round.number,
                    m.id
                );
            }
        }

        self.evaluate(id).await
    }

    async fn tournament(&self, id: TournamentId) -> ProgressionResult<Tournament> {
        self.store
            .tournament(id)
            .await?
            .ok_or(ProgressionError::TournamentNotFound(id))
    }

    fn expect_lifecycle(
        &self,
        t: &Tournament,
        expected: TournamentLifecycle,
    ) -> ProgressionResult<()> {
        if t.lifecycle != expected {
            return Err(ProgressionError::InvalidLifecycle {
                expected,
                actual: t.lifecycle,
            });
        }
        Ok(())
    }

    async fn load_rounds(
        &self,
        id: TournamentId,
    ) -> ProgressionResult<Vec<(Round, Vec<Match>)>> {
        let mut out = Vec::new();
        for round in self.store.rounds(id).await? {
            let matches = self.store.round_matches(round.id).await?;
            out.push((round, matches));
        }
        Ok(out)
    }

    /// The actual transition, performed while holding the advancement
    /// claim. Any error leaves previously persisted rounds untouched;
    /// round insertion itself is atomic, so no round is half-created.
    async fn advance_locked(
        &self,
        t: &Tournament,
        rounds: Vec<(Round, Vec<Match>)>,
    ) -> ProgressionResult<Progression> {
        let participants = self.store.participants(t.id).await?;

        let all_matches: Vec<Match> = rounds
            .iter()
            .flat_map(|(_, ms)| ms.iter().cloned())
            .collect();
        let standings = standings::compute(
            t.id,
            &participants,
            &all_matches,
            self.config.double_forfeit,
        )?;
        self.store.replace_standings(t.id, &standings).await?;

        if rounds.iter().any(|(_, ms)| !round_complete(ms)) {
            return self
                .resolve_placeholder_rounds(t, &rounds, &participants, &standings)
                .await;
        }

        let swiss_played = rounds
            .iter()
            .filter(|(r, _)| r.kind == RoundKind::Swiss)
            .count() as u32;

        if swiss_played < t.format.swiss_rounds {
            return self
                .generate_swiss_round(t, &rounds, &participants, &standings, swiss_played + 1)
                .await;
        }

        // The skeleton normally goes in alongside the final Swiss round;
        // this covers tournaments that predate their bracket.
        let has_bracket = rounds
            .iter()
            .any(|(r, _)| r.kind.is_elimination_phase());
        if let Some(k) = t.format.elimination_size
            && !has_bracket
        {
            let (last_round, _) = rounds.last().expect("swiss phase played");
            self.create_bracket_skeleton(t, last_round.id, last_round.number, k)
                .await?;
            let rounds = self.load_rounds(t.id).await?;
            return self
                .resolve_placeholder_rounds(t, &rounds, &participants, &standings)
                .await;
        }

        if t.format.elimination_size.is_some()
            && !rounds.iter().any(|(r, _)| r.kind == RoundKind::Final)
        {
            log::error!(
                "tournament {}: bracket skeleton is incomplete, refusing to finish; manual repair required",
                t.id
            );
            return Ok(Progression::NotReady);
        }

        self.store
            .set_lifecycle(t.id, TournamentLifecycle::Completed)
            .await?;
        for p in participants.iter().filter(|p| !p.withdrawn) {
            self.notifier
                .notify(p.id, &EngineEvent::TournamentFinished { tournament_id: t.id })
                .await;
        }
        log::info!("tournament {} finished", t.id);
        Ok(Progression::Finished)
    }

    async fn generate_swiss_round(
        &self,
        t: &Tournament,
        rounds: &[(Round, Vec<Match>)],
        participants: &[Participant],
        standings: &[Standing],
        number: u32,
    ) -> ProgressionResult<Progression> {
        let mut history = PairingHistory::new();
        for (round, matches) in rounds {
            history.record_round(round, matches);
        }

        // Round one pairs by seed; later rounds follow the standings.
        let table: &[Standing] = if rounds.is_empty() { &[] } else { standings };
        let proposed = pairing::pair_round(
            table,
            participants,
            &history,
            number,
            t.format.pairing_lookback,
        )?;

        let deadline = self.clock.now() + self.config.round_play_window();
        let mut new_matches: Vec<NewMatch> = proposed
            .pairings
            .iter()
            .map(|p| NewMatch::pairing(p.white, p.black, deadline))
            .collect();
        if let Some(recipient) = proposed.bye {
            new_matches.push(NewMatch::bye(recipient));
        }

        let round_id = self
            .store
            .insert_round(t.id, number, RoundKind::Swiss, new_matches)
            .await?;
        self.store
            .set_phase(t.id, TournamentPhase::Swiss, number)
            .await?;

        // The bracket skeleton goes in together with the last Swiss
        // round, so its placeholders are visible (and locked) while that
        // round is still being played.
        if number == t.format.swiss_rounds
            && let Some(k) = t.format.elimination_size
        {
            self.create_bracket_skeleton(t, round_id, number, k).await?;
        }

        self.notify_round(participants, t.id, number).await;
        log::info!(
            "tournament {}: swiss round {number} generated ({} pairings{})",
            t.id,
            proposed.pairings.len(),
            if proposed.bye.is_some() { ", 1 bye" } else { "" }
        );
        Ok(Progression::Advanced { round: number })
    }

    /// Create the full elimination skeleton: the seeded round of K bound
    /// to the final Swiss round, then advancement placeholders stage by
    /// stage, with a third-place round alongside the final for K >= 4.
    /// Every slot stays locked until its determining round completes.
    async fn create_bracket_skeleton(
        &self,
        t: &Tournament,
        determining_round: super::models::RoundId,
        last_number: u32,
        k: u32,
    ) -> ProgressionResult<()> {
        let mut number = last_number;
        let mut determined_by = determining_round;
        let mut slots = bracket::seeded_round_slots(k, determined_by);
        let first_number = number + 1;

        loop {
            let stage_size = slots.len();
            let kind = if stage_size == 1 {
                RoundKind::Final
            } else {
                RoundKind::Elimination
            };

            if kind == RoundKind::Final && k >= 4 {
                number += 1;
                self.store
                    .insert_round(
                        t.id,
                        number,
                        RoundKind::ThirdPlace,
                        vec![NewMatch::placeholder(
                            bracket::third_place_slots(determined_by),
                            None,
                        )],
                    )
                    .await?;
            }

            number += 1;
            let new_matches = slots
                .iter()
                .map(|s| NewMatch::placeholder(*s, None))
                .collect();
            let round_id = self
                .store
                .insert_round(t.id, number, kind, new_matches)
                .await?;

            if stage_size == 1 {
                break;
            }
            slots = bracket::advancement_round_slots(stage_size as u32, round_id);
            determined_by = round_id;
        }

        log::info!(
            "tournament {}: elimination bracket of {k} created (rounds {first_number}..{number})",
            t.id
        );
        Ok(())
    }

    /// Resolve the placeholders of every round whose determining round
    /// is complete, then point the tournament at the lowest open round.
    async fn resolve_placeholder_rounds(
        &self,
        t: &Tournament,
        rounds: &[(Round, Vec<Match>)],
        participants: &[Participant],
        standings: &[Standing],
    ) -> ProgressionResult<Progression> {
        // Withdrawn participants keep their rank in the published table
        // but give up their bracket spot; the cut re-ranks around them.
        let seeding: Vec<Standing> = {
            let withdrawn: std::collections::HashSet<_> = participants
                .iter()
                .filter(|p| p.withdrawn)
                .map(|p| p.id)
                .collect();
            standings
                .iter()
                .filter(|s| !withdrawn.contains(&s.participant_id))
                .enumerate()
                .map(|(i, s)| Standing {
                    rank: (i + 1) as u32,
                    ..s.clone()
                })
                .collect()
        };

        let mut advanced_to: Option<u32> = None;
        let deadline = self.clock.now() + self.config.round_play_window();

        for (round, matches) in rounds {
            if !matches.iter().any(Match::has_placeholder) {
                continue;
            }
            let Some(determining_id) = matches.iter().find_map(|m| {
                m.slots.iter().find_map(|s| match s {
                    super::models::MatchSlot::Placeholder(ph) => Some(ph.determined_by_round),
                    _ => None,
                })
            }) else {
                continue;
            };
            let Some((_, determining_matches)) =
                rounds.iter().find(|(r, _)| r.id == determining_id)
            else {
                continue;
            };
            if !round_complete(determining_matches) {
                continue;
            }

            let snapshot = bracket::ResolutionSnapshot {
                standings: &seeding,
                determining_matches,
            };
            let mut resolved_participants = Vec::new();
            for m in matches {
                if !m.has_placeholder() {
                    continue;
                }
                if let Some(slots) = bracket::resolve_match_slots(m, round.kind, &snapshot)? {
                    self.store.set_slots(m.id, &slots).await?;
                    self.store.set_deadline(m.id, deadline).await?;
                    resolved_participants
                        .extend(slots.iter().filter_map(|s| s.participant()));
                }
            }

            if !resolved_participants.is_empty() {
                advanced_to = Some(advanced_to.map_or(round.number, |n| n.min(round.number)));
                for p in resolved_participants {
                    self.notifier
                        .notify(
                            p,
                            &EngineEvent::RoundGenerated {
                                tournament_id: t.id,
                                round_number: round.number,
                            },
                        )
                        .await;
                }
                log::info!(
                    "tournament {}: round {} placeholders resolved",
                    t.id,
                    round.number
                );
            }
        }

        match advanced_to {
            Some(round) => {
                self.store
                    .set_phase(t.id, TournamentPhase::Elimination, round)
                    .await?;
                Ok(Progression::Advanced { round })
            }
            // Placeholders exist but stay locked behind an incomplete
            // determining round.
            None => Ok(Progression::NotReady),
        }
    }

    async fn notify_round(
        &self,
        participants: &[Participant],
        tournament_id: TournamentId,
        round_number: u32,
    ) {
        for p in participants.iter().filter(|p| !p.withdrawn) {
            self.notifier
                .notify(
                    p.id,
                    &EngineEvent::RoundGenerated {
                        tournament_id,
                        round_number,
                    },
                )
                .await;
        }
    }
}
