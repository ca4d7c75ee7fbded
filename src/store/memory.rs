//! In-memory store backend.
//!
//! Backs the test suites and lightweight embeddings. Mutations take a
//! single process-wide mutex, which trivially satisfies the same
//! atomicity the PostgreSQL backend gets from transactions and row
//! locks.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use super::repository::{MatchRepository, ProposalRepository, TournamentRepository};
use super::{StoreError, StoreResult};
use crate::scheduling::models::{ProposalStatus, ScheduleProposal};
use crate::tournament::models::{
    FormatConfig, Match, MatchId, MatchResult, MatchSlot, NewMatch, Participant, ParticipantId,
    Round, RoundId, RoundKind, Standing, Tournament, TournamentId, TournamentLifecycle,
    TournamentPhase,
};

#[derive(Debug, Default)]
struct Inner {
    tournaments: HashMap<TournamentId, Tournament>,
    participants: HashMap<TournamentId, Vec<Participant>>,
    rounds: HashMap<RoundId, Round>,
    matches: HashMap<MatchId, Match>,
    /// Match ids per round, in creation order.
    round_order: HashMap<RoundId, Vec<MatchId>>,
    standings: HashMap<TournamentId, Vec<Standing>>,
    proposals: HashMap<Uuid, ScheduleProposal>,
    claims: HashSet<TournamentId>,
    next_tournament: TournamentId,
    next_participant: ParticipantId,
    next_round: RoundId,
    next_match: MatchId,
}

/// In-memory implementation of all repository traits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("store lock poisoned")
    }
}

fn not_found(entity: &'static str, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

#[async_trait]
impl TournamentRepository for MemoryStore {
    async fn insert_tournament(
        &self,
        name: &str,
        format: &FormatConfig,
    ) -> StoreResult<TournamentId> {
        let mut inner = self.lock();
        inner.next_tournament += 1;
        let id = inner.next_tournament;
        inner.tournaments.insert(
            id,
            Tournament {
                id,
                name: name.to_string(),
                format: format.clone(),
                lifecycle: TournamentLifecycle::Upcoming,
                phase: TournamentPhase::Swiss,
                current_round: 0,
            },
        );
        Ok(id)
    }

    async fn tournament(&self, id: TournamentId) -> StoreResult<Option<Tournament>> {
        Ok(self.lock().tournaments.get(&id).cloned())
    }

    async fn set_lifecycle(
        &self,
        id: TournamentId,
        lifecycle: TournamentLifecycle,
    ) -> StoreResult<()> {
        let mut inner = self.lock();
        let t = inner
            .tournaments
            .get_mut(&id)
            .ok_or_else(|| not_found("tournament", id))?;
        t.lifecycle = lifecycle;
        Ok(())
    }

    async fn set_phase(
        &self,
        id: TournamentId,
        phase: TournamentPhase,
        current_round: u32,
    ) -> StoreResult<()> {
        let mut inner = self.lock();
        let t = inner
            .tournaments
            .get_mut(&id)
            .ok_or_else(|| not_found("tournament", id))?;
        t.phase = phase;
        t.current_round = current_round;
        Ok(())
    }

    async fn in_progress_tournaments(&self) -> StoreResult<Vec<Tournament>> {
        let inner = self.lock();
        let mut list: Vec<Tournament> = inner
            .tournaments
            .values()
            .filter(|t| t.lifecycle == TournamentLifecycle::InProgress)
            .cloned()
            .collect();
        list.sort_by_key(|t| t.id);
        Ok(list)
    }

    async fn insert_participant(
        &self,
        tournament_id: TournamentId,
        seed: u32,
    ) -> StoreResult<ParticipantId> {
        let mut inner = self.lock();
        if !inner.tournaments.contains_key(&tournament_id) {
            return Err(not_found("tournament", tournament_id));
        }
        inner.next_participant += 1;
        let id = inner.next_participant;
        inner
            .participants
            .entry(tournament_id)
            .or_default()
            .push(Participant {
                id,
                seed,
                withdrawn: false,
            });
        Ok(id)
    }

    async fn participants(&self, tournament_id: TournamentId) -> StoreResult<Vec<Participant>> {
        Ok(self
            .lock()
            .participants
            .get(&tournament_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_withdrawn(
        &self,
        tournament_id: TournamentId,
        participant_id: ParticipantId,
    ) -> StoreResult<()> {
        let mut inner = self.lock();
        let list = inner
            .participants
            .get_mut(&tournament_id)
            .ok_or_else(|| not_found("tournament", tournament_id))?;
        let p = list
            .iter_mut()
            .find(|p| p.id == participant_id)
            .ok_or_else(|| not_found("participant", participant_id))?;
        p.withdrawn = true;
        Ok(())
    }

    async fn claim_advancement(&self, id: TournamentId, round: u32) -> StoreResult<bool> {
        let mut inner = self.lock();
        let current = inner
            .tournaments
            .get(&id)
            .ok_or_else(|| not_found("tournament", id))?
            .current_round;
        if current != round || inner.claims.contains(&id) {
            return Ok(false);
        }
        inner.claims.insert(id);
        Ok(true)
    }

    async fn release_advancement(&self, id: TournamentId) -> StoreResult<()> {
        self.lock().claims.remove(&id);
        Ok(())
    }

    async fn replace_standings(
        &self,
        id: TournamentId,
        standings: &[Standing],
    ) -> StoreResult<()> {
        self.lock().standings.insert(id, standings.to_vec());
        Ok(())
    }

    async fn standings(&self, id: TournamentId) -> StoreResult<Vec<Standing>> {
        Ok(self.lock().standings.get(&id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl MatchRepository for MemoryStore {
    async fn insert_round(
        &self,
        tournament_id: TournamentId,
        number: u32,
        kind: RoundKind,
        matches: Vec<NewMatch>,
    ) -> StoreResult<RoundId> {
        let mut inner = self.lock();
        if !inner.tournaments.contains_key(&tournament_id) {
            return Err(not_found("tournament", tournament_id));
        }
        inner.next_round += 1;
        let round_id = inner.next_round;
        inner.rounds.insert(
            round_id,
            Round {
                id: round_id,
                tournament_id,
                number,
                kind,
            },
        );
        let mut order = Vec::with_capacity(matches.len());
        for new in matches {
            inner.next_match += 1;
            let id = inner.next_match;
            inner.matches.insert(
                id,
                Match {
                    id,
                    round_id,
                    slots: new.slots,
                    bye: new.bye,
                    scheduled_start: None,
                    deadline: new.deadline,
                    warning_sent: false,
                    auto_generated: new.auto_generated,
                    result: new.result,
                },
            );
            order.push(id);
        }
        inner.round_order.insert(round_id, order);
        Ok(round_id)
    }

    async fn rounds(&self, tournament_id: TournamentId) -> StoreResult<Vec<Round>> {
        let inner = self.lock();
        let mut list: Vec<Round> = inner
            .rounds
            .values()
            .filter(|r| r.tournament_id == tournament_id)
            .cloned()
            .collect();
        list.sort_by_key(|r| r.number);
        Ok(list)
    }

    async fn round(&self, id: RoundId) -> StoreResult<Option<Round>> {
        Ok(self.lock().rounds.get(&id).cloned())
    }

    async fn round_matches(&self, round_id: RoundId) -> StoreResult<Vec<Match>> {
        let inner = self.lock();
        let order = inner.round_order.get(&round_id).cloned().unwrap_or_default();
        Ok(order
            .iter()
            .filter_map(|id| inner.matches.get(id).cloned())
            .collect())
    }

    async fn match_by_id(&self, id: MatchId) -> StoreResult<Option<Match>> {
        Ok(self.lock().matches.get(&id).cloned())
    }

    async fn record_result(&self, id: MatchId, result: &MatchResult) -> StoreResult<bool> {
        let mut inner = self.lock();
        let m = inner
            .matches
            .get_mut(&id)
            .ok_or_else(|| not_found("match", id))?;
        if m.result.is_some() {
            return Ok(false);
        }
        m.result = Some(*result);
        Ok(true)
    }

    async fn set_schedule(&self, id: MatchId, start: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.lock();
        let m = inner
            .matches
            .get_mut(&id)
            .ok_or_else(|| not_found("match", id))?;
        m.scheduled_start = Some(start);
        Ok(())
    }

    async fn set_deadline(&self, id: MatchId, deadline: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.lock();
        let m = inner
            .matches
            .get_mut(&id)
            .ok_or_else(|| not_found("match", id))?;
        m.deadline = Some(deadline);
        Ok(())
    }

    async fn mark_warning_sent(&self, id: MatchId) -> StoreResult<bool> {
        let mut inner = self.lock();
        let m = inner
            .matches
            .get_mut(&id)
            .ok_or_else(|| not_found("match", id))?;
        if m.warning_sent {
            return Ok(false);
        }
        m.warning_sent = true;
        Ok(true)
    }

    async fn set_slots(&self, id: MatchId, slots: &[MatchSlot; 2]) -> StoreResult<()> {
        let mut inner = self.lock();
        let m = inner
            .matches
            .get_mut(&id)
            .ok_or_else(|| not_found("match", id))?;
        m.slots = *slots;
        Ok(())
    }

    async fn unresolved_matches(&self, tournament_id: TournamentId) -> StoreResult<Vec<Match>> {
        let inner = self.lock();
        let mut list: Vec<Match> = inner
            .matches
            .values()
            .filter(|m| {
                m.result.is_none()
                    && inner
                        .rounds
                        .get(&m.round_id)
                        .is_some_and(|r| r.tournament_id == tournament_id)
            })
            .cloned()
            .collect();
        list.sort_by_key(|m| m.id);
        Ok(list)
    }

    async fn confirmed_overlap(
        &self,
        participant: ParticipantId,
        start: DateTime<Utc>,
        window: Duration,
    ) -> StoreResult<bool> {
        let inner = self.lock();
        Ok(inner.matches.values().any(|m| {
            m.result.is_none()
                && m.has_participant(participant)
                && m.scheduled_start
                    .is_some_and(|s| (s - start).abs() < window)
        }))
    }
}

#[async_trait]
impl ProposalRepository for MemoryStore {
    async fn insert_proposal(&self, proposal: &ScheduleProposal) -> StoreResult<()> {
        self.lock().proposals.insert(proposal.id, proposal.clone());
        Ok(())
    }

    async fn proposal(&self, id: Uuid) -> StoreResult<Option<ScheduleProposal>> {
        Ok(self.lock().proposals.get(&id).cloned())
    }

    async fn pending_proposal(
        &self,
        match_id: MatchId,
    ) -> StoreResult<Option<ScheduleProposal>> {
        Ok(self
            .lock()
            .proposals
            .values()
            .find(|p| p.match_id == match_id && p.status.is_pending())
            .cloned())
    }

    async fn transition_status(
        &self,
        id: Uuid,
        expected: ProposalStatus,
        next: ProposalStatus,
    ) -> StoreResult<bool> {
        let mut inner = self.lock();
        let p = inner
            .proposals
            .get_mut(&id)
            .ok_or_else(|| not_found("proposal", id))?;
        if p.status != expected {
            return Ok(false);
        }
        p.status = next;
        Ok(true)
    }

    async fn set_alternative(
        &self,
        id: Uuid,
        alternative: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut inner = self.lock();
        let p = inner
            .proposals
            .get_mut(&id)
            .ok_or_else(|| not_found("proposal", id))?;
        if p.status != ProposalStatus::Proposed {
            return Ok(false);
        }
        p.status = ProposalStatus::AlternativeProposed;
        p.alternative_time = Some(alternative);
        Ok(true)
    }

    async fn stale_pending_proposals(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<ScheduleProposal>> {
        Ok(self
            .lock()
            .proposals
            .values()
            .filter(|p| p.status.is_pending() && p.effective_time() < now)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn round_insertion_preserves_match_order() {
        let store = MemoryStore::new();
        let tid = store
            .insert_tournament("Open", &FormatConfig::swiss_only(3))
            .await
            .unwrap();
        let a = store.insert_participant(tid, 1).await.unwrap();
        let b = store.insert_participant(tid, 2).await.unwrap();
        let c = store.insert_participant(tid, 3).await.unwrap();

        let deadline = start_time();
        let round_id = store
            .insert_round(
                tid,
                1,
                RoundKind::Swiss,
                vec![NewMatch::pairing(a, b, deadline), NewMatch::bye(c)],
            )
            .await
            .unwrap();

        let matches = store.round_matches(round_id).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].participants(), Some((a, b)));
        assert!(matches[1].bye);
    }

    #[tokio::test]
    async fn record_result_is_first_writer_wins() {
        let store = MemoryStore::new();
        let tid = store
            .insert_tournament("Open", &FormatConfig::swiss_only(1))
            .await
            .unwrap();
        let a = store.insert_participant(tid, 1).await.unwrap();
        let b = store.insert_participant(tid, 2).await.unwrap();
        let round_id = store
            .insert_round(
                tid,
                1,
                RoundKind::Swiss,
                vec![NewMatch::pairing(a, b, start_time())],
            )
            .await
            .unwrap();
        let m = store.round_matches(round_id).await.unwrap().remove(0);

        assert!(
            store
                .record_result(m.id, &MatchResult::Decisive { winner: a })
                .await
                .unwrap()
        );
        assert!(
            !store
                .record_result(m.id, &MatchResult::Decisive { winner: b })
                .await
                .unwrap()
        );
        let stored = store.match_by_id(m.id).await.unwrap().unwrap();
        assert_eq!(stored.result, Some(MatchResult::Decisive { winner: a }));
    }

    #[tokio::test]
    async fn advancement_claim_is_exclusive_and_round_scoped() {
        let store = MemoryStore::new();
        let tid = store
            .insert_tournament("Open", &FormatConfig::swiss_only(1))
            .await
            .unwrap();

        assert!(store.claim_advancement(tid, 0).await.unwrap());
        assert!(!store.claim_advancement(tid, 0).await.unwrap());
        store.release_advancement(tid).await.unwrap();
        assert!(store.claim_advancement(tid, 0).await.unwrap());
        store.release_advancement(tid).await.unwrap();

        // Stale round pointer no longer claims.
        assert!(!store.claim_advancement(tid, 3).await.unwrap());
    }

    #[tokio::test]
    async fn proposal_cas_rejects_stale_transitions() {
        let store = MemoryStore::new();
        let proposal = ScheduleProposal::new(1, 10, 11, start_time(), None);
        store.insert_proposal(&proposal).await.unwrap();

        assert!(
            store
                .transition_status(proposal.id, ProposalStatus::Proposed, ProposalStatus::Accepted)
                .await
                .unwrap()
        );
        // A second actor still expecting `Proposed` loses.
        assert!(
            !store
                .transition_status(
                    proposal.id,
                    ProposalStatus::Proposed,
                    ProposalStatus::Cancelled
                )
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn overlap_detection_uses_window() {
        let store = MemoryStore::new();
        let tid = store
            .insert_tournament("Open", &FormatConfig::swiss_only(1))
            .await
            .unwrap();
        let a = store.insert_participant(tid, 1).await.unwrap();
        let b = store.insert_participant(tid, 2).await.unwrap();
        let round_id = store
            .insert_round(
                tid,
                1,
                RoundKind::Swiss,
                vec![NewMatch::pairing(a, b, start_time() + Duration::days(2))],
            )
            .await
            .unwrap();
        let m = store.round_matches(round_id).await.unwrap().remove(0);
        store.set_schedule(m.id, start_time()).await.unwrap();

        let window = Duration::minutes(90);
        assert!(
            store
                .confirmed_overlap(a, start_time() + Duration::minutes(30), window)
                .await
                .unwrap()
        );
        assert!(
            !store
                .confirmed_overlap(a, start_time() + Duration::hours(3), window)
                .await
                .unwrap()
        );
        assert!(
            !store
                .confirmed_overlap(999, start_time(), window)
                .await
                .unwrap()
        );
    }
}
