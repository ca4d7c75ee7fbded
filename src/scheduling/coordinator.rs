//! Match schedule negotiation.
//!
//! Per match: `Unscheduled -> Proposed -> {Accepted -> Confirmed |
//! AlternativeProposed -> {Confirmed | Cancelled}} | Expired | Cancelled`.
//! Every transition is an optimistic compare-and-set against the stored
//! proposal status; a stale actor gets a state conflict and retries
//! against fresh state. Confirmation locks the match's start time, which
//! places it under timeout supervision.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::models::{ProposalStatus, ScheduleProposal};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::notify::{EngineEvent, Notifier};
use crate::presence::PresenceProvider;
use crate::store::{ChampionshipStore, StoreError};
use crate::tournament::models::{Match, MatchId, ParticipantId};

/// Scheduling errors
#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("match {0} not found")]
    MatchNotFound(MatchId),

    #[error("proposal {0} not found")]
    ProposalNotFound(Uuid),

    /// The match still carries unresolved placeholder slots.
    #[error("match {0} is not yet schedulable")]
    NotSchedulable(MatchId),

    /// The match already has a final result.
    #[error("match {0} is already resolved")]
    AlreadyResolved(MatchId),

    #[error("participant {participant} is not in match {match_id}")]
    NotAParticipant {
        match_id: MatchId,
        participant: ParticipantId,
    },

    /// A proposer cannot act on their own proposal's response side.
    #[error("cannot respond to your own proposal")]
    SelfAcceptanceNotAllowed,

    #[error("match {0} already has a pending proposal")]
    ProposalAlreadyPending(MatchId),

    #[error("proposed time {proposed} is after the round deadline {deadline}")]
    DeadlineExceeded {
        proposed: DateTime<Utc>,
        deadline: DateTime<Utc>,
    },

    #[error("proposed time {0} is in the past")]
    TimeInPast(DateTime<Utc>),

    /// Non-fatal: the caller picks a different time.
    #[error("participant {0} has an overlapping confirmed schedule")]
    SchedulingConflict(ParticipantId),

    /// Optimistic check failed against stale proposal state; retryable.
    #[error("proposal state changed concurrently")]
    StateConflict,

    #[error("both participants of match {0} must be online for an instant start")]
    ParticipantsOffline(MatchId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type SchedulingResult<T> = Result<T, SchedulingError>;

/// Coordinates start-time negotiation between the two participants of a
/// match.
pub struct MatchSchedulingCoordinator {
    store: Arc<dyn ChampionshipStore>,
    notifier: Arc<dyn Notifier>,
    presence: Arc<dyn PresenceProvider>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl MatchSchedulingCoordinator {
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

    /// Propose a start time to the opponent.
    pub async fn propose(
        &self,
        match_id: MatchId,
        proposer: ParticipantId,
        time: DateTime<Utc>,
        message: Option<String>,
    ) -> SchedulingResult<ScheduleProposal> {
        let m = self.schedulable_match(match_id).await?;
        if !m.has_participant(proposer) {
            return Err(SchedulingError::NotAParticipant {
                match_id,
                participant: proposer,
            });
        }
        let responder = m.opponent_of(proposer).expect("participant checked");

        self.validate_time(&m, time)?;
        if self.store.pending_proposal(match_id).await?.is_some() {
            return Err(SchedulingError::ProposalAlreadyPending(match_id));
        }
        self.check_conflicts(&m, time).await?;

        let proposal = ScheduleProposal::new(match_id, proposer, responder, time, message);
        self.store.insert_proposal(&proposal).await?;

        self.notifier
            .notify(
                responder,
                &EngineEvent::ScheduleProposed {
                    match_id,
                    proposal_id: proposal.id,
                    proposed_time: time,
                },
            )
            .await;

        Ok(proposal)
    }

    /// Accept the time currently on the table.
    ///
    /// A fresh proposal is accepted by the responder; once an alternative
    /// has been countered, acceptance is the original proposer's move.
    pub async fn accept(
        &self,
        proposal_id: Uuid,
        acceptor: ParticipantId,
    ) -> SchedulingResult<DateTime<Utc>> {
        let proposal = self
            .store
            .proposal(proposal_id)
            .await?
            .ok_or(SchedulingError::ProposalNotFound(proposal_id))?;
        let m = self.schedulable_match(proposal.match_id).await?;

        let expected = match proposal.status {
            ProposalStatus::Proposed => {
                if acceptor == proposal.proposer {
                    return Err(SchedulingError::SelfAcceptanceNotAllowed);
                }
                if acceptor != proposal.responder {
                    return Err(SchedulingError::NotAParticipant {
                        match_id: proposal.match_id,
                        participant: acceptor,
                    });
                }
                ProposalStatus::Proposed
            }
            ProposalStatus::AlternativeProposed => {
                if acceptor == proposal.responder {
                    return Err(SchedulingError::SelfAcceptanceNotAllowed);
                }
                if acceptor != proposal.proposer {
                    return Err(SchedulingError::NotAParticipant {
                        match_id: proposal.match_id,
                        participant: acceptor,
                    });
                }
                ProposalStatus::AlternativeProposed
            }
            _ => return Err(SchedulingError::StateConflict),
        };

        let time = proposal.effective_time();
        self.validate_time(&m, time)?;
        self.check_conflicts(&m, time).await?;

        if !self
            .store
            .transition_status(proposal_id, expected, ProposalStatus::Accepted)
            .await?
        {
            return Err(SchedulingError::StateConflict);
        }
        self.store.set_schedule(proposal.match_id, time).await?;
        if !self
            .store
            .transition_status(proposal_id, ProposalStatus::Accepted, ProposalStatus::Confirmed)
            .await?
        {
            return Err(SchedulingError::StateConflict);
        }

        let event = EngineEvent::ScheduleConfirmed {
            match_id: proposal.match_id,
            start: time,
        };
        self.notifier.notify(proposal.proposer, &event).await;
        self.notifier.notify(proposal.responder, &event).await;

        log::info!(
            "match {}: schedule confirmed for {}",
            proposal.match_id,
            time
        );
        Ok(time)
    }

    /// Counter a fresh proposal with an alternative time. The original
    /// proposer may then accept or cancel.
    pub async fn propose_alternative(
        &self,
        proposal_id: Uuid,
        responder: ParticipantId,
        alternative: DateTime<Utc>,
    ) -> SchedulingResult<()> {
        let proposal = self
            .store
            .proposal(proposal_id)
            .await?
            .ok_or(SchedulingError::ProposalNotFound(proposal_id))?;
        let m = self.schedulable_match(proposal.match_id).await?;

        if responder == proposal.proposer {
            return Err(SchedulingError::SelfAcceptanceNotAllowed);
        }
        if responder != proposal.responder {
            return Err(SchedulingError::NotAParticipant {
                match_id: proposal.match_id,
                participant: responder,
            });
        }

        self.validate_time(&m, alternative)?;
        self.check_conflicts(&m, alternative).await?;

        if !self.store.set_alternative(proposal_id, alternative).await? {
            return Err(SchedulingError::StateConflict);
        }

        self.notifier
            .notify(
                proposal.proposer,
                &EngineEvent::ScheduleAlternativeProposed {
                    match_id: proposal.match_id,
                    proposal_id,
                    alternative_time: alternative,
                },
            )
            .await;

        Ok(())
    }

    /// Cancel a non-confirmed proposal. Either participant may cancel.
    pub async fn cancel(
        &self,
        proposal_id: Uuid,
        actor: ParticipantId,
    ) -> SchedulingResult<()> {
        let proposal = self
            .store
            .proposal(proposal_id)
            .await?
            .ok_or(SchedulingError::ProposalNotFound(proposal_id))?;
        if !proposal.involves(actor) {
            return Err(SchedulingError::NotAParticipant {
                match_id: proposal.match_id,
                participant: actor,
            });
        }
        if !proposal.status.is_pending() {
            return Err(SchedulingError::StateConflict);
        }
        if !self
            .store
            .transition_status(proposal_id, proposal.status, ProposalStatus::Cancelled)
            .await?
        {
            return Err(SchedulingError::StateConflict);
        }

        let other = if actor == proposal.proposer {
            proposal.responder
        } else {
            proposal.proposer
        };
        self.notifier
            .notify(
                other,
                &EngineEvent::ScheduleCancelled {
                    match_id: proposal.match_id,
                    proposal_id,
                },
            )
            .await;

        Ok(())
    }

    /// Fast path: when both participants are online, start immediately,
    /// bypassing negotiation. Any pending proposal is cancelled.
    pub async fn instant_start(
        &self,
        match_id: MatchId,
        initiator: ParticipantId,
    ) -> SchedulingResult<DateTime<Utc>> {
        let m = self.schedulable_match(match_id).await?;
        if !m.has_participant(initiator) {
            return Err(SchedulingError::NotAParticipant {
                match_id,
                participant: initiator,
            });
        }
        let opponent = m.opponent_of(initiator).expect("participant checked");

        if !self.presence.is_online(initiator).await || !self.presence.is_online(opponent).await {
            return Err(SchedulingError::ParticipantsOffline(match_id));
        }

        if let Some(pending) = self.store.pending_proposal(match_id).await?
            && !self
                .store
                .transition_status(pending.id, pending.status, ProposalStatus::Cancelled)
                .await?
        {
            return Err(SchedulingError::StateConflict);
        }

        let now = self.clock.now();
        let mut record = ScheduleProposal::new(match_id, initiator, opponent, now, None);
        record.status = ProposalStatus::Confirmed;
        self.store.insert_proposal(&record).await?;
        self.store.set_schedule(match_id, now).await?;

        let event = EngineEvent::GameReady { match_id };
        self.notifier.notify(initiator, &event).await;
        self.notifier.notify(opponent, &event).await;

        log::info!("match {match_id}: instant start at {now}");
        Ok(now)
    }

    /// Expire pending proposals whose time on the table has passed.
    /// Invoked from the heartbeat. Returns how many expired.
    pub async fn expire_stale(&self) -> SchedulingResult<usize> {
        let now = self.clock.now();
        let stale = self.store.stale_pending_proposals(now).await?;
        let mut expired = 0;
        for proposal in stale {
            if self
                .store
                .transition_status(proposal.id, proposal.status, ProposalStatus::Expired)
                .await?
            {
                log::info!(
                    "proposal {} for match {} expired unconfirmed",
                    proposal.id,
                    proposal.match_id
                );
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn schedulable_match(&self, match_id: MatchId) -> SchedulingResult<Match> {
        let m = self
            .store
            .match_by_id(match_id)
            .await?
            .ok_or(SchedulingError::MatchNotFound(match_id))?;
        if m.is_resolved() {
            return Err(SchedulingError::AlreadyResolved(match_id));
        }
        if m.bye || m.participants().is_none() {
            return Err(SchedulingError::NotSchedulable(match_id));
        }
        Ok(m)
    }

    fn validate_time(&self, m: &Match, time: DateTime<Utc>) -> SchedulingResult<()> {
        if time < self.clock.now() {
            return Err(SchedulingError::TimeInPast(time));
        }
        if let Some(deadline) = m.deadline
            && time > deadline
        {
            return Err(SchedulingError::DeadlineExceeded {
                proposed: time,
                deadline,
            });
        }
        Ok(())
    }

    async fn check_conflicts(&self, m: &Match, time: DateTime<Utc>) -> SchedulingResult<()> {
        let (a, b) = m.participants().expect("caller checked resolvability");
        for participant in [a, b] {
            if self
                .store
                .confirmed_overlap(participant, time, self.config.conflict_window())
                .await?
            {
                return Err(SchedulingError::SchedulingConflict(participant));
            }
        }
        Ok(())
    }
}
