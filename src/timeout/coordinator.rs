//! Deadline supervision for scheduled and in-progress matches.
//!
//! Driven by the heartbeat: each tick scans the unresolved matches of
//! every in-progress tournament, sends one "starting soon" warning per
//! match, and resolves absences once the grace period after the
//! scheduled start (or the round's play window) has run out. Errors on
//! one match are logged and never abort the scan of the others.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::notify::{EngineEvent, Notifier};
use crate::presence::PresenceProvider;
use crate::store::{ChampionshipStore, StoreError};
use crate::tournament::models::{Match, MatchId, MatchResult};

/// Timeout errors
#[derive(Debug, Error)]
pub enum TimeoutError {
    #[error("match {0} not found")]
    MatchNotFound(MatchId),

    /// The match has unresolved slots or is a bye; nothing to supervise.
    #[error("match {0} is not supervisable")]
    NotSupervisable(MatchId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type TimeoutResult<T> = Result<T, TimeoutError>;

/// What one heartbeat tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub warnings_sent: usize,
    pub forfeits: usize,
}

/// How a timeout resolution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutOutcome {
    /// A result was recorded.
    Resolved(MatchResult),
    /// Someone else recorded a result first; treated as success.
    AlreadyResolved,
    /// Both participants are present; the match is live, nothing to do.
    BothPresent,
}

/// Watches confirmed and overdue matches and forfeits no-shows.
pub struct MatchTimeoutCoordinator {
    store: Arc<dyn ChampionshipStore>,
    notifier: Arc<dyn Notifier>,
    presence: Arc<dyn PresenceProvider>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl MatchTimeoutCoordinator {
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

    /// Scan every in-progress tournament once. Safe to call concurrently
    /// with itself: result recording is first-writer-wins and the warning
    /// flag flips at most once.
    pub async fn tick(&self) -> TimeoutResult<TickSummary> {
        let now = self.clock.now();
        let mut summary = TickSummary::default();

        // Paused tournaments are absent from the in-progress listing and
        // therefore skipped wholesale.
        for tournament in self.store.in_progress_tournaments().await? {
            let matches = match self.store.unresolved_matches(tournament.id).await {
                Ok(matches) => matches,
                Err(e) => {
                    log::error!("tournament {}: match scan failed: {e}", tournament.id);
                    continue;
                }
            };
            for m in matches {
                match self.supervise(&m, now).await {
                    Ok(tick) => {
                        summary.warnings_sent += tick.warnings_sent;
                        summary.forfeits += tick.forfeits;
                    }
                    Err(e) => {
                        log::error!("match {}: timeout supervision failed: {e}", m.id);
                    }
                }
            }
        }

        Ok(summary)
    }

    /// Operator override: resolve a match's absences right now, ahead of
    /// the grace period.
    pub async fn force_timeout(&self, match_id: MatchId) -> TimeoutResult<TimeoutOutcome> {
        let m = self
            .store
            .match_by_id(match_id)
            .await?
            .ok_or(TimeoutError::MatchNotFound(match_id))?;
        if m.is_resolved() {
            return Ok(TimeoutOutcome::AlreadyResolved);
        }
        if m.bye || m.participants().is_none() {
            return Err(TimeoutError::NotSupervisable(match_id));
        }
        log::info!("match {match_id}: operator forced timeout resolution");
        self.resolve_absences(&m).await
    }

    async fn supervise(&self, m: &Match, now: DateTime<Utc>) -> TimeoutResult<TickSummary> {
        let mut summary = TickSummary::default();
        if m.bye || m.participants().is_none() {
            return Ok(summary);
        }

        if let Some(start) = m.scheduled_start {
            if now >= start + self.config.grace_period() {
                if let TimeoutOutcome::Resolved(_) = self.resolve_absences(m).await? {
                    summary.forfeits += 1;
                }
            } else if now >= start - self.config.warning_lead()
                && now < start
                && !m.warning_sent
                && self.store.mark_warning_sent(m.id).await?
            {
                let event = EngineEvent::MatchStartingSoon {
                    match_id: m.id,
                    start,
                };
                let (a, b) = m.participants().expect("checked above");
                self.notifier.notify(a, &event).await;
                self.notifier.notify(b, &event).await;
                summary.warnings_sent += 1;
            }
        } else if let Some(deadline) = m.deadline
            && now > deadline
        {
            // Never scheduled and the play window is gone.
            if let TimeoutOutcome::Resolved(_) = self.resolve_absences(m).await? {
                summary.forfeits += 1;
            }
        }

        Ok(summary)
    }

    /// Decide the forfeit from presence: the present side wins, both
    /// absent is a double forfeit, both present leaves the match to live
    /// play. First writer wins on the stored result, so re-running this
    /// against an already-resolved match is a no-op.
    async fn resolve_absences(&self, m: &Match) -> TimeoutResult<TimeoutOutcome> {
        let (a, b) = m.participants().expect("caller checked resolvability");
        let a_present = self.presence.is_online(a).await;
        let b_present = self.presence.is_online(b).await;

        let result = match (a_present, b_present) {
            (true, true) => return Ok(TimeoutOutcome::BothPresent),
            (true, false) => MatchResult::Forfeit { absentee: b },
            (false, true) => MatchResult::Forfeit { absentee: a },
            (false, false) => MatchResult::DoubleForfeit,
        };

        if !self.store.record_result(m.id, &result).await? {
            return Ok(TimeoutOutcome::AlreadyResolved);
        }

        log::warn!("match {}: forfeited ({result:?})", m.id);
        let event = EngineEvent::MatchForfeited { match_id: m.id };
        self.notifier.notify(a, &event).await;
        self.notifier.notify(b, &event).await;

        Ok(TimeoutOutcome::Resolved(result))
    }
}
