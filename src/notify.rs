//! Outbound notification interface.
//!
//! The engine emits abstract participant events; delivery (push, socket,
//! email) is someone else's problem. Implementations must be cheap and
//! non-blocking from the engine's point of view; failures are theirs to
//! handle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

use crate::tournament::models::{MatchId, ParticipantId, TournamentId};

/// Events the engine reports to participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    RoundGenerated {
        tournament_id: TournamentId,
        round_number: u32,
    },
    TournamentFinished {
        tournament_id: TournamentId,
    },
    ScheduleProposed {
        match_id: MatchId,
        proposal_id: Uuid,
        proposed_time: DateTime<Utc>,
    },
    ScheduleAlternativeProposed {
        match_id: MatchId,
        proposal_id: Uuid,
        alternative_time: DateTime<Utc>,
    },
    ScheduleConfirmed {
        match_id: MatchId,
        start: DateTime<Utc>,
    },
    ScheduleCancelled {
        match_id: MatchId,
        proposal_id: Uuid,
    },
    MatchStartingSoon {
        match_id: MatchId,
        start: DateTime<Utc>,
    },
    MatchForfeited {
        match_id: MatchId,
    },
    /// Both participants are online; the match can start right away.
    GameReady {
        match_id: MatchId,
    },
}

/// Notification dispatcher consumed by the engine.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, participant: ParticipantId, event: &EngineEvent);
}

/// Discards every event. Useful for embedding and tests that do not
/// assert on notifications.
#[derive(Debug, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _participant: ParticipantId, _event: &EngineEvent) {}
}

/// Records every event in memory for test assertions.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(ParticipantId, EngineEvent)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(ParticipantId, EngineEvent)> {
        self.events.lock().expect("notifier lock poisoned").clone()
    }

    pub fn count_for(&self, participant: ParticipantId) -> usize {
        self.events
            .lock()
            .expect("notifier lock poisoned")
            .iter()
            .filter(|(p, _)| *p == participant)
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, participant: ParticipantId, event: &EngineEvent) {
        self.events
            .lock()
            .expect("notifier lock poisoned")
            .push((participant, event.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_notifier_captures_events() {
        let notifier = RecordingNotifier::new();
        let event = EngineEvent::MatchForfeited { match_id: 42 };

        notifier.notify(1, &event).await;
        notifier.notify(2, &event).await;
        notifier.notify(1, &event).await;

        assert_eq!(notifier.events().len(), 3);
        assert_eq!(notifier.count_for(1), 2);
        assert_eq!(notifier.count_for(3), 0);
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let event = EngineEvent::TournamentFinished { tournament_id: 9 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "tournament_finished");
        assert_eq!(json["tournament_id"], 9);
    }
}
