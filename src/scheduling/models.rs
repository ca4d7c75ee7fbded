//! Schedule negotiation data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tournament::models::{MatchId, ParticipantId};

/// Negotiation state of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    /// Sent to the responder, awaiting a reaction.
    Proposed,
    /// Accepted; the match schedule is being locked in.
    Accepted,
    /// The responder countered with an alternative time; the original
    /// proposer decides.
    AlternativeProposed,
    /// Locked in; the match has a confirmed start time.
    Confirmed,
    Cancelled,
    /// The proposed time passed without confirmation.
    Expired,
}

impl ProposalStatus {
    /// Still negotiable: not yet confirmed, cancelled, or expired.
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            Self::Proposed | Self::Accepted | Self::AlternativeProposed
        )
    }
}

/// A start-time proposal between the two participants of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleProposal {
    pub id: Uuid,
    pub match_id: MatchId,
    pub proposer: ParticipantId,
    pub responder: ParticipantId,
    pub proposed_time: DateTime<Utc>,
    pub alternative_time: Option<DateTime<Utc>>,
    pub status: ProposalStatus,
    pub message: Option<String>,
}

impl ScheduleProposal {
    pub fn new(
        match_id: MatchId,
        proposer: ParticipantId,
        responder: ParticipantId,
        proposed_time: DateTime<Utc>,
        message: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            match_id,
            proposer,
            responder,
            proposed_time,
            alternative_time: None,
            status: ProposalStatus::Proposed,
            message,
        }
    }

    /// The time currently on the table: the alternative once one has
    /// been countered, the original otherwise.
    pub fn effective_time(&self) -> DateTime<Utc> {
        self.alternative_time.unwrap_or(self.proposed_time)
    }

    pub fn involves(&self, participant: ParticipantId) -> bool {
        self.proposer == participant || self.responder == participant
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn effective_time_prefers_the_alternative() {
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap();
        let t1 = t0 + chrono::Duration::hours(2);

        let mut proposal = ScheduleProposal::new(1, 10, 11, t0, None);
        assert_eq!(proposal.effective_time(), t0);

        proposal.alternative_time = Some(t1);
        assert_eq!(proposal.effective_time(), t1);
    }

    #[test]
    fn pending_statuses() {
        assert!(ProposalStatus::Proposed.is_pending());
        assert!(ProposalStatus::Accepted.is_pending());
        assert!(ProposalStatus::AlternativeProposed.is_pending());
        assert!(!ProposalStatus::Confirmed.is_pending());
        assert!(!ProposalStatus::Cancelled.is_pending());
        assert!(!ProposalStatus::Expired.is_pending());
    }
}
