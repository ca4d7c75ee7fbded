//! Schedule negotiation between match participants.

pub mod coordinator;
pub mod models;

pub use coordinator::{MatchSchedulingCoordinator, SchedulingError, SchedulingResult};
pub use models::{ProposalStatus, ScheduleProposal};
