//! Deadline supervision and automatic forfeits.

pub mod coordinator;

pub use coordinator::{
    MatchTimeoutCoordinator, TickSummary, TimeoutError, TimeoutOutcome, TimeoutResult,
};
