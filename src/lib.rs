//! # Chess Championship
//!
//! A tournament orchestration engine for multi-round chess championships:
//! a Swiss-system phase with live standings and deterministic tiebreaks,
//! an optional single-elimination finals bracket, per-match start-time
//! negotiation between remote participants, heartbeat-driven automatic
//! forfeits, and rule-exact adjudication of automatic draw conditions.
//!
//! ## Architecture
//!
//! Pure engines do the tournament math; coordinators drive them against
//! pluggable storage:
//!
//! - **Standings**: full recomputation after every round, ranked by
//!   points, Buchholz, Sonnenborn-Berger, head-to-head, then seed.
//! - **Swiss pairing**: nearest-rank pairing with a no-repeat window and
//!   backtracking, bye rotation, and side balancing.
//! - **Elimination bracket**: a placeholder skeleton created at the cut,
//!   resolved round by round as results land.
//! - **Round progression**: idempotent, claim-guarded phase transitions.
//! - **Scheduling**: a propose/counter/confirm negotiation state machine
//!   with an instant-start fast path when both players are online.
//! - **Timeouts**: warnings, grace periods, and forfeits, driven by an
//!   injectable clock.
//! - **Draw adjudication**: stalemate, insufficient material, move-count
//!   and repetition rules, plus a configurable anti-dragging rule.
//!
//! External concerns (notification delivery, presence, persistence) are
//! consumed through traits; PostgreSQL and in-memory backends ship in
//! [`store`].
//!
//! ## Example
//!
//! ```no_run
//! use chess_championship::config::EngineConfig;
//! use chess_championship::clock::SystemClock;
//! use chess_championship::notify::NullNotifier;
//! use chess_championship::presence::StaticPresence;
//! use chess_championship::store::MemoryStore;
//! use chess_championship::tournament::{FormatConfig, RoundProgressionCoordinator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     let coordinator = RoundProgressionCoordinator::new(
//!         store,
//!         Arc::new(NullNotifier),
//!         Arc::new(StaticPresence::new()),
//!         Arc::new(SystemClock),
//!         EngineConfig::default(),
//!     );
//!
//!     let id = coordinator
//!         .create_tournament("Sunday Swiss", &FormatConfig::with_elimination(5, 8))
//!         .await?;
//!     coordinator.open_registration(id).await?;
//!     Ok(())
//! }
//! ```

/// Draw adjudication for live games.
pub mod adjudicator;
/// Injectable wall-clock source.
pub mod clock;
/// Engine configuration.
pub mod config;
/// Periodic scan loop.
pub mod heartbeat;
/// Outbound notification interface.
pub mod notify;
/// Online-presence interface.
pub mod presence;
/// Schedule negotiation.
pub mod scheduling;
/// Storage traits and backends.
pub mod store;
/// Deadline supervision and forfeits.
pub mod timeout;
/// Tournament orchestration.
pub mod tournament;

pub use adjudicator::{DrawAdjudicator, DrawReason, DrawVerdict, GameHistory};
pub use config::{DoubleForfeitScoring, EngineConfig};
pub use heartbeat::Heartbeat;
pub use scheduling::{MatchSchedulingCoordinator, SchedulingError};
pub use timeout::{MatchTimeoutCoordinator, TimeoutError};
pub use tournament::{
    FormatConfig, MatchResult, Progression, ProgressionError, RoundProgressionCoordinator,
};
