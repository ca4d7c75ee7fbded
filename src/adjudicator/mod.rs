//! Draw adjudication for live games.
//!
//! The live-play engine calls [`DrawAdjudicator::evaluate`] after each
//! move with the current position and accumulated history. Automatic
//! rules (stalemate, insufficient material, seventy-five-move rule,
//! fivefold repetition, and the optional queen-shuffle rule) end the game
//! on the spot; the fifty-move and threefold-repetition rules only flag a
//! claimable draw.

pub mod position;
pub mod rules;

pub use position::{MaterialCount, PieceKind, Position, PositionError, PositionResult, Side};
pub use rules::{
    DrawAdjudicator, DrawReason, DrawRuleConfig, DrawVerdict, GameHistory, MoveRecord,
};
