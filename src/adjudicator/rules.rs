//! Automatic-draw rule evaluation.
//!
//! Stateless evaluator invoked by the live-play engine after each move.
//! Rules are checked in a fixed priority order and the first rule that
//! fires decides the verdict. Automatic rules end the game immediately;
//! claim-eligible rules only flag availability and leave the decision to
//! the caller.

use serde::{Deserialize, Serialize};

use super::position::{PieceKind, Position, PositionResult};

/// Why a game is (or may be) drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawReason {
    Stalemate,
    InsufficientMaterial,
    SeventyFiveMoveRule,
    FiftyMoveRule,
    FivefoldRepetition,
    ThreefoldRepetition,
    /// Configurable anti-dragging rule, see [`DrawRuleConfig`].
    QueenShuffle,
    /// Mutual agreement, reported by the live-play engine. Never produced
    /// by [`DrawAdjudicator::evaluate`].
    Agreement,
}

/// Outcome of a draw-rule evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawVerdict {
    /// The game is over, drawn, regardless of any claim.
    pub is_draw: bool,
    pub reason: Option<DrawReason>,
    /// A draw is available to be claimed but not enforced.
    pub claimable: bool,
}

impl DrawVerdict {
    fn none() -> Self {
        Self {
            is_draw: false,
            reason: None,
            claimable: false,
        }
    }

    fn automatic(reason: DrawReason) -> Self {
        Self {
            is_draw: true,
            reason: Some(reason),
            claimable: false,
        }
    }

    fn claimable(reason: DrawReason) -> Self {
        Self {
            is_draw: false,
            reason: Some(reason),
            claimable: true,
        }
    }
}

/// One half-move of the game record. The adjudicator only needs to know
/// which piece moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub piece: PieceKind,
}

/// Accumulated game history supplied by the live-play engine.
///
/// Move legality is the live-play engine's concern, so the two facts the
/// stalemate rule needs, the number of legal moves for the side to move
/// and whether that side is in check, arrive precomputed rather than
/// being derived here.
#[derive(Debug, Clone, Default)]
pub struct GameHistory {
    /// Repetition keys of every position before the current one.
    pub prior_positions: Vec<String>,
    /// Half-moves played so far, oldest first.
    pub moves: Vec<MoveRecord>,
    /// Legal moves available to the side to move in the current position.
    pub legal_move_count: u32,
    /// Whether the side to move is in check.
    pub in_check: bool,
}

/// Tunable rule parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRuleConfig {
    /// If set, a game where the last N half-moves were all queen moves
    /// (both sides) is adjudicated drawn. Disabled by default.
    pub queen_shuffle_threshold: Option<u32>,
}

impl Default for DrawRuleConfig {
    fn default() -> Self {
        Self {
            queen_shuffle_threshold: None,
        }
    }
}

/// Stateless draw adjudicator.
#[derive(Debug, Clone, Default)]
pub struct DrawAdjudicator {
    config: DrawRuleConfig,
}

impl DrawAdjudicator {
    pub fn new(config: DrawRuleConfig) -> Self {
        Self { config }
    }

    /// Evaluate the draw rules against a position and its history.
    ///
    /// Priority order: stalemate, insufficient material, seventy-five-move
    /// rule, fifty-move rule, fivefold repetition, threefold repetition,
    /// queen-shuffle rule. The first rule that fires wins.
    ///
    /// # Errors
    ///
    /// Propagates [`super::position::PositionError::Unparsable`] for a
    /// malformed position string.
    pub fn evaluate(&self, fen: &str, history: &GameHistory) -> PositionResult<DrawVerdict> {
        let position = Position::parse(fen)?;

        if history.legal_move_count == 0 && !history.in_check {
            return Ok(DrawVerdict::automatic(DrawReason::Stalemate));
        }

        if position.insufficient_material() {
            return Ok(DrawVerdict::automatic(DrawReason::InsufficientMaterial));
        }

        if position.halfmove_clock >= 150 {
            return Ok(DrawVerdict::automatic(DrawReason::SeventyFiveMoveRule));
        }
        if position.halfmove_clock >= 100 {
            return Ok(DrawVerdict::claimable(DrawReason::FiftyMoveRule));
        }

        let occurrences = 1 + history
            .prior_positions
            .iter()
            .filter(|key| **key == position.repetition_key)
            .count();
        if occurrences >= 5 {
            return Ok(DrawVerdict::automatic(DrawReason::FivefoldRepetition));
        }
        if occurrences >= 3 {
            return Ok(DrawVerdict::claimable(DrawReason::ThreefoldRepetition));
        }

        if let Some(threshold) = self.config.queen_shuffle_threshold {
            let n = threshold as usize;
            if n > 0
                && history.moves.len() >= n
                && history.moves[history.moves.len() - n..]
                    .iter()
                    .all(|m| m.piece == PieceKind::Queen)
            {
                return Ok(DrawVerdict::automatic(DrawReason::QueenShuffle));
            }
        }

        Ok(DrawVerdict::none())
    }
}
