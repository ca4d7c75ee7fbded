//! Position parsing and material accounting.
//!
//! The adjudicator receives positions as FEN strings from the live-play
//! engine. Only the fields the draw rules need are retained: the piece
//! census, the side to move, the halfmove clock, and a normalized
//! repetition key covering placement, side to move, castling rights, and
//! the en-passant target.

use thiserror::Error;

/// Errors from position parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PositionError {
    #[error("unparsable position: {0}")]
    Unparsable(String),
}

pub type PositionResult<T> = Result<T, PositionError>;

/// Piece kinds, used both for the material census and for move records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PieceKind {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

/// Side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    White,
    Black,
}

/// Per-side piece counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterialCount {
    pub pawns: u8,
    pub knights: u8,
    pub bishops: u8,
    pub rooks: u8,
    pub queens: u8,
    pub kings: u8,
}

impl MaterialCount {
    fn add(&mut self, kind: PieceKind) {
        match kind {
            PieceKind::Pawn => self.pawns += 1,
            PieceKind::Knight => self.knights += 1,
            PieceKind::Bishop => self.bishops += 1,
            PieceKind::Rook => self.rooks += 1,
            PieceKind::Queen => self.queens += 1,
            PieceKind::King => self.kings += 1,
        }
    }

    fn minors(&self) -> u8 {
        self.knights + self.bishops
    }

    fn has_pawn_or_major(&self) -> bool {
        self.pawns > 0 || self.rooks > 0 || self.queens > 0
    }
}

/// A parsed position, reduced to what the draw rules inspect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub side_to_move: Side,
    pub halfmove_clock: u32,
    pub fullmove_number: u32,
    pub white: MaterialCount,
    pub black: MaterialCount,
    /// Placement, side to move, castling rights, and en-passant target,
    /// joined with single spaces. Two positions repeat iff their keys match.
    pub repetition_key: String,
}

impl Position {
    /// Parse a FEN string.
    ///
    /// The halfmove clock and fullmove number may be omitted (some engines
    /// send four-field FENs); they default to 0 and 1. Anything malformed
    /// in the mandatory fields is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`PositionError::Unparsable`] on malformed input. There is
    /// no silent fallback.
    pub fn parse(fen: &str) -> PositionResult<Self> {
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() < 4 || fields.len() > 6 {
            return Err(PositionError::Unparsable(format!(
                "expected 4 to 6 fields, got {}",
                fields.len()
            )));
        }

        let (white, black) = parse_placement(fields[0])?;

        if white.kings != 1 || black.kings != 1 {
            return Err(PositionError::Unparsable(format!(
                "each side needs exactly one king, got {} white / {} black",
                white.kings, black.kings
            )));
        }

        let side_to_move = match fields[1] {
            "w" => Side::White,
            "b" => Side::Black,
            other => {
                return Err(PositionError::Unparsable(format!(
                    "bad side to move '{other}'"
                )));
            }
        };

        validate_castling(fields[2])?;
        validate_en_passant(fields[3])?;

        let halfmove_clock = match fields.get(4) {
            Some(raw) => raw.parse::<u32>().map_err(|_| {
                PositionError::Unparsable(format!("bad halfmove clock '{raw}'"))
            })?,
            None => 0,
        };
        let fullmove_number = match fields.get(5) {
            Some(raw) => raw.parse::<u32>().map_err(|_| {
                PositionError::Unparsable(format!("bad fullmove number '{raw}'"))
            })?,
            None => 1,
        };

        Ok(Self {
            side_to_move,
            halfmove_clock,
            fullmove_number,
            white,
            black,
            repetition_key: format!(
                "{} {} {} {}",
                fields[0], fields[1], fields[2], fields[3]
            ),
        })
    }

    /// Whether the remaining material cannot force mate.
    ///
    /// Only two shapes qualify: bare kings, and king plus a single minor
    /// piece against a bare king. Any pawn, rook, or queen, or a second
    /// minor piece anywhere on the board, disqualifies the rule.
    pub fn insufficient_material(&self) -> bool {
        if self.white.has_pawn_or_major() || self.black.has_pawn_or_major() {
            return false;
        }
        self.white.minors() + self.black.minors() <= 1
    }
}

fn parse_placement(placement: &str) -> PositionResult<(MaterialCount, MaterialCount)> {
    let ranks: Vec<&str> = placement.split('/').collect();
    if ranks.len() != 8 {
        return Err(PositionError::Unparsable(format!(
            "expected 8 ranks, got {}",
            ranks.len()
        )));
    }

    let mut white = MaterialCount::default();
    let mut black = MaterialCount::default();

    for rank in &ranks {
        let mut files = 0u32;
        for c in rank.chars() {
            if let Some(skip) = c.to_digit(10) {
                if skip == 0 || skip > 8 {
                    return Err(PositionError::Unparsable(format!(
                        "bad skip digit '{c}' in rank '{rank}'"
                    )));
                }
                files += skip;
                continue;
            }
            let kind = match c.to_ascii_lowercase() {
                'p' => PieceKind::Pawn,
                'n' => PieceKind::Knight,
                'b' => PieceKind::Bishop,
                'r' => PieceKind::Rook,
                'q' => PieceKind::Queen,
                'k' => PieceKind::King,
                _ => {
                    return Err(PositionError::Unparsable(format!(
                        "bad piece char '{c}' in rank '{rank}'"
                    )));
                }
            };
            if c.is_ascii_uppercase() {
                white.add(kind);
            } else {
                black.add(kind);
            }
            files += 1;
        }
        if files != 8 {
            return Err(PositionError::Unparsable(format!(
                "rank '{rank}' covers {files} files"
            )));
        }
    }

    Ok((white, black))
}

fn validate_castling(field: &str) -> PositionResult<()> {
    if field == "-" {
        return Ok(());
    }
    if field.is_empty()
        || field.len() > 4
        || !field.chars().all(|c| matches!(c, 'K' | 'Q' | 'k' | 'q'))
    {
        return Err(PositionError::Unparsable(format!(
            "bad castling rights '{field}'"
        )));
    }
    Ok(())
}

fn validate_en_passant(field: &str) -> PositionResult<()> {
    if field == "-" {
        return Ok(());
    }
    let mut chars = field.chars();
    let file = chars.next();
    let rank = chars.next();
    let valid = matches!(file, Some('a'..='h'))
        && matches!(rank, Some('3') | Some('6'))
        && chars.next().is_none();
    if !valid {
        return Err(PositionError::Unparsable(format!(
            "bad en passant target '{field}'"
        )));
    }
    Ok(())
}
