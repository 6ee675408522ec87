//! Pure chess domain types and utilities.
//! No threads or I/O - this is the domain layer.
//!
//! Squares are absolute (`shakmaty::Square`, rank 1 = index 0). The
//! presentation layer addresses the board by [`Coord`], where row 0 is the
//! rendered top edge. [`Orientation`] is the only place that converts
//! between the two.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shakmaty::{Color as SColor, File, Rank, Role, Square};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize, JsonSchema)]
pub enum PieceKind {
    Pawn,
    Rook,
    Knight,
    Bishop,
    Queen,
    King,
}

impl PieceKind {
    pub fn from_role(role: Role) -> Self {
        match role {
            Role::Pawn => PieceKind::Pawn,
            Role::Knight => PieceKind::Knight,
            Role::Bishop => PieceKind::Bishop,
            Role::Rook => PieceKind::Rook,
            Role::Queen => PieceKind::Queen,
            Role::King => PieceKind::King,
        }
    }

    pub fn to_role(self) -> Role {
        match self {
            PieceKind::Pawn => Role::Pawn,
            PieceKind::Knight => Role::Knight,
            PieceKind::Bishop => Role::Bishop,
            PieceKind::Rook => Role::Rook,
            PieceKind::Queen => Role::Queen,
            PieceKind::King => Role::King,
        }
    }

    /// Lowercase letter used in FEN and in move text promotion suffixes
    pub fn to_char(self) -> char {
        match self {
            PieceKind::Pawn => 'p',
            PieceKind::Knight => 'n',
            PieceKind::Bishop => 'b',
            PieceKind::Rook => 'r',
            PieceKind::Queen => 'q',
            PieceKind::King => 'k',
        }
    }

    /// Parse a piece letter, ignoring case
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'p' => Some(PieceKind::Pawn),
            'n' => Some(PieceKind::Knight),
            'b' => Some(PieceKind::Bishop),
            'r' => Some(PieceKind::Rook),
            'q' => Some(PieceKind::Queen),
            'k' => Some(PieceKind::King),
            _ => None,
        }
    }

    /// Whether a pawn may promote to this kind
    pub fn is_promotion_choice(self) -> bool {
        matches!(
            self,
            PieceKind::Queen | PieceKind::Rook | PieceKind::Bishop | PieceKind::Knight
        )
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PieceColor {
    White,
    Black,
}

impl PieceColor {
    pub fn opposite(self) -> Self {
        match self {
            PieceColor::White => PieceColor::Black,
            PieceColor::Black => PieceColor::White,
        }
    }

    pub fn from_shakmaty(color: SColor) -> Self {
        match color {
            SColor::White => PieceColor::White,
            SColor::Black => PieceColor::Black,
        }
    }

    pub fn to_shakmaty(self) -> SColor {
        match self {
            PieceColor::White => SColor::White,
            PieceColor::Black => SColor::Black,
        }
    }

    /// Rank index (0-based) of this color's back rank
    pub fn back_rank(self) -> u32 {
        match self {
            PieceColor::White => 0,
            PieceColor::Black => 7,
        }
    }

    /// Rank index a pawn of this color promotes on
    pub fn promotion_rank(self) -> u32 {
        self.opposite().back_rank()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Piece {
    pub kind: PieceKind,
    pub color: PieceColor,
}

impl Piece {
    pub fn new(color: PieceColor, kind: PieceKind) -> Self {
        Self { kind, color }
    }

    /// FEN letter: uppercase for white, lowercase for black
    pub fn fen_char(&self) -> char {
        let c = self.kind.to_char();
        match self.color {
            PieceColor::White => c.to_ascii_uppercase(),
            PieceColor::Black => c,
        }
    }

    pub fn from_fen_char(c: char) -> Option<Self> {
        let kind = PieceKind::from_char(c)?;
        let color = if c.is_ascii_uppercase() {
            PieceColor::White
        } else {
            PieceColor::Black
        };
        Some(Self { kind, color })
    }
}

/// Convert shakmaty piece to our domain Piece
pub fn shakmaty_to_piece(piece: shakmaty::Piece) -> Piece {
    Piece {
        kind: PieceKind::from_role(piece.role),
        color: PieceColor::from_shakmaty(piece.color),
    }
}

/// Build an absolute square from 0-based file and rank indices
pub fn square_at(file: u32, rank: u32) -> Square {
    Square::from_coords(File::new(file), Rank::new(rank))
}

pub fn file_index(sq: Square) -> u32 {
    sq.file() as u32
}

pub fn rank_index(sq: Square) -> u32 {
    sq.rank() as u32
}

/// Parse an algebraic square name such as `e4`
pub fn parse_square(name: &str) -> Option<Square> {
    let mut chars = name.chars();
    let file = chars.next()?;
    let rank = chars.next()?;
    if chars.next().is_some() || !('a'..='h').contains(&file) || !('1'..='8').contains(&rank) {
        return None;
    }
    Some(square_at(file as u32 - 'a' as u32, rank as u32 - '1' as u32))
}

/// A square as addressed by the presentation layer (row 0 = rendered top)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Coord {
    pub row: usize,
    pub col: usize,
}

impl Coord {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Which color is drawn along the top edge of the board.
///
/// With black on top, row 0 is rank 8 and columns run a..h. With white on top
/// the board is rotated half a turn: row 0 is rank 1 and columns run h..a.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Orientation {
    upper: PieceColor,
}

impl Orientation {
    pub fn new(upper: PieceColor) -> Self {
        Self { upper }
    }

    pub fn upper_color(self) -> PieceColor {
        self.upper
    }

    pub fn to_square(self, coord: Coord) -> Option<Square> {
        if coord.row > 7 || coord.col > 7 {
            return None;
        }
        let (row, col) = (coord.row as u32, coord.col as u32);
        Some(match self.upper {
            PieceColor::Black => square_at(col, 7 - row),
            PieceColor::White => square_at(7 - col, row),
        })
    }

    pub fn to_coord(self, sq: Square) -> Coord {
        let (file, rank) = (file_index(sq) as usize, rank_index(sq) as usize);
        match self.upper {
            PieceColor::Black => Coord::new(7 - rank, file),
            PieceColor::White => Coord::new(rank, 7 - file),
        }
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Self::new(PieceColor::Black)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_orientation_row_zero_is_rank_eight() {
        let o = Orientation::new(PieceColor::Black);
        assert_eq!(o.to_square(Coord::new(0, 0)), Some(Square::A8));
        assert_eq!(o.to_square(Coord::new(7, 4)), Some(Square::E1));
        assert_eq!(o.to_coord(Square::E2), Coord::new(6, 4));
    }

    #[test]
    fn test_flipped_orientation_rotates_board() {
        let o = Orientation::new(PieceColor::White);
        assert_eq!(o.to_square(Coord::new(0, 0)), Some(Square::H1));
        assert_eq!(o.to_square(Coord::new(7, 7)), Some(Square::A8));
        assert_eq!(o.to_coord(Square::E8), Coord::new(7, 3));
    }

    #[test]
    fn test_orientation_round_trip_every_square() {
        for upper in [PieceColor::White, PieceColor::Black] {
            let o = Orientation::new(upper);
            for idx in 0..64u32 {
                let sq = Square::new(idx);
                assert_eq!(o.to_square(o.to_coord(sq)), Some(sq));
            }
        }
    }

    #[test]
    fn test_out_of_range_coord() {
        assert_eq!(Orientation::default().to_square(Coord::new(8, 0)), None);
    }

    #[test]
    fn test_parse_square() {
        assert_eq!(parse_square("e4"), Some(Square::E4));
        assert_eq!(parse_square("a1"), Some(Square::A1));
        assert_eq!(parse_square("i1"), None);
        assert_eq!(parse_square("e9"), None);
        assert_eq!(parse_square("e44"), None);
    }

    #[test]
    fn test_piece_fen_chars() {
        let p = Piece::from_fen_char('N').unwrap();
        assert_eq!(p, Piece::new(PieceColor::White, PieceKind::Knight));
        assert_eq!(Piece::new(PieceColor::Black, PieceKind::Queen).fen_char(), 'q');
        assert!(Piece::from_fen_char('x').is_none());
    }
}
