//! Board state: a shakmaty [`Setup`] viewed through an [`Orientation`].
//!
//! Pieces are stored in absolute coordinates and moves are played through
//! shakmaty. What the rules crate has no notion of lives here: the rendering
//! orientation, the promotion-pending flag, and passing a turn.

use shakmaty::fen::{Fen, LossyFenError, ParseFenError};
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, FromSetup, Position, Setup, Square};

use crate::domain::chess::{
    Coord, Orientation, Piece, PieceColor, PieceKind, file_index, rank_index, shakmaty_to_piece,
};
use crate::domain::moves::MoveRecord;
use crate::error::{EngineError, FenError};

/// Standard initial position
pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BoardState {
    setup: Setup,
    orientation: Orientation,
    promotion_pending: bool,
}

impl BoardState {
    /// The standard initial position viewed with `upper` on top
    pub fn initial(upper: PieceColor) -> Self {
        Self {
            setup: Chess::default().to_setup(EnPassantMode::Legal),
            orientation: Orientation::new(upper),
            promotion_pending: false,
        }
    }

    /// Decode a FEN string. Only placement is required; missing fields take
    /// their neutral values.
    pub fn from_fen(fen: &str, upper: PieceColor) -> Result<Self, FenError> {
        let fen = fen.trim();
        if fen.is_empty() {
            return Err(FenError::Empty);
        }
        let parsed: Fen = fen.parse().map_err(|e: ParseFenError| FenError::Invalid {
            fen: fen.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            setup: parsed.into_setup(),
            orientation: Orientation::new(upper),
            promotion_pending: false,
        })
    }

    /// Encode as a full six-field FEN in absolute coordinates, which is what
    /// every legality adapter expects.
    pub fn to_fen(&self) -> String {
        Fen::try_from_setup(self.setup.clone()).unwrap_or_else(LossyFenError::ignore).to_string()
    }

    /// The position as the rules backend sees it
    pub fn position(&self) -> Result<Chess, EngineError> {
        Chess::from_setup(self.setup.clone(), CastlingMode::Standard).map_err(|e| {
            EngineError::Position {
                fen: self.to_fen(),
                reason: e.to_string(),
            }
        })
    }

    pub fn piece_at(&self, sq: Square) -> Option<Piece> {
        self.setup.board.piece_at(sq).map(shakmaty_to_piece)
    }

    pub fn piece_at_coord(&self, coord: Coord) -> Option<Piece> {
        self.orientation.to_square(coord).and_then(|sq| self.piece_at(sq))
    }

    /// The matrix as the presentation layer draws it (row 0 = top)
    pub fn view_grid(&self) -> [[Option<Piece>; 8]; 8] {
        let mut grid = [[None; 8]; 8];
        for (row, cells) in grid.iter_mut().enumerate() {
            for (col, cell) in cells.iter_mut().enumerate() {
                *cell = self.piece_at_coord(Coord::new(row, col));
            }
        }
        grid
    }

    pub fn side_to_move(&self) -> PieceColor {
        PieceColor::from_shakmaty(self.setup.turn)
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn upper_color(&self) -> PieceColor {
        self.orientation.upper_color()
    }

    pub fn set_upper_color(&mut self, upper: PieceColor) {
        self.orientation = Orientation::new(upper);
    }

    pub fn fullmove_number(&self) -> u32 {
        self.setup.fullmoves.get()
    }

    pub fn is_promotion_pending(&self) -> bool {
        self.promotion_pending
    }

    pub fn set_promotion_pending(&mut self, pending: bool) {
        self.promotion_pending = pending;
    }

    /// Whether moving the piece on `from` to `to` is a pawn reaching its last rank
    pub fn is_promotion_trigger(&self, from: Square, to: Square) -> bool {
        match self.piece_at(from) {
            Some(Piece {
                kind: PieceKind::Pawn,
                color,
            }) => rank_index(to) == color.promotion_rank(),
            _ => false,
        }
    }

    /// Whether moving the piece on `from` to `to` is a two-square king castle
    pub fn is_castle_move(&self, from: Square, to: Square) -> bool {
        matches!(
            self.piece_at(from),
            Some(Piece {
                kind: PieceKind::King,
                ..
            })
        ) && rank_index(from) == rank_index(to)
            && file_index(from).abs_diff(file_index(to)) == 2
    }

    /// Play a move and return the captured piece, if any. Castles use the
    /// king's two-square destination. A move that is not legal here leaves
    /// the board untouched.
    pub fn apply(&mut self, mv: &MoveRecord) -> Result<Option<Piece>, EngineError> {
        let illegal = || EngineError::IllegalMove {
            text: mv.to_string(),
            fen: self.to_fen(),
        };
        let position = self.position()?;
        let uci = UciMove::Normal {
            from: mv.from,
            to: mv.to,
            promotion: mv.promotion.map(PieceKind::to_role),
        };
        let played = uci.to_move(&position).map_err(|_| illegal())?;
        let captured = played
            .capture()
            .map(|role| Piece::new(self.side_to_move().opposite(), PieceKind::from_role(role)));
        let after = position.play(played).map_err(|_| illegal())?;
        self.setup = after.to_setup(EnPassantMode::Legal);
        self.promotion_pending = false;
        Ok(captured)
    }

    /// Hand the move to the opponent without moving a piece
    pub fn pass_turn(&mut self) {
        let setup = &mut self.setup;
        setup.ep_square = None;
        setup.halfmoves = setup.halfmoves.saturating_add(1);
        if setup.turn == Color::Black {
            setup.fullmoves = setup.fullmoves.saturating_add(1);
        }
        setup.turn = !setup.turn;
        self.promotion_pending = false;
    }
}

/// Position identity used to compare FEN strings from different producers:
/// placement, side to move and castling rights. Move counters and en passant
/// notation vary between encoders and are ignored.
pub fn fen_key(fen: &str) -> String {
    let mut fields = fen.split_whitespace();
    let placement = fields.next().unwrap_or("");
    let side = fields.next().unwrap_or("w");
    let castling = fields.next().unwrap_or("-");
    format!("{} {} {}", placement, side, castling)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mv(from: Square, to: Square) -> MoveRecord {
        MoveRecord::new(from, to)
    }

    fn fen_of(position: &Chess) -> String {
        Fen::from_position(&position.clone(), EnPassantMode::Legal).to_string()
    }

    #[test]
    fn test_start_fen_round_trip() {
        let board = BoardState::initial(PieceColor::Black);
        assert_eq!(board.to_fen(), START_FEN);
        assert_eq!(BoardState::from_fen(START_FEN, PieceColor::Black).unwrap(), board);
    }

    #[test]
    fn test_short_fen_fills_defaults() {
        let board = BoardState::from_fen(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq",
            PieceColor::Black,
        )
        .unwrap();
        assert_eq!(board.to_fen(), START_FEN);
    }

    #[test]
    fn test_invalid_fens() {
        let upper = PieceColor::Black;
        assert_eq!(BoardState::from_fen("", upper), Err(FenError::Empty));
        assert_eq!(BoardState::from_fen("   ", upper), Err(FenError::Empty));
        for fen in [
            "8/8/8/8/8/8/8 w",
            "9/8/8/8/8/8/8/8 w",
            "8/8/8/8/8/8/8/7x w",
            "8/8/8/8/8/8/8/8 x",
        ] {
            assert!(
                matches!(BoardState::from_fen(fen, upper), Err(FenError::Invalid { .. })),
                "{}",
                fen
            );
        }
    }

    #[test]
    fn test_double_push_without_capturer_has_no_en_passant() {
        let mut board = BoardState::initial(PieceColor::Black);
        assert_eq!(board.apply(&mv(Square::E2, Square::E4)).unwrap(), None);
        assert_eq!(board.side_to_move(), PieceColor::Black);
        assert_eq!(
            board.to_fen(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
        );
    }

    #[test]
    fn test_en_passant_capture_removes_pawn() {
        let mut board =
            BoardState::from_fen("4k3/3p4/8/4P3/8/8/8/4K3 b - - 0 1", PieceColor::Black).unwrap();
        board.apply(&mv(Square::D7, Square::D5)).unwrap();
        assert!(board.to_fen().contains(" d6 "));
        let captured = board.apply(&mv(Square::E5, Square::D6)).unwrap();
        assert_eq!(captured, Some(Piece::new(PieceColor::Black, PieceKind::Pawn)));
        assert!(board.piece_at(Square::D5).is_none());
    }

    #[test]
    fn test_castle_moves_rook_and_clears_rights() {
        let mut board =
            BoardState::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1", PieceColor::Black).unwrap();
        assert!(board.is_castle_move(Square::E1, Square::G1));
        board.apply(&mv(Square::E1, Square::G1)).unwrap();
        assert_eq!(
            board.piece_at(Square::F1),
            Some(Piece::new(PieceColor::White, PieceKind::Rook))
        );
        assert!(board.piece_at(Square::H1).is_none());
        assert_eq!(board.to_fen(), "r3k2r/8/8/8/8/8/8/R4RK1 b kq - 1 1");

        board.apply(&mv(Square::E8, Square::C8)).unwrap();
        assert_eq!(board.to_fen(), "2kr3r/8/8/8/8/8/8/R4RK1 w - - 2 2");
    }

    #[test]
    fn test_rook_capture_clears_corner_right() {
        let mut board =
            BoardState::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1", PieceColor::Black).unwrap();
        let captured = board.apply(&mv(Square::A1, Square::A8)).unwrap();
        assert_eq!(captured, Some(Piece::new(PieceColor::Black, PieceKind::Rook)));
        assert_eq!(board.to_fen(), "R3k2r/8/8/8/8/8/8/4K2R b Kk - 0 1");
    }

    #[test]
    fn test_promotion_places_chosen_piece() {
        let mut board =
            BoardState::from_fen("8/4P3/8/8/8/8/8/k3K3 w - - 0 1", PieceColor::Black).unwrap();
        assert!(board.is_promotion_trigger(Square::E7, Square::E8));
        let mut record = mv(Square::E7, Square::E8);
        record.promotion = Some(PieceKind::Knight);
        board.apply(&record).unwrap();
        assert_eq!(
            board.piece_at(Square::E8),
            Some(Piece::new(PieceColor::White, PieceKind::Knight))
        );
        assert_eq!(board.side_to_move(), PieceColor::Black);
    }

    #[test]
    fn test_illegal_move_leaves_board_alone() {
        let mut board = BoardState::initial(PieceColor::Black);
        let before = board.clone();
        assert!(matches!(
            board.apply(&mv(Square::E2, Square::E5)),
            Err(EngineError::IllegalMove { .. })
        ));
        assert!(board.apply(&mv(Square::E7, Square::E5)).is_err());
        assert_eq!(board, before);
    }

    #[test]
    fn test_pass_turn() {
        let mut board = BoardState::initial(PieceColor::Black);
        board.apply(&mv(Square::E2, Square::E4)).unwrap();
        board.pass_turn();
        assert_eq!(board.side_to_move(), PieceColor::White);
        assert_eq!(board.fullmove_number(), 2);
        assert_eq!(
            board.to_fen(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 1 2"
        );
    }

    #[test]
    fn test_fen_round_trips_at_every_ply() {
        // castle, en passant, promotion and a pass all happen on this line
        let line = [
            "e2e4", "g8f6", "e4e5", "d7d5", "e5d6", "----", "d6c7", "e7e6", "c7b8q", "f8e7",
            "g1f3", "e8g8", "b8a7",
        ];
        let upper = PieceColor::White;
        let mut board = BoardState::initial(upper);
        let mut shadow = Chess::default();
        for text in line {
            if text == "----" {
                board.pass_turn();
                let mut setup = shadow.clone().to_setup(EnPassantMode::Legal);
                if setup.turn == Color::Black {
                    setup.fullmoves = setup.fullmoves.saturating_add(1);
                }
                setup.turn = !setup.turn;
                setup.halfmoves += 1;
                setup.ep_square = None;
                shadow = Chess::from_setup(setup, CastlingMode::Standard).unwrap();
            } else {
                let uci: UciMove = text.parse().unwrap();
                let m = uci.to_move(&shadow).unwrap();
                let UciMove::Normal { from, to, promotion } = uci else {
                    panic!("{} is not a board move", text);
                };
                let record = MoveRecord {
                    promotion: promotion.map(PieceKind::from_role),
                    ..mv(from, to)
                };
                board.apply(&record).unwrap();
                shadow = shadow.play(m).unwrap();
            }
            let fen = board.to_fen();
            assert_eq!(fen, fen_of(&shadow), "after {}", text);
            let reread = BoardState::from_fen(&fen, upper).unwrap();
            assert_eq!(reread, board, "after {}", text);
            assert_eq!(reread.to_fen(), fen);
        }
        assert_eq!(board.piece_at(Square::G8), Some(Piece::new(PieceColor::Black, PieceKind::King)));
        assert_eq!(board.piece_at(Square::F8), Some(Piece::new(PieceColor::Black, PieceKind::Rook)));
        assert_eq!(board.piece_at(Square::A7), Some(Piece::new(PieceColor::White, PieceKind::Queen)));
    }

    #[test]
    fn test_view_grid_follows_orientation() {
        let standard = BoardState::initial(PieceColor::Black);
        let flipped = BoardState::initial(PieceColor::White);
        assert_eq!(standard.view_grid()[7][4], Some(Piece::new(PieceColor::White, PieceKind::King)));
        assert_eq!(flipped.view_grid()[7][3], Some(Piece::new(PieceColor::Black, PieceKind::King)));
        assert_eq!(standard.to_fen(), flipped.to_fen());
    }

    #[test]
    fn test_fen_key_ignores_counters() {
        assert_eq!(
            fen_key("8/8/8/8/8/8/8/K6k w - - 0 1"),
            fen_key("8/8/8/8/8/8/8/K6k w - - 12 40")
        );
        assert_ne!(
            fen_key("8/8/8/8/8/8/8/K6k w - -"),
            fen_key("8/8/8/8/8/8/8/K6k b - -")
        );
    }
}
