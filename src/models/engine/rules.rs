//! Rules backend: shakmaty-driven legality plus a small material search.
//!
//! Every adapter owns one of these; it is the legality authority even for
//! backends whose move suggestions come from elsewhere.

use std::time::{Duration, Instant};

use log::debug;
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, File, Move, Position, Role, Square};

use crate::domain::chess::{PieceColor, PieceKind, file_index, rank_index, square_at};
use crate::domain::moves::{MoveRecord, MoveText};
use crate::domain::outcome::PositionStatus;
use crate::error::EngineError;

const MATE_SCORE: i32 = 100_000;

#[derive(Clone, Debug)]
pub struct Rules {
    position: Chess,
    fen: String,
}

impl Rules {
    pub fn new() -> Self {
        let position = Chess::default();
        Self {
            fen: crate::domain::START_FEN.to_string(),
            position,
        }
    }

    pub fn set_position(&mut self, fen: &str) -> Result<(), EngineError> {
        let setup: Fen = fen.parse().map_err(|e: shakmaty::fen::ParseFenError| {
            EngineError::Position {
                fen: fen.to_string(),
                reason: e.to_string(),
            }
        })?;
        let position: Chess =
            setup
                .into_position(CastlingMode::Standard)
                .map_err(|e| EngineError::Position {
                    fen: fen.to_string(),
                    reason: e.to_string(),
                })?;
        self.position = position;
        self.fen = fen.to_string();
        Ok(())
    }

    pub fn position(&self) -> &Chess {
        &self.position
    }

    pub fn fen(&self) -> &str {
        &self.fen
    }

    pub fn side_to_move(&self) -> PieceColor {
        PieceColor::from_shakmaty(self.position.turn())
    }

    pub fn legal_moves(&self) -> Vec<MoveRecord> {
        self.position.legal_moves().iter().filter_map(to_record).collect()
    }

    pub fn legal_moves_from(&self, from: Square) -> Vec<MoveRecord> {
        self.legal_moves().into_iter().filter(|m| m.from == from).collect()
    }

    /// All legal records for a from/to pair: one, or four for a promotion
    pub fn moves_between(&self, from: Square, to: Square) -> Vec<MoveRecord> {
        self.legal_moves()
            .into_iter()
            .filter(|m| m.from == from && m.to == to)
            .collect()
    }

    pub fn status(&self) -> PositionStatus {
        PositionStatus {
            has_legal_moves: !self.position.legal_moves().is_empty(),
            in_check: self.position.is_check(),
            insufficient_material: self.position.is_insufficient_material(),
        }
    }

    /// Turn adapter move text into a legal record for the current position.
    /// Castling written as king-takes-rook or as any long king slide along the
    /// back rank is rewritten to the two-square form first.
    pub fn resolve(&self, text: &str) -> Result<MoveRecord, EngineError> {
        let parsed: MoveText = text.parse().map_err(|_| EngineError::Unparseable {
            text: text.to_string(),
        })?;
        let parsed = self.normalize_castle(parsed);
        self.legal_moves()
            .into_iter()
            .find(|m| m.matches(&parsed))
            .ok_or_else(|| EngineError::IllegalMove {
                text: text.to_string(),
                fen: self.fen.clone(),
            })
    }

    fn normalize_castle(&self, text: MoveText) -> MoveText {
        let mover = self.position.turn();
        let is_king = self
            .position
            .board()
            .piece_at(text.from)
            .is_some_and(|p| p.role == Role::King && p.color == mover);
        let back_rank = PieceColor::from_shakmaty(mover).back_rank();
        let (from_file, to_file) = (file_index(text.from), file_index(text.to));

        if is_king
            && rank_index(text.from) == back_rank
            && rank_index(text.to) == back_rank
            && from_file.abs_diff(to_file) >= 2
        {
            let target = if to_file > from_file { 6 } else { 2 };
            return MoveText {
                to: square_at(target, back_rank),
                ..text
            };
        }
        text
    }
}

impl Default for Rules {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a shakmaty move into a record. Castles use the king's two-square
/// destination, which is how the presentation layer and move text express them.
pub fn to_record(m: &Move) -> Option<MoveRecord> {
    match m {
        Move::Normal {
            role,
            from,
            capture,
            to,
            promotion,
        } => Some(MoveRecord {
            from: *from,
            to: *to,
            promotion: promotion.map(PieceKind::from_role),
            is_castle: false,
            is_capture: capture.is_some(),
            is_promotion_trigger: *role == Role::Pawn && promotion.is_some(),
        }),
        Move::EnPassant { from, to } => Some(MoveRecord {
            is_capture: true,
            ..MoveRecord::new(*from, *to)
        }),
        Move::Castle { king, rook } => {
            let file = if rook.file() == File::H { File::G } else { File::C };
            Some(MoveRecord {
                is_castle: true,
                ..MoveRecord::new(*king, Square::from_coords(file, king.rank()))
            })
        }
        Move::Put { .. } => None,
    }
}

fn role_value(role: Role) -> i32 {
    match role {
        Role::Pawn => 100,
        Role::Knight => 320,
        Role::Bishop => 330,
        Role::Rook => 500,
        Role::Queen => 900,
        Role::King => 0,
    }
}

/// Material balance from the side to move's point of view
pub fn material(pos: &Chess) -> i32 {
    let turn = pos.turn();
    let mut score = 0;
    for idx in 0..64u32 {
        if let Some(piece) = pos.board().piece_at(Square::new(idx)) {
            let value = role_value(piece.role);
            score += if piece.color == turn { value } else { -value };
        }
    }
    score
}

fn capture_value(m: &Move) -> i32 {
    match m {
        Move::Normal {
            capture: Some(role),
            ..
        } => role_value(*role),
        Move::EnPassant { .. } => role_value(Role::Pawn),
        _ => 0,
    }
}

fn ordered_moves(pos: &Chess) -> Vec<Move> {
    let mut moves: Vec<Move> = pos.legal_moves().iter().cloned().collect();
    moves.sort_by_key(|m| -capture_value(m));
    moves
}

/// Alpha-beta over material. `None` once the deadline has passed.
fn negamax(pos: &Chess, depth: u32, mut alpha: i32, beta: i32, deadline: Instant) -> Option<i32> {
    let moves = ordered_moves(pos);
    if moves.is_empty() {
        // more remaining depth means a sooner mate
        return Some(if pos.is_check() { -MATE_SCORE - depth as i32 } else { 0 });
    }
    if depth == 0 {
        return Some(material(pos));
    }
    if Instant::now() >= deadline {
        return None;
    }
    for m in moves {
        let Ok(child) = pos.clone().play(m) else {
            continue;
        };
        alpha = alpha.max(-negamax(&child, depth - 1, -beta, -alpha, deadline)?);
        if alpha >= beta {
            break;
        }
    }
    Some(alpha)
}

/// Fixed-depth material search. Returns move text, or `None` when the side
/// to move has no legal moves. On timeout the best root move so far wins.
pub fn search_best_move(pos: &Chess, depth: u32, timeout: Duration) -> Option<String> {
    let deadline = Instant::now() + timeout;
    let root = ordered_moves(pos);
    let mut best = root.first().and_then(to_record)?;
    let mut alpha = -MATE_SCORE * 2;
    for m in &root {
        let Ok(child) = pos.clone().play(m.clone()) else {
            continue;
        };
        let Some(score) = negamax(&child, depth.max(1) - 1, -MATE_SCORE * 2, -alpha, deadline)
        else {
            break;
        };
        if -score > alpha {
            alpha = -score;
            best = to_record(m).unwrap_or(best);
        }
    }
    debug!("search depth {} best {}", depth, best);
    Some(best.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(fen: &str) -> Rules {
        let mut rules = Rules::new();
        rules.set_position(fen).unwrap();
        rules
    }

    #[test]
    fn test_start_position_has_twenty_moves() {
        let rules = Rules::new();
        assert_eq!(rules.legal_moves().len(), 20);
        assert_eq!(rules.legal_moves_from(Square::G1).len(), 2);
    }

    #[test]
    fn test_rejects_bad_fen() {
        let mut rules = Rules::new();
        assert!(matches!(
            rules.set_position("rnbqkbnr/pppppppp w"),
            Err(EngineError::Position { .. })
        ));
        // the previous position survives a rejected update
        assert_eq!(rules.legal_moves().len(), 20);
    }

    #[test]
    fn test_resolve_plain_and_garbage() {
        let rules = Rules::new();
        let record = rules.resolve("e2e4").unwrap();
        assert!(!record.is_capture && !record.is_castle);
        assert!(matches!(rules.resolve("zz"), Err(EngineError::Unparseable { .. })));
        assert!(matches!(rules.resolve("e2e5"), Err(EngineError::IllegalMove { .. })));
    }

    #[test]
    fn test_promotion_yields_four_records() {
        let rules = rules("8/4P3/8/8/8/8/8/k3K3 w - - 0 1");
        let moves = rules.moves_between(Square::E7, Square::E8);
        assert_eq!(moves.len(), 4);
        assert!(moves.iter().all(|m| m.is_promotion_trigger));
        let queen = rules.resolve("e7e8q").unwrap();
        assert_eq!(queen.promotion, Some(PieceKind::Queen));
    }

    #[test]
    fn test_castle_dialects_normalize() {
        let white = rules("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1");
        for text in ["e1g1", "e1h1"] {
            let record = white.resolve(text).unwrap();
            assert!(record.is_castle);
            assert_eq!(record.to, Square::G1);
        }
        for text in ["e1c1", "e1a1", "e1b1"] {
            let record = white.resolve(text).unwrap();
            assert!(record.is_castle);
            assert_eq!(record.to, Square::C1);
        }

        let black = rules("r3k2r/8/8/8/8/8/8/R3K2R b KQkq - 0 1");
        assert_eq!(black.resolve("e8h8").unwrap().to, Square::G8);
        assert_eq!(black.resolve("e8a8").unwrap().to, Square::C8);
    }

    #[test]
    fn test_status_checkmate_and_stalemate() {
        // fool's mate
        let mated = rules("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3");
        let status = mated.status();
        assert!(!status.has_legal_moves);
        assert!(status.in_check);

        let stalemate = rules("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1");
        let status = stalemate.status();
        assert!(!status.has_legal_moves);
        assert!(!status.in_check);

        assert!(rules("8/8/8/4k3/8/8/8/4K3 w - - 0 1").status().insufficient_material);
    }

    #[test]
    fn test_search_takes_hanging_queen() {
        let pos = rules("4k3/8/8/3q4/8/8/3R4/4K3 w - - 0 1");
        let best = search_best_move(pos.position(), 2, Duration::from_secs(5)).unwrap();
        assert_eq!(best, "d2d5");
    }

    #[test]
    fn test_search_finds_mate_in_one() {
        let pos = rules("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1");
        let best = search_best_move(pos.position(), 2, Duration::from_secs(5)).unwrap();
        assert_eq!(best, "a1a8");
    }

    #[test]
    fn test_search_timeout_still_moves() {
        let pos = Rules::new();
        let best = search_best_move(pos.position(), 4, Duration::ZERO).unwrap();
        assert!(pos.resolve(&best).is_ok());
    }

    #[test]
    fn test_search_without_moves() {
        let pos = rules("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1");
        assert_eq!(search_best_move(pos.position(), 2, Duration::from_secs(1)), None);
    }
}
