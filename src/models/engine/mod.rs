//! Legality adapters.
//!
//! A [`LegalityProvider`] is selected once per side when a match is
//! configured. All variants answer legality from their shakmaty [`Rules`];
//! they differ only in where best-move suggestions come from. Searches run
//! off the calling thread and report through a [`BestMoveReply`].

mod novice;
mod rules;
mod uci;

use std::thread;
use std::time::Duration;

use log::{debug, warn};
use shakmaty::Square;

pub use novice::NoviceEngine;
pub use rules::{Rules, search_best_move, to_record};
pub use uci::UciEngine;

use crate::config::{Difficulty, EngineConfig};
use crate::domain::chess::PieceColor;
use crate::domain::moves::MoveRecord;
use crate::domain::outcome::PositionStatus;
use crate::error::EngineError;

/// Callback for a finished search: move text, or `None` if the engine found
/// no move. Called on a worker thread.
pub type BestMoveReply = Box<dyn FnOnce(Result<Option<String>, EngineError>) + Send + 'static>;

#[derive(Debug)]
pub enum LegalityProvider {
    /// Built-in material search (also the human side's move checker)
    Rules(Rules),
    Novice(NoviceEngine),
    Uci(UciEngine),
}

impl LegalityProvider {
    /// Provider for a human side: legality plus hints
    pub fn human() -> Self {
        LegalityProvider::Rules(Rules::new())
    }

    /// Provider for an engine side. A full-strength request without a usable
    /// UCI binary falls back to the built-in search.
    pub fn for_difficulty(difficulty: Difficulty, config: &EngineConfig) -> Self {
        match difficulty {
            Difficulty::Novice => LegalityProvider::Novice(NoviceEngine::new(config.novice_seed)),
            Difficulty::Standard => LegalityProvider::Rules(Rules::new()),
            Difficulty::Full => match &config.uci_path {
                Some(path) => match UciEngine::start(path) {
                    Ok(engine) => LegalityProvider::Uci(engine),
                    Err(e) => {
                        warn!("falling back to built-in search: {}", e);
                        LegalityProvider::Rules(Rules::new())
                    }
                },
                None => {
                    warn!("no UCI engine configured, falling back to built-in search");
                    LegalityProvider::Rules(Rules::new())
                }
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LegalityProvider::Rules(_) => "rules",
            LegalityProvider::Novice(_) => "novice",
            LegalityProvider::Uci(_) => "uci",
        }
    }

    fn rules(&self) -> &Rules {
        match self {
            LegalityProvider::Rules(rules) => rules,
            LegalityProvider::Novice(engine) => &engine.rules,
            LegalityProvider::Uci(engine) => &engine.rules,
        }
    }

    fn rules_mut(&mut self) -> &mut Rules {
        match self {
            LegalityProvider::Rules(rules) => rules,
            LegalityProvider::Novice(engine) => &mut engine.rules,
            LegalityProvider::Uci(engine) => &mut engine.rules,
        }
    }

    pub fn set_position(&mut self, fen: &str) -> Result<(), EngineError> {
        self.rules_mut().set_position(fen)
    }

    pub fn fen(&self) -> &str {
        self.rules().fen()
    }

    pub fn side_to_move(&self) -> PieceColor {
        self.rules().side_to_move()
    }

    pub fn legal_moves(&self) -> Vec<MoveRecord> {
        self.rules().legal_moves()
    }

    pub fn legal_moves_from(&self, from: Square) -> Vec<MoveRecord> {
        self.rules().legal_moves_from(from)
    }

    pub fn moves_between(&self, from: Square, to: Square) -> Vec<MoveRecord> {
        self.rules().moves_between(from, to)
    }

    pub fn status(&self) -> PositionStatus {
        self.rules().status()
    }

    /// Validate adapter move text against the current position
    pub fn resolve(&self, text: &str) -> Result<MoveRecord, EngineError> {
        self.rules().resolve(text)
    }

    /// Start a search for the current position. `reply` runs on a worker
    /// thread once the search completes.
    pub fn request_best_move(&mut self, depth: u32, timeout: Duration, reply: BestMoveReply) {
        debug!("{} search depth {} for {}", self.name(), depth, self.fen());
        match self {
            LegalityProvider::Rules(rules) => {
                let position = rules.position().clone();
                thread::spawn(move || reply(Ok(search_best_move(&position, depth, timeout))));
            }
            LegalityProvider::Novice(engine) => {
                let position = engine.rules.position().clone();
                let seed = engine.next_seed();
                thread::spawn(move || reply(Ok(novice::pick_move(&position, seed))));
            }
            LegalityProvider::Uci(engine) => engine.request_best_move(depth, timeout, reply),
        }
    }
}

/// One provider per color, so engine state is never shared across sides
#[derive(Debug)]
pub struct EnginePair {
    white: LegalityProvider,
    black: LegalityProvider,
}

impl EnginePair {
    pub fn new(white: LegalityProvider, black: LegalityProvider) -> Self {
        Self { white, black }
    }

    pub fn get(&self, color: PieceColor) -> &LegalityProvider {
        match color {
            PieceColor::White => &self.white,
            PieceColor::Black => &self.black,
        }
    }

    pub fn get_mut(&mut self, color: PieceColor) -> &mut LegalityProvider {
        match color {
            PieceColor::White => &mut self.white,
            PieceColor::Black => &mut self.black,
        }
    }

    /// Load the same position into both providers
    pub fn set_position(&mut self, fen: &str) -> Result<(), EngineError> {
        self.white.set_position(fen)?;
        self.black.set_position(fen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::board::BoardState;
    use crate::domain::chess::{Coord, Piece, PieceKind};
    use crossbeam_channel::bounded;

    const CASTLE_FEN_WHITE: &str = "r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1";
    const CASTLE_FEN_BLACK: &str = "r3k2r/8/8/8/8/8/8/R3K2R b KQkq - 0 1";

    /// Castle by clicking view coordinates, the way the presentation layer
    /// does, and check where king and rook land in view coordinates.
    fn castle_via_view(
        fen: &str,
        upper: PieceColor,
        king_from: Square,
        king_to: Square,
        rook_to: Square,
    ) {
        let mut board = BoardState::from_fen(fen, upper).unwrap();
        let mut provider = LegalityProvider::human();
        provider.set_position(fen).unwrap();
        let o = board.orientation();

        let from_view: Coord = o.to_coord(king_from);
        let to_view: Coord = o.to_coord(king_to);
        let from = o.to_square(from_view).unwrap();
        let to = o.to_square(to_view).unwrap();

        let color = provider.side_to_move();
        let candidates = provider.moves_between(from, to);
        assert_eq!(candidates.len(), 1, "castle {}{} under {:?}", king_from, king_to, upper);
        assert!(candidates[0].is_castle);

        board.apply(&candidates[0]).unwrap();
        assert_eq!(
            board.piece_at_coord(to_view),
            Some(Piece::new(color, PieceKind::King))
        );
        assert_eq!(
            board.piece_at_coord(o.to_coord(rook_to)),
            Some(Piece::new(color, PieceKind::Rook))
        );
        provider.set_position(&board.to_fen()).unwrap();
    }

    #[test]
    fn test_all_castles_under_both_orientations() {
        for upper in [PieceColor::Black, PieceColor::White] {
            castle_via_view(CASTLE_FEN_WHITE, upper, Square::E1, Square::G1, Square::F1);
            castle_via_view(CASTLE_FEN_WHITE, upper, Square::E1, Square::C1, Square::D1);
            castle_via_view(CASTLE_FEN_BLACK, upper, Square::E8, Square::G8, Square::F8);
            castle_via_view(CASTLE_FEN_BLACK, upper, Square::E8, Square::C8, Square::D8);
        }
    }

    #[test]
    fn test_flipped_view_coordinates_for_castle() {
        // white on top: the white king sits on row 0, column 3
        let o = BoardState::initial(PieceColor::White).orientation();
        assert_eq!(o.to_coord(Square::E1), Coord::new(0, 3));
        assert_eq!(o.to_coord(Square::G1), Coord::new(0, 1));
    }

    #[test]
    fn test_rules_provider_replies_on_worker() {
        let mut provider = LegalityProvider::human();
        let (tx, rx) = bounded(1);
        provider.request_best_move(
            1,
            Duration::from_secs(2),
            Box::new(move |result| {
                let _ = tx.send((thread::current().id(), result));
            }),
        );
        let (thread_id, result) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(thread_id, thread::current().id());
        let text = result.unwrap().unwrap();
        assert!(provider.resolve(&text).is_ok());
    }

    #[test]
    fn test_novice_provider_replies() {
        let config = EngineConfig {
            novice_seed: Some(3),
            ..EngineConfig::default()
        };
        let mut provider = LegalityProvider::for_difficulty(Difficulty::Novice, &config);
        assert_eq!(provider.name(), "novice");
        let (tx, rx) = bounded(1);
        provider.request_best_move(1, Duration::from_secs(1), Box::new(move |r| {
            let _ = tx.send(r);
        }));
        let text = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap().unwrap();
        assert!(provider.resolve(&text).is_ok());
    }

    #[test]
    fn test_full_without_binary_falls_back() {
        let provider = LegalityProvider::for_difficulty(Difficulty::Full, &EngineConfig::default());
        assert_eq!(provider.name(), "rules");
    }

    #[test]
    fn test_engine_pair_shares_position() {
        let mut pair = EnginePair::new(LegalityProvider::human(), LegalityProvider::human());
        pair.set_position("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1")
            .unwrap();
        assert_eq!(pair.get(PieceColor::White).side_to_move(), PieceColor::Black);
        assert_eq!(pair.get(PieceColor::Black).fen(), pair.get(PieceColor::White).fen());
    }
}
