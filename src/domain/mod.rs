pub mod board;
pub mod chess;
pub mod moves;
pub mod outcome;
pub mod uci;

pub use board::{BoardState, START_FEN, fen_key};
pub use chess::{Coord, Orientation, Piece, PieceColor, PieceKind, shakmaty_to_piece};
pub use moves::{MoveHistory, MoveNode, MoveRecord, MoveText};
pub use outcome::{EvalContext, MatchResult, PositionStatus, evaluate};
