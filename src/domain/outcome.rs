//! Result evaluation: board state + mode -> match outcome.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::GameMode;
use crate::domain::board::BoardState;
use crate::domain::chess::PieceColor;

/// Outcome of a match. `Victory`/`Lose` are relative to the local human and
/// are only produced in single-player mode.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchResult {
    #[default]
    None,
    Drawn,
    WhiteVictory,
    BlackVictory,
    Victory,
    Lose,
}

impl MatchResult {
    pub fn is_terminal(self) -> bool {
        self != MatchResult::None
    }

    /// Victory for `winner`, expressed in the vocabulary of `mode`. In
    /// single-player mode the human is the side drawn at the bottom.
    pub fn victory_for(winner: PieceColor, mode: GameMode, upper: PieceColor) -> Self {
        match mode {
            GameMode::SinglePlayer => {
                if winner == upper.opposite() {
                    MatchResult::Victory
                } else {
                    MatchResult::Lose
                }
            }
            GameMode::TwoPlayer | GameMode::Online | GameMode::Autoplay => match winner {
                PieceColor::White => MatchResult::WhiteVictory,
                PieceColor::Black => MatchResult::BlackVictory,
            },
        }
    }
}

/// What the legality adapter reports about the side to move
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PositionStatus {
    pub has_legal_moves: bool,
    pub in_check: bool,
    pub insufficient_material: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct EvalContext {
    pub mode: GameMode,
    pub plies_played: u32,
    /// Ply ceiling; reaching it without a decision is a draw
    pub max_moves: Option<u32>,
}

pub fn evaluate(board: &BoardState, status: PositionStatus, ctx: &EvalContext) -> MatchResult {
    if !status.has_legal_moves {
        if status.in_check {
            let winner = board.side_to_move().opposite();
            return MatchResult::victory_for(winner, ctx.mode, board.upper_color());
        }
        return MatchResult::Drawn;
    }
    if status.insufficient_material {
        return MatchResult::Drawn;
    }
    match ctx.max_moves {
        Some(cap) if ctx.plies_played >= cap => MatchResult::Drawn,
        _ => MatchResult::None,
    }
}
