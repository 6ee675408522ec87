//! The slice of the UCI protocol used to ask an external engine for a move.
//!
//! Process spawning lives in the models layer.

use std::fmt;

/// Commands the adapter sends to an engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciCommand {
    Uci,
    IsReady,
    UciNewGame,
    /// Always a full FEN; the adapter keeps no move list of its own
    Position(String),
    Go { depth: u32, movetime_ms: u64 },
    Stop,
    Quit,
}

impl fmt::Display for UciCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UciCommand::Uci => f.write_str("uci"),
            UciCommand::IsReady => f.write_str("isready"),
            UciCommand::UciNewGame => f.write_str("ucinewgame"),
            UciCommand::Position(fen) => write!(f, "position fen {}", fen),
            UciCommand::Go { depth, movetime_ms } => {
                write!(f, "go depth {} movetime {}", depth, movetime_ms)
            }
            UciCommand::Stop => f.write_str("stop"),
            UciCommand::Quit => f.write_str("quit"),
        }
    }
}

/// One line of engine output, as far as the adapter cares
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineLine {
    /// The move text, or `None` for `bestmove (none)`
    BestMove(Option<String>),
    /// Handshake, `info` and anything else
    Other,
}

impl EngineLine {
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        if words.next() != Some("bestmove") {
            return EngineLine::Other;
        }
        // a trailing "ponder <move>" is ignored
        let best = words
            .next()
            .filter(|m| *m != "(none)" && *m != "0000")
            .map(str::to_string);
        EngineLine::BestMove(best)
    }
}
