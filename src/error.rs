//! Error types for the match core.
//!
//! Adapter and FEN errors are fatal for the match that raised them; transport
//! errors are recoverable and only logged. Invalid user input is never an
//! error: controllers treat it as a no-op.

/// Errors raised while decoding a FEN string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FenError {
    #[error("FEN is empty")]
    Empty,

    #[error("invalid FEN '{fen}': {reason}")]
    Invalid { fen: String, reason: String },
}

/// Errors raised while decoding coordinate move text (`e2e4`, `e7e8q`)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveTextError {
    #[error("move text '{0}' must be 4 or 5 characters")]
    Length(String),

    #[error("invalid square in move text '{0}'")]
    Square(String),

    #[error("invalid promotion piece in move text '{0}'")]
    Promotion(String),
}

/// Legality adapter protocol violations and backend failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("adapter rejected position '{fen}': {reason}")]
    Position { fen: String, reason: String },

    #[error("adapter returned unparseable move '{text}'")]
    Unparseable { text: String },

    #[error("adapter returned illegal move '{text}' for position '{fen}'")]
    IllegalMove { text: String, fen: String },

    #[error("adapter returned no move for '{fen}' although legal moves exist")]
    NoMove { fen: String },

    #[error("engine process failed: {0}")]
    Process(String),

    #[error("engine did not answer within {0} ms")]
    Timeout(u64),
}

/// Match transport failures (recoverable)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("server rejected move '{text}' for match {match_id}: {reason}")]
    Rejected {
        match_id: String,
        text: String,
        reason: String,
    },

    #[error("transport is not connected to match {0}")]
    NotSubscribed(String),

    #[error("snapshot could not be decoded: {0}")]
    Decode(String),
}

/// Errors surfaced by match controllers
#[derive(Debug, Clone, thiserror::Error)]
pub enum MatchError {
    #[error(transparent)]
    Fen(#[from] FenError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("saved move '{text}' is not legal at ply {ply}")]
    CorruptRecord { text: String, ply: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("match record could not be read or written: {0}")]
    Record(String),
}
