//! Match configuration.
//!
//! Configurations are plain serde structs with defaults, so a partial JSON
//! document is enough to describe a match. The JSON schema is available for
//! front ends through [`MatchConfig::json_schema`].

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::domain::board::{BoardState, START_FEN, fen_key};
use crate::domain::chess::PieceColor;
use crate::error::MatchError;

/// Environment variable overriding the external engine binary
pub const ENGINE_PATH_ENV: &str = "CHESS_ENGINE_PATH";

/// Remaining-time value meaning "no limit"
pub const INFINITE_TIME: i64 = -1;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// One human (bottom side) against the engine
    #[default]
    SinglePlayer,
    /// Two humans sharing the device
    TwoPlayer,
    /// Networked match against a remote player
    Online,
    /// Engine against engine, no human input
    Autoplay,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnMode {
    /// Turn clock restarts on every move; its expiry forfeits the match
    #[default]
    Normal,
    /// Fixed turn windows; an expired window costs the turn, not the match
    Alternately,
}

/// Engine strength, mapped onto a legality provider backend
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    /// Weak random/greedy play
    Novice,
    /// Built-in material search
    #[default]
    Standard,
    /// External UCI engine
    Full,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TimeControl {
    /// Per-turn limit in milliseconds, -1 for none
    pub turn_ms: i64,
    /// Per-player budget in milliseconds, -1 for none
    pub player_ms: i64,
    /// Added to the mover's budget after each move
    pub increment_ms: i64,
}

impl Default for TimeControl {
    fn default() -> Self {
        Self {
            turn_ms: INFINITE_TIME,
            player_ms: INFINITE_TIME,
            increment_ms: 0,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to a UCI engine binary, used by `Difficulty::Full`
    pub uci_path: Option<PathBuf>,
    pub search_depth: u32,
    pub hint_depth: u32,
    pub move_timeout_ms: u64,
    /// Seed for the novice engine; random when absent
    pub novice_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            uci_path: None,
            search_depth: 3,
            hint_depth: 2,
            move_timeout_ms: 2_000,
            novice_seed: None,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MatchConfig {
    pub mode: GameMode,
    pub difficulty: Difficulty,
    pub time: TimeControl,
    pub turn_mode: TurnMode,
    /// The human plays black, so white is drawn on top
    pub flipped_pieces: bool,
    /// Ply ceiling after which the match is drawn
    pub max_moves: Option<u32>,
    /// Custom starting position; absent means the standard one
    pub start_fen: Option<String>,
    pub engine: EngineConfig,
}

impl MatchConfig {
    pub fn from_json(text: &str) -> Result<Self, MatchError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| MatchError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// JSON schema of the configuration document
    pub fn json_schema() -> String {
        let schema = schemars::schema_for!(MatchConfig);
        serde_json::to_string_pretty(&schema).unwrap_or_default()
    }

    /// Apply `CHESS_ENGINE_PATH` if it is set
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(path) = std::env::var_os(ENGINE_PATH_ENV) {
            self.engine.uci_path = Some(PathBuf::from(path));
        }
        self
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.engine.search_depth == 0 {
            return Err(MatchError::Config("search_depth must be at least 1".into()));
        }
        let limit_ok = |ms: i64| ms > 0 || ms == INFINITE_TIME;
        if !limit_ok(self.time.turn_ms) || !limit_ok(self.time.player_ms) {
            return Err(MatchError::Config("time limits must be positive or -1".into()));
        }
        if self.time.increment_ms < 0 {
            return Err(MatchError::Config("increment_ms must not be negative".into()));
        }
        if self.mode == GameMode::Online {
            return Err(MatchError::Config(
                "online matches are configured with OnlineConfig".into(),
            ));
        }
        BoardState::from_fen(self.start_fen(), self.upper_color())?;
        Ok(())
    }

    pub fn start_fen(&self) -> &str {
        self.start_fen.as_deref().unwrap_or(START_FEN)
    }

    /// Color drawn at the top of the board
    pub fn upper_color(&self) -> PieceColor {
        if self.flipped_pieces {
            PieceColor::White
        } else {
            PieceColor::Black
        }
    }

    /// Whether moves for `color` come from an engine rather than a person
    pub fn is_engine_side(&self, color: PieceColor) -> bool {
        match self.mode {
            GameMode::SinglePlayer => color == self.upper_color(),
            GameMode::TwoPlayer | GameMode::Online => false,
            GameMode::Autoplay => true,
        }
    }

    /// Only matches from the standard initial position affect ratings
    pub fn is_rank_eligible(&self) -> bool {
        fen_key(self.start_fen()) == fen_key(START_FEN)
    }
}

/// How the local player's color is decided in an online match
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ColorAssignment {
    #[default]
    White,
    Black,
    /// Assigned by the server once the match starts
    Random,
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct OnlineConfig {
    pub match_id: String,
    pub player_id: String,
    pub color: ColorAssignment,
    pub turn_mode: TurnMode,
    pub start_fen: Option<String>,
}

impl OnlineConfig {
    pub fn start_fen(&self) -> &str {
        self.start_fen.as_deref().unwrap_or(START_FEN)
    }

    /// The color known at creation time, if not random
    pub fn fixed_color(&self) -> Option<PieceColor> {
        match self.color {
            ColorAssignment::White => Some(PieceColor::White),
            ColorAssignment::Black => Some(PieceColor::Black),
            ColorAssignment::Random => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MatchConfig::default();
        assert_eq!(config.mode, GameMode::SinglePlayer);
        assert_eq!(config.time.turn_ms, INFINITE_TIME);
        assert_eq!(config.upper_color(), PieceColor::Black);
        assert!(config.is_rank_eligible());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = MatchConfig::from_json(
            r#"{ "mode": "two_player", "turn_mode": "ALTERNATELY", "time": { "turn_ms": 30000 } }"#,
        )
        .unwrap();
        assert_eq!(config.mode, GameMode::TwoPlayer);
        assert_eq!(config.turn_mode, TurnMode::Alternately);
        assert_eq!(config.time.turn_ms, 30_000);
        assert_eq!(config.time.player_ms, INFINITE_TIME);
        assert_eq!(config.engine.search_depth, 3);
    }

    #[test]
    fn test_rejects_bad_config() {
        assert!(MatchConfig::from_json(r#"{ "engine": { "search_depth": 0 } }"#).is_err());
        assert!(MatchConfig::from_json(r#"{ "start_fen": "not a fen" }"#).is_err());
        assert!(MatchConfig::from_json(r#"{ "mode": "online" }"#).is_err());
    }

    #[test]
    fn test_time_limits_are_positive_or_infinite() {
        for (turn_ms, player_ms) in [(0, -1), (-1, 0), (-5, -1), (-1, -2), (i64::MIN, 1_000)] {
            let config = MatchConfig {
                time: TimeControl {
                    turn_ms,
                    player_ms,
                    increment_ms: 0,
                },
                ..MatchConfig::default()
            };
            assert!(config.validate().is_err(), "{} / {}", turn_ms, player_ms);
        }
        let ok = MatchConfig {
            time: TimeControl {
                turn_ms: 1,
                player_ms: -1,
                increment_ms: 2_000,
            },
            ..MatchConfig::default()
        };
        assert!(ok.validate().is_ok());
        assert!(MatchConfig::from_json(r#"{ "time": { "increment_ms": -1 } }"#).is_err());
    }

    #[test]
    fn test_engine_sides() {
        let single = MatchConfig::default();
        assert!(single.is_engine_side(PieceColor::Black));
        assert!(!single.is_engine_side(PieceColor::White));

        let flipped = MatchConfig {
            flipped_pieces: true,
            ..MatchConfig::default()
        };
        assert!(flipped.is_engine_side(PieceColor::White));

        let two = MatchConfig {
            mode: GameMode::TwoPlayer,
            ..MatchConfig::default()
        };
        assert!(!two.is_engine_side(PieceColor::White));
        assert!(!two.is_engine_side(PieceColor::Black));
    }

    #[test]
    fn test_custom_start_is_not_rank_eligible() {
        let config = MatchConfig {
            start_fen: Some("4k3/8/8/8/8/8/8/4K2R w K - 0 1".to_string()),
            ..MatchConfig::default()
        };
        assert!(!config.is_rank_eligible());
    }

    #[test]
    fn test_schema_mentions_fields() {
        let schema = MatchConfig::json_schema();
        assert!(schema.contains("turn_mode"));
        assert!(schema.contains("flipped_pieces"));
    }
}
