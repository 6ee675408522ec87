//! Persisted match state, written on pause/exit and read back to resume.

use serde::{Deserialize, Serialize};

use crate::config::MatchConfig;
use crate::domain::outcome::MatchResult;
use crate::error::MatchError;
use crate::models::clock::ClockReadings;

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct MatchRecord {
    pub config: MatchConfig,
    pub result: MatchResult,
    /// Move texts from the start position, in order
    pub moves: Vec<String>,
    pub turn_ms: i64,
    pub white_ms: i64,
    pub black_ms: i64,
    /// A move was already made in the current turn window
    pub move_done: bool,
}

impl MatchRecord {
    pub fn clocks(&self) -> ClockReadings {
        ClockReadings {
            turn_ms: self.turn_ms,
            white_ms: self.white_ms,
            black_ms: self.black_ms,
        }
    }

    pub fn to_json(&self) -> Result<String, MatchError> {
        serde_json::to_string_pretty(self).map_err(|e| MatchError::Record(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, MatchError> {
        let record: Self =
            serde_json::from_str(text).map_err(|e| MatchError::Record(e.to_string()))?;
        record.config.validate()?;
        Ok(record)
    }
}
