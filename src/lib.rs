//! Match engine and synchronization core for a turn-based chess app.
//!
//! `domain` holds the pure chess model (board, moves, outcome rules);
//! `models` holds the stateful parts: legality adapters, clocks, the event
//! queue and the local and online match controllers.

pub mod config;
pub mod domain;
pub mod error;
pub mod models;

pub use config::{MatchConfig, OnlineConfig};
pub use error::MatchError;
