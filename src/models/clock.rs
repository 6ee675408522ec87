//! Match clocks: one turn clock and one clock per player.
//!
//! Clocks do not read wall time themselves. The controller feeds elapsed
//! milliseconds from the clock scheduler's ticks, which keeps every state
//! transition on the controller's thread.

use log::debug;

use crate::config::{INFINITE_TIME, TimeControl};
use crate::domain::chess::PieceColor;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ClockState {
    Stopped,
    Running,
    Paused,
}

/// A countdown timer. Expiry is reported once; afterwards the clock is inert
/// until [`Clock::reset_time`] re-arms it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Clock {
    remaining_ms: i64,
    state: ClockState,
    expired: bool,
}

impl Clock {
    pub fn new(remaining_ms: i64) -> Self {
        Self {
            remaining_ms,
            state: ClockState::Stopped,
            expired: false,
        }
    }

    pub fn infinite() -> Self {
        Self::new(INFINITE_TIME)
    }

    pub fn remaining_ms(&self) -> i64 {
        self.remaining_ms
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_infinite(&self) -> bool {
        self.remaining_ms == INFINITE_TIME
    }

    pub fn has_expired(&self) -> bool {
        self.expired
    }

    /// Stopped -> Running. Ignored once expired.
    pub fn start(&mut self) {
        if self.state == ClockState::Stopped && !self.expired {
            self.state = ClockState::Running;
        }
    }

    /// Running -> Paused
    pub fn pause(&mut self) {
        if self.state == ClockState::Running {
            self.state = ClockState::Paused;
        }
    }

    /// Paused -> Running
    pub fn resume(&mut self) {
        if self.state == ClockState::Paused {
            self.state = ClockState::Running;
        }
    }

    /// Start or resume, whichever applies
    pub fn run(&mut self) {
        self.start();
        self.resume();
    }

    pub fn stop(&mut self) {
        self.state = ClockState::Stopped;
    }

    /// Set the remaining time and re-arm expiry. Valid from any state and
    /// never reports an expiry itself.
    pub fn reset_time(&mut self, remaining_ms: i64) {
        self.remaining_ms = remaining_ms;
        self.expired = false;
    }

    /// Add time to a finite clock
    pub fn add_time(&mut self, ms: i64) {
        if !self.is_infinite() && ms > 0 {
            self.remaining_ms += ms;
        }
    }

    /// Count down by `elapsed_ms`. Returns true exactly once, on the tick
    /// that reaches zero; the clock is stopped at that point.
    pub fn advance(&mut self, elapsed_ms: i64) -> bool {
        if self.state != ClockState::Running || self.is_infinite() || self.expired {
            return false;
        }
        self.remaining_ms = (self.remaining_ms - elapsed_ms).max(0);
        if self.remaining_ms == 0 {
            self.state = ClockState::Stopped;
            self.expired = true;
            return true;
        }
        false
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ClockKind {
    Turn,
    Player(PieceColor),
}

/// Remaining times of the three clocks, as persisted and displayed
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ClockReadings {
    pub turn_ms: i64,
    pub white_ms: i64,
    pub black_ms: i64,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MatchClocks {
    turn: Clock,
    white: Clock,
    black: Clock,
    turn_limit_ms: i64,
}

impl MatchClocks {
    pub fn new(time: &TimeControl) -> Self {
        Self {
            turn: Clock::new(time.turn_ms),
            white: Clock::new(time.player_ms),
            black: Clock::new(time.player_ms),
            turn_limit_ms: time.turn_ms,
        }
    }

    pub fn turn(&self) -> &Clock {
        &self.turn
    }

    pub fn player(&self, color: PieceColor) -> &Clock {
        match color {
            PieceColor::White => &self.white,
            PieceColor::Black => &self.black,
        }
    }

    fn player_mut(&mut self, color: PieceColor) -> &mut Clock {
        match color {
            PieceColor::White => &mut self.white,
            PieceColor::Black => &mut self.black,
        }
    }

    /// Run the mover's clock and the turn clock; pause the other player
    pub fn run_for(&mut self, mover: PieceColor) {
        self.player_mut(mover.opposite()).pause();
        self.player_mut(mover).run();
        self.turn.run();
    }

    /// Restart the turn clock with its full limit
    pub fn restart_turn(&mut self) {
        self.turn.reset_time(self.turn_limit_ms);
        self.turn.stop();
        self.turn.start();
    }

    pub fn add_increment(&mut self, color: PieceColor, ms: i64) {
        self.player_mut(color).add_time(ms);
    }

    /// Pause both player clocks; the turn clock keeps its state
    pub fn pause_players(&mut self) {
        self.white.pause();
        self.black.pause();
    }

    pub fn pause_all(&mut self) {
        self.turn.pause();
        self.white.pause();
        self.black.pause();
    }

    /// Advance every running clock, returning the ones that expired
    pub fn advance(&mut self, elapsed_ms: i64) -> Vec<ClockKind> {
        let mut expired = Vec::new();
        if self.white.advance(elapsed_ms) {
            expired.push(ClockKind::Player(PieceColor::White));
        }
        if self.black.advance(elapsed_ms) {
            expired.push(ClockKind::Player(PieceColor::Black));
        }
        if self.turn.advance(elapsed_ms) {
            expired.push(ClockKind::Turn);
        }
        if !expired.is_empty() {
            debug!("clocks expired: {:?}", expired);
        }
        expired
    }

    pub fn readings(&self) -> ClockReadings {
        ClockReadings {
            turn_ms: self.turn.remaining_ms(),
            white_ms: self.white.remaining_ms(),
            black_ms: self.black.remaining_ms(),
        }
    }

    /// Overwrite remaining times, leaving run states alone
    pub fn restore(&mut self, readings: ClockReadings) {
        self.turn.reset_time(readings.turn_ms);
        self.white.reset_time(readings.white_ms);
        self.black.reset_time(readings.black_ms);
    }
}
