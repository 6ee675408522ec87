//! The controller event queue.
//!
//! Engine workers, the clock scheduler and the match transport never touch
//! match state. They push a [`MatchEvent`] into one channel, and the thread
//! that owns the controller drains it, so every state transition happens on
//! that thread and one at a time.

use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, select, tick, unbounded};
use log::debug;
use shakmaty::Square;

use crate::domain::board::BoardState;
use crate::domain::chess::PieceColor;
use crate::domain::moves::MoveRecord;
use crate::domain::outcome::MatchResult;
use crate::error::{EngineError, MatchError, TransportError};
use crate::models::clock::ClockReadings;
use crate::models::engine::BestMoveReply;
use crate::models::record::MatchRecord;
use crate::models::transport::MatchSnapshot;

/// Why a search was started
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SearchPurpose {
    Move,
    Hint,
}

#[derive(Debug)]
pub enum MatchEvent {
    /// A search finished. `generation` and `ply` identify the controller state
    /// the search was started from; replies for any other state are stale.
    MoveComputed {
        generation: u64,
        ply: usize,
        color: PieceColor,
        purpose: SearchPurpose,
        outcome: Result<Option<String>, EngineError>,
    },
    ClockTick {
        elapsed_ms: i64,
    },
    SnapshotReceived(MatchSnapshot),
    TransportFailed(TransportError),
}

/// Build an engine reply that posts its answer into the event queue
pub fn reply_to(
    events: Sender<MatchEvent>,
    generation: u64,
    ply: usize,
    color: PieceColor,
    purpose: SearchPurpose,
) -> BestMoveReply {
    Box::new(move |outcome| {
        let event = MatchEvent::MoveComputed {
            generation,
            ply,
            color,
            purpose,
            outcome,
        };
        if events.send(event).is_err() {
            debug!("event queue closed, dropping {:?} search result", purpose);
        }
    })
}

/// Owner side of the event queue
pub struct EventLoop {
    sender: Sender<MatchEvent>,
    receiver: Receiver<MatchEvent>,
}

impl EventLoop {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Handle for producers
    pub fn sender(&self) -> Sender<MatchEvent> {
        self.sender.clone()
    }

    /// Wait up to `timeout` for the next event
    pub fn next_timeout(&self, timeout: Duration) -> Option<MatchEvent> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Everything queued right now, without blocking
    pub fn drain(&self) -> Vec<MatchEvent> {
        self.receiver.try_iter().collect()
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic tick source. Each tick carries the measured time since the
/// previous one. Dropping the scheduler stops the ticker thread.
pub struct ClockScheduler {
    stop: Option<Sender<()>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl ClockScheduler {
    pub fn start(events: Sender<MatchEvent>, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = unbounded::<()>();
        let worker = thread::spawn(move || {
            let ticker = tick(interval);
            let mut last = Instant::now();
            loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(ticker) -> now => {
                        let Ok(now) = now else { break };
                        let elapsed_ms = now.saturating_duration_since(last).as_millis() as i64;
                        last = now;
                        if events.send(MatchEvent::ClockTick { elapsed_ms }).is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("clock scheduler stopped");
        });
        Self {
            stop: Some(stop_tx),
            worker: Some(worker),
        }
    }

    pub fn stop(&mut self) {
        // closing the channel wakes the ticker's select
        self.stop.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for ClockScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Presentation callbacks. The presentation layer only renders what these
/// report; every method has a no-op default.
pub trait MatchObserver {
    /// A validated move was applied; `board` is the position after it
    fn on_move_applied(&mut self, _mv: &MoveRecord, _board: &BoardState) {}

    /// A pawn reached its last rank and a piece must be chosen
    fn on_promotion_required(&mut self, _from: Square, _to: Square) {}

    fn on_terminal(&mut self, _result: MatchResult) {}

    fn on_hint(&mut self, _mv: &MoveRecord) {}

    /// Display refresh only
    fn on_clock_tick(&mut self, _clocks: ClockReadings) {}

    /// The board was replaced wholesale (undo, resync)
    fn on_board_reset(&mut self, _board: &BoardState) {}

    /// `color` lost its turn to an expired turn window
    fn on_turn_passed(&mut self, _color: PieceColor) {}

    fn on_error(&mut self, _error: &MatchError) {}

    /// A finished match is ready to persist. Called once per match.
    fn on_archived(&mut self, _record: &MatchRecord) {}

    fn on_orientation_changed(&mut self, _upper: PieceColor) {}
}

/// Observer that ignores everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;

impl MatchObserver for NullObserver {}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    #[derive(Clone, PartialEq, Eq, Debug)]
    pub enum Seen {
        Applied(String),
        Promotion(String),
        Terminal(MatchResult),
        Hint(String),
        Reset,
        Passed(PieceColor),
        Error(String),
        Archived(Vec<String>),
        Orientation(PieceColor),
    }

    /// Observer that records every callback except clock ticks
    #[derive(Default, Debug)]
    pub struct RecordingObserver {
        pub seen: Vec<Seen>,
        pub ticks: usize,
    }

    impl RecordingObserver {
        pub fn count(&self, pred: impl Fn(&Seen) -> bool) -> usize {
            self.seen.iter().filter(|s| pred(s)).count()
        }
    }

    impl MatchObserver for RecordingObserver {
        fn on_move_applied(&mut self, mv: &MoveRecord, _board: &BoardState) {
            self.seen.push(Seen::Applied(mv.to_string()));
        }

        fn on_promotion_required(&mut self, from: Square, to: Square) {
            self.seen.push(Seen::Promotion(format!("{}{}", from, to)));
        }

        fn on_terminal(&mut self, result: MatchResult) {
            self.seen.push(Seen::Terminal(result));
        }

        fn on_hint(&mut self, mv: &MoveRecord) {
            self.seen.push(Seen::Hint(mv.to_string()));
        }

        fn on_clock_tick(&mut self, _clocks: ClockReadings) {
            self.ticks += 1;
        }

        fn on_board_reset(&mut self, _board: &BoardState) {
            self.seen.push(Seen::Reset);
        }

        fn on_turn_passed(&mut self, color: PieceColor) {
            self.seen.push(Seen::Passed(color));
        }

        fn on_error(&mut self, error: &MatchError) {
            self.seen.push(Seen::Error(error.to_string()));
        }

        fn on_archived(&mut self, record: &MatchRecord) {
            self.seen.push(Seen::Archived(record.moves.clone()));
        }

        fn on_orientation_changed(&mut self, upper: PieceColor) {
            self.seen.push(Seen::Orientation(upper));
        }
    }
}
