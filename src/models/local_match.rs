//! Local match controller: a single-device match between humans and/or
//! engines.
//!
//! All transitions run on the thread that owns the controller. Engine
//! searches and clock ticks come back as [`MatchEvent`]s through
//! [`LocalMatch::handle_event`]; a reply is applied only if the controller
//! is still in the state the search was started from (same generation, same
//! ply, still awaiting that engine).

use std::time::Duration;

use crossbeam_channel::Sender;
use log::{debug, error, info, warn};
use shakmaty::Square;

use crate::config::{INFINITE_TIME, GameMode, MatchConfig, TurnMode};
use crate::domain::board::BoardState;
use crate::domain::chess::{Coord, PieceColor, PieceKind};
use crate::domain::moves::{MoveHistory, MoveRecord};
use crate::domain::outcome::{EvalContext, MatchResult, evaluate};
use crate::error::{EngineError, MatchError};
use crate::models::clock::{ClockKind, ClockReadings, MatchClocks};
use crate::models::engine::{EnginePair, LegalityProvider};
use crate::models::events::{MatchEvent, MatchObserver, SearchPurpose, reply_to};
use crate::models::record::MatchRecord;

/// Move text recorded for a turn lost to an expired window
pub const PASS_TEXT: &str = "0000";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Phase {
    /// The side to move may act
    WaitingForMove,
    /// An engine search for the side to move is in flight
    AwaitingEngine,
    /// A pawn move to the last rank waits for a piece choice
    PromotionPending { from: Square, to: Square },
    /// Alternating mode: the mover already moved in this window
    BetweenTurns,
    Terminal,
    /// An adapter failure stopped the match
    Halted,
    Stopped,
}

/// State captured before each move so undo can restore it
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct Saved {
    clocks: ClockReadings,
    move_done: bool,
}

pub struct LocalMatch<O: MatchObserver> {
    config: MatchConfig,
    board: BoardState,
    engines: EnginePair,
    history: MoveHistory<Saved>,
    /// History lengths at which a turn was passed
    passes: Vec<usize>,
    clocks: MatchClocks,
    phase: Phase,
    result: MatchResult,
    /// Bumped whenever in-flight searches become meaningless
    generation: u64,
    started: bool,
    hint_blocked: bool,
    move_done: bool,
    archived: bool,
    events: Sender<MatchEvent>,
    observer: O,
}

impl<O: MatchObserver> LocalMatch<O> {
    /// Create a match with one provider per side, chosen from the config
    pub fn new(
        config: MatchConfig,
        events: Sender<MatchEvent>,
        observer: O,
    ) -> Result<Self, MatchError> {
        let engines = EnginePair::new(
            provider_for(&config, PieceColor::White),
            provider_for(&config, PieceColor::Black),
        );
        Self::with_engines(config, engines, events, observer)
    }

    pub fn with_engines(
        config: MatchConfig,
        mut engines: EnginePair,
        events: Sender<MatchEvent>,
        observer: O,
    ) -> Result<Self, MatchError> {
        config.validate()?;
        let board = BoardState::from_fen(config.start_fen(), config.upper_color())?;
        engines.set_position(&board.to_fen())?;
        info!(
            "new {:?} match, white: {}, black: {}",
            config.mode,
            engines.get(PieceColor::White).name(),
            engines.get(PieceColor::Black).name()
        );
        Ok(Self {
            clocks: MatchClocks::new(&config.time),
            config,
            board,
            engines,
            history: MoveHistory::new(),
            passes: Vec::new(),
            phase: Phase::WaitingForMove,
            result: MatchResult::None,
            generation: 0,
            started: false,
            hint_blocked: false,
            move_done: false,
            archived: false,
            events,
            observer,
        })
    }

    /// Rehydrate a saved match. Moves are replayed through the legality
    /// adapter from the start position; clocks are restored afterwards.
    pub fn resume(
        record: &MatchRecord,
        events: Sender<MatchEvent>,
        observer: O,
    ) -> Result<Self, MatchError> {
        let mut game = Self::new(record.config.clone(), events, observer)?;
        for (index, text) in record.moves.iter().enumerate() {
            if text == PASS_TEXT {
                game.pass_turn()?;
                continue;
            }
            let mover = game.board.side_to_move();
            let mv = game.engines.get(mover).resolve(text).map_err(|_| {
                MatchError::CorruptRecord {
                    text: text.clone(),
                    ply: index + 1,
                }
            })?;
            game.push_move(mv)?;
        }
        game.clocks.restore(record.clocks());
        game.move_done = record.move_done;
        game.result = record.result;
        if record.result.is_terminal() {
            game.phase = Phase::Terminal;
            game.archived = true;
        }
        info!("resumed match at ply {}", game.history.len());
        Ok(game)
    }

    /// Start the clocks and, if an engine is to move, its first search
    pub fn start(&mut self) {
        if self.started || self.phase != Phase::WaitingForMove {
            return;
        }
        self.started = true;

        let result = self.evaluate();
        if result.is_terminal() {
            self.finish(result);
            return;
        }
        if self.move_done && self.windowed() {
            self.phase = Phase::BetweenTurns;
            self.clocks.run_for(self.board.side_to_move());
            self.clocks.pause_players();
            return;
        }
        self.begin_turn();
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn board(&self) -> &BoardState {
        &self.board
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn result(&self) -> MatchResult {
        self.result
    }

    pub fn clocks(&self) -> &MatchClocks {
        &self.clocks
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn last_move(&self) -> Option<MoveRecord> {
        self.history.last().map(|node| node.record)
    }

    pub fn last_moves(&self, count: usize) -> Vec<MoveRecord> {
        self.history.last_moves(count)
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Terminal | Phase::Halted | Phase::Stopped)
    }

    /// Whether user input is currently ignored
    pub fn is_locked(&self) -> bool {
        !self.accepts_input()
    }

    fn accepts_input(&self) -> bool {
        self.started
            && self.phase == Phase::WaitingForMove
            && !self.config.is_engine_side(self.board.side_to_move())
    }

    /// Alternating mode with a finite window
    fn windowed(&self) -> bool {
        self.config.turn_mode == TurnMode::Alternately && self.config.time.turn_ms != INFINITE_TIME
    }

    /// Destinations of the piece on `coord`, in view coordinates
    pub fn legal_targets(&self, coord: Coord) -> Vec<Coord> {
        if !self.accepts_input() {
            return Vec::new();
        }
        let orientation = self.board.orientation();
        let Some(from) = orientation.to_square(coord) else {
            return Vec::new();
        };
        let mut targets = Vec::new();
        for mv in self.engines.get(self.board.side_to_move()).legal_moves_from(from) {
            let target = orientation.to_coord(mv.to);
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        targets
    }

    /// A human move in view coordinates. Illegal or untimely input is
    /// ignored and returns false.
    pub fn submit_move(&mut self, from: Coord, to: Coord) -> bool {
        if !self.accepts_input() {
            return false;
        }
        let orientation = self.board.orientation();
        let (Some(from), Some(to)) = (orientation.to_square(from), orientation.to_square(to)) else {
            return false;
        };

        let candidates = self.engines.get(self.board.side_to_move()).moves_between(from, to);
        let Some(mv) = candidates.first().copied() else {
            debug!("ignoring illegal move {}{}", from, to);
            return false;
        };

        if mv.is_promotion_trigger {
            self.phase = Phase::PromotionPending { from, to };
            self.board.set_promotion_pending(true);
            self.observer.on_promotion_required(from, to);
            return true;
        }
        self.apply_move(mv);
        true
    }

    /// Complete or cancel a pending promotion. `None` cancels the move.
    pub fn choose_promotion(&mut self, choice: Option<PieceKind>) -> bool {
        let Phase::PromotionPending { from, to } = self.phase else {
            return false;
        };
        let Some(kind) = choice else {
            self.board.set_promotion_pending(false);
            self.phase = Phase::WaitingForMove;
            return true;
        };
        let Some(mv) = self
            .engines
            .get(self.board.side_to_move())
            .moves_between(from, to)
            .into_iter()
            .find(|m| m.promotion == Some(kind))
        else {
            return false;
        };
        self.board.set_promotion_pending(false);
        self.phase = Phase::WaitingForMove;
        self.apply_move(mv);
        true
    }

    /// Take back the last ply (two-player), or everything back to the
    /// human's latest move (single-player, so the human is to move again
    /// even when passes fell in between)
    pub fn undo(&mut self) -> bool {
        if !self.accepts_input() {
            return false;
        }
        let keep = match self.config.mode {
            GameMode::TwoPlayer => self.history.len().checked_sub(1),
            GameMode::SinglePlayer => self
                .history
                .iter()
                .rposition(|node| !self.config.is_engine_side(node.board_before.side_to_move())),
            GameMode::Online | GameMode::Autoplay => return false,
        };
        let Some(keep) = keep else {
            return false;
        };

        let plies = self.history.len() - keep;
        let mut restored = None;
        while self.history.len() > keep {
            restored = self.history.pop();
        }
        let Some(node) = restored else {
            return false;
        };

        self.board = node.board_before;
        self.clocks.restore(node.saved.clocks);
        self.move_done = node.saved.move_done;
        let len = self.history.len();
        self.passes.retain(|&at| at <= len);
        self.generation += 1;
        if let Err(e) = self.engines.set_position(&self.board.to_fen()) {
            self.halt(e.into());
            return false;
        }

        info!("undid {} plies, back at ply {}", plies, len);
        self.observer.on_board_reset(&self.board);
        self.begin_turn();
        true
    }

    /// Ask the side to move's adapter for a suggestion
    pub fn request_hint(&mut self) -> bool {
        if self.hint_blocked || !self.accepts_input() {
            return false;
        }
        self.hint_blocked = true;
        let mover = self.board.side_to_move();
        let reply = reply_to(
            self.events.clone(),
            self.generation,
            self.history.len(),
            mover,
            SearchPurpose::Hint,
        );
        let timeout = Duration::from_millis(self.config.engine.move_timeout_ms);
        let depth = self.config.engine.hint_depth;
        self.engines.get_mut(mover).request_best_move(depth, timeout, reply);
        true
    }

    /// Pause the clocks and drop interest in any running search
    pub fn stop(&mut self) {
        if matches!(self.phase, Phase::Terminal | Phase::Stopped) {
            return;
        }
        self.phase = Phase::Stopped;
        self.generation += 1;
        self.clocks.pause_all();
        info!("match stopped at ply {}", self.history.len());
    }

    /// Persistable state of the match
    pub fn record(&self) -> MatchRecord {
        let clocks = self.clocks.readings();
        MatchRecord {
            config: self.config.clone(),
            result: self.result,
            moves: self.move_texts(),
            turn_ms: clocks.turn_ms,
            white_ms: clocks.white_ms,
            black_ms: clocks.black_ms,
            move_done: self.move_done,
        }
    }

    pub fn handle_event(&mut self, event: MatchEvent) {
        match event {
            MatchEvent::MoveComputed {
                generation,
                ply,
                color,
                purpose,
                outcome,
            } => self.on_move_computed(generation, ply, color, purpose, outcome),
            MatchEvent::ClockTick { elapsed_ms } => self.on_tick(elapsed_ms),
            MatchEvent::SnapshotReceived(_) | MatchEvent::TransportFailed(_) => {
                debug!("local match ignores transport events");
            }
        }
    }

    fn on_move_computed(
        &mut self,
        generation: u64,
        ply: usize,
        color: PieceColor,
        purpose: SearchPurpose,
        outcome: Result<Option<String>, EngineError>,
    ) {
        if purpose == SearchPurpose::Hint {
            self.hint_blocked = false;
        }
        if generation != self.generation || ply != self.history.len() {
            debug!(
                "ignoring stale {:?} result (generation {}, ply {})",
                purpose, generation, ply
            );
            return;
        }

        match purpose {
            SearchPurpose::Hint => match outcome {
                Ok(Some(text)) => match self.engines.get(color).resolve(&text) {
                    Ok(mv) => self.observer.on_hint(&mv),
                    Err(e) => warn!("discarding hint: {}", e),
                },
                Ok(None) => debug!("no hint available"),
                Err(e) => warn!("hint search failed: {}", e),
            },
            SearchPurpose::Move => {
                if self.phase != Phase::AwaitingEngine || color != self.board.side_to_move() {
                    debug!("ignoring engine move outside its turn");
                    return;
                }
                let mv = match outcome {
                    Ok(Some(text)) => self.engines.get(color).resolve(&text),
                    Ok(None) => Err(EngineError::NoMove {
                        fen: self.board.to_fen(),
                    }),
                    Err(e) => Err(e),
                };
                match mv {
                    Ok(mv) => {
                        self.phase = Phase::WaitingForMove;
                        self.apply_move(mv);
                    }
                    Err(e) => self.halt(e.into()),
                }
            }
        }
    }

    fn on_tick(&mut self, elapsed_ms: i64) {
        if !self.started || self.is_finished() {
            return;
        }
        let expired = self.clocks.advance(elapsed_ms);
        self.observer.on_clock_tick(self.clocks.readings());

        for kind in expired {
            match kind {
                ClockKind::Player(color) => {
                    warn!("{:?} ran out of time", color);
                    self.finish(self.victory(color.opposite()));
                    return;
                }
                ClockKind::Turn if self.windowed() => self.end_window(),
                ClockKind::Turn => {
                    let loser = self.board.side_to_move();
                    warn!("{:?} exceeded the turn limit", loser);
                    self.finish(self.victory(loser.opposite()));
                    return;
                }
            }
        }
    }

    /// A turn window ran out. A mover who already moved hands over; one who
    /// did not loses the turn, unless in check, in which case the window
    /// restarts.
    fn end_window(&mut self) {
        match self.phase {
            Phase::BetweenTurns => self.move_done = false,
            Phase::WaitingForMove | Phase::AwaitingEngine | Phase::PromotionPending { .. } => {
                let mover = self.board.side_to_move();
                self.board.set_promotion_pending(false);
                if self.engines.get(mover).status().in_check {
                    debug!("{:?} is in check and keeps the turn", mover);
                } else {
                    if let Err(e) = self.pass_turn() {
                        self.halt(e);
                        return;
                    }
                    info!("{:?} passed", mover);
                    self.observer.on_turn_passed(mover);
                    let result = self.evaluate();
                    if result.is_terminal() {
                        self.finish(result);
                        return;
                    }
                }
            }
            Phase::Terminal | Phase::Halted | Phase::Stopped => return,
        }
        self.generation += 1;
        self.clocks.restart_turn();
        self.begin_turn();
    }

    fn begin_turn(&mut self) {
        self.phase = Phase::WaitingForMove;
        self.clocks.run_for(self.board.side_to_move());
        self.request_engine_move();
    }

    fn request_engine_move(&mut self) {
        let mover = self.board.side_to_move();
        if self.phase != Phase::WaitingForMove || !self.config.is_engine_side(mover) {
            return;
        }
        self.phase = Phase::AwaitingEngine;
        let reply = reply_to(
            self.events.clone(),
            self.generation,
            self.history.len(),
            mover,
            SearchPurpose::Move,
        );
        let timeout = Duration::from_millis(self.config.engine.move_timeout_ms);
        let depth = self.config.engine.search_depth;
        self.engines.get_mut(mover).request_best_move(depth, timeout, reply);
    }

    fn apply_move(&mut self, mv: MoveRecord) {
        let mover = self.board.side_to_move();
        if let Err(e) = self.push_move(mv) {
            self.halt(e);
            return;
        }
        self.clocks.add_increment(mover, self.config.time.increment_ms);
        info!("ply {}: {:?} played {}", self.history.len(), mover, mv);
        self.observer.on_move_applied(&mv, &self.board);
        self.after_move();
    }

    fn after_move(&mut self) {
        let result = self.evaluate();
        if result.is_terminal() {
            self.finish(result);
            return;
        }
        if self.windowed() {
            self.move_done = true;
            self.phase = Phase::BetweenTurns;
            self.clocks.pause_players();
            return;
        }
        self.clocks.restart_turn();
        self.begin_turn();
    }

    /// Record and apply a validated move without notifying anyone
    fn push_move(&mut self, mv: MoveRecord) -> Result<(), MatchError> {
        let saved = Saved {
            clocks: self.clocks.readings(),
            move_done: self.move_done,
        };
        let mut after = self.board.clone();
        after.apply(&mv)?;
        self.engines.set_position(&after.to_fen())?;
        let before = std::mem::replace(&mut self.board, after);
        self.history.push(mv, before, saved);
        Ok(())
    }

    fn pass_turn(&mut self) -> Result<(), MatchError> {
        let mut after = self.board.clone();
        after.pass_turn();
        self.engines.set_position(&after.to_fen())?;
        self.board = after;
        self.passes.push(self.history.len());
        Ok(())
    }

    fn move_texts(&self) -> Vec<String> {
        let mut texts = Vec::with_capacity(self.history.len() + self.passes.len());
        let mut passes = self.passes.iter().peekable();
        for (made, node) in self.history.iter().enumerate() {
            while passes.next_if(|&&at| at == made).is_some() {
                texts.push(PASS_TEXT.to_string());
            }
            texts.push(node.record.to_string());
        }
        texts.extend(passes.map(|_| PASS_TEXT.to_string()));
        texts
    }

    fn evaluate(&self) -> MatchResult {
        let status = self.engines.get(self.board.side_to_move()).status();
        let ctx = EvalContext {
            mode: self.config.mode,
            plies_played: self.history.len() as u32,
            max_moves: self.config.max_moves,
        };
        evaluate(&self.board, status, &ctx)
    }

    fn victory(&self, winner: PieceColor) -> MatchResult {
        MatchResult::victory_for(winner, self.config.mode, self.board.upper_color())
    }

    fn finish(&mut self, result: MatchResult) {
        if self.phase == Phase::Terminal {
            return;
        }
        self.result = result;
        self.phase = Phase::Terminal;
        self.generation += 1;
        self.clocks.pause_all();
        info!("match over after {} plies: {:?}", self.history.len(), result);
        self.observer.on_terminal(result);
        self.archive();
    }

    fn archive(&mut self) {
        if self.archived {
            return;
        }
        self.archived = true;
        let record = self.record();
        self.observer.on_archived(&record);
    }

    fn halt(&mut self, err: MatchError) {
        error!(
            "match halted at ply {} in '{}': {}",
            self.history.len(),
            self.board.to_fen(),
            err
        );
        self.phase = Phase::Halted;
        self.generation += 1;
        self.clocks.pause_all();
        self.observer.on_error(&err);
    }
}

fn provider_for(config: &MatchConfig, color: PieceColor) -> LegalityProvider {
    if config.is_engine_side(color) {
        LegalityProvider::for_difficulty(config.difficulty, &config.engine)
    } else {
        LegalityProvider::human()
    }
}
