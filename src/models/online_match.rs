//! Multiplayer match controller.
//!
//! The server owns the match. Locally the board is a projection that may run
//! at most one unconfirmed move ahead of it: an own move is applied at once,
//! sent through the [`MatchTransport`], and held as pending until a snapshot
//! confirms or contradicts it. Snapshots that bring new moves are replayed
//! move by move for animation; anything that cannot be explained by the local
//! history is resolved by rebuilding the board from the server FEN.

use crossbeam_channel::Sender;
use log::{debug, info, warn};
use shakmaty::Square;

use crate::config::{OnlineConfig, TurnMode};
use crate::domain::board::{BoardState, fen_key};
use crate::domain::chess::{Coord, PieceColor, PieceKind};
use crate::domain::moves::{MoveHistory, MoveRecord};
use crate::domain::outcome::MatchResult;
use crate::error::MatchError;
use crate::models::engine::LegalityProvider;
use crate::models::events::{MatchEvent, MatchObserver};
use crate::models::transport::{MatchSnapshot, MatchTransport};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OnlinePhase {
    /// Not subscribed yet
    Idle,
    /// Subscribed, server has not started the match
    AwaitingOpponent,
    MyTurn,
    TheirTurn,
    Terminal,
    Stopped,
}

/// An own move applied locally but not yet seen in a snapshot
#[derive(Clone, Debug)]
struct PendingMove {
    record: MoveRecord,
    fen_before: String,
    fen_after: String,
}

pub struct OnlineMatch<T: MatchTransport, O: MatchObserver> {
    config: OnlineConfig,
    transport: T,
    events: Sender<MatchEvent>,
    observer: O,
    board: BoardState,
    rules: LegalityProvider,
    history: MoveHistory<()>,
    color: Option<PieceColor>,
    orientation_known: bool,
    pending: Option<PendingMove>,
    promotion: Option<(Square, Square)>,
    last_snapshot: Option<MatchSnapshot>,
    result: MatchResult,
    terminal_reported: bool,
    subscribed: bool,
    stopped: bool,
}

impl<T: MatchTransport, O: MatchObserver> OnlineMatch<T, O> {
    pub fn new(
        config: OnlineConfig,
        transport: T,
        events: Sender<MatchEvent>,
        observer: O,
    ) -> Result<Self, MatchError> {
        let color = config.fixed_color();
        // until a random color is known, white is drawn at the bottom
        let upper = color.map_or(PieceColor::Black, PieceColor::opposite);
        let board = BoardState::from_fen(config.start_fen(), upper)?;
        let mut rules = LegalityProvider::human();
        rules.set_position(&board.to_fen())?;
        Ok(Self {
            orientation_known: color.is_some(),
            config,
            transport,
            events,
            observer,
            board,
            rules,
            history: MoveHistory::new(),
            color,
            pending: None,
            promotion: None,
            last_snapshot: None,
            result: MatchResult::None,
            terminal_reported: false,
            subscribed: false,
            stopped: false,
        })
    }

    /// Subscribe to server updates for this match
    pub fn start(&mut self) -> Result<(), MatchError> {
        if self.subscribed || self.stopped {
            return Ok(());
        }
        self.transport
            .subscribe(&self.config.match_id, self.events.clone())?;
        self.subscribed = true;
        info!(
            "joined match {} as {}",
            self.config.match_id, self.config.player_id
        );
        Ok(())
    }

    /// Unsubscribe; later snapshots are ignored
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        if self.subscribed {
            self.transport.unsubscribe(&self.config.match_id);
            self.subscribed = false;
        }
        self.stopped = true;
        info!("left match {}", self.config.match_id);
    }

    pub fn board(&self) -> &BoardState {
        &self.board
    }

    pub fn color(&self) -> Option<PieceColor> {
        self.color
    }

    pub fn result(&self) -> MatchResult {
        self.result
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn move_texts(&self) -> Vec<String> {
        self.history.texts()
    }

    pub fn has_pending_move(&self) -> bool {
        self.pending.is_some()
    }

    pub fn last_snapshot(&self) -> Option<&MatchSnapshot> {
        self.last_snapshot.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn phase(&self) -> OnlinePhase {
        if self.stopped {
            OnlinePhase::Stopped
        } else if self.result.is_terminal() {
            OnlinePhase::Terminal
        } else if !self.subscribed {
            OnlinePhase::Idle
        } else if !self.is_started() {
            OnlinePhase::AwaitingOpponent
        } else if Some(self.board.side_to_move()) == self.color {
            OnlinePhase::MyTurn
        } else {
            OnlinePhase::TheirTurn
        }
    }

    fn is_started(&self) -> bool {
        self.last_snapshot.as_ref().is_some_and(|s| s.started)
    }

    /// Between turns in alternating mode: the server's turn window is spent
    fn is_between_turns(&self) -> bool {
        self.last_snapshot
            .as_ref()
            .is_some_and(|s| s.turn_mode == TurnMode::Alternately && s.time_by_turn == 0)
    }

    pub fn is_locked(&self) -> bool {
        self.phase() != OnlinePhase::MyTurn
            || self.pending.is_some()
            || self.promotion.is_some()
            || self.is_between_turns()
    }

    /// Destinations of the piece on `coord`, in view coordinates
    pub fn legal_targets(&self, coord: Coord) -> Vec<Coord> {
        if self.is_locked() {
            return Vec::new();
        }
        let orientation = self.board.orientation();
        let Some(from) = orientation.to_square(coord) else {
            return Vec::new();
        };
        let mut targets = Vec::new();
        for mv in self.rules.legal_moves_from(from) {
            let target = orientation.to_coord(mv.to);
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        targets
    }

    /// A local move in view coordinates: applied optimistically and sent
    pub fn submit_move(&mut self, from: Coord, to: Coord) -> bool {
        if self.is_locked() {
            return false;
        }
        let orientation = self.board.orientation();
        let (Some(from), Some(to)) = (orientation.to_square(from), orientation.to_square(to)) else {
            return false;
        };
        let Some(mv) = self.rules.moves_between(from, to).first().copied() else {
            debug!("ignoring illegal move {}{}", from, to);
            return false;
        };
        if mv.is_promotion_trigger {
            self.promotion = Some((from, to));
            self.board.set_promotion_pending(true);
            self.observer.on_promotion_required(from, to);
            return true;
        }
        self.send_move(mv);
        true
    }

    /// Complete or cancel a pending promotion. `None` cancels the move.
    pub fn choose_promotion(&mut self, choice: Option<PieceKind>) -> bool {
        let Some((from, to)) = self.promotion else {
            return false;
        };
        let mv = match choice {
            None => None,
            Some(kind) => {
                let found = self
                    .rules
                    .moves_between(from, to)
                    .into_iter()
                    .find(|m| m.promotion == Some(kind));
                if found.is_none() {
                    return false;
                }
                found
            }
        };
        self.promotion = None;
        self.board.set_promotion_pending(false);
        if let Some(mv) = mv {
            self.send_move(mv);
        }
        true
    }

    fn send_move(&mut self, mv: MoveRecord) {
        let fen_before = self.board.to_fen();
        if let Err(e) = self.push_move(mv) {
            self.observer.on_error(&e);
            return;
        }
        let fen_after = self.board.to_fen();
        self.pending = Some(PendingMove {
            record: mv,
            fen_before,
            fen_after,
        });
        self.observer.on_move_applied(&mv, &self.board);

        let text = mv.to_string();
        info!("sending {} for match {}", text, self.config.match_id);
        if let Err(e) = self.transport.send_move(&self.config.match_id, &text) {
            // the optimistic move stays; the next snapshot settles it
            warn!("{}", e);
        }
    }

    fn push_move(&mut self, mv: MoveRecord) -> Result<(), MatchError> {
        let mut after = self.board.clone();
        after.apply(&mv)?;
        self.rules.set_position(&after.to_fen())?;
        let before = std::mem::replace(&mut self.board, after);
        self.history.push(mv, before, ());
        Ok(())
    }

    pub fn handle_event(&mut self, event: MatchEvent) {
        match event {
            MatchEvent::SnapshotReceived(snapshot) => self.apply_snapshot(snapshot),
            MatchEvent::TransportFailed(e) => warn!("match {}: {}", self.config.match_id, e),
            MatchEvent::MoveComputed { .. } | MatchEvent::ClockTick { .. } => {
                debug!("online match ignores local engine and clock events");
            }
        }
    }

    fn apply_snapshot(&mut self, snapshot: MatchSnapshot) {
        if self.stopped {
            return;
        }
        if snapshot.started {
            self.learn_color(&snapshot);
        }

        let server_key = fen_key(&snapshot.fen);
        match self.pending.take() {
            Some(pending) if fen_key(&pending.fen_after) == server_key => {
                debug!("server confirmed {}", pending.record);
            }
            Some(pending) if fen_key(&pending.fen_before) == server_key => {
                info!("server never applied {}, resyncing", pending.record);
                self.rebuild(&snapshot);
            }
            Some(_) => self.catch_up(&snapshot),
            None if fen_key(&self.board.to_fen()) == server_key => {}
            None => self.catch_up(&snapshot),
        }

        self.observer.on_clock_tick(snapshot.clocks());
        let result = snapshot.result;
        self.last_snapshot = Some(snapshot);

        if result.is_terminal() && !self.terminal_reported {
            self.terminal_reported = true;
            self.result = result;
            self.promotion = None;
            info!("match {} over: {:?}", self.config.match_id, result);
            self.observer.on_terminal(result);
        }
    }

    /// The color becomes known once; a random color flips the board then
    fn learn_color(&mut self, snapshot: &MatchSnapshot) {
        if self.orientation_known {
            return;
        }
        let Some(color) = snapshot.color_of(&self.config.player_id) else {
            return;
        };
        self.color = Some(color);
        self.orientation_known = true;
        let upper = color.opposite();
        info!("assigned {:?} in match {}", color, self.config.match_id);
        self.board.set_upper_color(upper);
        self.observer.on_orientation_changed(upper);
    }

    /// Replay every server move past the local tail. Falls back to a rebuild
    /// when the local history is not a prefix of the server's or the result
    /// does not match the server FEN.
    fn catch_up(&mut self, snapshot: &MatchSnapshot) {
        let local = self.history.texts();
        let is_prefix = snapshot.moves.len() > local.len()
            && snapshot.moves.iter().zip(&local).all(|(s, l)| s == l);
        if !is_prefix {
            info!(
                "local history ({} moves) diverges from server ({} moves), resyncing",
                local.len(),
                snapshot.moves.len()
            );
            self.rebuild(snapshot);
            return;
        }

        let tail = &snapshot.moves[local.len()..];
        let Some(replay) = self.replay(tail) else {
            self.rebuild(snapshot);
            return;
        };
        let replayed_key = replay
            .last()
            .map(|(_, board)| fen_key(&board.to_fen()))
            .unwrap_or_default();
        if replayed_key != fen_key(&snapshot.fen) {
            info!("replay does not reach the server position, resyncing");
            self.rebuild(snapshot);
            return;
        }

        for (mv, after) in replay {
            let before = std::mem::replace(&mut self.board, after);
            self.history.push(mv, before, ());
            self.observer.on_move_applied(&mv, &self.board);
        }
        if let Err(e) = self.rules.set_position(&self.board.to_fen()) {
            warn!("{}", e);
            self.rebuild(snapshot);
            return;
        }
        debug!("replayed {} server moves", tail.len());
    }

    /// Validate `texts` against a scratch copy of the position
    fn replay(&self, texts: &[String]) -> Option<Vec<(MoveRecord, BoardState)>> {
        let mut rules = LegalityProvider::human();
        let mut board = self.board.clone();
        rules.set_position(&board.to_fen()).ok()?;
        let mut applied = Vec::with_capacity(texts.len());
        for text in texts {
            let mv = match rules.resolve(text) {
                Ok(mv) => mv,
                Err(e) => {
                    warn!("cannot replay server move: {}", e);
                    return None;
                }
            };
            if let Err(e) = board.apply(&mv) {
                warn!("cannot replay server move: {}", e);
                return None;
            }
            rules.set_position(&board.to_fen()).ok()?;
            applied.push((mv, board.clone()));
        }
        Some(applied)
    }

    /// Discard the local projection and take the server FEN. History is
    /// rebuilt from the server's move list when that list reaches the same
    /// position, and left empty otherwise.
    fn rebuild(&mut self, snapshot: &MatchSnapshot) {
        let upper = self.board.upper_color();
        let board = match BoardState::from_fen(&snapshot.fen, upper) {
            Ok(board) => board,
            Err(e) => {
                warn!("server sent unusable fen '{}': {}", snapshot.fen, e);
                return;
            }
        };
        if let Err(e) = self.rules.set_position(&board.to_fen()) {
            warn!("{}", e);
            return;
        }
        self.pending = None;
        self.promotion = None;
        self.history = self.history_from_start(&snapshot.moves, &board);
        self.board = board;
        self.observer.on_board_reset(&self.board);
    }

    fn history_from_start(&self, moves: &[String], target: &BoardState) -> MoveHistory<()> {
        let mut history = MoveHistory::new();
        let Ok(mut board) = BoardState::from_fen(self.config.start_fen(), target.upper_color())
        else {
            return history;
        };
        let mut rules = LegalityProvider::human();
        for text in moves {
            let resolved = rules
                .set_position(&board.to_fen())
                .and_then(|_| rules.resolve(text));
            let Ok(mv) = resolved else {
                return MoveHistory::new();
            };
            let before = board.clone();
            if board.apply(&mv).is_err() {
                return MoveHistory::new();
            }
            history.push(mv, before, ());
        }
        if fen_key(&board.to_fen()) != fen_key(&target.to_fen()) {
            return MoveHistory::new();
        }
        history
    }
}
