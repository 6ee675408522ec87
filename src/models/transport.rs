//! Match transport contract and the server snapshot it delivers.
//!
//! The wire framing (HTTP polling, WebSocket push) lives behind
//! [`MatchTransport`]. Implementations deliver snapshots by posting
//! [`MatchEvent::SnapshotReceived`] into the subscriber's event queue, and
//! report payloads they could not decode as [`MatchEvent::TransportFailed`].

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::Sender;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::TurnMode;
use crate::domain::chess::PieceColor;
use crate::domain::outcome::MatchResult;
use crate::error::TransportError;
use crate::models::clock::ClockReadings;
use crate::models::events::MatchEvent;

#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Players {
    pub white_id: Option<String>,
    pub black_id: Option<String>,
}

/// Server-authoritative state of a networked match
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchSnapshot {
    pub fen: String,
    pub moves: Vec<String>,
    pub time_by_white: i64,
    pub time_by_black: i64,
    pub time_by_turn: i64,
    pub result: MatchResult,
    pub started: bool,
    pub players: Players,
    pub turn_mode: TurnMode,
}

impl MatchSnapshot {
    pub fn from_json(text: &str) -> Result<Self, TransportError> {
        let snapshot: Self =
            serde_json::from_str(text).map_err(|e| TransportError::Decode(e.to_string()))?;
        if snapshot.fen.trim().is_empty() {
            return Err(TransportError::Decode("snapshot has no fen".into()));
        }
        Ok(snapshot)
    }

    /// Color the server assigned to `player_id`, if any
    pub fn color_of(&self, player_id: &str) -> Option<PieceColor> {
        if self.players.white_id.as_deref() == Some(player_id) {
            Some(PieceColor::White)
        } else if self.players.black_id.as_deref() == Some(player_id) {
            Some(PieceColor::Black)
        } else {
            None
        }
    }

    pub fn clocks(&self) -> ClockReadings {
        ClockReadings {
            turn_ms: self.time_by_turn,
            white_ms: self.time_by_white,
            black_ms: self.time_by_black,
        }
    }
}

pub trait MatchTransport {
    /// Send a move in coordinate text (`e2e4`, `e7e8q`)
    fn send_move(&mut self, match_id: &str, text: &str) -> Result<(), TransportError>;

    /// Start delivering snapshots for `match_id` into `events`
    fn subscribe(&mut self, match_id: &str, events: Sender<MatchEvent>)
    -> Result<(), TransportError>;

    fn unsubscribe(&mut self, match_id: &str);
}

#[derive(Default)]
struct LoopbackState {
    subscribers: HashMap<String, Sender<MatchEvent>>,
    sent: Vec<(String, String)>,
    reject_next: Option<String>,
}

/// In-process transport: records sent moves and lets the owner push
/// snapshots by hand. Clones share state.
#[derive(Clone, Default)]
pub struct LoopbackTransport {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a snapshot to the match's subscriber. Returns false when
    /// nobody is subscribed.
    pub fn push(&self, match_id: &str, snapshot: MatchSnapshot) -> bool {
        let state = self.state.lock();
        match state.subscribers.get(match_id) {
            Some(tx) => tx.send(MatchEvent::SnapshotReceived(snapshot)).is_ok(),
            None => {
                debug!("no subscriber for match {}", match_id);
                false
            }
        }
    }

    /// Deliver a raw snapshot payload as the server would send it. A payload
    /// that does not decode reaches the subscriber as a transport failure.
    pub fn push_json(&self, match_id: &str, text: &str) -> bool {
        let event = match MatchSnapshot::from_json(text) {
            Ok(snapshot) => MatchEvent::SnapshotReceived(snapshot),
            Err(e) => {
                warn!("bad snapshot for match {}: {}", match_id, e);
                MatchEvent::TransportFailed(e)
            }
        };
        let state = self.state.lock();
        match state.subscribers.get(match_id) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Moves sent so far, as (match id, move text)
    pub fn sent_moves(&self) -> Vec<(String, String)> {
        self.state.lock().sent.clone()
    }

    /// Make the next `send_move` fail with `reason`
    pub fn reject_next_send(&self, reason: &str) {
        self.state.lock().reject_next = Some(reason.to_string());
    }

    pub fn is_subscribed(&self, match_id: &str) -> bool {
        self.state.lock().subscribers.contains_key(match_id)
    }
}

impl MatchTransport for LoopbackTransport {
    fn send_move(&mut self, match_id: &str, text: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !state.subscribers.contains_key(match_id) {
            return Err(TransportError::NotSubscribed(match_id.to_string()));
        }
        if let Some(reason) = state.reject_next.take() {
            warn!("loopback rejecting {} for match {}", text, match_id);
            return Err(TransportError::Rejected {
                match_id: match_id.to_string(),
                text: text.to_string(),
                reason,
            });
        }
        state.sent.push((match_id.to_string(), text.to_string()));
        Ok(())
    }

    fn subscribe(
        &mut self,
        match_id: &str,
        events: Sender<MatchEvent>,
    ) -> Result<(), TransportError> {
        self.state.lock().subscribers.insert(match_id.to_string(), events);
        Ok(())
    }

    fn unsubscribe(&mut self, match_id: &str) {
        self.state.lock().subscribers.remove(match_id);
    }
}
