//! Headless match runner: engine against engine on the real event loop and
//! clock scheduler.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use log::{debug, error, info};

use match_core::config::{Difficulty, GameMode, MatchConfig};
use match_core::domain::{BoardState, MatchResult, MoveRecord, PieceColor};
use match_core::error::MatchError;
use match_core::models::{
    ClockScheduler, EnginePair, EventLoop, LegalityProvider, LocalMatch, MatchEvent,
    MatchObserver, MatchRecord,
};

/// Clock resolution of the runner
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Give up when nothing at all arrives for this long
const IDLE_LIMIT: Duration = Duration::from_secs(30);

pub struct RunOptions {
    pub config: MatchConfig,
    pub white: Difficulty,
    pub black: Difficulty,
    /// Where to write the match record as JSON
    pub output: Option<PathBuf>,
    /// A saved record to continue instead of starting fresh
    pub resume: Option<PathBuf>,
}

/// Logs the match as it is played
#[derive(Default)]
struct LogObserver {
    error: Option<String>,
}

impl MatchObserver for LogObserver {
    fn on_move_applied(&mut self, mv: &MoveRecord, board: &BoardState) {
        // the board is already past the move, so the mover is the side not to move
        let mover = board.side_to_move().opposite();
        let number = match mover {
            PieceColor::White => board.fullmove_number(),
            PieceColor::Black => board.fullmove_number().saturating_sub(1),
        };
        let mut flags = String::new();
        if mv.is_castle {
            flags.push_str(" castle");
        }
        if mv.is_capture {
            flags.push_str(" capture");
        }
        info!("{}. {:?} {}{}", number, mover, mv, flags);
    }

    fn on_turn_passed(&mut self, color: PieceColor) {
        info!("{:?} passed", color);
    }

    fn on_terminal(&mut self, result: MatchResult) {
        info!("result: {:?}", result);
    }

    fn on_archived(&mut self, record: &MatchRecord) {
        info!("archived after {} moves", record.moves.len());
    }

    fn on_error(&mut self, error: &MatchError) {
        error!("{}", error);
        self.error = Some(error.to_string());
    }
}

/// Play the match to its end and return its record
pub fn run(options: RunOptions) -> Result<MatchRecord> {
    let events = EventLoop::new();
    let mut game = match &options.resume {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let record = MatchRecord::from_json(&text)
                .with_context(|| format!("failed to load {}", path.display()))?;
            if record.config.mode != GameMode::Autoplay {
                bail!("{} is not an engine-vs-engine match", path.display());
            }
            LocalMatch::resume(&record, events.sender(), LogObserver::default())
                .context("failed to resume match")?
        }
        None => {
            let mut config = options.config;
            config.mode = GameMode::Autoplay;
            let engines = EnginePair::new(
                LegalityProvider::for_difficulty(options.white, &config.engine),
                LegalityProvider::for_difficulty(options.black, &config.engine),
            );
            LocalMatch::with_engines(config, engines, events.sender(), LogObserver::default())
                .context("failed to set up match")?
        }
    };

    let mut scheduler = ClockScheduler::start(events.sender(), TICK_INTERVAL);
    game.start();
    while !game.is_finished() {
        let Some(event) = events.next_timeout(IDLE_LIMIT) else {
            bail!("no engine or clock activity for {:?}", IDLE_LIMIT);
        };
        if !matches!(event, MatchEvent::ClockTick { .. }) {
            debug!("event: {:?}", event);
        }
        game.handle_event(event);
    }
    scheduler.stop();

    if let Some(message) = &game.observer().error {
        bail!("match halted: {}", message);
    }

    let record = game.record();
    if let Some(path) = &options.output {
        let json = record.to_json()?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        info!("wrote {}", path.display());
    }
    Ok(record)
}
