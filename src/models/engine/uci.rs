//! External UCI engine backend - manages the engine process lifecycle.
//!
//! Architecture:
//! - Engine I/O runs on OS threads (reader/writer)
//! - Each `go` gets a slot in a FIFO; the reader answers the oldest slot on
//!   every `bestmove`, since engines answer searches strictly in order
//! - A watchdog answers a slot with a timeout if the engine stays silent;
//!   the slot stays queued so the late `bestmove` is still matched to it

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Sender, unbounded};
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::domain::uci::{EngineLine, UciCommand};
use crate::error::EngineError;
use crate::models::engine::BestMoveReply;
use crate::models::engine::rules::Rules;

/// Extra time granted past `movetime` before the watchdog gives up
const WATCHDOG_GRACE: Duration = Duration::from_millis(1_500);

struct SearchSlot {
    id: u64,
    reply: Option<BestMoveReply>,
}

type SlotQueue = Arc<Mutex<VecDeque<SearchSlot>>>;

pub struct UciEngine {
    pub(crate) rules: Rules,
    path: PathBuf,
    /// Channel sender for commands to engine writer thread
    command_sender: Option<Sender<String>>,
    slots: SlotQueue,
    next_id: u64,
    /// Handle to the engine process
    process: Option<Child>,
}

impl std::fmt::Debug for UciEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UciEngine")
            .field("path", &self.path)
            .field("running", &self.is_running())
            .finish()
    }
}

impl UciEngine {
    /// Spawn the engine process and perform the UCI handshake
    pub fn start(path: &Path) -> Result<Self, EngineError> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| EngineError::Process(format!("failed to start {}: {}", path.display(), e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Process("failed to open stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Process("failed to open stdout".into()))?;

        let (cmd_tx, cmd_rx) = unbounded::<String>();
        let slots: SlotQueue = Arc::new(Mutex::new(VecDeque::new()));

        // Reader thread: answers search slots as bestmove lines arrive
        let reader_slots = Arc::clone(&slots);
        thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                let Ok(text) = line else { break };
                if let EngineLine::BestMove(best) = EngineLine::parse(&text) {
                    let slot = reader_slots.lock().pop_front();
                    match slot {
                        Some(SearchSlot {
                            reply: Some(reply), ..
                        }) => reply(Ok(best)),
                        Some(SearchSlot { id, reply: None }) => {
                            debug!("dropping late answer for search {}", id);
                        }
                        None => warn!("engine sent unsolicited '{}'", text),
                    }
                }
            }
            // Engine exited: fail whatever is still waiting
            for slot in reader_slots.lock().drain(..) {
                if let Some(reply) = slot.reply {
                    reply(Err(EngineError::Process("engine exited".into())));
                }
            }
        });

        // Writer thread (OS thread for blocking I/O)
        thread::spawn(move || {
            let mut writer = stdin;
            while let Ok(cmd) = cmd_rx.recv() {
                if writeln!(writer, "{}", cmd).is_err() || writer.flush().is_err() {
                    break;
                }
            }
        });

        let engine = Self {
            rules: Rules::new(),
            path: path.to_path_buf(),
            command_sender: Some(cmd_tx),
            slots,
            next_id: 0,
            process: Some(child),
        };
        engine.send_command(UciCommand::Uci);
        engine.send_command(UciCommand::IsReady);
        engine.send_command(UciCommand::UciNewGame);
        info!("started UCI engine {}", path.display());
        Ok(engine)
    }

    pub fn is_running(&self) -> bool {
        self.process.is_some()
    }

    /// Ask for the best move in the current position
    pub fn request_best_move(&mut self, depth: u32, timeout: Duration, reply: BestMoveReply) {
        if !self.is_running() {
            reply(Err(EngineError::Process("engine is not running".into())));
            return;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.slots.lock().push_back(SearchSlot {
            id,
            reply: Some(reply),
        });

        self.send_command(UciCommand::Position(self.rules.fen().to_string()));
        self.send_command(UciCommand::Go {
            depth,
            movetime_ms: timeout.as_millis() as u64,
        });

        let watchdog_slots = Arc::clone(&self.slots);
        let limit = timeout + WATCHDOG_GRACE;
        thread::spawn(move || {
            thread::sleep(limit);
            let expired = watchdog_slots
                .lock()
                .iter_mut()
                .find(|slot| slot.id == id)
                .and_then(|slot| slot.reply.take());
            if let Some(reply) = expired {
                warn!("engine search {} timed out", id);
                reply(Err(EngineError::Timeout(limit.as_millis() as u64)));
            }
        });
    }

    /// Stop the engine process
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }
        self.send_command(UciCommand::Stop);
        self.send_command(UciCommand::Quit);
        self.command_sender = None;

        if let Some(mut child) = self.process.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        info!("stopped UCI engine {}", self.path.display());
    }

    /// Send a UCI command to the engine
    fn send_command(&self, cmd: UciCommand) {
        debug!("uci > {}", cmd);
        if let Some(tx) = &self.command_sender {
            let _ = tx.send(cmd.to_string());
        }
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
