//! Go Text Protocol (GTP) client for an external analysis engine.
//!
//! The engine knows nothing about variations: it only sees a flat sequence of
//! `play` commands. [`GtpEngine::seed`] flattens the path to the active node
//! into that sequence, and [`GtpEngine::analyze`] starts a stream of
//! `lz-analyze` reports.
//!
//! Writing to the engine goes through an [`EngineLink`]. Reading happens on a
//! separate thread owned by [`ProcessLink`], which hands every stdout line to a
//! callback (normally a queue sender). Lines are then fed back, in order, to
//! [`GtpEngine::handle_line`] on the thread that owns the game tree.
//!
//! ## Commands sent
//!
//! - `boardsize <n>`, `komi <k>`, `clear_board` - startup
//! - `play <color> <vertex>` - replay of the current line
//! - `lz-analyze <color> <interval>` - start streaming analysis
//! - `name` - used as a no-op to interrupt the stream
//! - `quit`

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;

use log::{debug, info, warn};

use crate::board::Color;
use crate::config::EngineConfig;
use crate::error::AnalyzerError;
use crate::gametree::{GameTree, Move, NodeId};
use crate::position::str_coord;

/// One unit of engine output as delivered by the reader thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineLine {
    Line(String),
    /// Standard output closed; the process is gone or going.
    Eof,
}

/// What a line of engine output means to the analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// All startup commands were accepted.
    Ready,
    /// The engine rejected a command.
    Failure(String),
    /// The engine went away without being asked to quit.
    Exited,
    /// One batch of candidate moves, tagged with the epoch of the
    /// `lz-analyze` request that produced it.
    Report { epoch: u64, text: String },
}

/// Outbound half of the engine connection.
pub trait EngineLink {
    fn send_line(&mut self, line: &str) -> Result<(), AnalyzerError>;

    /// Stop talking to the engine. Further sends may fail.
    fn close(&mut self);
}

/// An engine running as a child process.
pub struct ProcessLink {
    child: Child,
    stdin: Option<ChildStdin>,
}

impl ProcessLink {
    /// Launch the engine. Every stdout line, followed by a final
    /// [`EngineLine::Eof`], is passed to `forward` from a reader thread.
    pub fn spawn<F>(config: &EngineConfig, forward: F) -> Result<Self, AnalyzerError>
    where
        F: Fn(EngineLine) + Send + 'static,
    {
        let mut child = Command::new(&config.command)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| AnalyzerError::Io {
                operation: format!("start engine '{}'", config.command),
                source,
            })?;
        info!("started engine '{}' (pid {})", config.command, child.id());

        let stdin = child.stdin.take();
        if let Some(stdout) = child.stdout.take() {
            thread::spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    match line {
                        Ok(l) => forward(EngineLine::Line(l)),
                        Err(_) => break,
                    }
                }
                forward(EngineLine::Eof);
            });
        }
        if let Some(stderr) = child.stderr.take() {
            thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    debug!("engine stderr: {line}");
                }
            });
        }
        Ok(Self { child, stdin })
    }
}

impl EngineLink for ProcessLink {
    fn send_line(&mut self, line: &str) -> Result<(), AnalyzerError> {
        let stdin = self.stdin.as_mut().ok_or(AnalyzerError::NotConnected)?;
        writeln!(stdin, "{line}")
            .and_then(|_| stdin.flush())
            .map_err(|source| AnalyzerError::Io {
                operation: "write to engine".to_string(),
                source,
            })
    }

    fn close(&mut self) {
        // Dropping stdin lets a well-behaved engine exit on EOF.
        self.stdin = None;
        if let Ok(None) = self.child.try_wait() {
            debug!("engine still running after close");
        }
    }
}

impl Drop for ProcessLink {
    fn drop(&mut self) {
        self.stdin = None;
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

/// What a command id was sent for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Startup { last: bool },
    Plain,
    Analyze { epoch: u64 },
}

/// GTP engine state as seen from the client side.
pub struct GtpEngine<L: EngineLink> {
    link: L,
    size: usize,
    next_id: u32,
    pending: VecDeque<(u32, Pending)>,
    started: bool,
    stopped: bool,
    quit_sent: bool,
    /// Epoch of the analysis whose reports are currently streaming.
    stream_epoch: Option<u64>,
}

impl<L: EngineLink> GtpEngine<L> {
    /// Wrap a fresh connection and send the startup commands.
    pub fn new(link: L, size: usize, komi: f32) -> Result<Self, AnalyzerError> {
        let mut engine = Self {
            link,
            size,
            next_id: 1,
            pending: VecDeque::new(),
            started: false,
            stopped: false,
            quit_sent: false,
            stream_epoch: None,
        };
        engine.send(&format!("boardsize {size}"), Pending::Startup { last: false })?;
        engine.send(&format!("komi {komi}"), Pending::Startup { last: false })?;
        engine.send("clear_board", Pending::Startup { last: true })?;
        Ok(engine)
    }

    /// All startup commands were acknowledged.
    pub fn started(&self) -> bool {
        self.started
    }

    /// The engine has quit, exited or failed.
    pub fn stopped(&self) -> bool {
        self.stopped
    }

    fn send(&mut self, command: &str, kind: Pending) -> Result<u32, AnalyzerError> {
        if self.stopped {
            return Err(AnalyzerError::NotConnected);
        }
        let id = self.next_id;
        self.next_id += 1;
        debug!("gtp > {id} {command}");
        self.link.send_line(&format!("{id} {command}"))?;
        self.pending.push_back((id, kind));
        Ok(id)
    }

    pub fn clear_board(&mut self) -> Result<(), AnalyzerError> {
        self.send("clear_board", Pending::Plain).map(|_| ())
    }

    pub fn played_move(&mut self, color: Color, x: usize, y: usize) -> Result<(), AnalyzerError> {
        let vertex = str_coord(x, y, self.size).ok_or(AnalyzerError::BadVertex { x, y, size: self.size })?;
        self.send(&format!("play {} {vertex}", color.gtp()), Pending::Plain)
            .map(|_| ())
    }

    /// Request streaming analysis for `to_move`. Reports produced for this
    /// request carry `epoch`.
    pub fn analyze(&mut self, to_move: Color, interval: u32, epoch: u64) -> Result<(), AnalyzerError> {
        self.send(
            &format!("lz-analyze {} {interval}", to_move.gtp()),
            Pending::Analyze { epoch },
        )
        .map(|_| ())
    }

    /// Stop the report stream but keep the engine running.
    pub fn pause_analysis(&mut self) -> Result<(), AnalyzerError> {
        self.send("name", Pending::Plain).map(|_| ())
    }

    pub fn quit(&mut self) {
        if self.stopped {
            return;
        }
        if let Err(e) = self.send("quit", Pending::Plain) {
            warn!("failed to send quit: {e}");
        }
        self.quit_sent = true;
        self.stopped = true;
        self.stream_epoch = None;
        self.link.close();
    }

    /// Bring the engine to the position at `active`.
    ///
    /// Moves are collected back to the nearest node that is not a played
    /// stone (the root, a pass or an edit). That node's stones are sent first,
    /// in board-scan order, followed by the collected moves in game order.
    pub fn seed(&mut self, tree: &GameTree, active: NodeId) -> Result<(), AnalyzerError> {
        let mut moves = Vec::new();
        let mut base = active;
        while tree.was_move_p(base) {
            if let Some(Move::Play { x, y, color }) = tree.get(base).map(|n| n.get_move()) {
                moves.push((x, y, color));
            }
            match tree.prev_move(base) {
                Some(p) => base = p,
                None => break,
            }
        }
        let Some(base_node) = tree.get(base) else {
            return Err(AnalyzerError::EngineFailure(format!(
                "cannot seed from missing node {}",
                active.index()
            )));
        };

        self.clear_board()?;
        let mut setup = 0;
        for (x, y, color) in base_node.position().stones() {
            self.played_move(color, x, y)?;
            setup += 1;
        }
        for &(x, y, color) in moves.iter().rev() {
            self.played_move(color, x, y)?;
        }
        debug!("seeded engine with {setup} setup stones and {} moves", moves.len());
        Ok(())
    }

    /// Interpret one line of engine output.
    pub fn handle_line(&mut self, line: EngineLine) -> Option<EngineEvent> {
        let text = match line {
            EngineLine::Eof => {
                let expected = self.quit_sent;
                self.stopped = true;
                self.stream_epoch = None;
                return if expected { None } else { Some(EngineEvent::Exited) };
            }
            EngineLine::Line(text) => text,
        };
        let line = text.trim();
        if line.is_empty() {
            return None;
        }

        if let Some(rest) = line.strip_prefix('=') {
            let (id, _message) = Self::parse_id(rest);
            return match self.take_pending(id) {
                Some(Pending::Startup { last: true }) => {
                    self.started = true;
                    info!("engine ready");
                    Some(EngineEvent::Ready)
                }
                Some(Pending::Analyze { epoch }) => {
                    self.stream_epoch = Some(epoch);
                    None
                }
                _ => {
                    // Any other command ends a running analysis stream.
                    self.stream_epoch = None;
                    None
                }
            };
        }

        if let Some(rest) = line.strip_prefix('?') {
            let (id, message) = Self::parse_id(rest);
            let kind = self.take_pending(id);
            warn!("engine rejected command {id:?} ({kind:?}): {message}");
            self.stream_epoch = None;
            return Some(EngineEvent::Failure(message.to_string()));
        }

        if line.starts_with("info ") {
            return match self.stream_epoch {
                Some(epoch) => Some(EngineEvent::Report {
                    epoch,
                    text: line.to_string(),
                }),
                None => {
                    debug!("dropping analysis output with no active request");
                    None
                }
            };
        }

        debug!("gtp < {line}");
        None
    }

    /// Drop the pending entry answered by a response with `id`.
    ///
    /// GTP answers in order, so without an id the oldest command is meant.
    fn take_pending(&mut self, id: Option<u32>) -> Option<Pending> {
        match id {
            Some(id) => {
                let i = self.pending.iter().position(|&(p, _)| p == id)?;
                // Anything older was answered without us noticing.
                self.pending.drain(..=i).last().map(|(_, kind)| kind)
            }
            None => self.pending.pop_front().map(|(_, kind)| kind),
        }
    }

    /// Parse an optional numeric command ID from the beginning of a response.
    fn parse_id(line: &str) -> (Option<u32>, &str) {
        let end = line
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
            .map(|(i, _)| i)
            .unwrap_or(line.len());
        match line[..end].parse::<u32>() {
            Ok(id) => (Some(id), line[end..].trim()),
            Err(_) => (None, line.trim()),
        }
    }
}
