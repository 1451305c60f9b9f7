//! Analyzer lifecycle and the session that serializes it with navigation.
//!
//! ```text
//! Disconnected --start--> Starting --ready--> Running <--pause--> Paused
//!      ^                                         |                  |
//!      +-------------- stop / failure / exit ----+------------------+
//! ```
//!
//! Every reseed, pause, resume, start and stop begins a new epoch. Reports
//! carry the epoch of the request that produced them and are dropped unless it
//! is still current.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::analysis::Overlay;
use crate::board::Color;
use crate::config::{AnalysisSettings, EngineConfig};
use crate::error::{AnalyzerError, GameError};
use crate::gametree::{GameTree, NodeId};
use crate::gtp::{EngineEvent, EngineLine, EngineLink, GtpEngine, ProcessLink};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AnalyzerState {
    Disconnected,
    Starting,
    Running,
    Paused,
}

/// A lifecycle change worth showing to the user.
#[derive(Debug)]
pub struct StatusUpdate {
    pub state: AnalyzerState,
    pub error: Option<AnalyzerError>,
}

pub struct Analyzer<L: EngineLink> {
    engine: Option<GtpEngine<L>>,
    state: AnalyzerState,
    epoch: u64,
    board_size: usize,
    komi: f32,
    settings: AnalysisSettings,
    overlay: Overlay,
    /// Node the current epoch analyses, and its side to move.
    analysed: Option<(NodeId, Color)>,
}

impl<L: EngineLink> Analyzer<L> {
    pub fn new(board_size: usize, komi: f32, settings: AnalysisSettings) -> Self {
        Self {
            engine: None,
            state: AnalyzerState::Disconnected,
            epoch: 0,
            board_size,
            komi,
            settings,
            overlay: Overlay::new(board_size),
            analysed: None,
        }
    }

    pub fn state(&self) -> AnalyzerState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    /// For view-only toggles such as [`Overlay::set_eval_input_paused`].
    pub fn overlay_mut(&mut self) -> &mut Overlay {
        &mut self.overlay
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    pub fn engine(&self) -> Option<&GtpEngine<L>> {
        self.engine.as_ref()
    }

    fn set_state(&mut self, state: AnalyzerState) {
        if self.state != state {
            info!("analyzer {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn next_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    /// Connect to a new engine. Ignored unless disconnected.
    pub fn start(&mut self, link: L) -> Result<(), AnalyzerError> {
        if self.state != AnalyzerState::Disconnected {
            warn!("analyzer already {:?}, start ignored", self.state);
            return Ok(());
        }
        self.next_epoch();
        self.overlay.clear();
        let engine = GtpEngine::new(link, self.board_size, self.komi)?;
        self.engine = Some(engine);
        self.set_state(AnalyzerState::Starting);
        Ok(())
    }

    /// Quit the engine and drop all analysis data.
    pub fn stop(&mut self) {
        if self.state == AnalyzerState::Disconnected {
            return;
        }
        if let Some(mut engine) = self.engine.take() {
            engine.quit();
        }
        self.next_epoch();
        self.overlay.clear();
        self.set_state(AnalyzerState::Disconnected);
    }

    /// Pause or resume the report stream. Resuming does not reseed.
    pub fn pause(&mut self, on: bool) -> Result<(), AnalyzerError> {
        match (on, self.state) {
            (true, AnalyzerState::Running) => {
                self.next_epoch();
                let sent = self.engine_mut()?.pause_analysis();
                self.checked(sent)?;
                self.overlay.clear();
                self.set_state(AnalyzerState::Paused);
            }
            (false, AnalyzerState::Paused) => {
                let epoch = self.next_epoch();
                let sent = self.request_analysis(epoch);
                self.checked(sent)?;
                self.set_state(AnalyzerState::Running);
            }
            _ => debug!("pause({on}) ignored while {:?}", self.state),
        }
        Ok(())
    }

    /// The active node changed: reseed, and analyse if running.
    pub fn activate(&mut self, tree: &GameTree, node: NodeId) -> Result<(), AnalyzerError> {
        let Some(n) = tree.get(node) else {
            debug!("activation of removed node {} ignored", node.index());
            return Ok(());
        };
        self.analysed = Some((node, n.to_move()));
        if !matches!(self.state, AnalyzerState::Running | AnalyzerState::Paused) {
            return Ok(());
        }
        let sent = self.reseed(tree, node);
        self.checked(sent)
    }

    fn reseed(&mut self, tree: &GameTree, node: NodeId) -> Result<(), AnalyzerError> {
        let epoch = self.next_epoch();
        self.overlay.clear();
        self.engine_mut()?.seed(tree, node)?;
        if self.state == AnalyzerState::Running {
            self.request_analysis(epoch)?;
        }
        Ok(())
    }

    fn request_analysis(&mut self, epoch: u64) -> Result<(), AnalyzerError> {
        let Some((_, to_move)) = self.analysed else {
            return Ok(());
        };
        let interval = self.settings.interval;
        self.engine_mut()?.analyze(to_move, interval, epoch)
    }

    fn engine_mut(&mut self) -> Result<&mut GtpEngine<L>, AnalyzerError> {
        self.engine.as_mut().ok_or(AnalyzerError::NotConnected)
    }

    /// A send failure means the connection is gone.
    fn checked(&mut self, result: Result<(), AnalyzerError>) -> Result<(), AnalyzerError> {
        if let Err(e) = &result {
            error!("analysis engine: {e}");
            self.disconnect();
        }
        result
    }

    fn disconnect(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.quit();
        }
        self.next_epoch();
        self.overlay.clear();
        self.set_state(AnalyzerState::Disconnected);
    }

    /// Feed one line of engine output through the adapter.
    pub fn handle_line(&mut self, tree: &GameTree, line: EngineLine) -> Option<StatusUpdate> {
        let event = self.engine.as_mut()?.handle_line(line)?;
        self.handle_engine_event(tree, event)
    }

    pub fn handle_engine_event(&mut self, tree: &GameTree, event: EngineEvent) -> Option<StatusUpdate> {
        match event {
            EngineEvent::Ready => {
                if self.state != AnalyzerState::Starting {
                    return None;
                }
                self.set_state(AnalyzerState::Running);
                let node = match self.analysed {
                    Some((node, _)) if tree.get(node).is_some() => node,
                    _ => {
                        let active = tree.active();
                        let to_move = tree.get(active).map_or(Color::Black, |n| n.to_move());
                        self.analysed = Some((active, to_move));
                        active
                    }
                };
                let sent = self.reseed(tree, node);
                match self.checked(sent) {
                    Ok(()) => Some(StatusUpdate {
                        state: self.state,
                        error: None,
                    }),
                    Err(e) => Some(StatusUpdate {
                        state: self.state,
                        error: Some(e),
                    }),
                }
            }
            EngineEvent::Failure(message) => {
                error!("analysis engine failed: {message}");
                self.disconnect();
                Some(StatusUpdate {
                    state: self.state,
                    error: Some(AnalyzerError::EngineFailure(message)),
                })
            }
            EngineEvent::Exited => {
                error!("analysis engine exited unexpectedly");
                self.disconnect();
                Some(StatusUpdate {
                    state: self.state,
                    error: Some(AnalyzerError::EngineExited),
                })
            }
            EngineEvent::Report { epoch, text } => {
                if self.state != AnalyzerState::Running || epoch != self.epoch {
                    debug!("stale report (epoch {epoch}, current {}) dropped", self.epoch);
                    return None;
                }
                let Some((node, _)) = self.analysed else {
                    return None;
                };
                if let Err(e) = self.overlay.build(tree, node, &text, &self.settings) {
                    warn!("report for node {} not applied: {e}", node.index());
                }
                None
            }
        }
    }
}

/// Work items for the session, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ActiveChanged(NodeId),
    /// Output of the engine started as `connection`.
    Engine { connection: u64, line: EngineLine },
}

/// A game record with an analyzer attached.
///
/// Navigation reaches the analyzer only through an observer on the active
/// node, which posts to the same queue as the engine's reader thread. Events
/// are processed one at a time by [`Session::pump`] or [`Session::run_for`].
pub struct Session<L: EngineLink> {
    tree: GameTree,
    analyzer: Analyzer<L>,
    sender: Sender<Event>,
    events: Receiver<Event>,
    connection: u64,
}

impl<L: EngineLink> Session<L> {
    pub fn new(mut tree: GameTree, komi: f32, settings: AnalysisSettings) -> Result<Self, GameError> {
        let (sender, events) = mpsc::channel();
        let tx = sender.clone();
        let active = tree.active();
        tree.add_observer(active, move |id| {
            let _ = tx.send(Event::ActiveChanged(id));
        })?;
        let analyzer = Analyzer::new(tree.board_size(), komi, settings);
        Ok(Self {
            tree,
            analyzer,
            sender,
            events,
            connection: 0,
        })
    }

    pub fn tree(&self) -> &GameTree {
        &self.tree
    }

    /// Direct record edits. Navigation should go through [`Session::navigate`].
    pub fn tree_mut(&mut self) -> &mut GameTree {
        &mut self.tree
    }

    pub fn analyzer(&self) -> &Analyzer<L> {
        &self.analyzer
    }

    pub fn analyzer_mut(&mut self) -> &mut Analyzer<L> {
        &mut self.analyzer
    }

    pub fn overlay(&self) -> &Overlay {
        self.analyzer.overlay()
    }

    /// Open a new connection slot and return the callback its reader should
    /// deliver lines to. Lines from older connections are ignored.
    pub fn new_connection(&mut self) -> impl Fn(EngineLine) + Send + 'static + use<L> {
        self.connection += 1;
        let connection = self.connection;
        let tx = self.sender.clone();
        move |line| {
            let _ = tx.send(Event::Engine { connection, line });
        }
    }

    /// Start the analyzer on `link`, analysing the active node once ready.
    pub fn start_engine(&mut self, link: L) -> Result<(), AnalyzerError> {
        let active = self.tree.active();
        self.analyzer.start(link)?;
        self.analyzer.activate(&self.tree, active)
    }

    pub fn navigate(&mut self, to: NodeId) -> Result<(), GameError> {
        let from = self.tree.active();
        self.tree.transfer_observers(from, to)
    }

    /// Play at `(x, y)` from the active node, following an existing variation
    /// when there is one.
    pub fn play(&mut self, x: usize, y: usize) -> Result<NodeId, GameError> {
        let active = self.tree.active();
        let child = match self.tree.find_child_move(active, x, y) {
            Some(c) => c,
            None => self.tree.add_child_move(active, x, y)?,
        };
        self.navigate(child)?;
        Ok(child)
    }

    pub fn pass(&mut self) -> Result<NodeId, GameError> {
        let child = self.tree.add_child_pass(self.tree.active())?;
        self.navigate(child)?;
        Ok(child)
    }

    /// Delete the active node's subtree and step back to its parent.
    pub fn delete_active(&mut self) -> Result<NodeId, GameError> {
        self.tree.delete_node(self.tree.active())
    }

    fn process(&mut self, event: Event) -> Option<StatusUpdate> {
        match event {
            Event::ActiveChanged(id) => match self.analyzer.activate(&self.tree, id) {
                Ok(()) => None,
                Err(e) => Some(StatusUpdate {
                    state: self.analyzer.state(),
                    error: Some(e),
                }),
            },
            Event::Engine { connection, line } => {
                if connection != self.connection {
                    debug!("output of old engine connection {connection} ignored");
                    return None;
                }
                self.analyzer.handle_line(&self.tree, line)
            }
        }
    }

    /// Process every queued event without blocking.
    pub fn pump(&mut self) -> Vec<StatusUpdate> {
        let mut updates = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            updates.extend(self.process(event));
        }
        updates
    }

    /// Process events as they arrive until `done` holds or `timeout` passes.
    pub fn run_for(&mut self, timeout: Duration, mut done: impl FnMut(&Self) -> bool) -> Vec<StatusUpdate> {
        let deadline = Instant::now() + timeout;
        let mut updates = Vec::new();
        while !done(self) {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(left) {
                Ok(event) => updates.extend(self.process(event)),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        updates
    }
}

impl Session<ProcessLink> {
    /// Launch the configured engine process and start analysing.
    pub fn launch(&mut self, config: &EngineConfig) -> Result<(), AnalyzerError> {
        let forward = self.new_connection();
        let link = ProcessLink::spawn(config, forward)?;
        self.start_engine(link)
    }
}
