//! Turning engine reports into an overlay of candidate moves.
//!
//! A report is one `lz-analyze` line holding several `info move ...` records.
//! [`Overlay::build`] replaces the whole overlay on every report: a fresh
//! variation tree rooted at a copy of the analysed position, plus per-cell
//! winrate deltas and visit counts for the candidate cells.

use log::{debug, warn};

use crate::board::{Color, Point, clamp_size};
use crate::config::AnalysisSettings;
use crate::constants::{MAX_CANDIDATES, NEUTRAL_WINRATE, PRUNE_VISITS, WINRATE_SCALE};
use crate::error::{GameError, ReportError};
use crate::gametree::{GameTree, NodeId, TreeKind};
use crate::numbering::MoveNumbers;
use crate::position::{Mark, Position, Vertex, parse_coord};

/// One candidate move as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub mv: String,
    pub visits: u32,
    /// Winrate for the side to move, in units of 1/10000.
    pub winrate: u32,
    pub prior: Option<u32>,
    pub order: Option<u32>,
    pub pv: Vec<String>,
}

impl Candidate {
    pub fn winrate(&self) -> f64 {
        f64::from(self.winrate) / WINRATE_SCALE
    }
}

const KEYS: [&str; 6] = ["move", "visits", "winrate", "prior", "order", "pv"];

/// Split a report into candidate records.
///
/// Keys may come in any order; `pv` takes every token up to the end of the
/// record. Unknown keys (`lcb`, `utility`, ...) are skipped together with their
/// values. A record missing `move`, `visits` or `winrate`, or carrying a
/// non-numeric count, comes back as an error without affecting its neighbours.
pub fn parse_report(text: &str) -> Vec<Result<Candidate, ReportError>> {
    let mut records = Vec::new();
    let mut current: Option<Vec<&str>> = None;
    for token in text.split_whitespace() {
        if token == "info" {
            if let Some(rec) = current.take() {
                records.push(rec);
            }
            current = Some(Vec::new());
        } else if let Some(rec) = current.as_mut() {
            rec.push(token);
        }
    }
    records.extend(current);
    records
        .into_iter()
        .filter(|rec| !rec.is_empty())
        .map(|rec| parse_record(&rec))
        .collect()
}

fn parse_record(tokens: &[&str]) -> Result<Candidate, ReportError> {
    let malformed = |reason: String| ReportError::Malformed {
        record: tokens.join(" "),
        reason,
    };
    let number = |key: &str, value: Option<&&str>| -> Result<u32, ReportError> {
        let value = value.ok_or_else(|| malformed(format!("'{key}' has no value")))?;
        value
            .parse()
            .map_err(|_| malformed(format!("'{key}' value '{value}' is not a count")))
    };

    let mut mv = None;
    let mut visits = None;
    let mut winrate = None;
    let mut prior = None;
    let mut order = None;
    let mut pv = Vec::new();

    let mut i = 0;
    while i < tokens.len() {
        let key = tokens[i];
        match key {
            "move" => {
                let value = tokens.get(i + 1).ok_or_else(|| malformed("'move' has no value".into()))?;
                mv = Some(value.to_string());
                i += 2;
            }
            "visits" => {
                visits = Some(number(key, tokens.get(i + 1))?);
                i += 2;
            }
            "winrate" => {
                winrate = Some(number(key, tokens.get(i + 1))?);
                i += 2;
            }
            "prior" => {
                prior = Some(number(key, tokens.get(i + 1))?);
                i += 2;
            }
            "order" => {
                order = Some(number(key, tokens.get(i + 1))?);
                i += 2;
            }
            "pv" => {
                pv = tokens[i + 1..].iter().map(|t| t.to_string()).collect();
                break;
            }
            _ => {
                i += 1;
                while i < tokens.len() && !KEYS.contains(&tokens[i]) {
                    i += 1;
                }
            }
        }
    }

    let mv = mv.ok_or_else(|| malformed("missing 'move'".into()))?;
    let visits = visits.ok_or_else(|| malformed("missing 'visits'".into()))?;
    let winrate = winrate.ok_or_else(|| malformed("missing 'winrate'".into()))?;
    if f64::from(winrate) > WINRATE_SCALE {
        return Err(malformed(format!("winrate {winrate} above {WINRATE_SCALE}")));
    }
    if pv.is_empty() {
        pv.push(mv.clone());
    }
    Ok(Candidate {
        mv,
        visits,
        winrate,
        prior,
        order,
        pv,
    })
}

/// Evaluation of a single retained candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateEval {
    /// Position in the report, which is also the letter shown on the board.
    pub index: usize,
    pub mv: String,
    pub point: Point,
    pub winrate: f64,
    /// Winrate minus the primary candidate's winrate.
    pub delta: f64,
    pub visits: u32,
    /// Number of PV moves that made it into the overlay tree.
    pub depth: usize,
}

/// The engine's top choice, kept even when its PV could not be drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryEval {
    pub mv: String,
    pub winrate: f64,
    pub visits: u32,
}

/// Candidate moves for the active position, ready for display.
pub struct Overlay {
    size: usize,
    tree: Option<GameTree>,
    to_move: Option<Color>,
    winrate_delta: Vec<f64>,
    visits: Vec<u32>,
    candidates: Vec<CandidateEval>,
    primary: Option<PrimaryEval>,
    eval_input_paused: bool,
    builds: u64,
}

impl Overlay {
    pub fn new(size: usize) -> Self {
        let size = clamp_size(size);
        Self {
            size,
            tree: None,
            to_move: None,
            winrate_delta: vec![0.0; size * size],
            visits: vec![0; size * size],
            candidates: Vec::new(),
            primary: None,
            eval_input_paused: false,
            builds: 0,
        }
    }

    /// Rebuild from one report for the position at `active`.
    ///
    /// Returns `Ok(false)` without touching anything while evaluation input
    /// is paused. The record tree is only read.
    pub fn build(
        &mut self,
        tree: &GameTree,
        active: NodeId,
        report: &str,
        settings: &AnalysisSettings,
    ) -> Result<bool, GameError> {
        if self.eval_input_paused {
            debug!("evaluation input paused, report discarded");
            return Ok(false);
        }

        if tree.kind() != TreeKind::Record {
            return Err(GameError::InvariantViolation(
                "analysis overlays are built from the game record only".into(),
            ));
        }
        let node = tree.node(active)?;
        let size = node.position().size();
        let to_move = node.to_move();
        let mut overlay = GameTree::new_overlay(node.position().clone(), to_move);
        let root = overlay.root();
        let mut winrate_delta = vec![0.0; size * size];
        let mut visits = vec![0; size * size];
        let mut candidates = Vec::new();
        let mut primary: Option<PrimaryEval> = None;
        let limit = settings.candidate_limit().min(MAX_CANDIDATES);

        let mut count = 0;
        for record in parse_report(report) {
            let cand = match record {
                Ok(c) => c,
                Err(e) => {
                    warn!("skipping candidate: {e}");
                    continue;
                }
            };
            let index = count;
            count += 1;

            let baseline = match &primary {
                Some(p) => p.winrate,
                None => {
                    let p = PrimaryEval {
                        mv: cand.mv.clone(),
                        winrate: cand.winrate(),
                        visits: cand.visits,
                    };
                    let wr = p.winrate;
                    primary = Some(p);
                    wr
                }
            };

            let pruned = settings.prune && cand.pv.len() == 1 && cand.visits < PRUNE_VISITS;
            if pruned {
                debug!("pruned {} ({} visits)", cand.mv, cand.visits);
            } else if let Some(eval) =
                Self::add_variation(&mut overlay, root, &cand, index, baseline, size)
            {
                let bp = eval.point.1 * size + eval.point.0;
                winrate_delta[bp] = eval.delta;
                visits[bp] = eval.visits;
                candidates.push(eval);
            }

            if count >= limit {
                break;
            }
        }

        debug!(
            "overlay rebuilt: {} of {count} candidates shown, {} nodes",
            candidates.len(),
            overlay.len()
        );
        self.size = size;
        self.tree = Some(overlay);
        self.to_move = Some(to_move);
        self.winrate_delta = winrate_delta;
        self.visits = visits;
        self.candidates = candidates;
        self.primary = primary;
        self.builds += 1;
        Ok(true)
    }

    /// Hang a candidate's PV under the overlay root and letter its first move.
    fn add_variation(
        overlay: &mut GameTree,
        root: NodeId,
        cand: &Candidate,
        index: usize,
        baseline: f64,
        size: usize,
    ) -> Option<CandidateEval> {
        let mut first = None;
        let mut cur = root;
        for token in &cand.pv {
            let Some(Vertex::Point(x, y)) = parse_coord(token, size) else {
                break;
            };
            match overlay.add_child_move(cur, x, y) {
                Ok(child) => cur = child,
                Err(e) => {
                    debug!("PV of {} stops at {token}: {e}", cand.mv);
                    break;
                }
            }
            if first.is_none() {
                first = Some((x, y));
            }
        }

        let Some((x, y)) = first else {
            debug!("candidate {} has no playable first move", cand.mv);
            return None;
        };
        match overlay.set_mark(root, x, y, Mark::Letter, index as u32) {
            Ok(true) => {}
            Ok(false) => debug!("candidate {} at index {index} left unlettered", cand.mv),
            Err(e) => debug!("letter for candidate {} not set: {e}", cand.mv),
        }
        Some(CandidateEval {
            index,
            mv: cand.mv.clone(),
            point: (x, y),
            winrate: cand.winrate(),
            delta: cand.winrate() - baseline,
            visits: cand.visits,
            depth: overlay.depth(cur),
        })
    }

    /// Drop everything; arrays return to zero.
    pub fn clear(&mut self) {
        self.tree = None;
        self.to_move = None;
        self.winrate_delta.fill(0.0);
        self.visits.fill(0);
        self.candidates.clear();
        self.primary = None;
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_none()
    }

    /// The current variation tree, if a report has been applied.
    pub fn tree(&self) -> Option<&GameTree> {
        self.tree.as_ref()
    }

    /// Side to move in the analysed position.
    pub fn to_move(&self) -> Option<Color> {
        self.to_move
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn winrate_deltas(&self) -> &[f64] {
        &self.winrate_delta
    }

    pub fn visit_counts(&self) -> &[u32] {
        &self.visits
    }

    pub fn candidates(&self) -> &[CandidateEval] {
        &self.candidates
    }

    pub fn primary(&self) -> Option<&PrimaryEval> {
        self.primary.as_ref()
    }

    /// Primary winrate, or an even game when nothing has been reported.
    pub fn primary_winrate(&self) -> f64 {
        self.primary.as_ref().map_or(NEUTRAL_WINRATE, |p| p.winrate)
    }

    pub fn candidate_at(&self, x: usize, y: usize) -> Option<&CandidateEval> {
        self.candidates.iter().find(|c| c.point == (x, y))
    }

    /// Numbers for the PV that starts at `(x, y)`, up to
    /// `settings.max_depth` moves.
    pub fn variation_numbers(&self, x: usize, y: usize, settings: &AnalysisSettings) -> Option<MoveNumbers> {
        let tree = self.tree.as_ref()?;
        let first = tree.find_child_move(tree.root(), x, y)?;
        Some(MoveNumbers::variation(tree, first, settings.max_depth))
    }

    /// The board after the numbered part of the PV that starts at `(x, y)`.
    pub fn variation_position(&self, x: usize, y: usize, settings: &AnalysisSettings) -> Option<&Position> {
        let tree = self.tree.as_ref()?;
        let mut cur = tree.find_child_move(tree.root(), x, y)?;
        let mut depth = 1;
        while settings.max_depth == 0 || depth < settings.max_depth {
            match tree.next_move(cur) {
                Some(next) => cur = next,
                None => break,
            }
            depth += 1;
        }
        tree.get(cur).map(|n| n.position())
    }

    /// Temporarily ignore incoming reports, keeping the current overlay.
    pub fn set_eval_input_paused(&mut self, paused: bool) {
        self.eval_input_paused = paused;
    }

    pub fn eval_input_paused(&self) -> bool {
        self.eval_input_paused
    }

    /// Number of reports applied so far.
    pub fn builds(&self) -> u64 {
        self.builds
    }
}
