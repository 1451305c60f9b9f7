//! Goban-Analysis command line.
//!
//! ## Usage
//!
//! - `goban-analysis demo` - Build a random game record and print it numbered
//! - `goban-analysis analyze --engine leelaz --arg=-g --arg=-wnet.gz --moves D4 Q16`
//!   - Run an engine on a position and print its candidate moves

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};

use goban_analysis::analyzer::{AnalyzerState, Session};
use goban_analysis::board::Color;
use goban_analysis::config::{Settings, WinratePerspective};
use goban_analysis::constants::{DEFAULT_SIZE, MAX_SIZE, MIN_SIZE};
use goban_analysis::gametree::{GameTree, NodeId};
use goban_analysis::gtp::ProcessLink;
use goban_analysis::logging::setup_logging;
use goban_analysis::numbering::MoveNumbers;
use goban_analysis::position::{Position, Vertex, parse_coord, str_coord};
use goban_analysis::render::{Diagram, overlay_summary, status_line};

/// Goban-Analysis: a Go game record with a live engine overlay
#[derive(Parser)]
#[command(name = "goban-analysis")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level, unless RUST_LOG is set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Copy, Clone, ValueEnum)]
enum Perspective {
    ToMove,
    Black,
    White,
}

impl From<Perspective> for WinratePerspective {
    fn from(p: Perspective) -> Self {
        match p {
            Perspective::ToMove => WinratePerspective::ToMove,
            Perspective::Black => WinratePerspective::Black,
            Perspective::White => WinratePerspective::White,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build a random game with a few variations and print it
    Demo {
        #[arg(long, default_value_t = 9)]
        size: usize,
        /// Moves in the main line
        #[arg(long, default_value_t = 30)]
        moves: usize,
        /// Seed for reproducible games
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Analyse a position with an external GTP engine supporting lz-analyze
    Analyze {
        /// Engine executable
        #[arg(long)]
        engine: Option<String>,
        /// Extra engine argument (repeatable)
        #[arg(long = "arg", allow_hyphen_values = true)]
        args: Vec<String>,
        /// JSON settings file
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        size: Option<usize>,
        #[arg(long)]
        komi: Option<f32>,
        /// Moves to play from the empty board, e.g. D4 Q16 pass
        #[arg(long, num_args = 1..)]
        moves: Vec<String>,
        /// Reports to wait for
        #[arg(long, default_value_t = 3)]
        batches: u64,
        /// Seconds to wait before giving up
        #[arg(long, default_value_t = 60)]
        timeout: u64,
        /// Keep single-move candidates with very few visits
        #[arg(long)]
        no_prune: bool,
        #[arg(long)]
        max_moves: Option<usize>,
        #[arg(long, value_enum)]
        perspective: Option<Perspective>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _logger = setup_logging(&cli.log_level).context("failed to start logging")?;

    match cli.command {
        Some(Commands::Analyze {
            engine,
            args,
            config,
            size,
            komi,
            moves,
            batches,
            timeout,
            no_prune,
            max_moves,
            perspective,
        }) => {
            let mut settings = match config {
                Some(path) => Settings::load(&path)
                    .with_context(|| format!("loading settings from {}", path.display()))?,
                None => Settings::default(),
            };
            if let Some(engine) = engine {
                settings.engine.command = engine;
            }
            if !args.is_empty() {
                settings.engine.args = args;
            }
            if let Some(size) = size {
                settings.engine.board_size = size;
            }
            if let Some(komi) = komi {
                settings.engine.komi = komi;
            }
            if no_prune {
                settings.analysis.prune = false;
            }
            if let Some(n) = max_moves {
                settings.analysis.max_moves = n;
            }
            if let Some(p) = perspective {
                settings.analysis.perspective = p.into();
            }
            settings.engine.validate()?;
            run_analysis(settings, &moves, batches, Duration::from_secs(timeout))
        }
        Some(Commands::Demo { size, moves, seed }) => run_demo(size, moves, seed),
        None => run_demo(DEFAULT_SIZE, 40, None),
    }
}

fn run_demo(size: usize, moves: usize, seed: Option<u64>) -> Result<()> {
    if !(MIN_SIZE..=MAX_SIZE).contains(&size) {
        bail!("board size {size} outside {MIN_SIZE}..={MAX_SIZE}");
    }
    let mut rng = match seed {
        Some(s) => fastrand::Rng::with_seed(s),
        None => fastrand::Rng::new(),
    };

    let mut tree = GameTree::new(Position::new(size), Color::Black);
    let mut cur = tree.root();
    let mut branch_points = Vec::new();
    for _ in 0..moves {
        let Some(next) = random_move(&mut tree, cur, &mut rng) else {
            cur = tree.add_child_pass(cur)?;
            continue;
        };
        // Occasionally leave an alternative behind.
        if rng.u8(0..8) == 0 && random_move(&mut tree, cur, &mut rng).is_some() {
            branch_points.push(cur);
        }
        cur = next;
    }
    let root = tree.root();
    tree.transfer_observers(root, cur)?;

    println!("Goban-Analysis: random {size}x{size} game\n");
    let position = tree.node(cur)?.position();
    let numbers = MoveNumbers::history(&tree, cur);
    if numbers.is_none() {
        println!("(a pass interrupts the history; numbers hidden)\n");
    }
    println!("{}", Diagram::new(position).with_numbers(numbers.as_ref()));

    println!("{} nodes, {} moves deep", tree.len(), tree.depth(cur));
    for bp in branch_points {
        let node = tree.node(bp)?;
        let alternatives: Vec<String> = node
            .children()
            .iter()
            .filter_map(|&c| tree.node(c).ok()?.move_point())
            .filter_map(|(x, y)| str_coord(x, y, size))
            .collect();
        println!("after move {}: {}", tree.depth(bp), alternatives.join(" / "));
    }
    Ok(())
}

/// Add a random legal move below `parent`, if one is found quickly.
fn random_move(tree: &mut GameTree, parent: NodeId, rng: &mut fastrand::Rng) -> Option<NodeId> {
    let size = tree.board_size();
    (0..size * size).find_map(|_| tree.add_child_move(parent, rng.usize(0..size), rng.usize(0..size)).ok())
}

fn run_analysis(settings: Settings, moves: &[String], batches: u64, timeout: Duration) -> Result<()> {
    let size = settings.engine.board_size;
    let perspective = settings.analysis.perspective;
    let tree = GameTree::new(Position::new(size), Color::Black);
    let mut session: Session<ProcessLink> = Session::new(tree, settings.engine.komi, settings.analysis.clone())?;

    for mv in moves {
        match parse_coord(mv, size) {
            Some(Vertex::Point(x, y)) => {
                session.play(x, y).with_context(|| format!("playing {mv}"))?;
            }
            Some(Vertex::Pass) => {
                session.pass()?;
            }
            None => bail!("'{mv}' is not a vertex on a {size}x{size} board"),
        }
    }

    session
        .launch(&settings.engine)
        .with_context(|| format!("starting {}", settings.engine.command))?;
    info!("waiting for {batches} reports");

    let updates = session.run_for(timeout, |s| {
        s.analyzer().state() == AnalyzerState::Disconnected || s.overlay().builds() >= batches
    });
    for update in &updates {
        if let Some(e) = &update.error {
            error!("{e}");
        }
    }

    let state = session.analyzer().state();
    let overlay = session.overlay();
    let active = session.tree().active();
    let position = session.tree().node(active)?.position();
    println!("{}", status_line(state, overlay, perspective));
    println!("{}", Diagram::new(position).with_overlay(Some(overlay)));
    print!("{}", overlay_summary(overlay, perspective));
    if let Some(best) = overlay.candidates().first() {
        let (x, y) = best.point;
        let settings = session.analyzer().settings();
        if let Some(end) = overlay.variation_position(x, y, settings) {
            let numbers = overlay.variation_numbers(x, y, settings);
            println!("\nVariation {}:", best.mv);
            println!("{}", Diagram::new(end).with_numbers(numbers.as_ref()));
        }
    }

    if let Some(err) = updates.into_iter().find_map(|u| u.error) {
        return Err(err.into());
    }
    if state != AnalyzerState::Disconnected && overlay.builds() < batches {
        eprintln!("timed out after {} of {batches} reports", overlay.builds());
    }
    session.analyzer_mut().stop();
    Ok(())
}
