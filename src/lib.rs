//! Goban-Analysis: a branching Go game record with a live engine overlay.
//!
//! A [`gametree::GameTree`] holds every variation of a game. An external
//! engine speaking GTP analyses whichever node is active, and its candidate
//! moves are rebuilt into an [`analysis::Overlay`] on every report.
//!
//! ## Modules
//!
//! - [`constants`] - Board bounds and analysis defaults
//! - [`board`] - Stones, captures, suicide and ko
//! - [`position`] - Board snapshot with marks; GTP vertex conversion
//! - [`gametree`] - Arena-backed record tree with navigation observers
//! - [`numbering`] - Move numbers for history and engine variations
//! - [`gtp`] - GTP client for the analysis engine
//! - [`analysis`] - Report parsing and overlay construction
//! - [`analyzer`] - Analyzer lifecycle and the event-driven session
//! - [`render`] - Text diagrams and summaries
//! - [`config`], [`error`], [`logging`] - Settings, error types, log setup
//!
//! ## Example
//!
//! ```
//! use goban_analysis::board::Color;
//! use goban_analysis::gametree::GameTree;
//! use goban_analysis::numbering::MoveNumbers;
//! use goban_analysis::position::Position;
//!
//! let mut tree = GameTree::new(Position::new(19), Color::Black);
//! let a = tree.add_child_move(tree.root(), 4, 4).unwrap();
//! let b = tree.add_child_move(a, 15, 15).unwrap();
//!
//! let numbers = MoveNumbers::history(&tree, b).unwrap();
//! assert_eq!(numbers.displayed(4 * 19 + 4), Some(1));
//! assert_eq!(numbers.displayed(15 * 19 + 15), Some(2));
//! ```

pub mod analysis;
pub mod analyzer;
pub mod board;
pub mod config;
pub mod constants;
pub mod error;
pub mod gametree;
pub mod gtp;
pub mod logging;
pub mod numbering;
pub mod position;
pub mod render;
