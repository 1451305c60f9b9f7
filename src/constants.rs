//! Constants for board geometry, GTP startup and analysis parameters.
//!
//! Board size is a runtime property of each game record, so only the bounds
//! live here. Analysis defaults can be overridden through
//! [`crate::config::AnalysisSettings`].

// =============================================================================
// Board Geometry
// =============================================================================

/// Default board size (NxN).
pub const DEFAULT_SIZE: usize = 19;

/// Smallest supported board.
pub const MIN_SIZE: usize = 2;

/// Largest supported board. GTP vertices run out of letters after 25 columns.
pub const MAX_SIZE: usize = 25;

/// Column letters used by GTP vertices (no 'I').
pub const COLUMN_LETTERS: &[u8; 25] = b"ABCDEFGHJKLMNOPQRSTUVWXYZ";

// =============================================================================
// Marks
// =============================================================================

/// Number of distinct letter marks (A-Z followed by a-z).
pub const LETTER_MARKS: u32 = 52;

/// Largest value a number mark may carry.
pub const MAX_NUMBER_MARK: u32 = 255;

// =============================================================================
// Engine
// =============================================================================

/// Default komi sent to the engine at startup.
pub const DEFAULT_KOMI: f32 = 7.5;

/// Centiseconds between `lz-analyze` reports.
pub const ANALYZE_INTERVAL: u32 = 100;

/// Scale of the `winrate` field in engine reports (10000 = certain win).
pub const WINRATE_SCALE: f64 = 10000.0;

// =============================================================================
// Overlay Construction
// =============================================================================

/// Hard cap on retained candidates, bounded by the letter alphabet.
pub const MAX_CANDIDATES: usize = LETTER_MARKS as usize;

/// Single-move candidates with fewer visits than this are pruned.
pub const PRUNE_VISITS: u32 = 2;

/// Winrate reported for the primary candidate before any report arrives.
pub const NEUTRAL_WINRATE: f64 = 0.5;
