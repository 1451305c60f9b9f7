//! Error types for the crate.

use thiserror::Error;

/// Why a stone could not be placed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveError {
    #[error("illegal move: point not empty")]
    Occupied,

    #[error("illegal move: outside the board")]
    OutOfBounds,

    #[error("illegal move: suicide")]
    Suicide,

    #[error("illegal move: retakes ko")]
    Ko,
}

/// Errors raised by game-tree navigation and mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GameError {
    /// The placement was rejected by the rules; the tree is unchanged.
    #[error(transparent)]
    InvalidMove(#[from] MoveError),

    /// An internal postcondition failed. This is a bug in the caller or the tree.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("the root node cannot be deleted")]
    RootDeletion,

    #[error("only a childless root or edit node can be replaced in place")]
    ReplaceNotAllowed,

    #[error("node {0} does not exist")]
    UnknownNode(usize),
}

/// Errors surfaced by the analysis engine and its lifecycle.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AnalyzerError {
    /// The engine answered with an explicit failure message.
    #[error("analysis engine failed: {0}")]
    EngineFailure(String),

    /// The engine process went away without being asked to.
    #[error("analysis engine exited unexpectedly")]
    EngineExited,

    #[error("no analysis engine is connected")]
    NotConnected,
    #[error("({x}, {y}) has no GTP vertex on a {size}x{size} board")]
    BadVertex { x: usize, y: usize, size: usize },

    #[error("failed to {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

/// A single candidate record in an engine report could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error("malformed report record '{record}': {reason}")]
    Malformed { record: String, reason: String },
}

/// Errors while loading settings files.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}
