//! Runtime configuration for the analysis engine and overlay.
//!
//! Settings can be built in code with the `with_*` methods or loaded from a
//! JSON file; missing fields fall back to the defaults in
//! [`crate::constants`].
//!
//! ```
//! use goban_analysis::config::AnalysisSettings;
//!
//! let settings = AnalysisSettings::default().with_prune(false).with_max_moves(5);
//! assert_eq!(settings.candidate_limit(), 5);
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::board::Color;
use crate::constants::{ANALYZE_INTERVAL, DEFAULT_KOMI, DEFAULT_SIZE, MAX_CANDIDATES, MAX_SIZE, MIN_SIZE};
use crate::error::ConfigError;

/// Whose point of view winrates are shown from.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinratePerspective {
    /// The side to move (the engine's native view).
    #[default]
    ToMove,
    Black,
    White,
}

impl WinratePerspective {
    /// Convert a side-to-move winrate into this perspective.
    pub fn display_winrate(self, winrate: f64, to_move: Color) -> f64 {
        match (self, to_move) {
            (WinratePerspective::Black, Color::White) | (WinratePerspective::White, Color::Black) => {
                1.0 - winrate
            }
            _ => winrate,
        }
    }
}

/// How engine reports are turned into an overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Drop single-move candidates with very few visits.
    pub prune: bool,
    /// Maximum candidates to keep (0 = as many as the letter marks allow).
    pub max_moves: usize,
    /// Maximum PV moves to number on the board (0 = the whole line).
    pub max_depth: usize,
    /// Centiseconds between engine reports.
    pub interval: u32,
    pub perspective: WinratePerspective,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            prune: true,
            max_moves: 0,
            max_depth: 0,
            interval: ANALYZE_INTERVAL,
            perspective: WinratePerspective::default(),
        }
    }
}

impl AnalysisSettings {
    pub fn with_prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    pub fn with_max_moves(mut self, max_moves: usize) -> Self {
        self.max_moves = max_moves;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_perspective(mut self, perspective: WinratePerspective) -> Self {
        self.perspective = perspective;
        self
    }

    /// Effective candidate cap: the configured maximum, never above 52.
    pub fn candidate_limit(&self) -> usize {
        if self.max_moves == 0 {
            MAX_CANDIDATES
        } else {
            self.max_moves.min(MAX_CANDIDATES)
        }
    }
}

/// How to launch the analysis engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Executable to run, e.g. `leelaz`.
    pub command: String,
    pub args: Vec<String>,
    pub board_size: usize,
    pub komi: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            board_size: DEFAULT_SIZE,
            komi: DEFAULT_KOMI,
        }
    }
}

impl EngineConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_board_size(mut self, board_size: usize) -> Self {
        self.board_size = board_size;
        self
    }

    pub fn with_komi(mut self, komi: f32) -> Self {
        self.komi = komi;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "no engine command configured".to_string(),
            });
        }
        if !(MIN_SIZE..=MAX_SIZE).contains(&self.board_size) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "board size {} outside {MIN_SIZE}..={MAX_SIZE}",
                    self.board_size
                ),
            });
        }
        Ok(())
    }
}

/// Everything a settings file may contain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub analysis: AnalysisSettings,
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}
