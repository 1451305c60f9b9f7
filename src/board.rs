//! Stone occupancy and the rules of Go.
//!
//! A [`Board`] is a plain 2D grid of optional stones. [`Board::play`] applies
//! captures, rejects suicide and enforces simple ko. Everything above this
//! module treats the rules as a black box.

use std::fmt;

use serde::{Deserialize, Serialize};

use log::warn;

use crate::constants::{MAX_SIZE, MIN_SIZE};
use crate::error::MoveError;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    Black,
    White,
}

impl Color {
    pub fn opponent(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }

    /// GTP color token.
    pub fn gtp(self) -> &'static str {
        match self {
            Color::Black => "B",
            Color::White => "W",
        }
    }
}

pub type Point = (usize, usize);

/// Bring a requested board size into `MIN_SIZE..=MAX_SIZE`.
pub fn clamp_size(size: usize) -> usize {
    let clamped = size.clamp(MIN_SIZE, MAX_SIZE);
    if clamped != size {
        warn!("board size {size} unsupported, using {clamped}");
    }
    clamped
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Board {
    size: usize,
    cells: Vec<Option<Color>>,
    /// Point the side to move may not retake this turn.
    ko: Option<Point>,
}

impl Board {
    /// An empty board. Sizes outside `MIN_SIZE..=MAX_SIZE` are clamped.
    pub fn new(size: usize) -> Self {
        let size = clamp_size(size);
        Self {
            size,
            cells: vec![None; size * size],
            ko: None,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn idx(&self, x: usize, y: usize) -> usize {
        y * self.size + x
    }

    pub fn get(&self, x: usize, y: usize) -> Option<Color> {
        if x >= self.size || y >= self.size {
            return None;
        }
        self.cells[self.idx(x, y)]
    }

    pub fn ko(&self) -> Option<Point> {
        self.ko
    }

    pub fn clear_ko(&mut self) {
        self.ko = None;
    }

    /// Put or remove a stone without applying any rules.
    pub fn set(&mut self, x: usize, y: usize, stone: Option<Color>) {
        if x >= self.size || y >= self.size {
            return;
        }
        let idx = self.idx(x, y);
        self.cells[idx] = stone;
        self.ko = None;
    }

    fn neighbors(&self, x: usize, y: usize) -> impl Iterator<Item = Point> + '_ {
        let s = self.size;
        let mut v = Vec::with_capacity(4);
        if x > 0 {
            v.push((x - 1, y));
        }
        if x + 1 < s {
            v.push((x + 1, y));
        }
        if y > 0 {
            v.push((x, y - 1));
        }
        if y + 1 < s {
            v.push((x, y + 1));
        }
        v.into_iter()
    }

    /// Play a stone, removing any captured groups.
    ///
    /// Returns the number of captured stones. On error the board is unchanged.
    pub fn play(&mut self, x: usize, y: usize, color: Color) -> Result<usize, MoveError> {
        if x >= self.size || y >= self.size {
            return Err(MoveError::OutOfBounds);
        }
        if self.get(x, y).is_some() {
            return Err(MoveError::Occupied);
        }
        if self.ko == Some((x, y)) {
            return Err(MoveError::Ko);
        }
        let idx = self.idx(x, y);
        self.cells[idx] = Some(color);

        let opp = color.opponent();
        let mut to_remove: Vec<Point> = Vec::new();
        for (nx, ny) in self.neighbors(x, y) {
            if self.get(nx, ny) == Some(opp)
                && !to_remove.contains(&(nx, ny))
                && self.group_liberties(nx, ny) == 0
            {
                self.collect_group(nx, ny, &mut to_remove);
            }
        }
        for &(rx, ry) in &to_remove {
            let i = self.idx(rx, ry);
            self.cells[i] = None;
        }

        let captures = to_remove.len();
        if captures == 0 && self.group_liberties(x, y) == 0 {
            self.cells[idx] = None; // undo suicidal move
            return Err(MoveError::Suicide);
        }

        // A lone stone that captured a lone stone and now sits in atari
        // may be retaken immediately unless we forbid it.
        self.ko = None;
        if captures == 1 && self.group_liberties(x, y) == 1 {
            let mut own = Vec::new();
            self.collect_group(x, y, &mut own);
            if own.len() == 1 {
                self.ko = Some(to_remove[0]);
            }
        }
        Ok(captures)
    }

    fn collect_group(&self, x: usize, y: usize, out: &mut Vec<Point>) -> usize {
        let Some(color) = self.get(x, y) else {
            return 0;
        };
        let mut stack = vec![(x, y)];
        let mut visited = vec![false; self.size * self.size];
        let mut count = 0;
        while let Some((cx, cy)) = stack.pop() {
            let i = self.idx(cx, cy);
            if visited[i] {
                continue;
            }
            visited[i] = true;
            if self.get(cx, cy) == Some(color) {
                out.push((cx, cy));
                count += 1;
                for (nx, ny) in self.neighbors(cx, cy) {
                    let ni = self.idx(nx, ny);
                    if !visited[ni] && self.get(nx, ny) == Some(color) {
                        stack.push((nx, ny));
                    }
                }
            }
        }
        count
    }

    /// Count distinct empty points adjacent to the group at `(x, y)`.
    pub fn group_liberties(&self, x: usize, y: usize) -> usize {
        let Some(color) = self.get(x, y) else {
            return 0;
        };
        let mut stack = vec![(x, y)];
        let mut visited = vec![false; self.size * self.size];
        let mut liberty_seen = vec![false; self.size * self.size];
        let mut liberties = 0;
        while let Some((cx, cy)) = stack.pop() {
            let i = self.idx(cx, cy);
            if visited[i] {
                continue;
            }
            visited[i] = true;
            for (nx, ny) in self.neighbors(cx, cy) {
                let ni = self.idx(nx, ny);
                match self.get(nx, ny) {
                    None => {
                        if !liberty_seen[ni] {
                            liberty_seen[ni] = true;
                            liberties += 1;
                        }
                    }
                    Some(c) if c == color && !visited[ni] => stack.push((nx, ny)),
                    _ => {}
                }
            }
        }
        liberties
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in 0..self.size {
            for x in 0..self.size {
                let ch = match self.get(x, y) {
                    Some(Color::Black) => 'X',
                    Some(Color::White) => 'O',
                    None => '.',
                };
                write!(f, "{ch} ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
