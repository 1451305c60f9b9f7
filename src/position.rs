//! Board positions with annotation marks, and GTP coordinate conversion.
//!
//! A [`Position`] is a full snapshot: stones (via [`Board`]), per-cell marks and
//! the ko state. Cells are addressed by `(x, y)` with `(0, 0)` in the top-left
//! corner, or by the linear index returned by [`Position::bitpos`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::board::{Board, Color, Point};
use crate::constants::{COLUMN_LETTERS, LETTER_MARKS, MAX_NUMBER_MARK};
use crate::error::MoveError;

/// Annotation drawn on top of a cell.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    #[default]
    None,
    Circle,
    Square,
    Triangle,
    Cross,
    /// Extra is the letter index: 0..26 is A-Z, 26..52 is a-z.
    Letter,
    /// Extra is the (positive) number shown.
    Number,
    /// Free text, see [`Position::mark_text_at`].
    Text,
    /// Extra is 0 for white territory, 1 for black.
    Territory,
    FalseEye,
    Seki,
    /// Highlight of a played move.
    Move,
}

/// Render a letter mark index as its character.
pub fn letter_for(extra: u32) -> char {
    if extra < 26 {
        (b'A' + extra as u8) as char
    } else {
        (b'a' + (extra - 26) as u8) as char
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Position {
    board: Board,
    marks: Vec<(Mark, u32)>,
    texts: HashMap<usize, String>,
}

impl Position {
    pub fn new(size: usize) -> Self {
        let board = Board::new(size);
        let cells = board.size() * board.size();
        Self {
            board,
            marks: vec![(Mark::None, 0); cells],
            texts: HashMap::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.board.size()
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn on_board(&self, x: usize, y: usize) -> bool {
        x < self.size() && y < self.size()
    }

    /// Linear index of a cell. Shared by every per-cell array in the crate.
    #[inline]
    pub fn bitpos(&self, x: usize, y: usize) -> usize {
        y * self.size() + x
    }

    /// Inverse of [`Position::bitpos`].
    #[inline]
    pub fn coords(&self, bp: usize) -> Point {
        (bp % self.size(), bp / self.size())
    }

    pub fn stone_at(&self, x: usize, y: usize) -> Option<Color> {
        self.board.get(x, y)
    }

    pub fn mark_at(&self, x: usize, y: usize) -> Mark {
        if !self.on_board(x, y) {
            return Mark::None;
        }
        self.marks[self.bitpos(x, y)].0
    }

    pub fn mark_extra_at(&self, x: usize, y: usize) -> u32 {
        if !self.on_board(x, y) {
            return 0;
        }
        self.marks[self.bitpos(x, y)].1
    }

    pub fn mark_text_at(&self, x: usize, y: usize) -> Option<&str> {
        if self.mark_at(x, y) != Mark::Text {
            return None;
        }
        self.texts.get(&self.bitpos(x, y)).map(String::as_str)
    }

    /// Set a mark, returning whether anything changed.
    ///
    /// Letter extras outside `0..52` and number extras outside `1..=255` are
    /// rejected and leave the cell untouched.
    pub fn set_mark(&mut self, x: usize, y: usize, mark: Mark, extra: u32) -> bool {
        if !self.on_board(x, y) {
            return false;
        }
        let valid = match mark {
            Mark::Letter => extra < LETTER_MARKS,
            Mark::Number => (1..=MAX_NUMBER_MARK).contains(&extra),
            _ => true,
        };
        if !valid {
            return false;
        }
        let bp = self.bitpos(x, y);
        let extra = match mark {
            Mark::Letter | Mark::Number | Mark::Territory => extra,
            _ => 0,
        };
        if self.marks[bp] == (mark, extra) {
            return false;
        }
        self.marks[bp] = (mark, extra);
        self.texts.remove(&bp);
        true
    }

    pub fn set_text_mark(&mut self, x: usize, y: usize, text: &str) {
        if !self.on_board(x, y) {
            return;
        }
        let bp = self.bitpos(x, y);
        self.marks[bp] = (Mark::Text, 0);
        self.texts.insert(bp, text.to_string());
    }

    pub fn clear_marks(&mut self) {
        self.marks.fill((Mark::None, 0));
        self.texts.clear();
    }

    /// Play a stone under the rules of Go. Returns the number of captures.
    pub fn add_stone(&mut self, x: usize, y: usize, color: Color) -> Result<usize, MoveError> {
        self.board.play(x, y, color)
    }

    /// Edit-mode placement: no captures, no legality checks.
    pub fn set_stone(&mut self, x: usize, y: usize, stone: Option<Color>) {
        self.board.set(x, y, stone);
    }

    pub fn clear_ko(&mut self) {
        self.board.clear_ko();
    }

    /// All stones in board-scan order (x outer, y inner).
    pub fn stones(&self) -> impl Iterator<Item = (usize, usize, Color)> + '_ {
        let n = self.size();
        (0..n).flat_map(move |x| (0..n).filter_map(move |y| self.stone_at(x, y).map(|c| (x, y, c))))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.board, f)
    }
}

/// A decoded GTP vertex.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Vertex {
    Point(usize, usize),
    Pass,
}

/// Parse a GTP vertex (e.g. "D4", "pass") for a board of `size`.
///
/// Columns are letters A-Z skipping 'I'; the row is counted from the bottom,
/// so rank `r` maps to `y = size - r`. Returns `None` for anything that does
/// not land on the board.
pub fn parse_coord(s: &str, size: usize) -> Option<Vertex> {
    if s.eq_ignore_ascii_case("pass") {
        return Some(Vertex::Pass);
    }

    let bytes = s.as_bytes();
    if bytes.len() < 2 || !bytes[0].is_ascii() {
        return None;
    }

    let col_char = bytes[0].to_ascii_uppercase();
    let x = COLUMN_LETTERS.iter().position(|&c| c == col_char)?;

    let rank: usize = s[1..].parse().ok()?;
    if rank == 0 || rank > size || x >= size {
        return None;
    }
    Some(Vertex::Point(x, size - rank))
}

/// Convert a board point to a GTP vertex string (e.g. "D4"), or `None` if
/// the point is off a `size` board or the board has no GTP column letters.
pub fn str_coord(x: usize, y: usize, size: usize) -> Option<String> {
    if x >= size || y >= size {
        return None;
    }
    let c = *COLUMN_LETTERS.get(x)? as char;
    Some(format!("{c}{}", size - y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_position() {
        let pos = Position::new(19);
        assert_eq!(pos.size(), 19);
        assert_eq!(pos.stones().count(), 0);
        assert_eq!(pos.mark_at(3, 3), Mark::None);
    }

    #[test]
    fn test_bitpos_coords_bijection() {
        let pos = Position::new(9);
        let mut seen = vec![false; 81];
        for y in 0..9 {
            for x in 0..9 {
                let bp = pos.bitpos(x, y);
                assert!(!seen[bp]);
                seen[bp] = true;
                assert_eq!(pos.coords(bp), (x, y));
            }
        }
    }

    #[test]
    fn test_parse_coord_skips_i() {
        assert_eq!(parse_coord("H5", 19), Some(Vertex::Point(7, 14)));
        assert_eq!(parse_coord("J5", 19), Some(Vertex::Point(8, 14)));
        assert_eq!(parse_coord("I5", 19), None);
        assert_eq!(parse_coord("d4", 19), Some(Vertex::Point(3, 15)));
    }

    #[test]
    fn test_parse_coord_bounds() {
        assert_eq!(parse_coord("A1", 9), Some(Vertex::Point(0, 8)));
        assert_eq!(parse_coord("J9", 9), Some(Vertex::Point(8, 0)));
        assert_eq!(parse_coord("K9", 9), None);
        assert_eq!(parse_coord("A10", 9), None);
        assert_eq!(parse_coord("A0", 9), None);
        assert_eq!(parse_coord("PASS", 9), Some(Vertex::Pass));
        assert_eq!(parse_coord("", 9), None);
    }

    #[test]
    fn test_str_coord() {
        assert_eq!(str_coord(0, 18, 19).as_deref(), Some("A1"));
        assert_eq!(str_coord(8, 0, 19).as_deref(), Some("J19"));
        assert_eq!(str_coord(15, 3, 19).as_deref(), Some("Q16"));
        assert_eq!(str_coord(24, 0, 25).as_deref(), Some("Z25"));
        assert_eq!(str_coord(9, 0, 9), None);
        assert_eq!(str_coord(25, 0, 26), None);
    }

    #[test]
    fn test_set_mark_reports_change() {
        let mut pos = Position::new(9);
        assert!(pos.set_mark(2, 2, Mark::Circle, 0));
        assert!(!pos.set_mark(2, 2, Mark::Circle, 0));
        assert!(pos.set_mark(2, 2, Mark::Letter, 51));
        assert_eq!(pos.mark_extra_at(2, 2), 51);
        assert!(!pos.set_mark(2, 2, Mark::Letter, 52));
        assert!(!pos.set_mark(3, 3, Mark::Number, 0));
        assert!(!pos.set_mark(9, 0, Mark::Circle, 0));
    }

    #[test]
    fn test_text_mark() {
        let mut pos = Position::new(9);
        pos.set_text_mark(1, 1, "ko");
        assert_eq!(pos.mark_at(1, 1), Mark::Text);
        assert_eq!(pos.mark_text_at(1, 1), Some("ko"));
        pos.set_mark(1, 1, Mark::None, 0);
        assert_eq!(pos.mark_text_at(1, 1), None);
    }

    #[test]
    fn test_stones_scan_order() {
        let mut pos = Position::new(9);
        pos.set_stone(5, 0, Some(Color::Black));
        pos.set_stone(0, 5, Some(Color::White));
        pos.set_stone(0, 1, Some(Color::Black));
        let order: Vec<_> = pos.stones().map(|(x, y, _)| (x, y)).collect();
        assert_eq!(order, vec![(0, 1), (0, 5), (5, 0)]);
    }

    #[test]
    fn test_letter_for() {
        assert_eq!(letter_for(0), 'A');
        assert_eq!(letter_for(25), 'Z');
        assert_eq!(letter_for(26), 'a');
        assert_eq!(letter_for(51), 'z');
    }
}
