//! Move numbers for display.
//!
//! Labels the stones of a run of consecutive moves with 1, 2, 3, ... so a
//! renderer can print them on the board. The same walk serves the game history
//! (anchored at a record node, walking back towards the root) and engine
//! variations (anchored at the first move of a PV, walking forward).

use crate::gametree::{GameTree, Node, NodeId};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Direction {
    /// Towards the root. The nearest move gets the lowest provisional count,
    /// so counts are reversed for display.
    Back,
    /// Along the primary line. Counts are already in display order.
    Forward,
}

/// Per-cell move numbers, indexed by [`crate::position::Position::bitpos`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoveNumbers {
    counts: Vec<u32>,
    n_back: u32,
    direction: Direction,
}

impl MoveNumbers {
    /// Number the moves leading to `anchor`.
    ///
    /// Walks back while nodes are moves without a start-count flag. Reaching
    /// the root numbers from the start of the game; reaching a flagged node
    /// numbers from just after it. Any other stop (a pass, an unflagged edit)
    /// makes the history ambiguous and yields `None`.
    pub fn history(tree: &GameTree, anchor: NodeId) -> Option<Self> {
        Self::history_capped(tree, anchor, 0)
    }

    /// Like [`MoveNumbers::history`] but numbers at most `cap` moves (0 = no cap).
    pub fn history_capped(tree: &GameTree, anchor: NodeId, cap: usize) -> Option<Self> {
        let size = tree.board_size();
        let mut numbers = Self::empty(size, Direction::Back);
        let mut cur = Some(anchor);
        while let Some(id) = cur {
            if tree.get_start_count(id) || tree.root_node_p(id) {
                break;
            }
            if cap > 0 && numbers.n_back as usize >= cap {
                break;
            }
            let (x, y) = tree.get(id).and_then(Node::move_point)?;
            numbers.record(size, x, y);
            cur = tree.prev_move(id);
        }
        Some(numbers)
    }

    /// Number an engine variation starting at `first`, following first
    /// children for at most `max_depth` moves (0 = the whole line).
    pub fn variation(tree: &GameTree, first: NodeId, max_depth: usize) -> Self {
        let size = tree.board_size();
        let mut numbers = Self::empty(size, Direction::Forward);
        let mut cur = Some(first);
        while let Some(id) = cur {
            if max_depth > 0 && numbers.n_back as usize >= max_depth {
                break;
            }
            let Some((x, y)) = tree.get(id).and_then(Node::move_point) else {
                break;
            };
            numbers.record(size, x, y);
            cur = tree.next_move(id);
        }
        numbers
    }

    fn empty(size: usize, direction: Direction) -> Self {
        Self {
            counts: vec![0; size * size],
            n_back: 0,
            direction,
        }
    }

    fn record(&mut self, size: usize, x: usize, y: usize) {
        self.n_back += 1;
        self.counts[y * size + x] = self.n_back;
    }

    /// Provisional count written during the walk (0 = unnumbered).
    pub fn raw(&self, bp: usize) -> u32 {
        self.counts.get(bp).copied().unwrap_or(0)
    }

    /// Number to show on a cell.
    pub fn displayed(&self, bp: usize) -> Option<u32> {
        let v = self.raw(bp);
        if v == 0 {
            return None;
        }
        Some(match self.direction {
            Direction::Back => self.n_back - v + 1,
            Direction::Forward => v,
        })
    }

    /// Number of moves walked; the largest number that can be displayed.
    pub fn max_number(&self) -> u32 {
        self.n_back
    }

    pub fn is_empty(&self) -> bool {
        self.n_back == 0
    }
}
