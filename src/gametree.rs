//! The branching game record.
//!
//! Nodes live in an arena owned by [`GameTree`] and refer to each other by
//! [`NodeId`]. Children are owned through the arena in variation order; the
//! parent link is a plain index and never keeps a node alive.
//!
//! The same type backs the persistent record and the throwaway variation tree
//! built from engine output (see [`TreeKind`]).
//!
//! Views learn about navigation only through observers: callbacks attached to
//! the active node, moved along by [`GameTree::transfer_observers`].

use crate::board::Color;
use crate::error::GameError;
use crate::position::{Mark, Position};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// How a node's position came about.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Move {
    Root,
    Play { x: usize, y: usize, color: Color },
    Pass { color: Color },
    /// Stones were placed or removed by hand.
    Edit,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TreeKind {
    /// The persistent game record.
    Record,
    /// Engine variations, rebuilt on every report.
    Overlay,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct Observer {
    id: ObserverId,
    callback: Box<dyn FnMut(NodeId)>,
}

/// One position in the record plus the move that produced it.
pub struct Node {
    position: Position,
    mv: Move,
    to_move: Color,
    comment: String,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    observers: Vec<Observer>,
    start_count: bool,
}

impl Node {
    fn new(position: Position, mv: Move, to_move: Color, parent: Option<NodeId>) -> Self {
        Self {
            position,
            mv,
            to_move,
            comment: String::new(),
            children: Vec::new(),
            parent,
            observers: Vec::new(),
            start_count: false,
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn get_move(&self) -> Move {
        self.mv
    }

    pub fn to_move(&self) -> Color {
        self.to_move
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Coordinates of the stone played here, if this is a move node.
    pub fn move_point(&self) -> Option<(usize, usize)> {
        match self.mv {
            Move::Play { x, y, .. } => Some((x, y)),
            _ => None,
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

/// Arena of nodes addressed by [`NodeId`].
///
/// Deleted slots are left empty and never handed out again, so an id kept by
/// an observer or the analyzer either resolves to the node it was issued for
/// or to nothing. The arena only grows; a record is dropped as a whole when a
/// new game starts.
pub struct GameTree {
    kind: TreeKind,
    nodes: Vec<Option<Node>>,
    live: usize,
    root: NodeId,
    active: NodeId,
    next_observer: u64,
}

impl GameTree {
    /// Start a game record from `position` with `to_move` to play.
    pub fn new(position: Position, to_move: Color) -> Self {
        Self::with_kind(TreeKind::Record, position, to_move)
    }

    /// Start a variation tree over a private copy of a position.
    pub fn new_overlay(position: Position, to_move: Color) -> Self {
        Self::with_kind(TreeKind::Overlay, position, to_move)
    }

    fn with_kind(kind: TreeKind, position: Position, to_move: Color) -> Self {
        let root = Node::new(position, Move::Root, to_move, None);
        Self {
            kind,
            nodes: vec![Some(root)],
            live: 1,
            root: NodeId(0),
            active: NodeId(0),
            next_observer: 0,
        }
    }

    pub fn kind(&self) -> TreeKind {
        self.kind
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The node currently under navigation focus.
    pub fn active(&self) -> NodeId {
        self.active
    }

    pub fn board_size(&self) -> usize {
        self.nodes[self.root.0]
            .as_ref()
            .map_or(0, |n| n.position.size())
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, GameError> {
        self.get(id).ok_or(GameError::UnknownNode(id.0))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, GameError> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(GameError::UnknownNode(id.0))
    }

    fn push_child(&mut self, parent: NodeId, child: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(child));
        self.live += 1;
        if let Some(Some(p)) = self.nodes.get_mut(parent.0) {
            p.children.push(id);
        }
        id
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Play the side to move at `(x, y)` and append the result as a new child.
    ///
    /// The child is not made active. Illegal moves leave the tree unchanged.
    pub fn add_child_move(&mut self, parent: NodeId, x: usize, y: usize) -> Result<NodeId, GameError> {
        let node = self.node(parent)?;
        let color = node.to_move;
        let mut position = node.position.clone();
        position.clear_marks();
        position.add_stone(x, y, color)?;
        let child = Node::new(position, Move::Play { x, y, color }, color.opponent(), Some(parent));
        Ok(self.push_child(parent, child))
    }

    /// Append a move node whose resulting position is already known.
    pub fn add_child_move_nochecks(
        &mut self,
        parent: NodeId,
        position: Position,
        color: Color,
        x: usize,
        y: usize,
        start_count: bool,
    ) -> Result<NodeId, GameError> {
        self.node(parent)?;
        let mut child = Node::new(position, Move::Play { x, y, color }, color.opponent(), Some(parent));
        child.start_count = start_count;
        Ok(self.push_child(parent, child))
    }

    pub fn add_child_pass(&mut self, parent: NodeId) -> Result<NodeId, GameError> {
        let node = self.node(parent)?;
        let color = node.to_move;
        let mut position = node.position.clone();
        position.clear_marks();
        position.clear_ko();
        let child = Node::new(position, Move::Pass { color }, color.opponent(), Some(parent));
        Ok(self.push_child(parent, child))
    }

    /// Append an edited position. A committed edit restarts move numbering.
    pub fn add_child_edit(
        &mut self,
        parent: NodeId,
        position: Position,
        to_move: Color,
        commit: bool,
    ) -> Result<NodeId, GameError> {
        self.node(parent)?;
        let mut child = Node::new(position, Move::Edit, to_move, Some(parent));
        child.start_count = commit;
        Ok(self.push_child(parent, child))
    }

    /// Overwrite a node's position in place.
    ///
    /// Only allowed for a childless node that is the root or itself an edit;
    /// anything else must go through [`GameTree::add_child_edit`].
    pub fn replace(&mut self, id: NodeId, position: Position, to_move: Color) -> Result<(), GameError> {
        let node = self.node_mut(id)?;
        let replaceable = matches!(node.mv, Move::Root | Move::Edit);
        if !node.children.is_empty() || !replaceable {
            return Err(GameError::ReplaceNotAllowed);
        }
        node.position = position;
        node.to_move = to_move;
        Ok(())
    }

    pub fn set_comment(&mut self, id: NodeId, comment: &str) -> Result<(), GameError> {
        self.node_mut(id)?.comment = comment.to_string();
        Ok(())
    }

    /// Force the side to move, e.g. after handicap placement.
    pub fn set_to_move(&mut self, id: NodeId, color: Color) -> Result<(), GameError> {
        self.node_mut(id)?.to_move = color;
        Ok(())
    }

    pub fn set_start_count(&mut self, id: NodeId, on: bool) -> Result<(), GameError> {
        self.node_mut(id)?.start_count = on;
        Ok(())
    }

    pub fn set_mark(&mut self, id: NodeId, x: usize, y: usize, mark: Mark, extra: u32) -> Result<bool, GameError> {
        Ok(self.node_mut(id)?.position.set_mark(x, y, mark, extra))
    }

    pub fn set_text_mark(&mut self, id: NodeId, x: usize, y: usize, text: &str) -> Result<(), GameError> {
        self.node_mut(id)?.position.set_text_mark(x, y, text);
        Ok(())
    }

    /// Remove a node and its subtree. Returns the parent, which becomes
    /// active if the active node was removed.
    pub fn delete_node(&mut self, id: NodeId) -> Result<NodeId, GameError> {
        let node = self.node(id)?;
        let Some(parent) = node.parent else {
            return Err(GameError::RootDeletion);
        };

        let mut doomed = vec![id];
        let mut i = 0;
        while i < doomed.len() {
            let kids = self.node(doomed[i])?.children.clone();
            doomed.extend(kids);
            i += 1;
        }
        let held_active = doomed.contains(&self.active);

        let mut orphaned = Vec::new();
        for &d in &doomed {
            if let Some(node) = self.nodes[d.0].take() {
                self.live -= 1;
                orphaned.extend(node.observers);
            }
        }
        self.node_mut(parent)?.children.retain(|&c| c != id);

        if held_active {
            self.node_mut(parent)?.observers.extend(orphaned);
            self.active = parent;
        }
        if self.get(self.active).is_none() || (held_active && self.active != parent) {
            return Err(GameError::InvariantViolation(format!(
                "active node {} does not survive deletion of node {}",
                self.active.0, id.0
            )));
        }
        if held_active {
            self.notify(parent);
        }
        Ok(parent)
    }

    // =========================================================================
    // Observers
    // =========================================================================

    /// Attach a callback that fires whenever `node`'s observers move to a
    /// newly active node.
    pub fn add_observer(
        &mut self,
        node: NodeId,
        callback: impl FnMut(NodeId) + 'static,
    ) -> Result<ObserverId, GameError> {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.node_mut(node)?.observers.push(Observer {
            id,
            callback: Box::new(callback),
        });
        Ok(id)
    }

    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        for node in self.nodes.iter_mut().flatten() {
            if let Some(i) = node.observers.iter().position(|o| o.id == id) {
                node.observers.remove(i);
                return true;
            }
        }
        false
    }

    /// Make `to` the active node, moving every observer of `from` onto it.
    ///
    /// Observers are called after the move is complete, each with `to`.
    pub fn transfer_observers(&mut self, from: NodeId, to: NodeId) -> Result<(), GameError> {
        self.node(to)?;
        if from == to {
            return Ok(());
        }
        let moved = std::mem::take(&mut self.node_mut(from)?.observers);
        self.node_mut(to)?.observers.extend(moved);
        self.active = to;
        self.notify(to);
        Ok(())
    }

    fn notify(&mut self, id: NodeId) {
        if let Some(Some(node)) = self.nodes.get_mut(id.0) {
            for observer in &mut node.observers {
                (observer.callback)(id);
            }
        }
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    pub fn find_child_move(&self, id: NodeId, x: usize, y: usize) -> Option<NodeId> {
        let node = self.get(id)?;
        node.children
            .iter()
            .copied()
            .find(|&c| self.get(c).and_then(Node::move_point) == Some((x, y)))
    }

    /// Next node along the primary line (the first child).
    pub fn next_move(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.children.first().copied()
    }

    pub fn prev_move(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.parent
    }

    /// True if a stone was played to reach this node.
    pub fn was_move_p(&self, id: NodeId) -> bool {
        matches!(self.get(id).map(|n| n.mv), Some(Move::Play { .. }))
    }

    pub fn root_node_p(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(|n| n.parent.is_none())
    }

    pub fn get_start_count(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(|n| n.start_count)
    }

    /// Distance from the root. Root is 0.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut cur = self.prev_move(id);
        while let Some(p) = cur {
            depth += 1;
            cur = self.prev_move(p);
        }
        depth
    }

    /// Nodes from the root down to `id`, inclusive.
    pub fn path_from_root(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut cur = self.get(id).map(|_| id);
        while let Some(n) = cur {
            path.push(n);
            cur = self.prev_move(n);
        }
        path.reverse();
        path
    }

    /// Ghost board of the moves available from `id`, lettered in variation order.
    pub fn child_moves(&self, id: NodeId) -> Position {
        let children = self.get(id).map(|n| n.children.clone()).unwrap_or_default();
        self.variation_board(&children, None)
    }

    /// Ghost board of the alternatives to `id` at its parent.
    pub fn sibling_moves(&self, id: NodeId) -> Position {
        let siblings = self
            .prev_move(id)
            .and_then(|p| self.get(p))
            .map(|p| p.children.clone())
            .unwrap_or_default();
        self.variation_board(&siblings, Some(id))
    }

    fn variation_board(&self, nodes: &[NodeId], skip: Option<NodeId>) -> Position {
        let mut board = Position::new(self.board_size());
        for (i, &c) in nodes.iter().enumerate() {
            if Some(c) == skip {
                continue;
            }
            if let Some(Move::Play { x, y, color }) = self.get(c).map(|n| n.mv) {
                board.set_stone(x, y, Some(color));
                board.set_mark(x, y, Mark::Letter, i as u32);
            }
        }
        board
    }
}
