//! Selection management for the editor.
//!
//! Tracks selected nodes, the selected connection and the rubber-band
//! rectangle while box-selecting.
//!
//! # Usage
//!
//! ```rust
//! use leadflow::editor::selection::Selection;
//! use leadflow::geometry::Point;
//!
//! let mut sel = Selection::new();
//! sel.start_rect(Point::new(10.0, 20.0));
//! sel.update_rect(Point::new(100.0, 120.0));
//! let rect = sel.take_rect().unwrap();
//! assert_eq!(rect.width(), 90.0);
//! ```

use crate::geometry::{Point, Rect};
use crate::model::{ConnectionId, NodeId};

/// Rubber-band rectangle in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionRect {
    pub start: Point,
    pub end: Point,
}

impl SelectionRect {
    pub fn new(p: Point) -> Self {
        Self { start: p, end: p }
    }

    pub fn rect(&self) -> Rect {
        Rect::from_corners(self.start, self.end)
    }

    pub fn width(&self) -> f32 {
        (self.end.x - self.start.x).abs()
    }

    pub fn height(&self) -> f32 {
        (self.end.y - self.start.y).abs()
    }

    /// Anything smaller than a few pixels is a click, not a box.
    pub fn is_meaningful(&self) -> bool {
        self.width() >= 3.0 || self.height() >= 3.0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub nodes: Vec<NodeId>,
    pub connection: Option<ConnectionId>,
    pub rect: Option<SelectionRect>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.connection = None;
        self.rect = None;
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.connection.is_none()
    }

    pub fn is_node_selected(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    /// The single selected node, which is what the property panel edits.
    pub fn primary_node(&self) -> Option<NodeId> {
        match self.nodes.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    pub fn select_node(&mut self, id: NodeId) {
        self.clear();
        self.nodes.push(id);
    }

    pub fn toggle_node(&mut self, id: NodeId) {
        self.connection = None;
        if let Some(pos) = self.nodes.iter().position(|&n| n == id) {
            self.nodes.remove(pos);
        } else {
            self.nodes.push(id);
        }
    }

    pub fn select_connection(&mut self, id: ConnectionId) {
        self.clear();
        self.connection = Some(id);
    }

    /// Forget ids that no longer exist.
    pub fn retain(&mut self, node_exists: impl Fn(NodeId) -> bool, conn_exists: impl Fn(ConnectionId) -> bool) {
        self.nodes.retain(|&n| node_exists(n));
        if self.connection.is_some_and(|c| !conn_exists(c)) {
            self.connection = None;
        }
    }

    pub fn start_rect(&mut self, p: Point) {
        self.rect = Some(SelectionRect::new(p));
    }

    pub fn update_rect(&mut self, p: Point) {
        if let Some(rect) = &mut self.rect {
            rect.end = p;
        }
    }

    /// Finish box selection, returning the screen rectangle if it was a real drag.
    pub fn take_rect(&mut self) -> Option<Rect> {
        self.rect
            .take()
            .filter(SelectionRect::is_meaningful)
            .map(|r| r.rect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_and_primary() {
        let mut sel = Selection::new();
        sel.toggle_node(NodeId(1));
        assert_eq!(sel.primary_node(), Some(NodeId(1)));
        sel.toggle_node(NodeId(2));
        assert_eq!(sel.primary_node(), None);
        sel.toggle_node(NodeId(1));
        assert_eq!(sel.nodes, vec![NodeId(2)]);
    }

    #[test]
    fn test_connection_selection_is_exclusive() {
        let mut sel = Selection::new();
        sel.select_node(NodeId(4));
        sel.select_connection(ConnectionId(9));
        assert!(sel.nodes.is_empty());
        assert_eq!(sel.connection, Some(ConnectionId(9)));
    }

    #[test]
    fn test_tiny_rect_is_a_click() {
        let mut sel = Selection::new();
        sel.start_rect(Point::new(5.0, 5.0));
        sel.update_rect(Point::new(6.0, 6.0));
        assert!(sel.take_rect().is_none());
        assert!(sel.rect.is_none());
    }

    #[test]
    fn test_retain_drops_missing() {
        let mut sel = Selection::new();
        sel.nodes = vec![NodeId(1), NodeId(2)];
        sel.connection = Some(ConnectionId(3));
        sel.retain(|n| n == NodeId(2), |_| false);
        assert_eq!(sel.nodes, vec![NodeId(2)]);
        assert!(sel.connection.is_none());
    }
}
