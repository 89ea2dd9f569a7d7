//! Undo/redo for graph edits.
//!
//! Every mutation issued through the editor is recorded as a [`GraphCommand`]
//! describing what happened. Undoing applies the inverse and pushes the
//! command describing that inverse onto the redo stack, so redo is just
//! another inversion.

use crate::geometry::Point;
use crate::graph::{Graph, RemovedNode};
use crate::model::{Connection, Node, NodeId, NodeKind};

/// A single recorded edit.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphCommand {
    /// A node (and the listed connections) was added at `index`.
    NodeAdded {
        index: usize,
        node: Node,
        connections: Vec<(usize, Connection)>,
    },
    /// A node was removed together with its connections.
    NodeRemoved {
        index: usize,
        node: Node,
        connections: Vec<(usize, Connection)>,
    },
    NodeMoved { id: NodeId, from: Point, to: Point },
    CollapsedSet { id: NodeId, from: bool, to: bool },
    Connected { index: usize, connection: Connection },
    Disconnected { index: usize, connection: Connection },
    /// A property edit, including any connections it cascaded or re-indexed.
    NodeEdited {
        id: NodeId,
        before: NodeKind,
        after: NodeKind,
        connections_before: Vec<Connection>,
        connections_after: Vec<Connection>,
    },
    /// Several commands applied as one user action, in order.
    Batch(Vec<GraphCommand>),
}

impl GraphCommand {
    pub fn removed(removed: RemovedNode) -> Self {
        GraphCommand::NodeRemoved {
            index: removed.index,
            node: removed.node,
            connections: removed.connections,
        }
    }

    /// Record a freshly added node, found by id.
    pub fn added(graph: &Graph, id: NodeId) -> Option<Self> {
        let index = graph.node_index(id)?;
        Some(GraphCommand::NodeAdded {
            index,
            node: graph.nodes[index].clone(),
            connections: Vec::new(),
        })
    }
}

/// Apply the inverse of `cmd` to the graph, returning the command that
/// re-applies it.
fn apply_inverse(graph: &mut Graph, cmd: &GraphCommand) -> GraphCommand {
    match cmd {
        GraphCommand::NodeAdded {
            index,
            node,
            connections,
        } => {
            // Removal brings its connections along; the stored ones are kept
            // so the positions are exact on the way back.
            let _ = graph.remove_node(node.id);
            GraphCommand::NodeRemoved {
                index: *index,
                node: node.clone(),
                connections: connections.clone(),
            }
        }
        GraphCommand::NodeRemoved {
            index,
            node,
            connections,
        } => {
            graph.restore_node(RemovedNode {
                index: *index,
                node: node.clone(),
                connections: connections.clone(),
            });
            GraphCommand::NodeAdded {
                index: *index,
                node: node.clone(),
                connections: connections.clone(),
            }
        }
        GraphCommand::NodeMoved { id, from, to } => {
            let _ = graph.move_node(*id, *from);
            GraphCommand::NodeMoved {
                id: *id,
                from: *to,
                to: *from,
            }
        }
        GraphCommand::CollapsedSet { id, from, to } => {
            let _ = graph.set_collapsed(*id, *from);
            GraphCommand::CollapsedSet {
                id: *id,
                from: *to,
                to: *from,
            }
        }
        GraphCommand::Connected { index, connection } => {
            let _ = graph.disconnect(connection.id);
            GraphCommand::Disconnected {
                index: *index,
                connection: *connection,
            }
        }
        GraphCommand::Disconnected { index, connection } => {
            graph.insert_connection(*index, *connection);
            GraphCommand::Connected {
                index: *index,
                connection: *connection,
            }
        }
        GraphCommand::NodeEdited {
            id,
            before,
            after,
            connections_before,
            connections_after,
        } => {
            if let Some(node) = graph.node_mut(*id) {
                node.kind = before.clone();
            }
            graph.connections = connections_before.clone();
            GraphCommand::NodeEdited {
                id: *id,
                before: after.clone(),
                after: before.clone(),
                connections_before: connections_after.clone(),
                connections_after: connections_before.clone(),
            }
        }
        // Inverses are kept in the order they were applied, so inverting the
        // result walks them backwards and replays the original order.
        GraphCommand::Batch(cmds) => GraphCommand::Batch(
            cmds.iter()
                .rev()
                .map(|c| apply_inverse(graph, c))
                .collect(),
        ),
    }
}

/// Undo/redo history for the editor.
///
/// # Example
///
/// ```rust
/// use leadflow::editor::{GraphCommand, History};
/// use leadflow::geometry::Point;
/// use leadflow::graph::Graph;
/// use leadflow::model::{NodeKind, NodeType};
///
/// let mut graph = Graph::new();
/// let id = graph.add_node(NodeKind::default_for(NodeType::Message, None), Point::ZERO);
/// let mut history = History::new(100);
/// history.push(GraphCommand::added(&graph, id).unwrap());
/// history.undo(&mut graph); // removes the node again
/// assert!(graph.nodes.is_empty());
/// history.redo(&mut graph);
/// assert_eq!(graph.nodes.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct History {
    undo_stack: Vec<GraphCommand>,
    redo_stack: Vec<GraphCommand>,
    max_size: usize,
}

impl History {
    /// Create a history with the given maximum undo depth.
    pub fn new(max_size: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_size,
        }
    }

    /// Record a command and clear the redo stack.
    pub fn push(&mut self, cmd: GraphCommand) {
        if let GraphCommand::Batch(cmds) = &cmd {
            if cmds.is_empty() {
                return;
            }
        }
        self.undo_stack.push(cmd);
        self.redo_stack.clear();
        if self.undo_stack.len() > self.max_size {
            self.undo_stack.remove(0);
        }
    }

    /// Undo the last command, returning true if one was undone.
    pub fn undo(&mut self, graph: &mut Graph) -> bool {
        match self.undo_stack.pop() {
            Some(cmd) => {
                let forward = apply_inverse(graph, &cmd);
                self.redo_stack.push(forward);
                true
            }
            None => false,
        }
    }

    /// Redo the last undone command, returning true if one was redone.
    pub fn redo(&mut self, graph: &mut Graph) -> bool {
        match self.redo_stack.pop() {
            Some(cmd) => {
                let inverse = apply_inverse(graph, &cmd);
                self.undo_stack.push(inverse);
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeType;

    fn graph_with_chain() -> (Graph, NodeId, NodeId) {
        let mut g = Graph::new();
        let t = g.add_node(NodeKind::default_for(NodeType::Trigger, None), Point::ZERO);
        let m = g.add_node(
            NodeKind::default_for(NodeType::Message, None),
            Point::new(300.0, 0.0),
        );
        g.connect(t, 0, m).unwrap();
        (g, t, m)
    }

    #[test]
    fn test_undo_redo_remove_node() {
        let (mut g, _, m) = graph_with_chain();
        let before = g.clone();
        let mut h = History::new(10);
        let removed = g.remove_node(m).unwrap();
        h.push(GraphCommand::removed(removed));
        let after = g.clone();

        assert!(h.undo(&mut g));
        assert_eq!(g, before);
        assert!(h.redo(&mut g));
        assert_eq!(g, after);
        assert!(h.undo(&mut g));
        assert_eq!(g, before);
    }

    #[test]
    fn test_undo_move_and_collapse_batch() {
        let (mut g, t, _) = graph_with_chain();
        let before = g.clone();
        let from = g.move_node(t, Point::new(50.0, 60.0)).unwrap();
        let was = g.set_collapsed(t, true).unwrap();
        let mut h = History::new(10);
        h.push(GraphCommand::Batch(vec![
            GraphCommand::NodeMoved {
                id: t,
                from,
                to: Point::new(50.0, 60.0),
            },
            GraphCommand::CollapsedSet {
                id: t,
                from: was,
                to: true,
            },
        ]));
        h.undo(&mut g);
        assert_eq!(g, before);
        h.redo(&mut g);
        assert!(g.node(t).unwrap().collapsed);
        assert_eq!(g.node(t).unwrap().position(), Point::new(50.0, 60.0));
    }

    #[test]
    fn test_undo_connect() {
        let (mut g, _, m) = graph_with_chain();
        let e = g.add_node(NodeKind::default_for(NodeType::End, None), Point::ZERO);
        let id = g.connect(m, 0, e).unwrap();
        let index = g.connections.iter().position(|c| c.id == id).unwrap();
        let mut h = History::new(10);
        h.push(GraphCommand::Connected {
            index,
            connection: g.connections[index],
        });
        h.undo(&mut g);
        assert!(g.connection(id).is_none());
        h.redo(&mut g);
        assert!(g.connection(id).is_some());
    }

    #[test]
    fn test_history_depth_and_redo_clear() {
        let mut g = Graph::new();
        let mut h = History::new(2);
        for i in 0..3 {
            let id = g.add_node(
                NodeKind::default_for(NodeType::Delay, None),
                Point::new(i as f32, 0.0),
            );
            h.push(GraphCommand::added(&g, id).unwrap());
        }
        assert!(h.undo(&mut g));
        assert!(h.undo(&mut g));
        assert!(!h.undo(&mut g));
        assert_eq!(g.nodes.len(), 1);
        assert!(h.can_redo());
        let id = g.add_node(NodeKind::default_for(NodeType::End, None), Point::ZERO);
        h.push(GraphCommand::added(&g, id).unwrap());
        assert!(!h.can_redo());
    }
}
