//! The node/connection container and all structural mutations.
//!
//! Every mutation checks its preconditions before touching any data, so a
//! call either applies completely or returns an error with the graph
//! unchanged. Cascades (connections of a removed node, connections of a
//! removed output row) are applied in the same call as the primary change.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GraphError, PortRef, ValidationIssue};
use crate::geometry::Point;
use crate::model::{Connection, ConnectionId, Node, NodeId, NodeKind};

/// A node removed from the graph together with everything that referenced it,
/// with the original positions needed to put it back.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedNode {
    pub index: usize,
    pub node: Node,
    /// `(original index, connection)` pairs in ascending index order.
    pub connections: Vec<(usize, Connection)>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    // ── lookup ──────────────────────────────────────────────────────────────

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn node_index(&self, id: NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.iter().find(|c| c.id == id)
    }

    /// The connection leaving `node` on output `index`, if wired.
    pub fn connection_from(&self, node: NodeId, index: usize) -> Option<&Connection> {
        self.connections
            .iter()
            .find(|c| c.source_node_id == node && c.output_index == index)
    }

    /// The connection entering `node`, if wired.
    pub fn connection_into(&self, node: NodeId) -> Option<&Connection> {
        self.connections.iter().find(|c| c.target_node_id == node)
    }

    /// All connections touching `node` on either side.
    pub fn connections_of(&self, node: NodeId) -> impl Iterator<Item = &Connection> {
        self.connections
            .iter()
            .filter(move |c| c.source_node_id == node || c.target_node_id == node)
    }

    /// The node that runs after `node` leaves through output `index`.
    pub fn successor(&self, node: NodeId, index: usize) -> Option<NodeId> {
        self.connection_from(node, index).map(|c| c.target_node_id)
    }

    pub fn triggers(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| !n.kind.has_input())
    }

    pub fn next_node_id(&self) -> NodeId {
        NodeId(self.nodes.iter().map(|n| n.id.0).max().map_or(1, |m| m + 1))
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(
            self.connections
                .iter()
                .map(|c| c.id.0)
                .max()
                .map_or(1, |m| m + 1),
        )
    }

    /// Whether `to` can be reached from `from` by following connections.
    pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            queue.extend(
                self.connections
                    .iter()
                    .filter(|c| c.source_node_id == current)
                    .map(|c| c.target_node_id),
            );
        }
        false
    }

    // ── node mutations ──────────────────────────────────────────────────────

    /// Place a new node and return its id.
    pub fn add_node(&mut self, kind: NodeKind, position: Point) -> NodeId {
        let id = self.next_node_id();
        debug!(node = %id, node_type = %kind.node_type(), "add node");
        self.nodes.push(Node::new(id, kind, position));
        id
    }

    /// Put a node back at `index` (clamped). Used to restore removed nodes.
    pub fn insert_node(&mut self, index: usize, node: Node) {
        let index = index.min(self.nodes.len());
        self.nodes.insert(index, node);
    }

    /// Remove a node and every connection that references it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<RemovedNode, GraphError> {
        let index = self.node_index(id).ok_or(GraphError::NodeNotFound(id))?;
        let node = self.nodes.remove(index);
        let mut connections = Vec::new();
        let mut kept = Vec::with_capacity(self.connections.len());
        for (i, c) in self.connections.drain(..).enumerate() {
            if c.source_node_id == id || c.target_node_id == id {
                connections.push((i, c));
            } else {
                kept.push(c);
            }
        }
        self.connections = kept;
        debug!(node = %id, cascaded = connections.len(), "remove node");
        Ok(RemovedNode {
            index,
            node,
            connections,
        })
    }

    /// Undo a [`Graph::remove_node`].
    pub fn restore_node(&mut self, removed: RemovedNode) {
        self.insert_node(removed.index, removed.node);
        for (i, c) in removed.connections {
            self.insert_connection(i, c);
        }
    }

    /// Move a node, returning its previous position.
    pub fn move_node(&mut self, id: NodeId, position: Point) -> Result<Point, GraphError> {
        let node = self.node_mut(id).ok_or(GraphError::NodeNotFound(id))?;
        let old = node.position();
        node.set_position(position);
        Ok(old)
    }

    /// Copy a node's payload to a new node offset from the original.
    /// Connections are never copied.
    pub fn duplicate_node(&mut self, id: NodeId, offset: Point) -> Result<NodeId, GraphError> {
        let original = self.node(id).ok_or(GraphError::NodeNotFound(id))?;
        let kind = original.kind.clone();
        let collapsed = original.collapsed;
        let position = original.position() + offset;
        let copy = self.add_node(kind, position);
        if let Some(node) = self.node_mut(copy) {
            node.collapsed = collapsed;
        }
        Ok(copy)
    }

    /// Set the collapsed flag, returning the previous value.
    pub fn set_collapsed(&mut self, id: NodeId, collapsed: bool) -> Result<bool, GraphError> {
        let node = self.node_mut(id).ok_or(GraphError::NodeNotFound(id))?;
        Ok(std::mem::replace(&mut node.collapsed, collapsed))
    }

    // ── connections ─────────────────────────────────────────────────────────

    /// Check every precondition of [`Graph::connect`] without mutating.
    pub fn can_connect(
        &self,
        source: NodeId,
        output_index: usize,
        target: NodeId,
    ) -> Result<(), GraphError> {
        let source_node = self.node(source).ok_or(GraphError::NodeNotFound(source))?;
        let target_node = self.node(target).ok_or(GraphError::NodeNotFound(target))?;
        if source == target {
            return Err(GraphError::SelfLoop(source));
        }
        if output_index >= source_node.kind.output_count() {
            return Err(GraphError::InvalidOutput {
                node: source,
                index: output_index,
            });
        }
        if !target_node.kind.has_input() {
            return Err(GraphError::NoInputPort(target));
        }
        if self.connection_from(source, output_index).is_some() {
            return Err(GraphError::PortOccupied {
                port: PortRef::Output {
                    node: source,
                    index: output_index,
                },
            });
        }
        if self.connection_into(target).is_some() {
            return Err(GraphError::PortOccupied {
                port: PortRef::Input { node: target },
            });
        }
        if self.reaches(target, source) {
            return Err(GraphError::WouldCreateCycle {
                from: source,
                to: target,
            });
        }
        Ok(())
    }

    /// Wire `source`'s output `output_index` to `target`'s input.
    pub fn connect(
        &mut self,
        source: NodeId,
        output_index: usize,
        target: NodeId,
    ) -> Result<ConnectionId, GraphError> {
        if let Err(e) = self.can_connect(source, output_index, target) {
            debug!(%source, output_index, %target, error = %e, "connect refused");
            return Err(e);
        }
        let id = self.next_connection_id();
        self.connections.push(Connection {
            id,
            source_node_id: source,
            output_index,
            target_node_id: target,
        });
        debug!(connection = %id, %source, output_index, %target, "connect");
        Ok(id)
    }

    /// Remove a connection, returning it with its former index.
    pub fn disconnect(&mut self, id: ConnectionId) -> Result<(usize, Connection), GraphError> {
        let index = self
            .connections
            .iter()
            .position(|c| c.id == id)
            .ok_or(GraphError::ConnectionNotFound(id))?;
        Ok((index, self.connections.remove(index)))
    }

    /// Put a connection back at `index` (clamped).
    pub fn insert_connection(&mut self, index: usize, connection: Connection) {
        let index = index.min(self.connections.len());
        self.connections.insert(index, connection);
    }

    /// Drop output `index` of `node`: its connection (if any) is removed and
    /// connections on later outputs shift down by one so ports stay contiguous.
    /// Call after the payload row has been removed.
    pub(crate) fn remove_output(&mut self, node: NodeId, index: usize) -> Option<Connection> {
        let position = self
            .connections
            .iter()
            .position(|c| c.source_node_id == node && c.output_index == index);
        let removed = position.map(|i| self.connections.remove(i));
        for c in self
            .connections
            .iter_mut()
            .filter(|c| c.source_node_id == node && c.output_index > index)
        {
            c.output_index -= 1;
        }
        removed
    }

    /// Open a gap at output `index` of `node`: connections on outputs at or
    /// after `index` shift up by one.
    pub(crate) fn insert_output(&mut self, node: NodeId, index: usize) {
        for c in self
            .connections
            .iter_mut()
            .filter(|c| c.source_node_id == node && c.output_index >= index)
        {
            c.output_index += 1;
        }
    }

    /// A deep copy with fresh, dense ids (nodes and connections numbered from
    /// 1 in document order). Connections follow their renumbered endpoints.
    pub fn renumbered(&self) -> Graph {
        let map: HashMap<NodeId, NodeId> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id, NodeId(i as u64 + 1)))
            .collect();
        let nodes = self
            .nodes
            .iter()
            .map(|n| Node {
                id: map[&n.id],
                ..n.clone()
            })
            .collect();
        let connections = self
            .connections
            .iter()
            .filter_map(|c| {
                Some((
                    *map.get(&c.source_node_id)?,
                    c.output_index,
                    *map.get(&c.target_node_id)?,
                ))
            })
            .enumerate()
            .map(|(i, (source, output_index, target))| Connection {
                id: ConnectionId(i as u64 + 1),
                source_node_id: source,
                output_index,
                target_node_id: target,
            })
            .collect();
        Graph { nodes, connections }
    }

    // ── validation ──────────────────────────────────────────────────────────

    /// Check every structural invariant. Returns errors and warnings;
    /// see [`ValidationIssue::is_error`].
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        let mut node_ids = HashSet::new();
        for n in &self.nodes {
            if !node_ids.insert(n.id) {
                issues.push(ValidationIssue::DuplicateNodeId(n.id));
            }
        }
        let by_id: HashMap<NodeId, &Node> = self.nodes.iter().map(|n| (n.id, n)).collect();

        let mut conn_ids = HashSet::new();
        let mut sources = HashSet::new();
        let mut targets = HashSet::new();
        for c in &self.connections {
            if !conn_ids.insert(c.id) {
                issues.push(ValidationIssue::DuplicateConnectionId(c.id));
            }
            let Some(source) = by_id.get(&c.source_node_id) else {
                issues.push(ValidationIssue::DanglingConnection {
                    connection: c.id,
                    node: c.source_node_id,
                });
                continue;
            };
            let Some(target) = by_id.get(&c.target_node_id) else {
                issues.push(ValidationIssue::DanglingConnection {
                    connection: c.id,
                    node: c.target_node_id,
                });
                continue;
            };
            if c.source_node_id == c.target_node_id {
                issues.push(ValidationIssue::SelfLoop {
                    connection: c.id,
                    node: c.source_node_id,
                });
            }
            if c.output_index >= source.kind.output_count() {
                issues.push(ValidationIssue::OutputOutOfRange {
                    connection: c.id,
                    node: source.id,
                    index: c.output_index,
                });
            }
            if !target.kind.has_input() {
                issues.push(ValidationIssue::TargetHasNoInput {
                    connection: c.id,
                    node: target.id,
                });
            }
            if !sources.insert((c.source_node_id, c.output_index)) {
                issues.push(ValidationIssue::DuplicateSource {
                    node: c.source_node_id,
                    index: c.output_index,
                });
            }
            if !targets.insert(c.target_node_id) {
                issues.push(ValidationIssue::DuplicateTarget {
                    node: c.target_node_id,
                });
            }
        }

        for node in self.cycle_members() {
            issues.push(ValidationIssue::Cycle { node });
        }

        if self.triggers().next().is_none() {
            if !self.nodes.is_empty() {
                issues.push(ValidationIssue::NoTrigger);
            }
        } else {
            let reachable = self.reachable_from_triggers();
            for n in &self.nodes {
                if n.kind.has_input() && !reachable.contains(&n.id) {
                    issues.push(ValidationIssue::Unreachable(n.id));
                }
            }
        }

        issues
    }

    /// Only the issues that block a save.
    pub fn validation_errors(&self) -> Vec<ValidationIssue> {
        self.validate().into_iter().filter(|i| i.is_error()).collect()
    }

    fn reachable_from_triggers(&self) -> HashSet<NodeId> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<NodeId> = self.triggers().map(|n| n.id).collect();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            queue.extend(
                self.connections
                    .iter()
                    .filter(|c| c.source_node_id == current)
                    .map(|c| c.target_node_id),
            );
        }
        seen
    }

    /// Nodes that sit on a directed cycle (self loops excluded; they are
    /// reported separately). Kahn's algorithm: whatever cannot be peeled off
    /// in topological order is on or behind a cycle; of those, keep the ones
    /// that can reach themselves.
    fn cycle_members(&self) -> BTreeSet<NodeId> {
        let edges: Vec<(NodeId, NodeId)> = self
            .connections
            .iter()
            .filter(|c| c.source_node_id != c.target_node_id)
            .map(|c| (c.source_node_id, c.target_node_id))
            .collect();
        let mut indegree: HashMap<NodeId, usize> = HashMap::new();
        for (s, t) in &edges {
            indegree.entry(*s).or_default();
            *indegree.entry(*t).or_default() += 1;
        }
        let mut queue: VecDeque<NodeId> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| *n)
            .collect();
        while let Some(n) = queue.pop_front() {
            indegree.remove(&n);
            for (_, t) in edges.iter().filter(|(s, _)| *s == n) {
                if let Some(d) = indegree.get_mut(t) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(*t);
                    }
                }
            }
        }
        indegree
            .keys()
            .copied()
            .filter(|&n| {
                edges
                    .iter()
                    .filter(|(s, _)| *s == n)
                    .any(|(_, t)| *t != n && self.reaches(*t, n))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeType, TriggerSubtype};

    fn kind(t: NodeType) -> NodeKind {
        NodeKind::default_for(t, Some(TriggerSubtype::NewContact))
    }

    fn chain() -> (Graph, NodeId, NodeId, NodeId) {
        let mut g = Graph::new();
        let t = g.add_node(kind(NodeType::Trigger), Point::new(0.0, 0.0));
        let m = g.add_node(kind(NodeType::Message), Point::new(300.0, 0.0));
        let e = g.add_node(kind(NodeType::End), Point::new(600.0, 0.0));
        g.connect(t, 0, m).unwrap();
        g.connect(m, 0, e).unwrap();
        (g, t, m, e)
    }

    #[test]
    fn test_ids_are_sequential() {
        let (g, t, m, e) = chain();
        assert_eq!((t, m, e), (NodeId(1), NodeId(2), NodeId(3)));
        assert_eq!(g.next_connection_id(), ConnectionId(3));
    }

    #[test]
    fn test_remove_node_cascades() {
        let (mut g, t, m, e) = chain();
        let removed = g.remove_node(m).unwrap();
        assert_eq!(removed.connections.len(), 2);
        assert!(g.connections.is_empty());
        assert!(g.node(m).is_none());
        assert!(g.node(t).is_some() && g.node(e).is_some());
    }

    #[test]
    fn test_restore_node_is_exact() {
        let (mut g, _, m, _) = chain();
        let before = g.clone();
        let removed = g.remove_node(m).unwrap();
        g.restore_node(removed);
        assert_eq!(g, before);
    }

    #[test]
    fn test_connect_rejects_self_loop() {
        let (mut g, _, m, _) = chain();
        assert_eq!(g.connect(m, 0, m), Err(GraphError::SelfLoop(m)));
    }

    #[test]
    fn test_connect_rejects_occupied_ports() {
        let (mut g, t, _, e) = chain();
        let extra = g.add_node(kind(NodeType::Message), Point::ZERO);
        assert!(matches!(
            g.connect(t, 0, extra),
            Err(GraphError::PortOccupied {
                port: PortRef::Output { .. }
            })
        ));
        assert!(matches!(
            g.connect(extra, 0, e),
            Err(GraphError::PortOccupied {
                port: PortRef::Input { .. }
            })
        ));
    }

    #[test]
    fn test_connect_rejects_cycle() {
        let mut g = Graph::new();
        let a = g.add_node(kind(NodeType::Message), Point::ZERO);
        let b = g.add_node(kind(NodeType::Wait), Point::ZERO);
        let c = g.add_node(kind(NodeType::Delay), Point::ZERO);
        g.connect(a, 0, b).unwrap();
        g.connect(b, 0, c).unwrap();
        let before = g.clone();
        assert_eq!(
            g.connect(c, 0, a),
            Err(GraphError::WouldCreateCycle { from: c, to: a })
        );
        assert_eq!(g, before);
    }

    #[test]
    fn test_connect_rejects_trigger_target() {
        let (mut g, t, _, _) = chain();
        let intent = g.add_node(kind(NodeType::Intent), Point::ZERO);
        assert_eq!(g.connect(intent, 0, t), Err(GraphError::NoInputPort(t)));
    }

    #[test]
    fn test_connect_rejects_missing_output() {
        let (mut g, _, _, e) = chain();
        let other = g.add_node(kind(NodeType::Message), Point::ZERO);
        assert_eq!(
            g.connect(e, 0, other),
            Err(GraphError::InvalidOutput { node: e, index: 0 })
        );
    }

    #[test]
    fn test_duplicate_copies_payload_not_connections() {
        let (mut g, _, m, _) = chain();
        let copy = g.duplicate_node(m, Point::new(40.0, 40.0)).unwrap();
        let original = g.node(m).unwrap().clone();
        let dup = g.node(copy).unwrap();
        assert_eq!(dup.kind, original.kind);
        assert_eq!(dup.position(), Point::new(340.0, 40.0));
        assert_eq!(g.connections_of(copy).count(), 0);
    }

    #[test]
    fn test_remove_output_reindexes() {
        let mut g = Graph::new();
        let c = g.add_node(
            NodeKind::Condition(crate::model::ConditionPayload {
                rules: vec![
                    crate::model::ConditionRule::Replied,
                    crate::model::ConditionRule::NoReply,
                    crate::model::ConditionRule::Always,
                ],
            }),
            Point::ZERO,
        );
        let a = g.add_node(kind(NodeType::Message), Point::ZERO);
        let b = g.add_node(kind(NodeType::Message), Point::ZERO);
        g.connect(c, 0, a).unwrap();
        g.connect(c, 2, b).unwrap();
        assert!(g.remove_output(c, 0).is_some());
        assert_eq!(g.connections.len(), 1);
        assert_eq!(g.connections[0].output_index, 1);
    }

    #[test]
    fn test_renumbered_keeps_topology() {
        let (mut g, t, m, _) = chain();
        g.remove_node(t).unwrap();
        let fresh = g.add_node(kind(NodeType::Trigger), Point::ZERO);
        g.connect(fresh, 0, m).unwrap();
        let copy = g.renumbered();
        assert_eq!(
            copy.nodes.iter().map(|n| n.id).collect::<Vec<_>>(),
            vec![NodeId(1), NodeId(2), NodeId(3)]
        );
        assert_eq!(copy.connections.len(), 2);
        // m -> e became 1 -> 2, fresh -> m became 3 -> 1.
        assert_eq!(copy.successor(NodeId(1), 0), Some(NodeId(2)));
        assert_eq!(copy.successor(NodeId(3), 0), Some(NodeId(1)));
        assert!(copy.validation_errors().is_empty());
    }

    #[test]
    fn test_validate_clean_chain() {
        let (g, _, _, _) = chain();
        assert!(g.validate().is_empty());
    }

    #[test]
    fn test_validate_reports_tampered_graph() {
        let (mut g, t, m, e) = chain();
        // Bypass connect() to simulate a corrupted document.
        g.connections.push(Connection {
            id: ConnectionId(10),
            source_node_id: e,
            output_index: 0,
            target_node_id: m,
        });
        g.connections.push(Connection {
            id: ConnectionId(11),
            source_node_id: m,
            output_index: 0,
            target_node_id: NodeId(99),
        });
        g.connections.push(Connection {
            id: ConnectionId(12),
            source_node_id: m,
            output_index: 0,
            target_node_id: t,
        });
        let issues = g.validate();
        assert!(issues.contains(&ValidationIssue::OutputOutOfRange {
            connection: ConnectionId(10),
            node: e,
            index: 0
        }));
        assert!(issues.contains(&ValidationIssue::DuplicateTarget { node: m }));
        assert!(issues.contains(&ValidationIssue::DanglingConnection {
            connection: ConnectionId(11),
            node: NodeId(99)
        }));
        assert!(issues.contains(&ValidationIssue::TargetHasNoInput {
            connection: ConnectionId(12),
            node: t
        }));
        assert!(issues.contains(&ValidationIssue::DuplicateSource { node: m, index: 0 }));
        assert!(issues.contains(&ValidationIssue::Cycle { node: m }));
        assert!(issues.contains(&ValidationIssue::Cycle { node: e }));
    }

    #[test]
    fn test_validate_warnings() {
        let mut g = Graph::new();
        g.add_node(kind(NodeType::Message), Point::ZERO);
        let issues = g.validate();
        assert_eq!(issues, vec![ValidationIssue::NoTrigger]);
        assert!(g.validation_errors().is_empty());

        let (mut g, _, _, _) = chain();
        let loose = g.add_node(kind(NodeType::Tag), Point::ZERO);
        assert_eq!(g.validate(), vec![ValidationIssue::Unreachable(loose)]);
    }
}
