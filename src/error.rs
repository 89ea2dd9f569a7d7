//! Error taxonomy for graph editing and flow persistence.

use thiserror::Error;

use crate::model::{ConnectionId, FlowId, NodeId, NodeType};

/// One end of a connection, used to report which port is already wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRef {
    Output { node: NodeId, index: usize },
    Input { node: NodeId },
}

impl std::fmt::Display for PortRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortRef::Output { node, index } => write!(f, "output {} of node {}", index, node),
            PortRef::Input { node } => write!(f, "input of node {}", node),
        }
    }
}

/// Errors raised by graph mutations. A failing call never leaves a partial edit behind.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("{port} is already connected")]
    PortOccupied { port: PortRef },

    #[error("connecting node {from} to node {to} would create a cycle")]
    WouldCreateCycle { from: NodeId, to: NodeId },

    #[error("node {0} cannot be connected to itself")]
    SelfLoop(NodeId),

    #[error("node {0} has no input port")]
    NoInputPort(NodeId),

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("connection {0} not found")]
    ConnectionNotFound(ConnectionId),

    #[error("node {node} has no output port {index}")]
    InvalidOutput { node: NodeId, index: usize },

    #[error("node {node} has no row {index}")]
    RowOutOfRange { node: NodeId, index: usize },

    #[error("node {node} is not a {expected} node")]
    PayloadMismatch { node: NodeId, expected: NodeType },
}

/// A problem found by [`crate::graph::Graph::validate`].
///
/// Warnings never block a save; errors do.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    #[error("connection {connection} references missing node {node}")]
    DanglingConnection { connection: ConnectionId, node: NodeId },

    #[error("connection {connection} uses output {index} which node {node} does not have")]
    OutputOutOfRange {
        connection: ConnectionId,
        node: NodeId,
        index: usize,
    },

    #[error("output {index} of node {node} is the source of more than one connection")]
    DuplicateSource { node: NodeId, index: usize },

    #[error("input of node {node} is the target of more than one connection")]
    DuplicateTarget { node: NodeId },

    #[error("connection {connection} targets node {node}, which has no input")]
    TargetHasNoInput { connection: ConnectionId, node: NodeId },

    #[error("connection {connection} loops node {node} onto itself")]
    SelfLoop { connection: ConnectionId, node: NodeId },

    #[error("node {node} is part of a cycle")]
    Cycle { node: NodeId },

    #[error("node id {0} is used more than once")]
    DuplicateNodeId(NodeId),

    #[error("connection id {0} is used more than once")]
    DuplicateConnectionId(ConnectionId),

    #[error("node {0} is not reachable from any trigger")]
    Unreachable(NodeId),

    #[error("flow has no trigger and will never start")]
    NoTrigger,
}

impl ValidationIssue {
    /// Whether this issue makes the graph unsafe to hand to the runtime.
    pub fn is_error(&self) -> bool {
        !matches!(self, ValidationIssue::Unreachable(_) | ValidationIssue::NoTrigger)
    }
}

/// Errors raised by the persistence adapter and its backends.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("flow failed validation: {}", summarize(.0))]
    ValidationFailed(Vec<ValidationIssue>),

    #[error("persistence backend unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("flow {0} not found")]
    NotFound(FlowId),

    #[error("invalid flow id '{0}'")]
    InvalidId(FlowId),

    #[error("malformed flow document: {0}")]
    Codec(#[from] serde_json::Error),
}

impl PersistenceError {
    /// Network/backend failures are retryable; the flow stays editable and unsaved.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PersistenceError::PersistenceUnavailable(_))
    }
}

fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
