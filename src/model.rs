use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::Point;
use crate::graph::Graph;
use crate::viewport::Viewport;

// ────────────────────────────────────────────────────────────────────────────
// Identities
// ────────────────────────────────────────────────────────────────────────────

/// Flow-local node identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Flow-local connection identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Backend-wide flow identity (a UUID string for flows created here).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(pub String);

impl FlowId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FlowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FlowId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Node types and payloads
// ────────────────────────────────────────────────────────────────────────────

/// The type tag of a node, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Trigger,
    Intent,
    Message,
    Wait,
    Condition,
    Delay,
    Transfer,
    Tag,
    Status,
    Webhook,
    End,
}

impl NodeType {
    pub const ALL: [NodeType; 11] = [
        NodeType::Trigger,
        NodeType::Intent,
        NodeType::Message,
        NodeType::Wait,
        NodeType::Condition,
        NodeType::Delay,
        NodeType::Transfer,
        NodeType::Tag,
        NodeType::Status,
        NodeType::Webhook,
        NodeType::End,
    ];

    /// Wire name as used in the serialized flow.
    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Trigger => "trigger",
            NodeType::Intent => "intent",
            NodeType::Message => "message",
            NodeType::Wait => "wait",
            NodeType::Condition => "condition",
            NodeType::Delay => "delay",
            NodeType::Transfer => "transfer",
            NodeType::Tag => "tag",
            NodeType::Status => "status",
            NodeType::Webhook => "webhook",
            NodeType::End => "end",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSubtype {
    #[default]
    NewContact,
    Keyword,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerPayload {
    pub subtype: TriggerSubtype,
    /// Keywords that start the flow when `subtype` is `keyword`.
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// A named intent route and the phrases that select it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRoute {
    pub name: String,
    #[serde(default)]
    pub phrases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentPayload {
    pub routes: Vec<IntentRoute>,
}

impl IntentPayload {
    /// Output index of the implicit "no match" port.
    pub fn no_match_index(&self) -> usize {
        self.routes.len()
    }

    /// Route a reply: index of the first route with a phrase contained in the
    /// reply (case-insensitive), otherwise the "no match" index.
    pub fn select(&self, reply: &str) -> usize {
        let reply = reply.to_lowercase();
        self.routes
            .iter()
            .position(|route| {
                route
                    .phrases
                    .iter()
                    .map(|p| p.trim().to_lowercase())
                    .any(|p| !p.is_empty() && reply.contains(&p))
            })
            .unwrap_or_else(|| self.no_match_index())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    #[default]
    Image,
    Audio,
    Video,
    Document,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    pub kind: MediaKind,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRef>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitPayload {
    /// Seconds to wait for a reply before moving on; `None` waits indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Contains,
    Equals,
    StartsWith,
}

/// A guard on one output of a `condition` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionRule {
    Always,
    NoReply,
    Replied,
    TextMatch {
        text: String,
        #[serde(default)]
        mode: MatchMode,
    },
}

impl ConditionRule {
    /// Whether the rule accepts a reply (`None` means the contact did not reply).
    pub fn matches(&self, reply: Option<&str>) -> bool {
        match self {
            ConditionRule::Always => true,
            ConditionRule::NoReply => reply.is_none(),
            ConditionRule::Replied => reply.is_some(),
            ConditionRule::TextMatch { text, mode } => {
                let Some(reply) = reply else { return false };
                let reply = reply.trim().to_lowercase();
                let text = text.trim().to_lowercase();
                match mode {
                    MatchMode::Contains => reply.contains(&text),
                    MatchMode::Equals => reply == text,
                    MatchMode::StartsWith => reply.starts_with(&text),
                }
            }
        }
    }

    /// Short label shown on the output port.
    pub fn label(&self) -> String {
        match self {
            ConditionRule::Always => "always".to_string(),
            ConditionRule::NoReply => "no reply".to_string(),
            ConditionRule::Replied => "replied".to_string(),
            ConditionRule::TextMatch { text, mode } => match mode {
                MatchMode::Contains => format!("contains \"{}\"", text),
                MatchMode::Equals => format!("is \"{}\"", text),
                MatchMode::StartsWith => format!("starts with \"{}\"", text),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionPayload {
    pub rules: Vec<ConditionRule>,
}

impl ConditionPayload {
    /// Branch selection: rules are tried top to bottom and the first match wins.
    /// When nothing matches the last rule is the default branch.
    pub fn select(&self, reply: Option<&str>) -> Option<usize> {
        self.rules
            .iter()
            .position(|r| r.matches(reply))
            .or_else(|| self.rules.len().checked_sub(1))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayPayload {
    pub seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferPayload {
    /// Note shown to the human agent taking over the conversation.
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagAction {
    #[default]
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagPayload {
    pub tag: String,
    #[serde(default)]
    pub action: TagAction,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    /// Lead status the contact is moved to.
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EndPayload {}

/// Type tag plus type-specific payload.
///
/// Serialized adjacently as `"type": ..., "payload": {...}` inside the node object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum NodeKind {
    Trigger(TriggerPayload),
    Intent(IntentPayload),
    Message(MessagePayload),
    Wait(WaitPayload),
    Condition(ConditionPayload),
    Delay(DelayPayload),
    Transfer(TransferPayload),
    Tag(TagPayload),
    Status(StatusPayload),
    Webhook(WebhookPayload),
    End(EndPayload),
}

impl NodeKind {
    /// The payload a freshly placed node of `node_type` starts with.
    pub fn default_for(node_type: NodeType, subtype: Option<TriggerSubtype>) -> Self {
        match node_type {
            NodeType::Trigger => NodeKind::Trigger(TriggerPayload {
                subtype: subtype.unwrap_or_default(),
                keywords: Vec::new(),
            }),
            NodeType::Intent => NodeKind::Intent(IntentPayload {
                routes: vec![IntentRoute {
                    name: "Route 1".to_string(),
                    phrases: Vec::new(),
                }],
            }),
            NodeType::Message => NodeKind::Message(MessagePayload::default()),
            NodeType::Wait => NodeKind::Wait(WaitPayload::default()),
            NodeType::Condition => NodeKind::Condition(ConditionPayload {
                rules: vec![ConditionRule::Replied, ConditionRule::NoReply],
            }),
            NodeType::Delay => NodeKind::Delay(DelayPayload { seconds: 60 }),
            NodeType::Transfer => NodeKind::Transfer(TransferPayload::default()),
            NodeType::Tag => NodeKind::Tag(TagPayload::default()),
            NodeType::Status => NodeKind::Status(StatusPayload::default()),
            NodeType::Webhook => NodeKind::Webhook(WebhookPayload::default()),
            NodeType::End => NodeKind::End(EndPayload {}),
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Trigger(_) => NodeType::Trigger,
            NodeKind::Intent(_) => NodeType::Intent,
            NodeKind::Message(_) => NodeType::Message,
            NodeKind::Wait(_) => NodeType::Wait,
            NodeKind::Condition(_) => NodeType::Condition,
            NodeKind::Delay(_) => NodeType::Delay,
            NodeKind::Transfer(_) => NodeType::Transfer,
            NodeKind::Tag(_) => NodeType::Tag,
            NodeKind::Status(_) => NodeType::Status,
            NodeKind::Webhook(_) => NodeType::Webhook,
            NodeKind::End(_) => NodeType::End,
        }
    }

    /// Triggers are the only nodes without an input port.
    pub fn has_input(&self) -> bool {
        !matches!(self, NodeKind::Trigger(_))
    }

    pub fn output_count(&self) -> usize {
        match self {
            NodeKind::Intent(p) => p.routes.len() + 1,
            NodeKind::Condition(p) => p.rules.len(),
            NodeKind::End(_) => 0,
            _ => 1,
        }
    }

    /// Label of an output port, for multi-output nodes.
    pub fn output_label(&self, index: usize) -> Option<String> {
        match self {
            NodeKind::Intent(p) => {
                if index < p.routes.len() {
                    Some(p.routes[index].name.clone())
                } else if index == p.routes.len() {
                    Some("no match".to_string())
                } else {
                    None
                }
            }
            NodeKind::Condition(p) => p.rules.get(index).map(ConditionRule::label),
            _ => None,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Node, Port, Connection
// ────────────────────────────────────────────────────────────────────────────

/// A single step of an automation, positioned in canvas space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(flatten)]
    pub kind: NodeKind,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub collapsed: bool,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind, position: Point) -> Self {
        Self {
            id,
            kind,
            x: position.x,
            y: position.y,
            collapsed: false,
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn set_position(&mut self, p: Point) {
        self.x = p.x;
        self.y = p.y;
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    /// All ports of this node, input first.
    pub fn ports(&self) -> Vec<Port> {
        let mut ports = Vec::with_capacity(self.kind.output_count() + 1);
        if self.kind.has_input() {
            ports.push(Port {
                node: self.id,
                direction: PortDirection::Input,
                index: 0,
                label: None,
            });
        }
        for index in 0..self.kind.output_count() {
            ports.push(Port {
                node: self.id,
                direction: PortDirection::Output,
                index,
                label: self.kind.output_label(index),
            });
        }
        ports
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

/// A derived attachment point; ports are never stored, only computed from the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub node: NodeId,
    pub direction: PortDirection,
    pub index: usize,
    pub label: Option<String>,
}

/// Directed edge from an output port to a node's single input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: ConnectionId,
    pub source_node_id: NodeId,
    pub output_index: usize,
    pub target_node_id: NodeId,
}

// ────────────────────────────────────────────────────────────────────────────
// Flow
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    #[default]
    Draft,
    Active,
    Inactive,
}

/// A named automation graph as exchanged with the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub id: FlowId,
    pub name: String,
    #[serde(default)]
    pub status: FlowStatus,
    #[serde(flatten)]
    pub graph: Graph,
    /// Last-used viewport, stored for convenience only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
    /// Server-assigned timestamp of the last successful save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Flow {
    /// A new, empty draft flow.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: FlowId::generate(),
            name: name.into(),
            status: FlowStatus::Draft,
            graph: Graph::new(),
            viewport: None,
            updated_at: None,
        }
    }

    pub fn summary(&self) -> FlowSummary {
        FlowSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            node_count: self.graph.nodes.len(),
            updated_at: self.updated_at,
        }
    }
}

/// Listing entry returned by the persistence adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSummary {
    pub id: FlowId,
    pub name: String,
    pub status: FlowStatus,
    pub node_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_serializes_type_and_payload() {
        let node = Node::new(
            NodeId(3),
            NodeKind::Delay(DelayPayload { seconds: 90 }),
            Point::new(10.0, 20.5),
        );
        let v = serde_json::to_value(&node).unwrap();
        assert_eq!(v["id"], 3);
        assert_eq!(v["type"], "delay");
        assert_eq!(v["payload"]["seconds"], 90);
        assert_eq!(v["x"], 10.0);
        assert_eq!(v["collapsed"], false);
        let back: Node = serde_json::from_value(v).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_end_node_payload_is_empty_object() {
        let node = Node::new(NodeId(1), NodeKind::End(EndPayload {}), Point::ZERO);
        let v = serde_json::to_value(&node).unwrap();
        assert_eq!(v["payload"], serde_json::json!({}));
    }

    #[test]
    fn test_port_counts_per_type() {
        let trigger = NodeKind::default_for(NodeType::Trigger, None);
        assert!(!trigger.has_input());
        assert_eq!(trigger.output_count(), 1);

        let end = NodeKind::default_for(NodeType::End, None);
        assert!(end.has_input());
        assert_eq!(end.output_count(), 0);

        let intent = NodeKind::Intent(IntentPayload {
            routes: vec![IntentRoute::default(), IntentRoute::default()],
        });
        assert_eq!(intent.output_count(), 3);
        assert_eq!(intent.output_label(2).as_deref(), Some("no match"));

        let cond = NodeKind::default_for(NodeType::Condition, None);
        assert_eq!(cond.output_count(), 2);
    }

    #[test]
    fn test_condition_first_match_wins_and_last_is_default() {
        let payload = ConditionPayload {
            rules: vec![
                ConditionRule::TextMatch {
                    text: "sim".into(),
                    mode: MatchMode::Contains,
                },
                ConditionRule::Replied,
                ConditionRule::NoReply,
            ],
        };
        assert_eq!(payload.select(Some("Sim, quero")), Some(0));
        assert_eq!(payload.select(Some("talvez")), Some(1));
        assert_eq!(payload.select(None), Some(2));

        let only_text = ConditionPayload {
            rules: vec![
                ConditionRule::TextMatch {
                    text: "a".into(),
                    mode: MatchMode::Equals,
                },
                ConditionRule::TextMatch {
                    text: "b".into(),
                    mode: MatchMode::Equals,
                },
            ],
        };
        assert_eq!(only_text.select(Some("c")), Some(1));
        assert_eq!(ConditionPayload::default().select(None), None);
    }

    #[test]
    fn test_intent_routes_phrases() {
        let payload = IntentPayload {
            routes: vec![
                IntentRoute {
                    name: "price".into(),
                    phrases: vec!["preço".into(), "quanto custa".into()],
                },
                IntentRoute {
                    name: "human".into(),
                    phrases: vec!["atendente".into()],
                },
            ],
        };
        assert_eq!(payload.select("Quanto custa o plano?"), 0);
        assert_eq!(payload.select("quero um ATENDENTE"), 1);
        assert_eq!(payload.select("bom dia"), 2);
    }

    #[test]
    fn test_condition_rule_wire_format() {
        let rule = ConditionRule::TextMatch {
            text: "ok".into(),
            mode: MatchMode::Equals,
        };
        let v = serde_json::to_value(&rule).unwrap();
        assert_eq!(v, serde_json::json!({"kind": "text_match", "text": "ok", "mode": "equals"}));
        let v = serde_json::to_value(ConditionRule::NoReply).unwrap();
        assert_eq!(v, serde_json::json!({"kind": "no_reply"}));
    }

    #[test]
    fn test_node_ports_listing() {
        let node = Node::new(
            NodeId(7),
            NodeKind::default_for(NodeType::Condition, None),
            Point::ZERO,
        );
        let ports = node.ports();
        assert_eq!(ports.len(), 3);
        assert_eq!(ports[0].direction, PortDirection::Input);
        assert_eq!(ports[2].index, 1);
        assert_eq!(ports[2].label.as_deref(), Some("no reply"));
    }
}
