//! Property editor bridge.
//!
//! Maps the selected node's type to the form fields it exposes
//! ([`form_schema`]) and applies typed edits ([`PropertyEdit`]) straight to
//! the graph. Row edits on `condition` and `intent` nodes keep the output
//! ports in step with the rows: a removed row takes its connection with it and
//! later outputs are re-indexed; an inserted intent route pushes the "no match"
//! connection one slot down.

use indexmap::IndexMap;
use tracing::debug;

use crate::error::GraphError;
use crate::graph::Graph;
use crate::model::{
    ConditionRule, Connection, HttpMethod, IntentRoute, MediaRef, NodeId, NodeKind, NodeType,
    TagAction, TriggerSubtype,
};

// ────────────────────────────────────────────────────────────────────────────
// Form schema
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    /// Multi-line text that accepts variable tokens.
    TemplateText,
    Number { min: u64 },
    /// Optional number; empty means "none".
    OptionalNumber { min: u64 },
    Url,
    Select(&'static [&'static str]),
    StringList,
    ConditionRows,
    IntentRoutes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
}

const fn field(key: &'static str, label: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { key, label, kind }
}

/// The fields shown for a node type, in display order.
pub fn form_schema(node_type: NodeType) -> Vec<FieldSpec> {
    match node_type {
        NodeType::Trigger => vec![
            field("subtype", "Starts on", FieldKind::Select(&["new_contact", "keyword"])),
            field("keywords", "Keywords", FieldKind::StringList),
        ],
        NodeType::Intent => vec![field("routes", "Routes", FieldKind::IntentRoutes)],
        NodeType::Message => vec![
            field("text", "Message", FieldKind::TemplateText),
            field("mediaUrl", "Media URL", FieldKind::Url),
            field(
                "mediaKind",
                "Media type",
                FieldKind::Select(&["image", "audio", "video", "document"]),
            ),
        ],
        NodeType::Wait => vec![field(
            "timeoutSeconds",
            "Timeout (seconds)",
            FieldKind::OptionalNumber { min: 1 },
        )],
        NodeType::Condition => vec![field("rules", "Rules", FieldKind::ConditionRows)],
        NodeType::Delay => vec![field("seconds", "Delay (seconds)", FieldKind::Number { min: 1 })],
        NodeType::Transfer => vec![field("note", "Note for the agent", FieldKind::TemplateText)],
        NodeType::Tag => vec![
            field("tag", "Tag", FieldKind::Text),
            field("action", "Action", FieldKind::Select(&["add", "remove"])),
        ],
        NodeType::Status => vec![field("status", "Target status", FieldKind::Text)],
        NodeType::Webhook => vec![
            field("url", "URL", FieldKind::Url),
            field("method", "Method", FieldKind::Select(&["GET", "POST", "PUT"])),
        ],
        NodeType::End => Vec::new(),
    }
}

/// A non-blocking problem with a field value, shown next to the field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldProblem {
    pub key: &'static str,
    pub message: String,
}

/// Field-level problems of a node's payload. These never block a save.
pub fn field_problems(kind: &NodeKind) -> Vec<FieldProblem> {
    let mut out = Vec::new();
    let mut push = |key, message: &str| {
        out.push(FieldProblem {
            key,
            message: message.to_string(),
        })
    };
    match kind {
        NodeKind::Trigger(p) => {
            if p.subtype == TriggerSubtype::Keyword && p.keywords.iter().all(|k| k.trim().is_empty()) {
                push("keywords", "a keyword trigger needs at least one keyword");
            }
        }
        NodeKind::Intent(p) => {
            if p.routes.iter().any(|r| r.name.trim().is_empty()) {
                push("routes", "every route needs a name");
            }
            if p.routes.iter().any(|r| r.phrases.is_empty()) {
                push("routes", "a route without phrases never matches");
            }
        }
        NodeKind::Message(p) => {
            if p.text.trim().is_empty() && p.media.is_none() {
                push("text", "message is empty");
            }
            if let Some(media) = &p.media {
                if !is_http_url(&media.url) {
                    push("mediaUrl", "media URL must be an http(s) URL");
                }
            }
        }
        NodeKind::Condition(p) => {
            if p.rules.is_empty() {
                push("rules", "a condition needs at least one rule");
            }
        }
        NodeKind::Delay(p) => {
            if p.seconds == 0 {
                push("seconds", "delay must be at least one second");
            }
        }
        NodeKind::Tag(p) => {
            if p.tag.trim().is_empty() {
                push("tag", "tag name is empty");
            }
        }
        NodeKind::Status(p) => {
            if p.status.trim().is_empty() {
                push("status", "target status is empty");
            }
        }
        NodeKind::Webhook(p) => {
            if !is_http_url(&p.url) {
                push("url", "webhook URL must be an http(s) URL");
            }
        }
        NodeKind::Wait(_) | NodeKind::Transfer(_) | NodeKind::End(_) => {}
    }
    out
}

fn is_http_url(s: &str) -> bool {
    url::Url::parse(s.trim())
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

// ────────────────────────────────────────────────────────────────────────────
// Edits
// ────────────────────────────────────────────────────────────────────────────

/// A single field or row change on one node.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyEdit {
    SetTriggerSubtype(TriggerSubtype),
    SetKeywords(Vec<String>),
    SetMessageText(String),
    SetMedia(Option<MediaRef>),
    SetWaitTimeout(Option<u64>),
    AddConditionRow(ConditionRule),
    UpdateConditionRow { index: usize, rule: ConditionRule },
    RemoveConditionRow(usize),
    AddIntentRoute(IntentRoute),
    UpdateIntentRoute { index: usize, route: IntentRoute },
    RemoveIntentRoute(usize),
    SetDelaySeconds(u64),
    SetTransferNote(String),
    SetTagName(String),
    SetTagAction(TagAction),
    SetTargetStatus(String),
    SetWebhookUrl(String),
    SetWebhookMethod(HttpMethod),
}

impl PropertyEdit {
    /// The node type this edit applies to.
    pub fn target_type(&self) -> NodeType {
        match self {
            PropertyEdit::SetTriggerSubtype(_) | PropertyEdit::SetKeywords(_) => NodeType::Trigger,
            PropertyEdit::SetMessageText(_) | PropertyEdit::SetMedia(_) => NodeType::Message,
            PropertyEdit::SetWaitTimeout(_) => NodeType::Wait,
            PropertyEdit::AddConditionRow(_)
            | PropertyEdit::UpdateConditionRow { .. }
            | PropertyEdit::RemoveConditionRow(_) => NodeType::Condition,
            PropertyEdit::AddIntentRoute(_)
            | PropertyEdit::UpdateIntentRoute { .. }
            | PropertyEdit::RemoveIntentRoute(_) => NodeType::Intent,
            PropertyEdit::SetDelaySeconds(_) => NodeType::Delay,
            PropertyEdit::SetTransferNote(_) => NodeType::Transfer,
            PropertyEdit::SetTagName(_) | PropertyEdit::SetTagAction(_) => NodeType::Tag,
            PropertyEdit::SetTargetStatus(_) => NodeType::Status,
            PropertyEdit::SetWebhookUrl(_) | PropertyEdit::SetWebhookMethod(_) => NodeType::Webhook,
        }
    }
}

/// What an applied edit did besides changing the payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EditOutcome {
    /// Connection removed because its output row was removed.
    pub removed_connection: Option<Connection>,
}

/// Apply an edit to a node's payload, keeping ports and connections in sync.
/// On error nothing is changed.
pub fn apply_edit(graph: &mut Graph, id: NodeId, edit: PropertyEdit) -> Result<EditOutcome, GraphError> {
    let node = graph.node_mut(id).ok_or(GraphError::NodeNotFound(id))?;
    if node.node_type() != edit.target_type() {
        return Err(GraphError::PayloadMismatch {
            node: id,
            expected: edit.target_type(),
        });
    }
    debug!(node = %id, ?edit, "property edit");

    // Row bookkeeping to apply to the connections once the payload is updated.
    enum Ports {
        Unchanged,
        Removed(usize),
        Inserted(usize),
    }
    let mut ports = Ports::Unchanged;

    match (&mut node.kind, edit) {
        (NodeKind::Trigger(p), PropertyEdit::SetTriggerSubtype(s)) => p.subtype = s,
        (NodeKind::Trigger(p), PropertyEdit::SetKeywords(k)) => {
            p.keywords = k.into_iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
        }
        (NodeKind::Message(p), PropertyEdit::SetMessageText(t)) => p.text = t,
        (NodeKind::Message(p), PropertyEdit::SetMedia(m)) => p.media = m,
        (NodeKind::Wait(p), PropertyEdit::SetWaitTimeout(t)) => p.timeout_seconds = t,
        (NodeKind::Condition(p), PropertyEdit::AddConditionRow(rule)) => {
            // Appended rows get the next output index; nothing to shift.
            p.rules.push(rule);
        }
        (NodeKind::Condition(p), PropertyEdit::UpdateConditionRow { index, rule }) => {
            let slot = p
                .rules
                .get_mut(index)
                .ok_or(GraphError::RowOutOfRange { node: id, index })?;
            *slot = rule;
        }
        (NodeKind::Condition(p), PropertyEdit::RemoveConditionRow(index)) => {
            if index >= p.rules.len() {
                return Err(GraphError::RowOutOfRange { node: id, index });
            }
            p.rules.remove(index);
            ports = Ports::Removed(index);
        }
        (NodeKind::Intent(p), PropertyEdit::AddIntentRoute(route)) => {
            // The new route takes the slot of "no match", which moves down one.
            let index = p.routes.len();
            p.routes.push(route);
            ports = Ports::Inserted(index);
        }
        (NodeKind::Intent(p), PropertyEdit::UpdateIntentRoute { index, route }) => {
            let slot = p
                .routes
                .get_mut(index)
                .ok_or(GraphError::RowOutOfRange { node: id, index })?;
            *slot = route;
        }
        (NodeKind::Intent(p), PropertyEdit::RemoveIntentRoute(index)) => {
            if index >= p.routes.len() {
                return Err(GraphError::RowOutOfRange { node: id, index });
            }
            p.routes.remove(index);
            ports = Ports::Removed(index);
        }
        (NodeKind::Delay(p), PropertyEdit::SetDelaySeconds(s)) => p.seconds = s,
        (NodeKind::Transfer(p), PropertyEdit::SetTransferNote(n)) => p.note = n,
        (NodeKind::Tag(p), PropertyEdit::SetTagName(t)) => p.tag = t.trim().to_string(),
        (NodeKind::Tag(p), PropertyEdit::SetTagAction(a)) => p.action = a,
        (NodeKind::Status(p), PropertyEdit::SetTargetStatus(s)) => p.status = s.trim().to_string(),
        (NodeKind::Webhook(p), PropertyEdit::SetWebhookUrl(u)) => p.url = u.trim().to_string(),
        (NodeKind::Webhook(p), PropertyEdit::SetWebhookMethod(m)) => p.method = m,
        (_, edit) => {
            return Err(GraphError::PayloadMismatch {
                node: id,
                expected: edit.target_type(),
            });
        }
    }

    let mut outcome = EditOutcome::default();
    match ports {
        Ports::Unchanged => {}
        Ports::Removed(index) => outcome.removed_connection = graph.remove_output(id, index),
        Ports::Inserted(index) => graph.insert_output(id, index),
    }
    Ok(outcome)
}

// ────────────────────────────────────────────────────────────────────────────
// Variables
// ────────────────────────────────────────────────────────────────────────────

/// Contact variables every flow can reference.
pub const BUILTIN_VARIABLES: [&str; 3] = ["nome", "telefone", "email"];

/// Variables offered as insertable tokens. Values are resolved by the runtime,
/// never by the editor.
#[derive(Debug, Clone, Default)]
pub struct VariableCatalog {
    /// Custom contact fields: key -> display label.
    pub custom: IndexMap<String, String>,
}

impl VariableCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_custom(&mut self, key: impl Into<String>, label: impl Into<String>) {
        self.custom.insert(key.into(), label.into());
    }

    /// All tokens, built-ins first: `{{nome}}`, `{{telefone}}`, ...
    pub fn tokens(&self) -> Vec<String> {
        BUILTIN_VARIABLES
            .iter()
            .map(|v| v.to_string())
            .chain(self.custom.keys().cloned())
            .map(|v| token(&v))
            .collect()
    }

    pub fn is_known(&self, name: &str) -> bool {
        BUILTIN_VARIABLES.contains(&name) || self.custom.contains_key(name)
    }
}

pub fn token(name: &str) -> String {
    format!("{{{{{}}}}}", name)
}

/// Insert `{{name}}` at character offset `cursor` (clamped to the text length)
/// and return the cursor position just after the token.
pub fn insert_token(text: &mut String, cursor: usize, name: &str) -> usize {
    let tok = token(name);
    let char_count = text.chars().count();
    let cursor = cursor.min(char_count);
    let byte = text
        .char_indices()
        .nth(cursor)
        .map_or(text.len(), |(b, _)| b);
    text.insert_str(byte, &tok);
    cursor + tok.chars().count()
}

/// Variable names referenced by `{{...}}` tokens in `text`, in order, without duplicates.
pub fn referenced_variables(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else { break };
        let name = after[..end].trim();
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
        rest = &after[end + 2..];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::model::{ConditionPayload, IntentPayload, NodeType};

    fn condition_with_rows(g: &mut Graph, n: usize) -> NodeId {
        let rules = (0..n)
            .map(|i| ConditionRule::TextMatch {
                text: format!("r{}", i),
                mode: Default::default(),
            })
            .collect();
        g.add_node(NodeKind::Condition(ConditionPayload { rules }), Point::ZERO)
    }

    fn msg(g: &mut Graph) -> NodeId {
        g.add_node(NodeKind::default_for(NodeType::Message, None), Point::ZERO)
    }

    #[test]
    fn test_add_condition_row_adds_port() {
        let mut g = Graph::new();
        let c = condition_with_rows(&mut g, 2);
        apply_edit(&mut g, c, PropertyEdit::AddConditionRow(ConditionRule::Always)).unwrap();
        assert_eq!(g.node(c).unwrap().kind.output_count(), 3);
        assert!(g.connection_from(c, 2).is_none());
    }

    #[test]
    fn test_remove_condition_row_cascades_and_reindexes() {
        let mut g = Graph::new();
        let c = condition_with_rows(&mut g, 3);
        let a = msg(&mut g);
        let b = msg(&mut g);
        g.connect(c, 1, a).unwrap();
        g.connect(c, 2, b).unwrap();

        let out = apply_edit(&mut g, c, PropertyEdit::RemoveConditionRow(1)).unwrap();
        assert_eq!(out.removed_connection.map(|c| c.target_node_id), Some(a));
        assert_eq!(g.node(c).unwrap().kind.output_count(), 2);
        assert_eq!(g.successor(c, 1), Some(b));
        assert!(g.validation_errors().is_empty());
    }

    #[test]
    fn test_intent_route_insert_moves_no_match() {
        let mut g = Graph::new();
        let i = g.add_node(
            NodeKind::Intent(IntentPayload {
                routes: vec![IntentRoute {
                    name: "yes".into(),
                    phrases: vec!["sim".into()],
                }],
            }),
            Point::ZERO,
        );
        let yes = msg(&mut g);
        let fallback = msg(&mut g);
        g.connect(i, 0, yes).unwrap();
        g.connect(i, 1, fallback).unwrap();

        apply_edit(
            &mut g,
            i,
            PropertyEdit::AddIntentRoute(IntentRoute {
                name: "no".into(),
                phrases: vec!["não".into()],
            }),
        )
        .unwrap();
        assert_eq!(g.successor(i, 0), Some(yes));
        assert_eq!(g.successor(i, 1), None);
        assert_eq!(g.successor(i, 2), Some(fallback));

        apply_edit(&mut g, i, PropertyEdit::RemoveIntentRoute(0)).unwrap();
        assert_eq!(g.connection_into(yes), None);
        assert_eq!(g.successor(i, 1), Some(fallback));
        assert!(g.validation_errors().is_empty());
    }

    #[test]
    fn test_mismatched_edit_is_rejected_without_change() {
        let mut g = Graph::new();
        let m = msg(&mut g);
        let before = g.clone();
        let err = apply_edit(&mut g, m, PropertyEdit::SetDelaySeconds(5)).unwrap_err();
        assert_eq!(
            err,
            GraphError::PayloadMismatch {
                node: m,
                expected: NodeType::Delay
            }
        );
        assert_eq!(g, before);
    }

    #[test]
    fn test_row_out_of_range() {
        let mut g = Graph::new();
        let c = condition_with_rows(&mut g, 1);
        let before = g.clone();
        assert_eq!(
            apply_edit(&mut g, c, PropertyEdit::RemoveConditionRow(4)),
            Err(GraphError::RowOutOfRange { node: c, index: 4 })
        );
        assert_eq!(g, before);
    }

    #[test]
    fn test_field_problems() {
        let webhook = NodeKind::default_for(NodeType::Webhook, None);
        assert_eq!(field_problems(&webhook)[0].key, "url");
        let mut g = Graph::new();
        let id = g.add_node(webhook, Point::ZERO);
        apply_edit(
            &mut g,
            id,
            PropertyEdit::SetWebhookUrl(" https://hooks.example.com/lead ".into()),
        )
        .unwrap();
        assert!(field_problems(&g.node(id).unwrap().kind).is_empty());
    }

    #[test]
    fn test_schema_covers_types() {
        assert!(form_schema(NodeType::End).is_empty());
        let keys: Vec<_> = form_schema(NodeType::Webhook).iter().map(|f| f.key).collect();
        assert_eq!(keys, vec!["url", "method"]);
    }

    #[test]
    fn test_tokens() {
        let mut vars = VariableCatalog::new();
        vars.add_custom("empresa", "Company");
        assert_eq!(
            vars.tokens(),
            vec!["{{nome}}", "{{telefone}}", "{{email}}", "{{empresa}}"]
        );
        assert!(vars.is_known("empresa"));
        assert!(!vars.is_known("cidade"));
    }

    #[test]
    fn test_insert_token_at_char_offset() {
        let mut text = String::from("Olá , tudo bem?");
        let cursor = insert_token(&mut text, 4, "nome");
        assert_eq!(text, "Olá {{nome}}, tudo bem?");
        assert_eq!(cursor, 12);
        let end = insert_token(&mut text, 999, "email");
        assert!(text.ends_with("{{email}}"));
        assert_eq!(end, text.chars().count());
    }

    #[test]
    fn test_referenced_variables() {
        let vars = referenced_variables("Oi {{nome}}, seu email {{ email }} e {{nome}} {{");
        assert_eq!(vars, vec!["nome", "email"]);
    }
}
