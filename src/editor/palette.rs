//! Node palette: the catalog of node types an operator can drag onto the canvas.
//!
//! A dragged palette item travels as a [`PaletteDrag`] (`{type, subtype?}`),
//! the same shape a browser drag payload would carry as JSON.
//!
//! ```rust
//! use leadflow::editor::palette::{palette, PaletteItem};
//!
//! let matches: Vec<&PaletteItem> = palette().iter().filter(|e| e.matches_query("delay")).collect();
//! assert_eq!(matches.len(), 1);
//! ```

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::model::{NodeKind, NodeType, TriggerSubtype};

/// Drag payload of a palette item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteDrag {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<TriggerSubtype>,
}

impl PaletteDrag {
    pub fn new(node_type: NodeType) -> Self {
        Self {
            node_type,
            subtype: None,
        }
    }

    /// Payload of the node created when this item is dropped.
    pub fn node_kind(&self) -> NodeKind {
        NodeKind::default_for(self.node_type, self.subtype)
    }
}

#[derive(Debug, Clone)]
pub struct PaletteItem {
    pub drag: PaletteDrag,
    pub label: String,
    pub category: String,
    pub description: String,
}

impl PaletteItem {
    /// Case-insensitive substring match on label, type, category or description.
    pub fn matches_query(&self, query: &str) -> bool {
        if query.is_empty() {
            return true;
        }
        let q = query.to_lowercase();
        self.label.to_lowercase().contains(&q)
            || self.drag.node_type.as_str().contains(&q)
            || self.category.to_lowercase().contains(&q)
            || self.description.to_lowercase().contains(&q)
    }
}

/// A palette section.
#[derive(Debug, Clone)]
pub struct PaletteCategory {
    pub name: String,
    pub items: Vec<PaletteItem>,
}

fn item(
    node_type: NodeType,
    subtype: Option<TriggerSubtype>,
    label: &str,
    category: &str,
    description: &str,
) -> PaletteItem {
    PaletteItem {
        drag: PaletteDrag { node_type, subtype },
        label: label.to_string(),
        category: category.to_string(),
        description: description.to_string(),
    }
}

static PALETTE: Lazy<Vec<PaletteItem>> = Lazy::new(|| {
    vec![
        item(
            NodeType::Trigger,
            Some(TriggerSubtype::NewContact),
            "New contact",
            "Triggers",
            "Starts when a new lead messages for the first time",
        ),
        item(
            NodeType::Trigger,
            Some(TriggerSubtype::Keyword),
            "Keyword",
            "Triggers",
            "Starts when an inbound message contains a keyword",
        ),
        item(
            NodeType::Message,
            None,
            "Send message",
            "Messaging",
            "Sends a text or media message to the contact",
        ),
        item(
            NodeType::Wait,
            None,
            "Wait for reply",
            "Messaging",
            "Pauses until the contact replies or a timeout passes",
        ),
        item(
            NodeType::Intent,
            None,
            "Intent",
            "Logic",
            "Routes the reply by matching phrases, with a no-match exit",
        ),
        item(
            NodeType::Condition,
            None,
            "Condition",
            "Logic",
            "Branches on rules evaluated top to bottom; the last rule is the default",
        ),
        item(
            NodeType::Delay,
            None,
            "Delay",
            "Logic",
            "Waits a fixed number of seconds",
        ),
        item(
            NodeType::Tag,
            None,
            "Tag contact",
            "Actions",
            "Adds or removes a tag on the contact",
        ),
        item(
            NodeType::Status,
            None,
            "Set status",
            "Actions",
            "Moves the lead to another status",
        ),
        item(
            NodeType::Webhook,
            None,
            "Webhook",
            "Actions",
            "Calls an external URL with the contact data",
        ),
        item(
            NodeType::Transfer,
            None,
            "Transfer to human",
            "Actions",
            "Hands the conversation off to a human agent",
        ),
        item(NodeType::End, None, "End", "Actions", "Finishes the flow"),
    ]
});

/// All palette items in display order.
pub fn palette() -> &'static [PaletteItem] {
    &PALETTE
}

/// Palette items grouped by category, categories in first-seen order.
pub fn palette_by_category() -> Vec<PaletteCategory> {
    let mut categories: Vec<PaletteCategory> = Vec::new();
    for entry in palette() {
        match categories.iter_mut().find(|c| c.name == entry.category) {
            Some(cat) => cat.items.push(entry.clone()),
            None => categories.push(PaletteCategory {
                name: entry.category.clone(),
                items: vec![entry.clone()],
            }),
        }
    }
    categories
}
