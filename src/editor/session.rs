//! The editor session: one open flow and all editing state around it.
//!
//! A session is the single owner of the graph, viewport, selection, history
//! and controller of an open flow. Front-ends hold a session and pass it (or
//! borrows of it) to whatever needs it; there is no global editor state.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EditorConfig;
use crate::error::{GraphError, PersistenceError};
use crate::graph::Graph;
use crate::model::{Flow, FlowId, FlowStatus, Node, NodeId};
use crate::persistence::{SaveJob, SaveQueue};
use crate::viewport::Viewport;

use super::controller::{EditorContext, EditorEvent, Feedback, InteractionController};
use super::history::{GraphCommand, History};
use super::properties::{self, EditOutcome, FieldProblem, PropertyEdit, VariableCatalog};
use super::selection::Selection;

/// Where the session stands relative to the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveStatus {
    /// No edits since the last successful save or load.
    Saved,
    Unsaved,
    Saving,
    /// The last save failed and a queued save is running behind it.
    Retrying(String),
    /// The last save failed; edits are kept and the save can be retried.
    Failed(String),
}

pub struct EditorSession {
    id: FlowId,
    name: String,
    status: FlowStatus,
    updated_at: Option<DateTime<Utc>>,
    pub graph: Graph,
    pub viewport: Viewport,
    pub selection: Selection,
    pub history: History,
    pub controller: InteractionController,
    pub config: EditorConfig,
    pub variables: VariableCatalog,
    /// Bumped on every change to the flow document.
    revision: u64,
    /// Revision known to be stored by the backend.
    saved_revision: u64,
    saves: SaveQueue,
    last_error: Option<String>,
}

impl EditorSession {
    /// Start editing a new, empty flow.
    pub fn new(name: impl Into<String>, config: EditorConfig) -> Self {
        let mut session = Self::open(Flow::new(name), config);
        // A fresh flow exists only in memory until first saved.
        session.revision = 1;
        session
    }

    /// Start editing an existing flow.
    pub fn open(flow: Flow, config: EditorConfig) -> Self {
        let mut viewport = flow.viewport.unwrap_or_default();
        viewport.limits = config.zoom_limits();
        viewport.scale = viewport.limits.clamp(viewport.scale);
        debug!(flow = %flow.id, nodes = flow.graph.nodes.len(), "open session");
        Self {
            id: flow.id,
            name: flow.name,
            status: flow.status,
            updated_at: flow.updated_at,
            graph: flow.graph,
            viewport,
            selection: Selection::new(),
            history: History::new(config.history_depth),
            controller: InteractionController::new(),
            config,
            variables: VariableCatalog::new(),
            revision: 0,
            saved_revision: 0,
            saves: SaveQueue::new(),
            last_error: None,
        }
    }

    pub fn id(&self) -> &FlowId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.touch();
    }

    pub fn status(&self) -> FlowStatus {
        self.status
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_dirty(&self) -> bool {
        self.revision != self.saved_revision
    }

    pub fn save_status(&self) -> SaveStatus {
        match (self.saves.is_busy(), &self.last_error) {
            (true, Some(e)) => SaveStatus::Retrying(e.clone()),
            (true, None) => SaveStatus::Saving,
            (false, Some(e)) => SaveStatus::Failed(e.clone()),
            (false, None) if self.is_dirty() => SaveStatus::Unsaved,
            (false, None) => SaveStatus::Saved,
        }
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    /// Feed an input event through the interaction controller.
    pub fn dispatch(&mut self, event: EditorEvent) -> Feedback {
        let mut ctx = EditorContext {
            graph: &mut self.graph,
            viewport: &mut self.viewport,
            selection: &mut self.selection,
            history: &mut self.history,
            config: &self.config,
        };
        let feedback = self.controller.handle(&mut ctx, event);
        if feedback.changes_graph() {
            self.touch();
        }
        if let Feedback::ConnectionRefused(e) = &feedback {
            debug!(error = %e, "connection refused");
        }
        feedback
    }

    /// The node the property panel edits.
    pub fn selected_node(&self) -> Option<&Node> {
        self.selection
            .primary_node()
            .and_then(|id| self.graph.node(id))
    }

    /// Apply a property edit and record it for undo.
    pub fn apply_edit(&mut self, node: NodeId, edit: PropertyEdit) -> Result<EditOutcome, GraphError> {
        let before = self
            .graph
            .node(node)
            .map(|n| n.kind.clone())
            .ok_or(GraphError::NodeNotFound(node))?;
        let connections_before = self.graph.connections.clone();
        let outcome = properties::apply_edit(&mut self.graph, node, edit)?;
        if let Some(after) = self.graph.node(node).map(|n| n.kind.clone()) {
            if after != before || self.graph.connections != connections_before {
                self.history.push(GraphCommand::NodeEdited {
                    id: node,
                    before,
                    after,
                    connections_before,
                    connections_after: self.graph.connections.clone(),
                });
                self.touch();
            }
        }
        if let Some(c) = outcome.removed_connection {
            self.selection.retain(|_| true, |id| id != c.id);
        }
        Ok(outcome)
    }

    /// Field problems of the selected node, for inline hints.
    pub fn field_problems(&self) -> Vec<FieldProblem> {
        self.selected_node()
            .map(|n| properties::field_problems(&n.kind))
            .unwrap_or_default()
    }

    pub fn undo(&mut self) -> bool {
        let done = self.history.undo(&mut self.graph);
        if done {
            self.after_history_step();
        }
        done
    }

    pub fn redo(&mut self) -> bool {
        let done = self.history.redo(&mut self.graph);
        if done {
            self.after_history_step();
        }
        done
    }

    fn after_history_step(&mut self) {
        let graph = &self.graph;
        self.selection
            .retain(|n| graph.node(n).is_some(), |c| graph.connection(c).is_some());
        self.touch();
    }

    /// Snapshot of the flow document as it would be saved.
    pub fn to_flow(&self) -> Flow {
        Flow {
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            graph: self.graph.clone(),
            viewport: Some(self.viewport),
            updated_at: self.updated_at,
        }
    }

    /// Ask for a save. Returns the job to run now, or `None` when a save is
    /// already in flight; the latest state is then saved once it completes.
    pub fn request_save(&mut self) -> Option<SaveJob> {
        let job = self.saves.request(self.revision, self.to_flow());
        if job.is_none() {
            debug!(flow = %self.id, revision = self.revision, "save coalesced");
        }
        job
    }

    /// Report the outcome of a save job. Returns the queued follow-up job, if any.
    pub fn finish_save(&mut self, job: &SaveJob, result: Result<Flow, PersistenceError>) -> Option<SaveJob> {
        match result {
            Ok(saved) => {
                self.saved_revision = self.saved_revision.max(job.revision);
                self.updated_at = saved.updated_at;
                self.status = saved.status;
                self.last_error = None;
                info!(flow = %self.id, revision = job.revision, "flow saved");
            }
            Err(e) => {
                // Edits stay in memory and the flow stays dirty.
                warn!(flow = %self.id, error = %e, retryable = e.is_retryable(), "save failed");
                self.last_error = Some(e.to_string());
            }
        }
        self.saves.complete()
    }

    /// Adopt a status change made through the persistence adapter.
    pub fn set_status(&mut self, status: FlowStatus) {
        self.status = status;
    }

    /// Write the current state to a local draft file.
    pub fn write_draft(&self, path: &Utf8Path) -> Result<()> {
        DraftDoc {
            saved_at: Utc::now(),
            flow: self.to_flow(),
        }
        .save(path)
    }

    /// Reopen a session from a draft file. The result is dirty, since a
    /// draft holds edits the backend may not have.
    pub fn from_draft(path: &Utf8Path, config: EditorConfig) -> Result<Self> {
        let doc = DraftDoc::load(path)?;
        let mut session = Self::open(doc.flow, config);
        session.revision = 1;
        Ok(session)
    }
}

const DRAFT_MAGIC: &[u8; 8] = b"LEADFLOW";
const DRAFT_VERSION: u32 = 1;

/// Local snapshot of unsaved edits: magic bytes, a version and the flow as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftDoc {
    pub saved_at: DateTime<Utc>,
    pub flow: Flow,
}

impl DraftDoc {
    pub fn save(&self, path: &Utf8Path) -> Result<()> {
        let file = std::fs::File::create(path).with_context(|| format!("Create draft {}", path))?;
        let mut writer = std::io::BufWriter::new(file);
        writer.write_all(DRAFT_MAGIC)?;
        writer.write_all(&DRAFT_VERSION.to_le_bytes())?;
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: &Utf8Path) -> Result<Self> {
        let file = std::fs::File::open(path).with_context(|| format!("Open draft {}", path))?;
        let mut reader = std::io::BufReader::new(file);
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if &magic != DRAFT_MAGIC {
            anyhow::bail!("{} is not a leadflow draft", path);
        }
        let mut version_bytes = [0u8; 4];
        reader.read_exact(&mut version_bytes)?;
        let version = u32::from_le_bytes(version_bytes);
        if version != DRAFT_VERSION {
            anyhow::bail!("Unsupported draft version: {}", version);
        }
        let doc: DraftDoc =
            serde_json::from_reader(reader).with_context(|| format!("Decode draft {}", path))?;
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::palette::PaletteDrag;
    use crate::geometry::Point;
    use crate::editor::controller::{Key, Modifiers, PointerButton};
    use crate::model::{ConditionRule, NodeKind, NodeType};
    use camino::Utf8PathBuf;

    fn drop_node(session: &mut EditorSession, t: NodeType, x: f32) -> NodeId {
        match session.dispatch(EditorEvent::PaletteDrop {
            drag: PaletteDrag::new(t),
            pos: Point::new(x, 0.0),
        }) {
            Feedback::NodeAdded(id) => id,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_edits_mark_dirty_and_undo() {
        let mut s = EditorSession::open(Flow::new("Welcome"), EditorConfig::default());
        assert_eq!(s.save_status(), SaveStatus::Saved);
        let c = drop_node(&mut s, NodeType::Condition, 0.0);
        assert!(s.is_dirty());
        assert_eq!(s.selected_node().map(|n| n.id), Some(c));

        s.apply_edit(c, PropertyEdit::AddConditionRow(ConditionRule::Always))
            .unwrap();
        assert_eq!(s.graph.node(c).unwrap().kind.output_count(), 3);
        assert!(s.undo());
        assert_eq!(s.graph.node(c).unwrap().kind.output_count(), 2);
        assert!(s.redo());
        assert_eq!(s.graph.node(c).unwrap().kind.output_count(), 3);
    }

    #[test]
    fn test_new_flow_starts_unsaved() {
        let s = EditorSession::new("Fresh", EditorConfig::default());
        assert!(s.is_dirty());
        assert_eq!(s.save_status(), SaveStatus::Unsaved);
        assert!(s.graph.nodes.is_empty());
    }

    #[test]
    fn test_failed_save_keeps_edits() {
        let mut s = EditorSession::open(Flow::new("Follow-up"), EditorConfig::default());
        drop_node(&mut s, NodeType::Message, 0.0);
        let job = s.request_save().unwrap();
        assert_eq!(s.save_status(), SaveStatus::Saving);
        assert!(s.request_save().is_none());

        let next = s.finish_save(
            &job,
            Err(PersistenceError::PersistenceUnavailable("offline".into())),
        );
        // The failure stays visible while the coalesced request runs.
        let next = next.unwrap();
        assert_eq!(
            s.save_status(),
            SaveStatus::Retrying("persistence backend unavailable: offline".into())
        );
        assert!(s.is_dirty());
        assert_eq!(s.graph.nodes.len(), 1);

        let saved = next.flow.clone();
        assert!(s.finish_save(&next, Ok(saved)).is_none());
        assert_eq!(s.save_status(), SaveStatus::Saved);
    }

    #[test]
    fn test_failed_save_without_queued_request() {
        let mut s = EditorSession::open(Flow::new("Follow-up"), EditorConfig::default());
        drop_node(&mut s, NodeType::Message, 0.0);
        let job = s.request_save().unwrap();
        let next = s.finish_save(
            &job,
            Err(PersistenceError::PersistenceUnavailable("offline".into())),
        );
        assert!(next.is_none());
        assert!(matches!(s.save_status(), SaveStatus::Failed(_)));

        // A manual retry shows the earlier failure until it completes.
        let retry = s.request_save().unwrap();
        assert!(matches!(s.save_status(), SaveStatus::Retrying(_)));
        let saved = retry.flow.clone();
        assert!(s.finish_save(&retry, Ok(saved)).is_none());
        assert_eq!(s.save_status(), SaveStatus::Saved);
    }

    #[test]
    fn test_cancelled_drag_leaves_session_clean() {
        let mut flow = Flow::new("Drag");
        let id = flow.graph.add_node(
            NodeKind::default_for(NodeType::Message, None),
            Point::ZERO,
        );
        let mut s = EditorSession::open(flow, EditorConfig::default());
        let before = s.graph.clone();
        let press = |s: &mut EditorSession| {
            s.dispatch(EditorEvent::PointerDown {
                pos: Point::new(50.0, 50.0),
                button: PointerButton::Primary,
                modifiers: Modifiers::NONE,
            })
        };

        press(&mut s);
        assert_eq!(
            s.dispatch(EditorEvent::PointerMove { pos: Point::new(150.0, 50.0) }),
            Feedback::NodesDragged
        );
        assert_eq!(s.graph.node(id).unwrap().position(), Point::new(100.0, 0.0));
        let fb = s.dispatch(EditorEvent::KeyPressed {
            key: Key::Escape,
            modifiers: Modifiers::NONE,
        });
        assert_eq!(fb, Feedback::Cancelled);
        assert_eq!(s.graph, before);
        assert!(!s.is_dirty());
        assert_eq!(s.save_status(), SaveStatus::Saved);

        // Releasing the same drag commits it.
        press(&mut s);
        s.dispatch(EditorEvent::PointerMove { pos: Point::new(150.0, 50.0) });
        s.dispatch(EditorEvent::PointerUp { pos: Point::new(150.0, 50.0) });
        assert_eq!(s.save_status(), SaveStatus::Unsaved);
    }

    #[test]
    fn test_edit_during_save_stays_dirty() {
        let mut s = EditorSession::open(Flow::new("Promo"), EditorConfig::default());
        drop_node(&mut s, NodeType::Message, 0.0);
        let job = s.request_save().unwrap();
        drop_node(&mut s, NodeType::End, 400.0);
        let saved = job.flow.clone();
        assert!(s.finish_save(&job, Ok(saved)).is_none());
        assert!(s.is_dirty());
    }

    #[test]
    fn test_draft_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("draft.lfd")).unwrap();
        let mut s = EditorSession::new("Draft", EditorConfig::default());
        drop_node(&mut s, NodeType::Trigger, 0.0);
        s.write_draft(&path).unwrap();

        let reopened = EditorSession::from_draft(&path, EditorConfig::default()).unwrap();
        assert_eq!(reopened.id(), s.id());
        assert_eq!(reopened.graph, s.graph);
        assert!(reopened.is_dirty());

        std::fs::write(&path, b"not a draft").unwrap();
        assert!(EditorSession::from_draft(&path, EditorConfig::default()).is_err());
    }
}
