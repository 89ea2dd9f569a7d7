//! Flow persistence: backend abstraction, the adapter the editor talks to,
//! save coalescing and the canonical JSON form of a flow.
//!
//! The adapter never transmits a graph that fails validation, and every
//! backend failure comes back as a typed [`PersistenceError`] so the editor
//! can keep the flow open and retry.

pub mod fs_store;
mod queue;

pub use fs_store::FsFlowStore;
pub use queue::{SaveJob, SaveQueue};

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::error::{PersistenceError, ValidationIssue};
use crate::model::{Flow, FlowId, FlowStatus, FlowSummary};

/// Suffix appended to the name of a duplicated flow.
pub const COPY_SUFFIX: &str = " (copy)";

/// Storage the adapter talks to: a remote API, a directory, or memory.
pub trait FlowBackend {
    fn list(&mut self) -> Result<Vec<FlowSummary>, PersistenceError>;
    fn fetch(&mut self, id: &FlowId) -> Result<Flow, PersistenceError>;
    /// Store a flow, replacing any previous version. Returns the flow as
    /// stored, with the server-assigned `updated_at`.
    fn store(&mut self, flow: &Flow) -> Result<Flow, PersistenceError>;
    fn remove(&mut self, id: &FlowId) -> Result<(), PersistenceError>;
}

/// Serialize a flow in its wire format.
pub fn to_json(flow: &Flow) -> Result<String, PersistenceError> {
    Ok(serde_json::to_string_pretty(flow)?)
}

pub fn from_json(text: &str) -> Result<Flow, PersistenceError> {
    Ok(serde_json::from_str(text)?)
}

/// Wire format without server-assigned fields, for comparing two versions
/// of the same flow.
pub fn canonical_json(flow: &Flow) -> Result<String, PersistenceError> {
    let mut flow = flow.clone();
    flow.updated_at = None;
    to_json(&flow)
}

pub struct PersistenceAdapter<B> {
    backend: B,
}

impl<B: FlowBackend> PersistenceAdapter<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Flow summaries, most recently updated first.
    pub fn list(&mut self) -> Result<Vec<FlowSummary>, PersistenceError> {
        let mut flows = self.backend.list()?;
        flows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.name.cmp(&b.name)));
        Ok(flows)
    }

    pub fn load(&mut self, id: &FlowId) -> Result<Flow, PersistenceError> {
        let flow = self.backend.fetch(id)?;
        debug!(flow = %id, nodes = flow.graph.nodes.len(), "flow loaded");
        Ok(flow)
    }

    /// Validate and store. A flow without a trigger is saved; it simply
    /// never starts.
    pub fn save(&mut self, flow: &Flow) -> Result<Flow, PersistenceError> {
        let (errors, warnings): (Vec<ValidationIssue>, Vec<ValidationIssue>) =
            flow.graph.validate().into_iter().partition(|i| i.is_error());
        if !errors.is_empty() {
            warn!(flow = %flow.id, errors = errors.len(), "refusing to save invalid flow");
            return Err(PersistenceError::ValidationFailed(errors));
        }
        for w in &warnings {
            debug!(flow = %flow.id, warning = %w, "validation warning");
        }
        let stored = self.backend.store(flow)?;
        info!(flow = %flow.id, nodes = flow.graph.nodes.len(), "flow saved");
        Ok(stored)
    }

    /// Create and store a new, empty draft.
    pub fn create(&mut self, name: &str) -> Result<Flow, PersistenceError> {
        self.save(&Flow::new(name))
    }

    /// Deep copy with a new flow id, fresh node and connection ids, the name
    /// suffixed and the status reset to draft.
    pub fn duplicate(&mut self, id: &FlowId) -> Result<Flow, PersistenceError> {
        let original = self.load(id)?;
        let copy = Flow {
            id: FlowId::generate(),
            name: format!("{}{}", original.name, COPY_SUFFIX),
            status: FlowStatus::Draft,
            graph: original.graph.renumbered(),
            viewport: original.viewport,
            updated_at: None,
        };
        info!(from = %id, to = %copy.id, "flow duplicated");
        self.save(&copy)
    }

    pub fn set_active(&mut self, id: &FlowId, active: bool) -> Result<Flow, PersistenceError> {
        let mut flow = self.load(id)?;
        flow.status = if active {
            FlowStatus::Active
        } else {
            FlowStatus::Inactive
        };
        if active && flow.graph.triggers().next().is_none() {
            warn!(flow = %id, "activated flow has no trigger and will never start");
        }
        self.save(&flow)
    }

    pub fn delete(&mut self, id: &FlowId) -> Result<(), PersistenceError> {
        self.backend.remove(id)?;
        info!(flow = %id, "flow deleted");
        Ok(())
    }
}

/// Backend held in memory. `offline` makes every call fail as unavailable.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    pub flows: IndexMap<FlowId, Flow>,
    pub offline: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_online(&self) -> Result<(), PersistenceError> {
        if self.offline {
            Err(PersistenceError::PersistenceUnavailable(
                "backend offline".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

impl FlowBackend for MemoryBackend {
    fn list(&mut self) -> Result<Vec<FlowSummary>, PersistenceError> {
        self.check_online()?;
        Ok(self.flows.values().map(Flow::summary).collect())
    }

    fn fetch(&mut self, id: &FlowId) -> Result<Flow, PersistenceError> {
        self.check_online()?;
        self.flows
            .get(id)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(id.clone()))
    }

    fn store(&mut self, flow: &Flow) -> Result<Flow, PersistenceError> {
        self.check_online()?;
        let mut stored = flow.clone();
        stored.updated_at = Some(chrono::Utc::now());
        self.flows.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    fn remove(&mut self, id: &FlowId) -> Result<(), PersistenceError> {
        self.check_online()?;
        self.flows
            .shift_remove(id)
            .map(|_| ())
            .ok_or_else(|| PersistenceError::NotFound(id.clone()))
    }
}
