//! Directory-backed flow store: one `<flow-id>.json` document per flow.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use tracing::{debug, warn};

use super::{FlowBackend, from_json, to_json};
use crate::error::PersistenceError;
use crate::model::{Flow, FlowId, FlowSummary};

#[derive(Debug, Clone)]
pub struct FsFlowStore {
    root: Utf8PathBuf,
}

impl FsFlowStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<Utf8PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).with_context(|| format!("Create store dir {}", root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Path of a flow's document. Ids that could escape the store are rejected.
    pub fn path_of(&self, id: &FlowId) -> Result<Utf8PathBuf> {
        let s = id.as_str();
        if s.is_empty()
            || s.starts_with('.')
            || !s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            anyhow::bail!("Invalid flow id {:?}", s);
        }
        Ok(self.root.join(format!("{}.json", s)))
    }

    fn list_files(&self) -> Result<Vec<Utf8PathBuf>> {
        let mut files = Vec::new();
        for entry in
            std::fs::read_dir(self.root.as_std_path()).with_context(|| format!("Read dir {}", self.root))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let p = Utf8PathBuf::from_path_buf(entry.path())
                .map_err(|_| anyhow::anyhow!("Non-UTF8 path in {}", self.root))?;
            if p.extension() == Some("json") {
                files.push(p);
            }
        }
        files.sort();
        Ok(files)
    }

    fn read(&self, path: &Utf8Path) -> Result<Flow> {
        let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
        from_json(&text).with_context(|| format!("Failed to parse {}", path))
    }

    /// Write through a temporary file so readers never see a partial document.
    fn write(&self, path: &Utf8Path, flow: &Flow) -> Result<()> {
        let text = to_json(flow)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, text).with_context(|| format!("Failed to write {}", tmp))?;
        std::fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path))?;
        Ok(())
    }
}

fn unavailable(e: anyhow::Error) -> PersistenceError {
    PersistenceError::PersistenceUnavailable(format!("{:#}", e))
}

impl FlowBackend for FsFlowStore {
    fn list(&mut self) -> Result<Vec<FlowSummary>, PersistenceError> {
        let files = self.list_files().map_err(unavailable)?;
        let mut out = Vec::with_capacity(files.len());
        for path in files {
            match self.read(&path) {
                Ok(flow) => out.push(flow.summary()),
                // One unreadable document should not hide the others.
                Err(e) => {
                    let reason = format!("{:#}", e);
                    warn!(path = %path, error = %reason, "skipping flow document");
                }
            }
        }
        Ok(out)
    }

    fn fetch(&mut self, id: &FlowId) -> Result<Flow, PersistenceError> {
        let path = self.path_of(id).map_err(|_| PersistenceError::NotFound(id.clone()))?;
        if !path.is_file() {
            return Err(PersistenceError::NotFound(id.clone()));
        }
        self.read(&path).map_err(unavailable)
    }

    fn store(&mut self, flow: &Flow) -> Result<Flow, PersistenceError> {
        let path = self
            .path_of(&flow.id)
            .map_err(|_| PersistenceError::InvalidId(flow.id.clone()))?;
        let mut stored = flow.clone();
        stored.updated_at = Some(Utc::now());
        self.write(&path, &stored).map_err(unavailable)?;
        debug!(path = %path, "flow document written");
        Ok(stored)
    }

    fn remove(&mut self, id: &FlowId) -> Result<(), PersistenceError> {
        let path = self.path_of(id).map_err(|_| PersistenceError::NotFound(id.clone()))?;
        if !path.is_file() {
            return Err(PersistenceError::NotFound(id.clone()));
        }
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to remove {}", path))
            .map_err(unavailable)
    }
}
