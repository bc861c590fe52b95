//! Workflow Document Store
//!
//! Durable persistence for workflow definitions: one pretty-printed JSON
//! file per workflow id under a store directory. Live execution state is
//! deliberately *not* persisted here; only definitions are durable.
//!
//! Hand-authored definitions can also be loaded from YAML files via
//! [`load_workflow_file`], which picks the format by extension.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use thiserror::Error;

use super::model::{NodeData, Workflow, WorkflowNode};

/// Lazily-resolved default store directory.
///
/// Resolution order: `TABRUNNER_HOME` environment override, then
/// `~/.tabrunner/workflows`, then `.tabrunner/workflows` relative to the
/// working directory.
pub static DEFAULT_STORE_DIR: Lazy<PathBuf> = Lazy::new(|| {
    if let Ok(home) = std::env::var("TABRUNNER_HOME") {
        return PathBuf::from(home).join("workflows");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".tabrunner").join("workflows");
    }

    PathBuf::from(".tabrunner").join("workflows")
});

/// Document persistence errors. Caller-facing; never touch execution state.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid workflow JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid workflow YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unsupported workflow file extension: '{0}'")]
    UnsupportedFormat(String),
}

/// File-backed store for workflow documents.
pub struct WorkflowStore {
    dir: PathBuf,
}

impl WorkflowStore {
    /// Opens a store rooted at the given directory, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        debug!("Workflow store: {}", dir.display());
        Ok(Self { dir })
    }

    /// Opens the default per-user store.
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(DEFAULT_STORE_DIR.as_path())
    }

    /// Returns the store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, workflow_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", workflow_id))
    }

    /// Creates and persists a new workflow document.
    ///
    /// New documents are seeded with a single start node so the entry
    /// point always exists.
    pub fn create(
        &self,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<Workflow, StoreError> {
        let mut workflow = Workflow::new(name);
        workflow.description = description;
        workflow
            .add_node(WorkflowNode::new("start", NodeData::Start {}))
            .ok();

        self.save(&mut workflow)?;
        info!("Created workflow '{}' ({})", workflow.name, workflow.id);
        Ok(workflow)
    }

    /// Saves a workflow document, refreshing its update timestamp.
    pub fn save(&self, workflow: &mut Workflow) -> Result<(), StoreError> {
        workflow.updated_at = chrono::Utc::now();

        let json = serde_json::to_string_pretty(workflow)?;
        fs::write(self.path_for(&workflow.id), json)?;

        debug!("Saved workflow '{}'", workflow.id);
        Ok(())
    }

    /// Loads a workflow by id; `None` if no such document exists.
    pub fn load(&self, workflow_id: &str) -> Result<Option<Workflow>, StoreError> {
        let path = self.path_for(workflow_id);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        let workflow: Workflow = serde_json::from_str(&content)?;
        Ok(Some(workflow))
    }

    /// Lists all stored workflows, sorted by creation time.
    ///
    /// Unreadable files are skipped with a warning rather than failing the
    /// whole listing.
    pub fn list(&self) -> Result<Vec<Workflow>, StoreError> {
        let mut workflows = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match fs::read_to_string(&path).map_err(StoreError::from).and_then(
                |content| Ok(serde_json::from_str::<Workflow>(&content)?),
            ) {
                Ok(workflow) => workflows.push(workflow),
                Err(e) => warn!("Skipping unreadable workflow {}: {}", path.display(), e),
            }
        }

        workflows.sort_by_key(|w| w.created_at);
        Ok(workflows)
    }

    /// Deletes a workflow document; `false` if it did not exist.
    pub fn delete(&self, workflow_id: &str) -> Result<bool, StoreError> {
        let path = self.path_for(workflow_id);
        if !path.exists() {
            return Ok(false);
        }

        fs::remove_file(&path)?;
        info!("Deleted workflow '{}'", workflow_id);
        Ok(true)
    }
}

/// Loads a workflow definition from a standalone file.
///
/// JSON is the canonical document format; `.yaml`/`.yml` is accepted for
/// hand-authored definitions.
pub fn load_workflow_file(path: impl AsRef<Path>) -> Result<Workflow, StoreError> {
    let path = path.as_ref();
    info!("Loading workflow from: {}", path.display());

    let content = fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let workflow = match ext.as_str() {
        "json" => serde_json::from_str(&content)?,
        "yaml" | "yml" => serde_yaml::from_str(&content)?,
        other => return Err(StoreError::UnsupportedFormat(other.to_string())),
    };

    Ok(workflow)
}
