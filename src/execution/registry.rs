//! Execution Registry
//!
//! Process-wide table of live and recently-finished executions, keyed by
//! execution id. The registry owns the canonical `Execution` record; the
//! engine mutates a record only through its slot lock (single-writer
//! discipline). Terminal records are retained for status queries until
//! reaped with [`ExecutionRegistry::gc`] or the process exits.
//!
//! The registry is an injected component, constructed once per process
//! (or per test) and handed to the engine and request handlers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::workflow::model::{ExecutionContext, Workflow};

/// Lifecycle status of an execution.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Failed,
}

impl ExecutionStatus {
    /// Terminal statuses are never mutated again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One live or completed run of a workflow.
///
/// Runtime state only; the engine never persists it.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub workflow_id: String,
    pub execution_id: String,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_node_id: Option<String>,
    pub context: ExecutionContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Logical step counter; grows with every execution-update
    pub step: u64,
}

impl Execution {
    fn new(workflow_id: &str, execution_id: &str, context: ExecutionContext) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            execution_id: execution_id.to_string(),
            status: ExecutionStatus::Idle,
            current_node_id: None,
            context,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            step: 0,
        }
    }

    /// Returns true once the execution can no longer change.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Transitions to running (initial start or resume).
    pub fn mark_running(&mut self) {
        self.status = ExecutionStatus::Running;
        self.error = None;
    }

    /// Parks the execution at a node awaiting a human response.
    pub fn mark_paused(&mut self, node_id: &str) {
        self.status = ExecutionStatus::Paused;
        self.current_node_id = Some(node_id.to_string());
    }

    /// Finishes the execution successfully.
    pub fn mark_completed(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.current_node_id = None;
        self.completed_at = Some(Utc::now());
    }

    /// Finishes the execution with an error description.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }
}

/// Caller-facing request errors. Never mutate any execution record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    #[error("no execution with id '{0}'")]
    NotFound(String),

    #[error("execution '{id}' is {status}, not paused")]
    NotResumable { id: String, status: ExecutionStatus },

    #[error("execution '{0}' is busy applying a step")]
    Busy(String),
}

/// Registry slot: the record plus the pinned workflow definition.
///
/// The definition rides along so a paused execution can resume without
/// re-reading the store.
pub(crate) struct ExecutionSlot {
    pub record: Mutex<Execution>,
    pub workflow: Arc<Workflow>,
}

/// Process-wide table of executions.
pub struct ExecutionRegistry {
    slots: Mutex<HashMap<String, Arc<ExecutionSlot>>>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a new idle execution for a workflow and returns its id.
    ///
    /// Ids are v4 UUIDs: globally unique, collision-free for any
    /// realistic process lifetime.
    pub fn create(&self, workflow: &Arc<Workflow>, tab_id: Option<String>) -> String {
        let execution_id = Uuid::new_v4().to_string();
        let context = ExecutionContext::new(execution_id.clone(), tab_id);
        let execution = Execution::new(&workflow.id, &execution_id, context);

        let slot = Arc::new(ExecutionSlot {
            record: Mutex::new(execution),
            workflow: Arc::clone(workflow),
        });

        self.lock_slots().insert(execution_id.clone(), slot);
        info!(
            "Created execution {} for workflow '{}'",
            execution_id, workflow.id
        );
        execution_id
    }

    /// Returns a point-in-time snapshot of an execution.
    pub fn get(&self, execution_id: &str) -> Option<Execution> {
        let slot = self.lock_slots().get(execution_id).cloned()?;
        let record = slot.record.lock().unwrap_or_else(PoisonError::into_inner);
        Some(record.clone())
    }

    /// Returns snapshots of all known executions.
    pub fn list(&self) -> Vec<Execution> {
        let slots: Vec<_> = self.lock_slots().values().cloned().collect();
        slots
            .iter()
            .map(|slot| {
                slot.record
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
            })
            .collect()
    }

    /// Reaps terminal executions; returns how many were removed.
    pub fn gc(&self) -> usize {
        let mut slots = self.lock_slots();
        let before = slots.len();
        slots.retain(|_, slot| {
            !slot
                .record
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_terminal()
        });
        let removed = before - slots.len();
        if removed > 0 {
            debug!("Reaped {} terminal executions", removed);
        }
        removed
    }

    /// Number of registered executions.
    pub fn len(&self) -> usize {
        self.lock_slots().len()
    }

    /// Returns true if no executions are registered.
    pub fn is_empty(&self) -> bool {
        self.lock_slots().is_empty()
    }

    /// Engine-internal slot access.
    pub(crate) fn slot(&self, execution_id: &str) -> Option<Arc<ExecutionSlot>> {
        self.lock_slots().get(execution_id).cloned()
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<ExecutionSlot>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ExecutionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::model::{NodeData, WorkflowNode};

    fn sample_workflow() -> Arc<Workflow> {
        let mut workflow = Workflow::new("registry-test");
        workflow
            .add_node(WorkflowNode::new("start", NodeData::Start {}))
            .unwrap();
        Arc::new(workflow)
    }

    #[test]
    fn test_create_registers_idle_execution() {
        let registry = ExecutionRegistry::new();
        let workflow = sample_workflow();

        let id = registry.create(&workflow, Some("tab-1".to_string()));
        let execution = registry.get(&id).unwrap();

        assert_eq!(execution.status, ExecutionStatus::Idle);
        assert_eq!(execution.workflow_id, workflow.id);
        assert_eq!(execution.context.current_tab_id.as_deref(), Some("tab-1"));
        assert_eq!(execution.context.execution_id, id);
        assert_eq!(execution.step, 0);
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = ExecutionRegistry::new();
        let workflow = sample_workflow();

        let a = registry.create(&workflow, None);
        let b = registry.create(&workflow, None);
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_get_unknown_is_none() {
        let registry = ExecutionRegistry::new();
        assert!(registry.get("ghost").is_none());
    }

    #[test]
    fn test_status_transitions() {
        let registry = ExecutionRegistry::new();
        let workflow = sample_workflow();
        let id = registry.create(&workflow, None);

        let slot = registry.slot(&id).unwrap();
        {
            let mut record = slot.record.lock().unwrap();
            record.mark_running();
            assert_eq!(record.status, ExecutionStatus::Running);
            assert!(!record.is_terminal());

            record.mark_paused("alert");
            assert_eq!(record.status, ExecutionStatus::Paused);
            assert_eq!(record.current_node_id.as_deref(), Some("alert"));

            record.mark_completed();
            assert!(record.is_terminal());
            assert!(record.completed_at.is_some());
            assert!(record.current_node_id.is_none());
        }

        let snapshot = registry.get(&id).unwrap();
        assert_eq!(snapshot.status, ExecutionStatus::Completed);
    }

    #[test]
    fn test_mark_failed_records_error() {
        let registry = ExecutionRegistry::new();
        let workflow = sample_workflow();
        let id = registry.create(&workflow, None);

        let slot = registry.slot(&id).unwrap();
        slot.record.lock().unwrap().mark_failed("boom");

        let snapshot = registry.get(&id).unwrap();
        assert_eq!(snapshot.status, ExecutionStatus::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("boom"));
        assert!(snapshot.completed_at.is_some());
    }

    #[test]
    fn test_gc_reaps_only_terminal() {
        let registry = ExecutionRegistry::new();
        let workflow = sample_workflow();

        let done = registry.create(&workflow, None);
        let live = registry.create(&workflow, None);

        registry
            .slot(&done)
            .unwrap()
            .record
            .lock()
            .unwrap()
            .mark_completed();
        registry
            .slot(&live)
            .unwrap()
            .record
            .lock()
            .unwrap()
            .mark_running();

        assert_eq!(registry.gc(), 1);
        assert!(registry.get(&done).is_none());
        assert!(registry.get(&live).is_some());
    }

    #[test]
    fn test_list_snapshots() {
        let registry = ExecutionRegistry::new();
        let workflow = sample_workflow();
        registry.create(&workflow, None);
        registry.create(&workflow, None);

        let listed = registry.list();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|e| e.status == ExecutionStatus::Idle));
    }

    #[test]
    fn test_slot_pins_workflow() {
        let registry = ExecutionRegistry::new();
        let workflow = sample_workflow();
        let id = registry.create(&workflow, None);

        let slot = registry.slot(&id).unwrap();
        assert_eq!(slot.workflow.id, workflow.id);
    }

    #[test]
    fn test_snapshot_serialization_shape() {
        let registry = ExecutionRegistry::new();
        let workflow = sample_workflow();
        let id = registry.create(&workflow, None);

        let snapshot = registry.get(&id).unwrap();
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["executionId"], id);
        assert_eq!(value["workflowId"], workflow.id);
        assert_eq!(value["status"], "idle");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_state_error_display() {
        let err = StateError::NotFound("x".to_string());
        assert!(err.to_string().contains("x"));

        let err = StateError::NotResumable {
            id: "y".to_string(),
            status: ExecutionStatus::Running,
        };
        assert!(err.to_string().contains("running"));
    }
}
