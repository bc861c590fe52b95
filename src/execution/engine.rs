//! Workflow Execution Engine
//!
//! The core engine that orchestrates workflow traversal:
//! - Graph validation on the first step of an execution
//! - Node-by-node dispatch to the action executors
//! - Branch resolution through the condition evaluator
//! - Suspend/resume across human acknowledgment
//! - Lifecycle event emission after every state change
//!
//! Each execution advances on its own worker thread, strictly one node
//! step at a time. The execution record is mutated only under its slot
//! lock, and never while a collaborator call is in flight: a step reads a
//! context snapshot, runs the executor, then re-locks to apply effects.
//! A cancellation that lands mid-step is observed at apply time and the
//! step's effects are discarded.

use std::sync::{Arc, PoisonError, TryLockError};
use std::thread;

use log::{debug, error, info};
use serde_json::json;
use thiserror::Error;

use crate::events::{EventSink, ExecutionEvent, NullSink};
use crate::workflow::condition::{self, EvalError};
use crate::workflow::graph::{self, GraphError};
use crate::workflow::model::{NodeData, Workflow, WorkflowNode};

use super::actions::{execute_node, ActionError, ActionRunner, ExecutorOutcome};
use super::registry::{
    Execution, ExecutionRegistry, ExecutionSlot, ExecutionStatus, StateError,
};

/// Default per-execution step budget.
///
/// Edge cycles are legal in a document; the budget turns an unbounded
/// loop into an ordinary terminal failure.
pub const DEFAULT_MAX_STEPS: u64 = 1000;

/// Terminal execution errors: whatever stopped a run, as recorded on the
/// execution and reported in its final `execution-update`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error("execution cancelled by caller")]
    Cancelled,

    #[error("step budget of {0} exceeded (does the workflow cycle?)")]
    StepLimitExceeded(u64),
}

/// Workflow execution engine.
///
/// Drives executions against a registry, a collaborator runner, and an
/// event sink. Cloning is cheap; clones share the same registry and
/// collaborators.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tabrunner::events::LogSink;
/// use tabrunner::execution::{Engine, ExecutionRegistry};
/// use tabrunner::workflow::store::load_workflow_file;
/// # use tabrunner::execution::actions::{ActionError, ActionRunner};
/// # struct MyRunner;
/// # impl ActionRunner for MyRunner {
/// #     fn run_prompt(&self, _: &str, _: Option<&str>) -> Result<String, ActionError> { Ok(String::new()) }
/// #     fn tab_text(&self, _: &str) -> Result<String, ActionError> { Ok(String::new()) }
/// # }
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let registry = Arc::new(ExecutionRegistry::new());
///     let mut engine = Engine::new(Arc::clone(&registry), Arc::new(MyRunner));
///     engine.set_event_sink(Arc::new(LogSink));
///
///     let workflow = load_workflow_file("summarize.json")?;
///     let execution_id = engine.execute(workflow, Some("tab-1".to_string()))?;
///     println!("started {}", execution_id);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Engine {
    registry: Arc<ExecutionRegistry>,
    runner: Arc<dyn ActionRunner>,
    sink: Arc<dyn EventSink>,
    max_steps: u64,
}

impl Engine {
    /// Creates an engine over a registry and a collaborator runner.
    pub fn new(registry: Arc<ExecutionRegistry>, runner: Arc<dyn ActionRunner>) -> Self {
        Self {
            registry,
            runner,
            sink: Arc::new(NullSink),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Sets the sink receiving push events.
    pub fn set_event_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sink = sink;
    }

    /// Sets the per-execution step budget.
    pub fn set_max_steps(&mut self, max_steps: u64) {
        self.max_steps = max_steps;
    }

    /// Starts executing a workflow against an optional browsing tab.
    ///
    /// Validates the graph first; a validation failure is returned
    /// synchronously and no execution is registered. On success the
    /// execution id is returned immediately and traversal proceeds on a
    /// worker thread.
    pub fn execute(
        &self,
        workflow: Workflow,
        tab_id: Option<String>,
    ) -> Result<String, GraphError> {
        graph::validate(&workflow)?;
        let start_id = graph::resolve_start(&workflow)?.id.clone();

        let workflow = Arc::new(workflow);
        let execution_id = self.registry.create(&workflow, tab_id);

        let slot = match self.registry.slot(&execution_id) {
            Some(slot) => slot,
            None => {
                // A freshly created execution cannot disappear
                error!("Execution {} vanished before starting", execution_id);
                return Ok(execution_id);
            }
        };

        {
            let mut record = lock_record(&slot);
            record.mark_running();
            record.current_node_id = Some(start_id.clone());
            record.step += 1;
            self.sink.emit(update_event(&record));
        }

        info!(
            "Executing workflow '{}' as {} (entry '{}')",
            workflow.id, execution_id, start_id
        );

        let engine = self.clone();
        let worker_workflow = Arc::clone(&workflow);
        let worker_id = execution_id.clone();
        thread::spawn(move || {
            engine.drive(worker_workflow, slot, worker_id, start_id, String::new());
        });

        Ok(execution_id)
    }

    /// Resumes a paused execution with a human response.
    ///
    /// The response payload is merged into the context under the notify
    /// node's id, and traversal continues at the node following it; the
    /// notify node itself is not re-executed. Fails with
    /// [`StateError::NotFound`] / [`StateError::NotResumable`] without
    /// touching the record; a record whose step is mid-apply is rejected
    /// with [`StateError::Busy`].
    pub fn resume(
        &self,
        execution_id: &str,
        acknowledged: bool,
        response: Option<String>,
    ) -> Result<(), StateError> {
        let slot = self
            .registry
            .slot(execution_id)
            .ok_or_else(|| StateError::NotFound(execution_id.to_string()))?;

        let mut record = match slot.record.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                return Err(StateError::Busy(execution_id.to_string()))
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        if record.status != ExecutionStatus::Paused {
            return Err(StateError::NotResumable {
                id: execution_id.to_string(),
                status: record.status,
            });
        }

        let Some(notify_id) = record.current_node_id.clone() else {
            return Err(StateError::NotResumable {
                id: execution_id.to_string(),
                status: record.status,
            });
        };

        info!(
            "Resuming execution {} (acknowledged: {})",
            execution_id, acknowledged
        );

        record.context.set(
            notify_id.clone(),
            json!({ "acknowledged": acknowledged, "response": response }),
        );

        let workflow = Arc::clone(&slot.workflow);
        let node = match workflow.get_node(&notify_id) {
            Some(node) => node,
            None => {
                // The definition is immutable, so the paused node must exist
                self.fail_locked(
                    &mut record,
                    GraphError::DanglingReference {
                        edge: String::new(),
                        node: notify_id.clone(),
                    }
                    .into(),
                );
                return Ok(());
            }
        };

        match self.next_node(&workflow, node, &record) {
            Ok(Some((edge_id, next_id))) => {
                record.mark_running();
                record.current_node_id = Some(next_id.clone());
                record.step += 1;
                self.sink.emit(update_event(&record));
                drop(record);

                let engine = self.clone();
                let slot = Arc::clone(&slot);
                let worker_id = execution_id.to_string();
                thread::spawn(move || {
                    engine.drive(workflow, slot, worker_id, next_id, edge_id);
                });
                Ok(())
            }
            Ok(None) => {
                // The notify node was the last one
                record.mark_completed();
                record.step += 1;
                self.sink.emit(update_event(&record));
                info!("Execution {} completed", execution_id);
                Ok(())
            }
            Err(e) => {
                // The resume call itself succeeded; the execution did not
                self.fail_locked(&mut record, e);
                Ok(())
            }
        }
    }

    /// Cancels a non-terminal execution.
    ///
    /// Idempotent: returns `false` for unknown or already-terminal
    /// executions and leaves them untouched.
    pub fn stop(&self, execution_id: &str) -> bool {
        let Some(slot) = self.registry.slot(execution_id) else {
            return false;
        };

        let mut record = lock_record(&slot);
        if record.is_terminal() {
            return false;
        }

        info!("Stopping execution {}", execution_id);
        record.mark_failed(ExecutionError::Cancelled.to_string());
        record.step += 1;
        self.sink.emit(update_event(&record));
        true
    }

    /// Returns a point-in-time snapshot of an execution.
    pub fn status(&self, execution_id: &str) -> Result<Execution, StateError> {
        self.registry
            .get(execution_id)
            .ok_or_else(|| StateError::NotFound(execution_id.to_string()))
    }

    /// The step loop: runs one execution to completion, failure, or
    /// suspension.
    fn drive(
        &self,
        workflow: Arc<Workflow>,
        slot: Arc<ExecutionSlot>,
        execution_id: String,
        first_node: String,
        via_edge: String,
    ) {
        let mut node_id = first_node;
        let mut last_edge = via_edge;

        loop {
            let node = match workflow.get_node(&node_id) {
                Some(node) => node,
                None => {
                    let mut record = lock_record(&slot);
                    self.fail_locked(
                        &mut record,
                        GraphError::DanglingReference {
                            edge: last_edge.clone(),
                            node: node_id.clone(),
                        }
                        .into(),
                    );
                    return;
                }
            };

            // Snapshot phase: announce the visit and read what the step
            // needs, then release the lock before any collaborator call.
            let context = {
                let record = lock_record(&slot);
                if record.status != ExecutionStatus::Running {
                    debug!(
                        "[{}] worker exiting, execution is {}",
                        execution_id, record.status
                    );
                    return;
                }
                self.sink.emit(ExecutionEvent::NodeStart {
                    execution_id: execution_id.clone(),
                    node_id: node.id.clone(),
                    node_kind: node.kind(),
                });
                record.context.clone()
            };

            let outcome = execute_node(node, &context, self.runner.as_ref(), self.sink.as_ref());

            // Apply phase: re-lock, observe any racing cancellation, then
            // commit the step's effects.
            let mut record = lock_record(&slot);
            if record.status != ExecutionStatus::Running {
                debug!(
                    "[{}] discarding step effects, execution is {}",
                    execution_id, record.status
                );
                return;
            }

            match outcome {
                ExecutorOutcome::Completed { patch } => {
                    let result = patch.get(&node.id).cloned();
                    record.context.merge(patch);
                    record.current_node_id = Some(node_id.clone());
                    self.sink.emit(ExecutionEvent::NodeComplete {
                        execution_id: execution_id.clone(),
                        node_id: node.id.clone(),
                        result,
                        error: None,
                    });
                }
                ExecutorOutcome::Suspended { message } => {
                    record.mark_paused(&node_id);
                    record.step += 1;
                    self.sink.emit(ExecutionEvent::HumanNotification {
                        execution_id: execution_id.clone(),
                        node_id: node_id.clone(),
                        message,
                        requires_acknowledgment: true,
                    });
                    self.sink.emit(update_event(&record));
                    info!(
                        "Execution {} paused at '{}' awaiting acknowledgment",
                        execution_id, node_id
                    );
                    return;
                }
                ExecutorOutcome::Failed { error } => {
                    let error = ExecutionError::Action(error);
                    self.sink.emit(ExecutionEvent::NodeComplete {
                        execution_id: execution_id.clone(),
                        node_id: node_id.clone(),
                        result: None,
                        error: Some(error.to_string()),
                    });
                    self.fail_locked(&mut record, error);
                    return;
                }
            }

            match self.next_node(&workflow, node, &record) {
                Ok(Some((edge_id, next_id))) => {
                    record.step += 1;
                    if record.step > self.max_steps {
                        self.fail_locked(
                            &mut record,
                            ExecutionError::StepLimitExceeded(self.max_steps),
                        );
                        return;
                    }
                    self.sink.emit(update_event(&record));
                    last_edge = edge_id;
                    node_id = next_id;
                }
                Ok(None) => {
                    record.mark_completed();
                    record.step += 1;
                    self.sink.emit(update_event(&record));
                    info!("Execution {} completed", execution_id);
                    return;
                }
                Err(e) => {
                    self.fail_locked(&mut record, e);
                    return;
                }
            }
        }
    }

    /// Resolves the node following `node`, or `None` when traversal is
    /// exhausted.
    ///
    /// Ifelse nodes evaluate their condition exactly once, here, against
    /// the post-merge context; everything else follows its single
    /// outgoing edge.
    fn next_node(
        &self,
        workflow: &Workflow,
        node: &WorkflowNode,
        record: &Execution,
    ) -> Result<Option<(String, String)>, ExecutionError> {
        if let NodeData::Ifelse { condition } = &node.data {
            let taken = condition::evaluate(condition, &record.context)?;
            debug!(
                "[{}] branch '{}': `{}` evaluated to {}",
                record.execution_id, node.id, condition, taken
            );
            let edge = graph::branch_edge(workflow, &node.id, taken)?;
            return Ok(Some((edge.id.clone(), edge.target.clone())));
        }

        let edges = graph::outgoing_edges(workflow, &node.id);
        match edges.len() {
            0 => Ok(None),
            1 => Ok(Some((edges[0].id.clone(), edges[0].target.clone()))),
            count => Err(GraphError::AmbiguousFanout {
                node: node.id.clone(),
                count,
            }
            .into()),
        }
    }

    fn fail_locked(&self, record: &mut Execution, error: ExecutionError) {
        error!("[{}] execution failed: {}", record.execution_id, error);
        record.mark_failed(error.to_string());
        record.step += 1;
        self.sink.emit(update_event(record));
    }
}

fn lock_record(slot: &ExecutionSlot) -> std::sync::MutexGuard<'_, Execution> {
    slot.record.lock().unwrap_or_else(PoisonError::into_inner)
}

fn update_event(record: &Execution) -> ExecutionEvent {
    ExecutionEvent::ExecutionUpdate {
        execution_id: record.execution_id.clone(),
        status: record.status,
        current_node_id: record.current_node_id.clone(),
        error: record.error.clone(),
        step: record.step,
    }
}
