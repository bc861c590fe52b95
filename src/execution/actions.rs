//! Action Executors
//!
//! Performs the side effect associated with a single node visit:
//! - Start: no-op entry point
//! - Prompt: model call against the bound browsing tab
//! - IfElse: nothing here; branch selection lives in the engine
//! - Notify: human notification, optionally suspending for acknowledgment
//!
//! Executors never touch the execution record; they receive a context
//! snapshot and report what happened through [`ExecutorOutcome`].

use std::collections::HashMap;

use log::{debug, info};
use serde_json::Value;
use thiserror::Error;

use crate::events::{EventSink, ExecutionEvent};
use crate::workflow::model::{ExecutionContext, NodeData, WorkflowNode};

/// Collaborator-call failures. Fatal to the execution; any retry policy
/// belongs to the collaborator itself.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    #[error("prompt call failed: {0}")]
    Prompt(String),

    #[error("prompt requested tab context but no tab is bound to this execution")]
    TabNotBound,

    #[error("failed to read tab '{tab_id}': {reason}")]
    TabRead { tab_id: String, reason: String },
}

/// The collaborator boundary for prompt nodes: a model invocation plus a
/// snapshot of the bound browsing tab's visible text.
///
/// Implementations live outside the engine (browser shell, test fakes,
/// the CLI's interactive runner).
pub trait ActionRunner: Send + Sync {
    /// Runs an instruction against the model, optionally grounded in page
    /// text, returning the textual result.
    fn run_prompt(&self, instruction: &str, page_text: Option<&str>) -> Result<String, ActionError>;

    /// Reads the visible text of a browsing tab.
    fn tab_text(&self, tab_id: &str) -> Result<String, ActionError>;
}

/// Result of executing one node.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorOutcome {
    /// The node finished; merge the patch into the context.
    Completed { patch: HashMap<String, Value> },
    /// The node needs a human response before the execution can continue.
    Suspended { message: String },
    /// The node's collaborator call failed.
    Failed { error: ActionError },
}

impl ExecutorOutcome {
    fn done() -> Self {
        Self::Completed {
            patch: HashMap::new(),
        }
    }
}

/// Executes a single node against a context snapshot.
///
/// The one exhaustive dispatch point over the node-kind union; an unknown
/// kind cannot reach here because deserialization already rejected it.
pub fn execute_node(
    node: &WorkflowNode,
    context: &ExecutionContext,
    runner: &dyn ActionRunner,
    sink: &dyn EventSink,
) -> ExecutorOutcome {
    match &node.data {
        NodeData::Start {} => {
            debug!("[{}] start node '{}'", context.execution_id, node.id);
            ExecutorOutcome::done()
        }

        NodeData::Prompt {
            prompt,
            use_tab_context,
        } => execute_prompt(node, prompt, *use_tab_context, context, runner),

        // Branch selection happens in the engine; the visit itself has no
        // side effect.
        NodeData::Ifelse { .. } => ExecutorOutcome::done(),

        NodeData::Notify {
            message,
            requires_acknowledgment,
        } => {
            if *requires_acknowledgment {
                return ExecutorOutcome::Suspended {
                    message: message.clone(),
                };
            }

            // Fire-and-continue
            info!(
                "[{}] notification from '{}': {}",
                context.execution_id, node.id, message
            );
            sink.emit(ExecutionEvent::HumanNotification {
                execution_id: context.execution_id.clone(),
                node_id: node.id.clone(),
                message: message.clone(),
                requires_acknowledgment: false,
            });
            ExecutorOutcome::done()
        }
    }
}

/// Runs a prompt node's model call, snapshotting tab text first when the
/// node asks for page context.
fn execute_prompt(
    node: &WorkflowNode,
    prompt: &str,
    use_tab_context: bool,
    context: &ExecutionContext,
    runner: &dyn ActionRunner,
) -> ExecutorOutcome {
    let page_text = if use_tab_context {
        let tab_id = match context.current_tab_id.as_deref() {
            Some(id) => id,
            None => {
                return ExecutorOutcome::Failed {
                    error: ActionError::TabNotBound,
                }
            }
        };

        match runner.tab_text(tab_id) {
            Ok(text) => {
                debug!(
                    "[{}] captured {} chars of tab '{}' for prompt '{}'",
                    context.execution_id,
                    text.len(),
                    tab_id,
                    node.id
                );
                Some(text)
            }
            Err(error) => return ExecutorOutcome::Failed { error },
        }
    } else {
        None
    };

    match runner.run_prompt(prompt, page_text.as_deref()) {
        Ok(result) => {
            debug!(
                "[{}] prompt '{}' returned {} chars",
                context.execution_id,
                node.id,
                result.len()
            );
            // Result lands under the node-scoped variable name (the node id)
            let mut patch = HashMap::new();
            patch.insert(node.id.clone(), Value::String(result));
            ExecutorOutcome::Completed { patch }
        }
        Err(error) => ExecutorOutcome::Failed { error },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChannelSink, NullSink};
    use std::sync::mpsc::channel;
    use std::sync::Mutex;

    /// Scripted collaborator for tests.
    struct FakeRunner {
        prompt_result: Result<String, ActionError>,
        tab_result: Result<String, ActionError>,
        calls: Mutex<Vec<(String, Option<String>)>>,
    }

    impl FakeRunner {
        fn answering(result: &str) -> Self {
            Self {
                prompt_result: Ok(result.to_string()),
                tab_result: Ok("page text".to_string()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(error: ActionError) -> Self {
            Self {
                prompt_result: Err(error.clone()),
                tab_result: Err(error),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with_tab_text(mut self, text: &str) -> Self {
            self.tab_result = Ok(text.to_string());
            self
        }
    }

    impl ActionRunner for FakeRunner {
        fn run_prompt(
            &self,
            instruction: &str,
            page_text: Option<&str>,
        ) -> Result<String, ActionError> {
            self.calls
                .lock()
                .unwrap()
                .push((instruction.to_string(), page_text.map(String::from)));
            self.prompt_result.clone()
        }

        fn tab_text(&self, _tab_id: &str) -> Result<String, ActionError> {
            self.tab_result.clone()
        }
    }

    fn context(tab: Option<&str>) -> ExecutionContext {
        ExecutionContext::new("exec-test", tab.map(String::from))
    }

    #[test]
    fn test_start_is_noop() {
        let node = WorkflowNode::new("entry", NodeData::Start {});
        let runner = FakeRunner::answering("unused");

        let outcome = execute_node(&node, &context(None), &runner, &NullSink);
        assert_eq!(
            outcome,
            ExecutorOutcome::Completed {
                patch: HashMap::new()
            }
        );
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_ifelse_is_noop_here() {
        let node = WorkflowNode::new(
            "check",
            NodeData::Ifelse {
                condition: "x > 1".to_string(),
            },
        );
        let runner = FakeRunner::answering("unused");

        let outcome = execute_node(&node, &context(None), &runner, &NullSink);
        assert_eq!(
            outcome,
            ExecutorOutcome::Completed {
                patch: HashMap::new()
            }
        );
    }

    #[test]
    fn test_prompt_patches_node_scoped_variable() {
        let node = WorkflowNode::new(
            "summary",
            NodeData::Prompt {
                prompt: "Summarize this".to_string(),
                use_tab_context: false,
            },
        );
        let runner = FakeRunner::answering("a short summary");

        let outcome = execute_node(&node, &context(None), &runner, &NullSink);
        match outcome {
            ExecutorOutcome::Completed { patch } => {
                assert_eq!(patch.get("summary"), Some(&Value::from("a short summary")));
            }
            other => panic!("Expected completion, got {:?}", other),
        }

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], ("Summarize this".to_string(), None));
    }

    #[test]
    fn test_prompt_attaches_tab_context() {
        let node = WorkflowNode::new(
            "summary",
            NodeData::Prompt {
                prompt: "Summarize this".to_string(),
                use_tab_context: true,
            },
        );
        let runner = FakeRunner::answering("done").with_tab_text("the page body");

        let outcome = execute_node(&node, &context(Some("tab-3")), &runner, &NullSink);
        assert!(matches!(outcome, ExecutorOutcome::Completed { .. }));

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0].1.as_deref(), Some("the page body"));
    }

    #[test]
    fn test_prompt_without_bound_tab_fails() {
        let node = WorkflowNode::new(
            "summary",
            NodeData::Prompt {
                prompt: "Summarize".to_string(),
                use_tab_context: true,
            },
        );
        let runner = FakeRunner::answering("never reached");

        let outcome = execute_node(&node, &context(None), &runner, &NullSink);
        assert_eq!(
            outcome,
            ExecutorOutcome::Failed {
                error: ActionError::TabNotBound
            }
        );
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_prompt_collaborator_failure() {
        let node = WorkflowNode::new(
            "summary",
            NodeData::Prompt {
                prompt: "Summarize".to_string(),
                use_tab_context: false,
            },
        );
        let runner = FakeRunner::failing(ActionError::Prompt("model timed out".to_string()));

        let outcome = execute_node(&node, &context(None), &runner, &NullSink);
        assert_eq!(
            outcome,
            ExecutorOutcome::Failed {
                error: ActionError::Prompt("model timed out".to_string())
            }
        );
    }

    #[test]
    fn test_tab_read_failure() {
        let node = WorkflowNode::new(
            "summary",
            NodeData::Prompt {
                prompt: "Summarize".to_string(),
                use_tab_context: true,
            },
        );
        let runner = FakeRunner::failing(ActionError::TabRead {
            tab_id: "tab-3".to_string(),
            reason: "tab closed".to_string(),
        });

        let outcome = execute_node(&node, &context(Some("tab-3")), &runner, &NullSink);
        assert!(matches!(
            outcome,
            ExecutorOutcome::Failed {
                error: ActionError::TabRead { .. }
            }
        ));
    }

    #[test]
    fn test_notify_fire_and_continue_emits_event() {
        let node = WorkflowNode::new(
            "fyi",
            NodeData::Notify {
                message: "heads up".to_string(),
                requires_acknowledgment: false,
            },
        );
        let runner = FakeRunner::answering("unused");
        let (tx, rx) = channel();
        let sink = ChannelSink::new(tx);

        let outcome = execute_node(&node, &context(None), &runner, &sink);
        assert!(matches!(outcome, ExecutorOutcome::Completed { .. }));

        let event = rx.try_recv().unwrap();
        assert_eq!(
            event,
            ExecutionEvent::HumanNotification {
                execution_id: "exec-test".to_string(),
                node_id: "fyi".to_string(),
                message: "heads up".to_string(),
                requires_acknowledgment: false,
            }
        );
    }

    #[test]
    fn test_notify_with_acknowledgment_suspends() {
        let node = WorkflowNode::new(
            "confirm",
            NodeData::Notify {
                message: "please confirm".to_string(),
                requires_acknowledgment: true,
            },
        );
        let runner = FakeRunner::answering("unused");
        let (tx, rx) = channel();
        let sink = ChannelSink::new(tx);

        let outcome = execute_node(&node, &context(None), &runner, &sink);
        assert_eq!(
            outcome,
            ExecutorOutcome::Suspended {
                message: "please confirm".to_string()
            }
        );
        // The suspension event is the engine's to emit, not the executor's
        assert!(rx.try_recv().is_err());
    }
}
