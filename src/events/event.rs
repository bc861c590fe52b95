//! Execution Event Payloads
//!
//! One event fires for every observable state change of an execution.
//! Within a single execution the order is fixed: `node-start` for a node
//! precedes its `node-complete`, which precedes any successor's
//! `node-start`; `execution-update` carries a step counter that only ever
//! grows. No ordering holds across distinct executions.

use serde::Serialize;
use serde_json::Value;

use crate::execution::registry::ExecutionStatus;
use crate::workflow::model::NodeKind;

/// A push event emitted by the engine. Fire-and-forget.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ExecutionEvent {
    /// Execution-level status change.
    #[serde(rename_all = "camelCase")]
    ExecutionUpdate {
        execution_id: String,
        status: ExecutionStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_node_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Logical step counter, monotonic per execution
        step: u64,
    },

    /// A node is about to execute.
    #[serde(rename_all = "camelCase")]
    NodeStart {
        execution_id: String,
        node_id: String,
        node_kind: NodeKind,
    },

    /// A node finished executing.
    #[serde(rename_all = "camelCase")]
    NodeComplete {
        execution_id: String,
        node_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// A notify node published a message for a human.
    #[serde(rename_all = "camelCase")]
    HumanNotification {
        execution_id: String,
        node_id: String,
        message: String,
        requires_acknowledgment: bool,
    },
}

impl ExecutionEvent {
    /// The id of the execution this event belongs to.
    pub fn execution_id(&self) -> &str {
        match self {
            Self::ExecutionUpdate { execution_id, .. }
            | Self::NodeStart { execution_id, .. }
            | Self::NodeComplete { execution_id, .. }
            | Self::HumanNotification { execution_id, .. } => execution_id,
        }
    }
}
