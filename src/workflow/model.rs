//! Workflow Data Model
//!
//! Core data structures representing workflow documents: typed nodes,
//! the edges connecting them, and the execution context threaded through
//! a run.
//!
//! # Example JSON Format
//!
//! ```json
//! {
//!   "id": "5f6c...",
//!   "name": "Summarize page",
//!   "nodes": [
//!     { "id": "entry", "type": "start", "data": {}, "position": { "x": 0, "y": 0 } },
//!     {
//!       "id": "summary",
//!       "type": "prompt",
//!       "data": { "prompt": "Summarize this page", "useTabContext": true },
//!       "position": { "x": 200, "y": 0 }
//!     }
//!   ],
//!   "edges": [{ "id": "e1", "source": "entry", "target": "summary" }],
//!   "createdAt": "2025-06-01T12:00:00Z",
//!   "updatedAt": "2025-06-01T12:00:00Z"
//! }
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// 2-D layout position of a node in the visual editor.
///
/// Presentational only; never consulted during execution.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// The closed set of node kinds.
///
/// Unknown kinds are rejected at deserialization time; they are not an
/// extension point.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Start,
    Prompt,
    Ifelse,
    Notify,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Prompt => write!(f, "prompt"),
            Self::Ifelse => write!(f, "ifelse"),
            Self::Notify => write!(f, "notify"),
        }
    }
}

/// Kind-specific node payload.
///
/// Serializes as a sibling `type` tag plus a `data` object, matching the
/// persisted document layout.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum NodeData {
    /// Entry point; carries no payload.
    Start {},
    /// Instruction for the model collaborator.
    Prompt {
        prompt: String,
        #[serde(rename = "useTabContext", default)]
        use_tab_context: bool,
    },
    /// Boolean branch on a condition expression.
    Ifelse { condition: String },
    /// Human notification, optionally blocking on acknowledgment.
    Notify {
        message: String,
        #[serde(rename = "requiresAcknowledgment", default)]
        requires_acknowledgment: bool,
    },
}

impl NodeData {
    /// Returns the kind tag for this payload.
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Start {} => NodeKind::Start,
            Self::Prompt { .. } => NodeKind::Prompt,
            Self::Ifelse { .. } => NodeKind::Ifelse,
            Self::Notify { .. } => NodeKind::Notify,
        }
    }
}

/// A single typed node in a workflow graph.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowNode {
    /// Unique identifier within the workflow
    pub id: String,

    /// Kind tag and kind-specific payload (`type` + `data` in JSON)
    #[serde(flatten)]
    pub data: NodeData,

    /// Editor layout position
    #[serde(default)]
    pub position: Position,
}

impl WorkflowNode {
    /// Creates a node with the given id and payload at the origin.
    pub fn new(id: impl Into<String>, data: NodeData) -> Self {
        Self {
            id: id.into().trim().to_string(),
            data,
            position: Position::default(),
        }
    }

    /// Sets the editor position.
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    /// Returns this node's kind.
    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }
}

/// A directed edge between two nodes.
///
/// Edges leaving an `ifelse` node carry the taken branch in
/// `source_handle` (`"true"` or `"false"`). `target_handle` is reserved
/// and unused by the current node kinds.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowEdge {
    pub id: String,

    /// Source node id
    pub source: String,

    /// Target node id
    pub target: String,

    /// Branch tag on edges leaving an ifelse node
    #[serde(
        rename = "sourceHandle",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_handle: Option<String>,

    /// Reserved target port tag
    #[serde(
        rename = "targetHandle",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub target_handle: Option<String>,
}

impl WorkflowEdge {
    /// Creates an untagged edge between two nodes.
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    /// Tags this edge with an ifelse branch (`"true"` / `"false"`).
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.source_handle = Some(branch.into());
        self
    }
}

/// A complete, durable workflow document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Creates an empty workflow with a generated id and fresh timestamps.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            edges: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the optional description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a node, rejecting duplicate ids.
    pub fn add_node(&mut self, node: WorkflowNode) -> Result<(), String> {
        if self.nodes.iter().any(|n| n.id == node.id) {
            return Err(format!("Node '{}' already exists", node.id));
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Adds an edge, rejecting duplicate ids.
    pub fn add_edge(&mut self, edge: WorkflowEdge) -> Result<(), String> {
        if self.edges.iter().any(|e| e.id == edge.id) {
            return Err(format!("Edge '{}' already exists", edge.id));
        }
        self.edges.push(edge);
        Ok(())
    }

    /// Gets a node by id.
    pub fn get_node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Gets an edge by id.
    pub fn get_edge(&self, id: &str) -> Option<&WorkflowEdge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// Removes a node and every edge touching it.
    pub fn remove_node(&mut self, id: &str) -> Result<(), String> {
        let index = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| format!("Node '{}' not found", id))?;

        self.edges.retain(|e| e.source != id && e.target != id);
        self.nodes.remove(index);
        Ok(())
    }

    /// Returns the number of nodes in the workflow.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the workflow has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// The mutable variable bag threaded through one execution.
///
/// Mutated only by the engine between steps; never shared across
/// executions.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    /// Accumulated node outputs, keyed by variable name
    pub variables: HashMap<String, Value>,

    /// Bound browsing-tab identifier, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_tab_id: Option<String>,

    /// Id of the execution this context belongs to
    pub execution_id: String,
}

impl ExecutionContext {
    /// Creates a fresh context for an execution.
    pub fn new(execution_id: impl Into<String>, current_tab_id: Option<String>) -> Self {
        Self {
            variables: HashMap::new(),
            current_tab_id,
            execution_id: execution_id.into(),
        }
    }

    /// Merges a patch of variables, later keys overwriting earlier ones.
    pub fn merge(&mut self, patch: HashMap<String, Value>) {
        self.variables.extend(patch);
    }

    /// Looks up a variable by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Sets a single variable.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }
}
