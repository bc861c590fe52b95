//! Workflow Definition Module
//!
//! Provides data structures and utilities for defining, validating, and
//! persisting workflow documents.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (nodes, edges, execution context)
//! - [`graph`]: Structural rules, start resolution, validation
//! - [`condition`]: The ifelse condition expression language
//! - [`store`]: JSON document persistence

pub mod condition;
pub mod graph;
pub mod model;
pub mod store;

pub use condition::{evaluate, EvalError};
pub use graph::{quick_validate, validate, GraphError};
pub use model::{
    ExecutionContext, NodeData, NodeKind, Position, Workflow, WorkflowEdge, WorkflowNode,
};
pub use store::{load_workflow_file, StoreError, WorkflowStore};
