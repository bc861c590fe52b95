//! Workflow Execution Module
//!
//! Provides the core execution engine for walking workflow graphs,
//! including action dispatch, suspend/resume across human
//! acknowledgment, and the process-wide execution registry.
//!
//! # Architecture
//!
//! - [`engine`]: Main execution engine orchestrating traversal
//! - [`actions`]: Per-node-kind action executors and the collaborator boundary
//! - [`registry`]: Table of live executions and their records

pub mod actions;
pub mod engine;
pub mod registry;

pub use actions::{ActionError, ActionRunner, ExecutorOutcome};
pub use engine::{Engine, ExecutionError, DEFAULT_MAX_STEPS};
pub use registry::{Execution, ExecutionRegistry, ExecutionStatus, StateError};
