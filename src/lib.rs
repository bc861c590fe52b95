//! TabRunner - Visual Workflow Execution Engine
//!
//! A workflow engine for browser-tab automation: users compose directed
//! graphs of typed nodes (start, prompt, if/else, notify) in a visual
//! builder, and this crate executes them against a browsing tab, pausing
//! for human acknowledgment when a notify node requires it.
//!
//! # Architecture
//!
//! The library is organized into three main modules:
//!
//! - [`workflow`]: Data structures, graph rules, the condition language,
//!   and document persistence
//! - [`execution`]: Core execution engine, action executors, and the
//!   execution registry
//! - [`events`]: Typed push events and observer sinks
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tabrunner::events::LogSink;
//! use tabrunner::execution::{ActionError, ActionRunner, Engine, ExecutionRegistry};
//! use tabrunner::load_workflow_file;
//!
//! struct OfflineRunner;
//!
//! impl ActionRunner for OfflineRunner {
//!     fn run_prompt(&self, instruction: &str, _page: Option<&str>) -> Result<String, ActionError> {
//!         Ok(format!("echo: {}", instruction))
//!     }
//!     fn tab_text(&self, _tab_id: &str) -> Result<String, ActionError> {
//!         Ok(String::new())
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load a workflow definition
//!     let workflow = load_workflow_file("summarize.json")?;
//!
//!     // Create the engine over a fresh registry
//!     let registry = Arc::new(ExecutionRegistry::new());
//!     let mut engine = Engine::new(Arc::clone(&registry), Arc::new(OfflineRunner));
//!     engine.set_event_sink(Arc::new(LogSink));
//!
//!     // Execute the workflow
//!     let execution_id = engine.execute(workflow, None)?;
//!     println!("started execution {}", execution_id);
//!     Ok(())
//! }
//! ```

pub mod events;
pub mod execution;
pub mod workflow;

// Re-export commonly used types
pub use events::{EventSink, ExecutionEvent};
pub use execution::{Engine, ExecutionRegistry, ExecutionStatus};
pub use workflow::model::{Workflow, WorkflowEdge, WorkflowNode};
pub use workflow::store::load_workflow_file;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "TabRunner";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::model::NodeData;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "TabRunner");
    }

    #[test]
    fn test_module_exports_node() {
        let node = WorkflowNode::new("entry", NodeData::Start {});
        assert_eq!(node.id, "entry");
    }

    #[test]
    fn test_module_exports_workflow() {
        let workflow = Workflow::new("empty");
        assert!(workflow.is_empty());
    }

    #[test]
    fn test_version_format() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert!(parts.len() >= 2, "Version should have at least major.minor");
        for part in parts {
            assert!(part.parse::<u32>().is_ok(), "Version components should be numeric");
        }
    }
}
