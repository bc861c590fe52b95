//! Graph Rules & Validation
//!
//! Structural rules for workflow graphs:
//! - Start-node resolution
//! - Edge/reference integrity checking
//! - Outgoing-edge lookup in document insertion order
//! - Branch-edge selection for ifelse nodes
//!
//! Validation runs once at execution start, not per step.

use log::{debug, info, warn};
use thiserror::Error;

use super::model::{NodeKind, Workflow, WorkflowEdge, WorkflowNode};

/// Document-integrity errors. Always fatal to an execution, never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("workflow must have exactly one start node (found {found})")]
    NoStartNode { found: usize },

    #[error("edge '{edge}' references missing node '{node}'")]
    DanglingReference { edge: String, node: String },

    #[error("node '{node}' has {count} outgoing edges but is not a branch node")]
    AmbiguousFanout { node: String, count: usize },

    #[error("branch node '{node}' has no outgoing edge tagged '{tag}'")]
    MissingBranch { node: String, tag: String },
}

/// Resolves the unique start node of a workflow.
pub fn resolve_start(workflow: &Workflow) -> Result<&WorkflowNode, GraphError> {
    let mut starts = workflow.nodes.iter().filter(|n| n.kind() == NodeKind::Start);

    match (starts.next(), starts.next()) {
        (Some(node), None) => Ok(node),
        (None, _) => Err(GraphError::NoStartNode { found: 0 }),
        (Some(_), Some(_)) => {
            let found = workflow
                .nodes
                .iter()
                .filter(|n| n.kind() == NodeKind::Start)
                .count();
            Err(GraphError::NoStartNode { found })
        }
    }
}

/// Looks up a node, reporting the referencing edge on failure.
pub fn node_by_id<'a>(
    workflow: &'a Workflow,
    node_id: &str,
    via_edge: &str,
) -> Result<&'a WorkflowNode, GraphError> {
    workflow
        .get_node(node_id)
        .ok_or_else(|| GraphError::DanglingReference {
            edge: via_edge.to_string(),
            node: node_id.to_string(),
        })
}

/// Returns the edges leaving a node, in document insertion order.
///
/// Insertion order is the deterministic tie-break when two branch edges
/// carry the same tag.
pub fn outgoing_edges<'a>(workflow: &'a Workflow, node_id: &str) -> Vec<&'a WorkflowEdge> {
    workflow
        .edges
        .iter()
        .filter(|e| e.source == node_id)
        .collect()
}

/// Selects the outgoing edge of an ifelse node for the taken branch.
///
/// The first edge (insertion order) whose tag matches wins; duplicates
/// were already flagged by [`validate`].
pub fn branch_edge<'a>(
    workflow: &'a Workflow,
    node_id: &str,
    taken: bool,
) -> Result<&'a WorkflowEdge, GraphError> {
    let tag = if taken { "true" } else { "false" };

    outgoing_edges(workflow, node_id)
        .into_iter()
        .find(|e| e.source_handle.as_deref() == Some(tag))
        .ok_or_else(|| GraphError::MissingBranch {
            node: node_id.to_string(),
            tag: tag.to_string(),
        })
}

/// Validates the workflow structure ahead of execution.
///
/// Checks:
/// 1. Exactly one start node exists
/// 2. Every edge references existing nodes
///
/// Duplicate branch tags on an ifelse node are legal but suspicious: the
/// lower-insertion-order edge wins at runtime, so they are logged as
/// document warnings rather than rejected.
pub fn validate(workflow: &Workflow) -> Result<(), GraphError> {
    info!(
        "Validating workflow '{}' ({} nodes, {} edges)",
        workflow.id,
        workflow.nodes.len(),
        workflow.edges.len()
    );

    resolve_start(workflow)?;

    for edge in &workflow.edges {
        node_by_id(workflow, &edge.source, &edge.id)?;
        node_by_id(workflow, &edge.target, &edge.id)?;
    }

    for node in &workflow.nodes {
        if node.kind() != NodeKind::Ifelse {
            continue;
        }
        for tag in ["true", "false"] {
            let tagged = outgoing_edges(workflow, &node.id)
                .into_iter()
                .filter(|e| e.source_handle.as_deref() == Some(tag))
                .count();
            if tagged > 1 {
                warn!(
                    "Branch node '{}' has {} edges tagged '{}'; the first in document order wins",
                    node.id, tagged, tag
                );
            }
        }
    }

    debug!("Workflow '{}' validated", workflow.id);
    Ok(())
}

/// Quick validation that returns a list of error messages.
///
/// Useful for editor validation feedback; unlike [`validate`] it keeps
/// going after the first problem.
pub fn quick_validate(workflow: &Workflow) -> Vec<String> {
    let mut errors = Vec::new();

    let starts = workflow
        .nodes
        .iter()
        .filter(|n| n.kind() == NodeKind::Start)
        .count();
    if starts != 1 {
        errors.push(format!(
            "Workflow must have exactly one start node (found {})",
            starts
        ));
    }

    for edge in &workflow.edges {
        if workflow.get_node(&edge.source).is_none() {
            errors.push(format!(
                "Edge '{}': unknown source node '{}'",
                edge.id, edge.source
            ));
        }
        if workflow.get_node(&edge.target).is_none() {
            errors.push(format!(
                "Edge '{}': unknown target node '{}'",
                edge.id, edge.target
            ));
        }
    }

    for node in &workflow.nodes {
        let outgoing = outgoing_edges(workflow, &node.id);

        match node.kind() {
            NodeKind::Ifelse => {
                if outgoing.len() > 2 {
                    errors.push(format!(
                        "Branch node '{}': has {} outgoing edges (at most 2 allowed)",
                        node.id,
                        outgoing.len()
                    ));
                }
                for edge in &outgoing {
                    match edge.source_handle.as_deref() {
                        Some("true") | Some("false") => {}
                        Some(other) => errors.push(format!(
                            "Edge '{}': invalid branch tag '{}' (expected 'true' or 'false')",
                            edge.id, other
                        )),
                        None => errors.push(format!(
                            "Edge '{}': edge leaving branch node '{}' has no branch tag",
                            edge.id, node.id
                        )),
                    }
                }
            }
            _ => {
                if outgoing.len() > 1 {
                    errors.push(format!(
                        "Node '{}': has {} outgoing edges but is not a branch node",
                        node.id,
                        outgoing.len()
                    ));
                }
            }
        }
    }

    errors
}
