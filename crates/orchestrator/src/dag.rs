//! DAG validation: run this before persisting a workflow.
//!
//! Rules enforced, fail-fast in this order:
//! 1. Node IDs must be unique within the workflow.
//! 2. Every edge must reference valid node IDs (`from`, then `to`).
//! 3. Every node's type must be registered and its config must satisfy the
//!    type's schema.
//! 4. The directed graph must be acyclic.
//!
//! Returns a topologically-sorted list of node IDs on success.  Both the
//! order and the reported cycle are deterministic for a given input: nodes
//! are visited in declared order and each node's successors in declared edge
//! order.

use std::collections::HashMap;

use nodes::NodeTypeRegistry;

use crate::{
    ValidationError,
    models::{WorkflowEdge, WorkflowNode},
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    /// On the current DFS path.
    Active,
    Done,
}

/// Validate the graph and return its nodes in topological execution order.
///
/// # Errors
/// - [`ValidationError::DuplicateNodeId`] if two nodes share an ID.
/// - [`ValidationError::UnknownNodeReference`] if an edge references a missing node.
/// - [`ValidationError::UnknownNodeType`] / [`ValidationError::InvalidConfig`]
///   if a node does not match the registry.
/// - [`ValidationError::CycleDetected`] with the first cycle found.
pub fn validate_graph(
    registry: &NodeTypeRegistry,
    nodes: &[WorkflowNode],
    edges: &[WorkflowEdge],
) -> Result<Vec<String>, ValidationError> {
    // -----------------------------------------------------------------------
    // 1. Ensure node IDs are unique
    // -----------------------------------------------------------------------
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
    for (position, node) in nodes.iter().enumerate() {
        if index.insert(node.id.as_str(), position).is_some() {
            return Err(ValidationError::DuplicateNodeId(node.id.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Validate edge endpoints
    // -----------------------------------------------------------------------
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for edge in edges {
        let from = *index.get(edge.from.as_str()).ok_or_else(|| {
            ValidationError::UnknownNodeReference {
                node_id: edge.from.clone(),
                side: "from",
            }
        })?;
        let to = *index.get(edge.to.as_str()).ok_or_else(|| {
            ValidationError::UnknownNodeReference {
                node_id: edge.to.clone(),
                side: "to",
            }
        })?;
        adjacency[from].push(to);
    }

    // -----------------------------------------------------------------------
    // 3. Node types and config
    // -----------------------------------------------------------------------
    for node in nodes {
        let descriptor = registry.resolve(&node.node_type).map_err(|_| {
            ValidationError::UnknownNodeType {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
            }
        })?;
        descriptor
            .check_config(&node.config)
            .map_err(|source| ValidationError::InvalidConfig {
                node_id: node.id.clone(),
                source,
            })?;
    }

    // -----------------------------------------------------------------------
    // 4. Iterative DFS: cycle detection + reverse postorder
    // -----------------------------------------------------------------------
    let mut marks = vec![Mark::New; nodes.len()];
    let mut postorder: Vec<usize> = Vec::with_capacity(nodes.len());
    // (node, index of the next successor to visit)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..nodes.len() {
        if marks[root] != Mark::New {
            continue;
        }
        marks[root] = Mark::Active;
        stack.push((root, 0));

        while let Some(frame) = stack.last_mut() {
            let (node, next) = *frame;
            let Some(&child) = adjacency[node].get(next) else {
                marks[node] = Mark::Done;
                postorder.push(node);
                stack.pop();
                continue;
            };
            frame.1 += 1;

            match marks[child] {
                Mark::New => {
                    marks[child] = Mark::Active;
                    stack.push((child, 0));
                }
                Mark::Active => {
                    let start = stack
                        .iter()
                        .rposition(|&(n, _)| n == child)
                        .unwrap_or(0);
                    let cycle = stack[start..]
                        .iter()
                        .map(|&(n, _)| nodes[n].id.clone())
                        .collect();
                    return Err(ValidationError::CycleDetected { cycle });
                }
                Mark::Done => {}
            }
        }
    }

    Ok(postorder
        .into_iter()
        .rev()
        .map(|n| nodes[n].id.clone())
        .collect())
}
