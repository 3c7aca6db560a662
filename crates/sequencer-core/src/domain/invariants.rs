//! Domain invariants checked when sequence definitions are loaded.
//!
//! Greedy fixed-point release only terminates with the maximal releasable
//! set if every predecessor is configured in the same definition and the
//! predecessor graph is acyclic; both are enforced here.

use super::errors::ConfigurationError;
use super::release::ReleaseCondition;
use super::value_objects::QualifiedName;
use std::collections::{HashMap, HashSet};

/// Group nodes need at least two children and no repeated direct predecessor.
pub fn check_condition_shape(
    owner: &QualifiedName,
    condition: &ReleaseCondition,
) -> Result<(), ConfigurationError> {
    let children = match condition {
        ReleaseCondition::Predecessor(_) => return Ok(()),
        ReleaseCondition::And(children) | ReleaseCondition::Or(children) => children,
    };

    if children.len() < 2 {
        return Err(ConfigurationError::MalformedCondition {
            qualified_name: owner.clone(),
            reason: format!("AND/OR group needs at least 2 children, got {}", children.len()),
        });
    }

    let mut seen = HashSet::new();
    for child in children {
        if let ReleaseCondition::Predecessor(name) = child {
            if !seen.insert(name) {
                return Err(ConfigurationError::DuplicatePredecessor {
                    qualified_name: owner.clone(),
                    predecessor: name.clone(),
                });
            }
        }
        check_condition_shape(owner, child)?;
    }

    Ok(())
}

/// Every predecessor must be a type of the same definition.
pub fn check_predecessors_known(
    owner: &QualifiedName,
    condition: &ReleaseCondition,
    known: &HashSet<QualifiedName>,
) -> Result<(), ConfigurationError> {
    for predecessor in condition.predecessors() {
        if !known.contains(predecessor) {
            return Err(ConfigurationError::UnknownPredecessor {
                qualified_name: owner.clone(),
                predecessor: predecessor.clone(),
            });
        }
    }
    Ok(())
}

/// Reject any type that (transitively) depends on itself.
///
/// `dependencies` maps each type to the predecessors referenced by its
/// release condition.
pub fn check_acyclic(
    dependencies: &HashMap<QualifiedName, Vec<QualifiedName>>,
) -> Result<(), ConfigurationError> {
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();

    // Sorted so the reported type is deterministic.
    let mut nodes: Vec<&QualifiedName> = dependencies.keys().collect();
    nodes.sort();

    for node in nodes {
        if let Some(culprit) = find_cycle(dependencies, node, &mut visited, &mut rec_stack) {
            return Err(ConfigurationError::CyclicDependency(culprit));
        }
    }
    Ok(())
}

fn find_cycle(
    dependencies: &HashMap<QualifiedName, Vec<QualifiedName>>,
    node: &QualifiedName,
    visited: &mut HashSet<QualifiedName>,
    rec_stack: &mut HashSet<QualifiedName>,
) -> Option<QualifiedName> {
    if rec_stack.contains(node) {
        return Some(node.clone());
    }
    if visited.contains(node) {
        return None;
    }

    visited.insert(node.clone());
    rec_stack.insert(node.clone());

    if let Some(predecessors) = dependencies.get(node) {
        for predecessor in predecessors {
            if let Some(culprit) = find_cycle(dependencies, predecessor, visited, rec_stack) {
                return Some(culprit);
            }
        }
    }

    rec_stack.remove(node);
    None
}
