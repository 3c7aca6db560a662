//! # Release Conditions
//!
//! A release condition is a predecessor/AND/OR tree deciding when a message
//! type may be handed to its handler. Evaluation is a pure function of the
//! set of qualified names already PROCESSED in the same sequence instance.
//!
//! ```text
//! And ─┬─ Predecessor(OrderPlaced)
//!      └─ Or ─┬─ Predecessor(Payment.CARD)
//!             └─ Predecessor(Payment.WIRE)
//! ```

use super::value_objects::QualifiedName;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Closed set of release condition nodes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseCondition {
    /// Satisfied once the named type has been processed.
    Predecessor(QualifiedName),
    /// Satisfied when every child is satisfied.
    And(Vec<ReleaseCondition>),
    /// Satisfied when at least one child is satisfied.
    Or(Vec<ReleaseCondition>),
}

impl ReleaseCondition {
    pub fn predecessor(name: impl Into<String>) -> Self {
        ReleaseCondition::Predecessor(QualifiedName::new(name))
    }

    pub fn all(children: Vec<ReleaseCondition>) -> Self {
        ReleaseCondition::And(children)
    }

    pub fn any(children: Vec<ReleaseCondition>) -> Self {
        ReleaseCondition::Or(children)
    }

    /// Evaluate against the processed-type set.
    pub fn is_satisfied(&self, processed: &HashSet<QualifiedName>) -> bool {
        match self {
            ReleaseCondition::Predecessor(name) => processed.contains(name),
            ReleaseCondition::And(children) => children.iter().all(|c| c.is_satisfied(processed)),
            ReleaseCondition::Or(children) => children.iter().any(|c| c.is_satisfied(processed)),
        }
    }

    /// Every predecessor referenced anywhere in the tree, in tree order.
    pub fn predecessors(&self) -> Vec<&QualifiedName> {
        let mut out = Vec::new();
        self.collect_predecessors(&mut out);
        out
    }

    fn collect_predecessors<'a>(&'a self, out: &mut Vec<&'a QualifiedName>) {
        match self {
            ReleaseCondition::Predecessor(name) => out.push(name),
            ReleaseCondition::And(children) | ReleaseCondition::Or(children) => {
                for child in children {
                    child.collect_predecessors(out);
                }
            }
        }
    }
}

/// Optional condition evaluation: an absent condition is always satisfied.
pub fn condition_satisfied(
    condition: Option<&ReleaseCondition>,
    processed: &HashSet<QualifiedName>,
) -> bool {
    condition.map_or(true, |c| c.is_satisfied(processed))
}
