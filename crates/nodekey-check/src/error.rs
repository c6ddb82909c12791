//! Validation diagnostics.
//!
//! [`Violation`] describes one broken rule with the node type and field it
//! concerns. [`ValidationError`] carries every violation found for a node, so
//! a caller fixes all of them in one pass.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single rule a candidate node breaks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// A child type was submitted without a reference to its parent.
    #[error("{node_type} requires a parent {parent_type} (via {ref_field}, {relationship})")]
    ParentRequired {
        /// The child type.
        node_type: String,
        /// The type the parent must have.
        parent_type: String,
        /// Property expected to hold the parent id.
        ref_field: String,
        /// Edge label of the relationship.
        relationship: String,
    },

    /// A field breaks a type-specific business rule.
    #[error("{node_type}.{field} {constraint}")]
    FieldConstraintViolation {
        node_type: String,
        /// Field name; alternatives are joined with `|`.
        field: String,
        /// What the rule requires, e.g. `must be between 1 and 65535, got 0`.
        constraint: String,
    },
}

impl Violation {
    pub fn is_parent_required(&self) -> bool {
        matches!(self, Violation::ParentRequired { .. })
    }

    /// The field a constraint violation concerns.
    pub fn field(&self) -> Option<&str> {
        match self {
            Violation::FieldConstraintViolation { field, .. } => Some(field),
            Violation::ParentRequired { .. } => None,
        }
    }
}

/// A node rejected by validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("invalid {node_type}: {}", join_violations(.violations))]
pub struct ValidationError {
    pub node_type: String,
    pub violations: Vec<Violation>,
}

impl ValidationError {
    pub fn requires_parent(&self) -> bool {
        self.violations.iter().any(Violation::is_parent_required)
    }

    /// Field constraint violations only.
    pub fn field_violations(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| !v.is_parent_required())
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
