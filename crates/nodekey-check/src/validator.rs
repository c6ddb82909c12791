//! Validation orchestrator.
//!
//! Combines the taxonomy's parent requirements with each core type's field
//! rules. Extension types (anything not in [`CoreNodeType`]) bypass both
//! checks. A supplied parent reference must be a well-formed identifier of
//! the parent type.

use std::sync::Arc;

use nodekey_core::id::CanonicalId;
use nodekey_core::taxonomy::{ParentRelationship, Taxonomy};
use nodekey_core::value::Properties;

use crate::error::{ValidationError, Violation};
use crate::rules::CoreNodeType;

/// Decides whether a candidate node may be created.
#[derive(Debug, Clone)]
pub struct Validator {
    taxonomy: Arc<Taxonomy>,
}

impl Validator {
    pub fn new(taxonomy: Arc<Taxonomy>) -> Self {
        Validator { taxonomy }
    }

    /// A validator over the built-in taxonomy.
    pub fn standard() -> Self {
        Validator::new(Arc::new(Taxonomy::standard()))
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Validates a candidate node.
    ///
    /// `has_parent` says whether the caller supplies a reference to the
    /// node's parent. All violations are reported together.
    pub fn validate_node(
        &self,
        node_type: &str,
        properties: &Properties,
        has_parent: bool,
    ) -> Result<(), ValidationError> {
        let violations = self.check_node(node_type, properties, has_parent);
        if violations.is_empty() {
            return Ok(());
        }
        tracing::debug!(
            node_type,
            violations = violations.len(),
            "node rejected by structural validation"
        );
        Err(ValidationError {
            node_type: node_type.to_string(),
            violations,
        })
    }

    /// Like [`validate_node`](Self::validate_node), inferring `has_parent`
    /// from the node's reference field.
    pub fn validate_with_properties(
        &self,
        node_type: &str,
        properties: &Properties,
    ) -> Result<(), ValidationError> {
        let has_parent = self.parent_reference_present(node_type, properties);
        self.validate_node(node_type, properties, has_parent)
    }

    /// True if the node's parent reference field is present and non-blank.
    /// Always false for root and unknown types.
    pub fn parent_reference_present(&self, node_type: &str, properties: &Properties) -> bool {
        self.taxonomy
            .get_parent_relationship(node_type)
            .is_some_and(|rel| !properties.is_missing(&rel.ref_field))
    }

    /// Returns every violation of a candidate node, empty if it is valid.
    pub fn check_node(&self, node_type: &str, properties: &Properties, has_parent: bool) -> Vec<Violation> {
        let Some(core_type) = CoreNodeType::from_name(node_type) else {
            tracing::trace!(node_type, "extension type skips structural validation");
            return Vec::new();
        };

        let mut violations = Vec::new();
        if let Some(rel) = self.taxonomy.get_parent_relationship(node_type) {
            if let Some(violation) = check_parent_reference(node_type, &rel, properties) {
                violations.push(violation);
            } else if !has_parent {
                violations.push(Violation::ParentRequired {
                    node_type: node_type.to_string(),
                    parent_type: rel.parent_type,
                    ref_field: rel.ref_field,
                    relationship: rel.relationship,
                });
            }
        }
        violations.extend(core_type.check_fields(properties));
        violations
    }
}

/// Checks a present, non-blank parent reference: it must parse as an
/// identifier whose type is the relationship's parent type.
fn check_parent_reference(
    node_type: &str,
    rel: &ParentRelationship,
    properties: &Properties,
) -> Option<Violation> {
    if properties.is_missing(&rel.ref_field) {
        return None;
    }
    let value = properties.get(&rel.ref_field)?;
    let constraint = match value.as_str().map(|s| CanonicalId::parse(s.trim())) {
        Some(Ok(id)) if id.node_type() == rel.parent_type => return None,
        Some(Ok(id)) => format!(
            "must reference a {} identifier, got a {} identifier",
            rel.parent_type,
            id.node_type()
        ),
        Some(Err(err)) => format!("must be a {} identifier: {}", rel.parent_type, err),
        None => format!("must be a {} identifier, got {}", rel.parent_type, value.kind_name()),
    };
    Some(Violation::FieldConstraintViolation {
        node_type: node_type.to_string(),
        field: rel.ref_field.clone(),
        constraint,
    })
}

impl Default for Validator {
    fn default() -> Self {
        Validator::standard()
    }
}
