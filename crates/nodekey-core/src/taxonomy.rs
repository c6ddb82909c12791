//! The fixed node-type hierarchy.
//!
//! Root types stand on their own. Every other (child) type must reference
//! exactly one parent node of a fixed type through a foreign-key property,
//! described by a [`ParentRelationship`].
//!
//! A [`Taxonomy`] is checked once when it is built: parents must exist,
//! relationship labels must be unique, and every parent chain must reach a
//! root within [`MAX_TAXONOMY_DEPTH`] hops. Lookups afterwards are plain
//! table reads.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on the number of parent hops from any child type to its root.
pub const MAX_TAXONOMY_DEPTH: usize = 8;

/// The parent-side field a child's reference points at.
pub const PARENT_ID_FIELD: &str = "id";

const STANDARD_ROOTS: &[&str] = &[
    "mission",
    "domain",
    "host",
    "technology",
    "finding",
    "technique",
    "cloud_asset",
    "api",
];

/// `(child, parent, ref_field, relationship)`
const STANDARD_RELATIONSHIPS: &[(&str, &str, &str, &str)] = &[
    ("mission_run", "mission", "mission_id", "HAS_RUN"),
    ("subdomain", "domain", "domain_id", "HAS_SUBDOMAIN"),
    ("port", "host", "host_id", "HAS_PORT"),
    ("service", "port", "port_id", "RUNS_SERVICE"),
    ("endpoint", "service", "service_id", "HAS_ENDPOINT"),
    ("certificate", "host", "host_id", "SERVES_CERTIFICATE"),
    ("evidence", "finding", "finding_id", "HAS_EVIDENCE"),
    ("mitigation", "finding", "finding_id", "HAS_MITIGATION"),
];

/// The required parent of a child node type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRelationship {
    pub child_type: String,
    pub parent_type: String,
    /// Property on the child holding the parent's id, e.g. `host_id`.
    pub ref_field: String,
    /// Always [`PARENT_ID_FIELD`].
    pub parent_field: String,
    /// Edge label, unique across the taxonomy, e.g. `HAS_PORT`.
    pub relationship: String,
    /// Always true; the model has no optional parents.
    pub required: bool,
}

impl ParentRelationship {
    pub fn new(
        child_type: impl Into<String>,
        parent_type: impl Into<String>,
        ref_field: impl Into<String>,
        relationship: impl Into<String>,
    ) -> Self {
        ParentRelationship {
            child_type: child_type.into(),
            parent_type: parent_type.into(),
            ref_field: ref_field.into(),
            parent_field: PARENT_ID_FIELD.to_string(),
            relationship: relationship.into(),
            required: true,
        }
    }
}

/// Static-configuration errors found while building a [`Taxonomy`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaxonomyError {
    #[error("node type name must not be empty")]
    EmptyNodeType,

    #[error("child type '{child_type}' declared more than once")]
    DuplicateChildType { child_type: String },

    #[error("root type '{node_type}' must not declare a parent")]
    RootHasParent { node_type: String },

    #[error("child type '{child_type}' has an empty reference field")]
    EmptyRefField { child_type: String },

    #[error("child type '{child_type}' has an empty relationship label")]
    EmptyRelationship { child_type: String },

    #[error("child type '{child_type}' must reference parent field 'id', not '{parent_field}'")]
    InvalidParentField {
        child_type: String,
        parent_field: String,
    },

    #[error("child type '{child_type}' declares an optional parent")]
    OptionalParent { child_type: String },

    #[error(
        "relationship '{relationship}' is used by both '{first_child}' and '{second_child}'"
    )]
    DuplicateRelationship {
        relationship: String,
        first_child: String,
        second_child: String,
    },

    #[error("child type '{child_type}' references unknown parent type '{parent_type}'")]
    UnknownParentType {
        child_type: String,
        parent_type: String,
    },

    #[error("parent chain of '{node_type}' forms a cycle")]
    Cycle { node_type: String },

    #[error("parent chain of '{node_type}' exceeds {max} hops")]
    DepthExceeded { node_type: String, max: usize },
}

/// Root types plus the child → parent relationship table.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    roots: BTreeSet<String>,
    parents: IndexMap<String, ParentRelationship>,
    /// Edges point from child to parent.
    graph: DiGraph<String, ()>,
    indices: HashMap<String, NodeIndex>,
}

impl Taxonomy {
    /// Builds and checks a taxonomy.
    pub fn new<I, S>(roots: I, relationships: Vec<ParentRelationship>) -> Result<Self, TaxonomyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roots: BTreeSet<String> = roots.into_iter().map(Into::into).collect();
        if roots.iter().any(|r| r.trim().is_empty()) {
            return Err(TaxonomyError::EmptyNodeType);
        }

        let mut parents: IndexMap<String, ParentRelationship> = IndexMap::new();
        let mut labels: HashMap<String, String> = HashMap::new();

        for rel in relationships {
            check_relationship_fields(&rel)?;
            if roots.contains(&rel.child_type) {
                return Err(TaxonomyError::RootHasParent {
                    node_type: rel.child_type,
                });
            }
            if parents.contains_key(&rel.child_type) {
                return Err(TaxonomyError::DuplicateChildType {
                    child_type: rel.child_type,
                });
            }
            if let Some(first) = labels.get(&rel.relationship) {
                return Err(TaxonomyError::DuplicateRelationship {
                    relationship: rel.relationship.clone(),
                    first_child: first.clone(),
                    second_child: rel.child_type,
                });
            }
            labels.insert(rel.relationship.clone(), rel.child_type.clone());
            parents.insert(rel.child_type.clone(), rel);
        }

        for rel in parents.values() {
            if !roots.contains(&rel.parent_type) && !parents.contains_key(&rel.parent_type) {
                return Err(TaxonomyError::UnknownParentType {
                    child_type: rel.child_type.clone(),
                    parent_type: rel.parent_type.clone(),
                });
            }
        }

        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();
        for name in roots.iter().chain(parents.keys()) {
            indices.insert(name.clone(), graph.add_node(name.clone()));
        }
        for rel in parents.values() {
            graph.add_edge(indices[&rel.child_type], indices[&rel.parent_type], ());
        }
        if let Err(cycle) = petgraph::algo::toposort(&graph, None) {
            return Err(TaxonomyError::Cycle {
                node_type: graph[cycle.node_id()].clone(),
            });
        }

        let taxonomy = Taxonomy {
            roots,
            parents,
            graph,
            indices,
        };
        for child in taxonomy.parents.keys() {
            if taxonomy.depth(child) > MAX_TAXONOMY_DEPTH {
                return Err(TaxonomyError::DepthExceeded {
                    node_type: child.clone(),
                    max: MAX_TAXONOMY_DEPTH,
                });
            }
        }
        Ok(taxonomy)
    }

    /// The built-in knowledge-graph hierarchy.
    ///
    /// # Panics
    ///
    /// Panics if the compiled-in table is malformed; that is a programming
    /// error, covered by the unit tests.
    pub fn standard() -> Self {
        Self::try_standard().expect("built-in taxonomy table must be well-formed")
    }

    /// Fallible form of [`standard`](Self::standard).
    pub fn try_standard() -> Result<Self, TaxonomyError> {
        let relationships = STANDARD_RELATIONSHIPS
            .iter()
            .map(|(child, parent, ref_field, label)| {
                ParentRelationship::new(*child, *parent, *ref_field, *label)
            })
            .collect();
        Taxonomy::new(STANDARD_ROOTS.iter().copied(), relationships)
    }

    pub fn is_root_node_type(&self, node_type: &str) -> bool {
        self.roots.contains(node_type)
    }

    /// Returns a copy of the parent relationship of a child type.
    ///
    /// `None` for root types and for unknown types alike; use
    /// [`is_root_node_type`](Self::is_root_node_type) or
    /// [`is_known`](Self::is_known) to tell them apart.
    pub fn get_parent_relationship(&self, node_type: &str) -> Option<ParentRelationship> {
        self.parents.get(node_type).cloned()
    }

    /// True if the type is a root or a child in this taxonomy.
    pub fn is_known(&self, node_type: &str) -> bool {
        self.indices.contains_key(node_type)
    }

    pub fn requires_parent(&self, node_type: &str) -> bool {
        self.parents.get(node_type).is_some_and(|rel| rel.required)
    }

    /// Root types, sorted.
    pub fn root_types(&self) -> Vec<String> {
        self.roots.iter().cloned().collect()
    }

    /// Child types, sorted.
    pub fn child_types(&self) -> Vec<String> {
        let mut children: Vec<String> = self.parents.keys().cloned().collect();
        children.sort();
        children
    }

    /// All parent relationships, sorted by child type.
    pub fn relationships(&self) -> Vec<ParentRelationship> {
        let mut rels: Vec<ParentRelationship> = self.parents.values().cloned().collect();
        rels.sort_by(|a, b| a.child_type.cmp(&b.child_type));
        rels
    }

    /// Finds the relationship carrying a given edge label.
    pub fn relationship_by_label(&self, label: &str) -> Option<ParentRelationship> {
        self.parents
            .values()
            .find(|rel| rel.relationship == label)
            .cloned()
    }

    /// Direct child types of `parent_type`, sorted.
    pub fn children_of(&self, parent_type: &str) -> Vec<String> {
        let Some(&idx) = self.indices.get(parent_type) else {
            return Vec::new();
        };
        let mut children: Vec<String> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .map(|child| self.graph[child].clone())
            .collect();
        children.sort();
        children
    }

    /// Ancestors of `node_type`, nearest first, ending at its root.
    ///
    /// Empty for root and unknown types.
    pub fn parent_chain(&self, node_type: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = node_type;
        while let Some(rel) = self.parents.get(current) {
            if chain.len() > MAX_TAXONOMY_DEPTH {
                break;
            }
            chain.push(rel.parent_type.clone());
            current = &rel.parent_type;
        }
        chain
    }

    /// Number of parent hops from `node_type` to its root (0 for roots).
    pub fn depth(&self, node_type: &str) -> usize {
        self.parent_chain(node_type).len()
    }
}

fn check_relationship_fields(rel: &ParentRelationship) -> Result<(), TaxonomyError> {
    if rel.child_type.trim().is_empty() || rel.parent_type.trim().is_empty() {
        return Err(TaxonomyError::EmptyNodeType);
    }
    if rel.ref_field.trim().is_empty() {
        return Err(TaxonomyError::EmptyRefField {
            child_type: rel.child_type.clone(),
        });
    }
    if rel.relationship.trim().is_empty() {
        return Err(TaxonomyError::EmptyRelationship {
            child_type: rel.child_type.clone(),
        });
    }
    if rel.parent_field != PARENT_ID_FIELD {
        return Err(TaxonomyError::InvalidParentField {
            child_type: rel.child_type.clone(),
            parent_field: rel.parent_field.clone(),
        });
    }
    if !rel.required {
        return Err(TaxonomyError::OptionalParent {
            child_type: rel.child_type.clone(),
        });
    }
    Ok(())
}
