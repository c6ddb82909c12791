//! TypeRegistry: node types and their identifying properties.
//!
//! Every node type that can receive a content-addressed identifier is
//! registered with an ordered list of *identifying properties*, its natural
//! key. The table is configuration: changing the identifying properties of an
//! existing type changes every identifier generated for it afterwards.
//!
//! A registry is built once and then shared read-only behind an `Arc`.
//! [`RegistryHandle`] is the one place a registry can be swapped after
//! publication, for tests that substitute their own table.

use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::CoreError;
use crate::value::Properties;

/// Ordered identifying-property names of one node type.
pub type IdentifyingProperties = SmallVec<[String; 4]>;

/// Built-in identifying properties, in declaration order.
const STANDARD_TYPES: &[(&str, &[&str])] = &[
    ("mission", &["name"]),
    ("mission_run", &["mission_id", "run_number"]),
    ("domain", &["name"]),
    ("subdomain", &["name"]),
    ("host", &["ip"]),
    ("port", &["host_id", "number", "protocol"]),
    ("service", &["port_id", "name"]),
    ("endpoint", &["service_id", "url", "method"]),
    ("technology", &["name", "version"]),
    ("certificate", &["fingerprint"]),
    ("finding", &["mission_id", "title"]),
    ("evidence", &["finding_id", "type", "content_hash"]),
    ("mitigation", &["finding_id", "title"]),
    ("technique", &["technique_id"]),
    ("cloud_asset", &["provider", "resource_id"]),
    ("api", &["base_url"]),
];

/// Serializable registry table, e.g. loaded from a JSON file.
///
/// ```json
/// { "types": { "host": ["ip"], "port": ["host_id", "number", "protocol"] } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub types: IndexMap<String, Vec<String>>,
}

/// Registry of node types keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeRegistry {
    types: IndexMap<String, IdentifyingProperties>,
}

impl TypeRegistry {
    /// Creates a registry with no types. Use [`register`](Self::register) to fill it.
    pub fn empty() -> Self {
        TypeRegistry {
            types: IndexMap::new(),
        }
    }

    /// Creates the registry with the built-in knowledge-graph node types.
    pub fn standard() -> Self {
        let types = STANDARD_TYPES
            .iter()
            .map(|(node_type, props)| {
                (
                    node_type.to_string(),
                    props.iter().map(|p| p.to_string()).collect(),
                )
            })
            .collect();
        TypeRegistry { types }
    }

    /// Builds a registry from a configuration table, applying the same checks
    /// as [`register`](Self::register) to every entry.
    pub fn from_config(config: &RegistryConfig) -> Result<Self, CoreError> {
        let mut registry = TypeRegistry::empty();
        for (node_type, props) in &config.types {
            registry.register(node_type, props.as_slice())?;
        }
        Ok(registry)
    }

    /// Returns this registry as a configuration table.
    pub fn to_config(&self) -> RegistryConfig {
        RegistryConfig {
            types: self
                .types
                .iter()
                .map(|(t, props)| (t.clone(), props.to_vec()))
                .collect(),
        }
    }

    /// Registers a node type with its identifying properties.
    ///
    /// Fails if the name is empty or already registered, if no properties
    /// are given, or if a property name is empty or repeated.
    pub fn register<S: AsRef<str>>(&mut self, node_type: &str, props: &[S]) -> Result<(), CoreError> {
        if node_type.trim().is_empty() {
            return Err(CoreError::EmptyNodeType);
        }
        if self.types.contains_key(node_type) {
            return Err(CoreError::DuplicateNodeType {
                node_type: node_type.to_string(),
            });
        }
        if props.is_empty() {
            return Err(CoreError::NoIdentifyingProperties {
                node_type: node_type.to_string(),
            });
        }

        let mut names = IdentifyingProperties::new();
        for prop in props {
            let prop = prop.as_ref();
            if prop.is_empty() || names.iter().any(|n| n == prop) {
                return Err(CoreError::InvalidIdentifyingProperty {
                    node_type: node_type.to_string(),
                    property: prop.to_string(),
                });
            }
            names.push(prop.to_string());
        }
        self.types.insert(node_type.to_string(), names);
        Ok(())
    }

    /// Returns the identifying properties of a node type in registration order.
    pub fn get_identifying_properties(&self, node_type: &str) -> Result<&[String], CoreError> {
        self.types
            .get(node_type)
            .map(|props| props.as_slice())
            .ok_or_else(|| CoreError::TypeNotRegistered {
                node_type: node_type.to_string(),
            })
    }

    pub fn is_registered(&self, node_type: &str) -> bool {
        self.types.contains_key(node_type)
    }

    /// Lists the identifying properties that are absent, null, or blank in
    /// `properties`, in registration order.
    pub fn missing_properties(
        &self,
        node_type: &str,
        properties: &Properties,
    ) -> Result<Vec<String>, CoreError> {
        let required = self.get_identifying_properties(node_type)?;
        Ok(required
            .iter()
            .filter(|name| properties.is_missing(name))
            .cloned()
            .collect())
    }

    /// Checks that every identifying property is present.
    ///
    /// Returns [`CoreError::MissingIdentifyingProperties`] with the full list
    /// of missing names if any are absent.
    pub fn validate_properties(&self, node_type: &str, properties: &Properties) -> Result<(), CoreError> {
        let missing = self.missing_properties(node_type, properties)?;
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CoreError::MissingIdentifyingProperties {
                node_type: node_type.to_string(),
                missing,
            })
        }
    }

    /// All registered type names, sorted lexicographically.
    pub fn all_node_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Publication point for a shared registry.
///
/// Readers take a [`snapshot`](Self::snapshot) and keep using it for the
/// whole operation, so a concurrent [`replace`](Self::replace) never exposes
/// a half-updated table. Replacement is meant for test setup.
#[derive(Debug)]
pub struct RegistryHandle {
    current: RwLock<Arc<TypeRegistry>>,
}

impl RegistryHandle {
    pub fn new(registry: TypeRegistry) -> Self {
        RegistryHandle {
            current: RwLock::new(Arc::new(registry)),
        }
    }

    /// Returns the currently published registry.
    pub fn snapshot(&self) -> Arc<TypeRegistry> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Publishes a new registry and returns the previous one.
    pub fn replace(&self, registry: TypeRegistry) -> Arc<TypeRegistry> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(registry))
    }
}

impl Default for RegistryHandle {
    fn default() -> Self {
        RegistryHandle::new(TypeRegistry::standard())
    }
}
