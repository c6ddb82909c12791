//! Core error types for nodekey-core.
//!
//! Uses `thiserror` for structured, matchable error variants. Every variant
//! embeds the offending node type or property name so callers can
//! pattern-match on the rendered message as well as on the variant.

use thiserror::Error;

use crate::value::CanonicalValueError;

/// Errors produced by the type registry and the ID generator.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The node type has no entry in the type registry.
    #[error("node type not registered: '{node_type}'")]
    TypeNotRegistered { node_type: String },

    /// One or more identifying properties are absent, null, or blank.
    #[error(
        "missing identifying properties for '{node_type}': {}",
        .missing.join(", ")
    )]
    MissingIdentifyingProperties {
        node_type: String,
        missing: Vec<String>,
    },

    /// An identifying property value has no canonical text form.
    #[error("cannot canonicalize property '{property}': {source}")]
    Canonicalization {
        property: String,
        #[source]
        source: CanonicalValueError,
    },

    /// A node type name was empty at registration.
    #[error("node type name must not be empty")]
    EmptyNodeType,

    /// Attempting to register a node type that already exists.
    #[error("duplicate node type: '{node_type}'")]
    DuplicateNodeType { node_type: String },

    /// A node type was registered without any identifying properties.
    #[error("node type '{node_type}' must declare at least one identifying property")]
    NoIdentifyingProperties { node_type: String },

    /// The same identifying property (or an empty name) was listed twice.
    #[error("invalid identifying property '{property}' for '{node_type}'")]
    InvalidIdentifyingProperty { node_type: String, property: String },

    /// A string did not have the `{type}:{token}` identifier shape.
    #[error("invalid canonical id '{value}': {reason}")]
    InvalidCanonicalId { value: String, reason: String },
}
