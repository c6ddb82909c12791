//! Deterministic content-addressed node identifiers.
//!
//! An identifier is derived only from a node's type and its identifying
//! properties:
//!
//! 1. Look up the type's identifying properties in the [`TypeRegistry`].
//! 2. Require every one of them to be present.
//! 3. Sort the names lexicographically.
//! 4. Build `"{type}:{name1}={val1}|{name2}={val2}|..."` from canonical values.
//! 5. SHA-256 the UTF-8 bytes of that string.
//! 6. Encode the first 12 digest bytes as unpadded URL-safe base64.
//! 7. Return `"{type}:{token}"`.
//!
//! The same inputs give the same identifier across processes and across
//! conforming implementations. Distinct inputs collide only with the
//! probability of a 96-bit hash collision; no collision detection is
//! performed.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CoreError;
use crate::registry::TypeRegistry;
use crate::value::Properties;

/// Number of SHA-256 digest bytes kept in an identifier (96 bits).
pub const DIGEST_PREFIX_LEN: usize = 12;

/// Length of the encoded token: 12 bytes of unpadded base64.
pub const TOKEN_LEN: usize = 16;

/// A content-addressed node identifier of the form `"{type}:{token}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalId(String);

impl CanonicalId {
    /// Hashes an already-built canonical string into an identifier.
    pub fn from_canonical(node_type: &str, canonical: &str) -> Self {
        let digest = Sha256::digest(canonical.as_bytes());
        let token = URL_SAFE_NO_PAD.encode(&digest[..DIGEST_PREFIX_LEN]);
        CanonicalId(format!("{}:{}", node_type, token))
    }

    /// Parses and shape-checks an identifier string.
    ///
    /// Only the format is checked; whether the token matches any particular
    /// properties cannot be known from the string alone.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        let invalid = |reason: &str| CoreError::InvalidCanonicalId {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let (node_type, token) = value
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing ':' separator"))?;
        if node_type.is_empty() {
            return Err(invalid("empty node type"));
        }
        if token.len() != TOKEN_LEN {
            return Err(invalid("token must be 16 characters"));
        }
        if !token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(invalid("token must be unpadded base64url"));
        }
        Ok(CanonicalId(value.to_string()))
    }

    /// The node type prefix.
    pub fn node_type(&self) -> &str {
        self.split().0
    }

    /// The 16-character hash token.
    pub fn token(&self) -> &str {
        self.split().1
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split(&self) -> (&str, &str) {
        // The token is fixed-length and never contains ':'.
        let at = self.0.len() - TOKEN_LEN - 1;
        (&self.0[..at], &self.0[at + 1..])
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CanonicalId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CanonicalId::parse(&value)
    }
}

impl From<CanonicalId> for String {
    fn from(id: CanonicalId) -> Self {
        id.0
    }
}

impl AsRef<str> for CanonicalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Generates identifiers against a shared [`TypeRegistry`].
///
/// Cheap to clone; every clone reads the same registry.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    registry: Arc<TypeRegistry>,
}

impl IdGenerator {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        IdGenerator { registry }
    }

    /// A generator over the built-in registry.
    pub fn standard() -> Self {
        IdGenerator::new(Arc::new(TypeRegistry::standard()))
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Builds the canonical string hashed into the identifier.
    ///
    /// Properties that are not identifying for `node_type` are ignored.
    pub fn canonical_string(&self, node_type: &str, properties: &Properties) -> Result<String, CoreError> {
        self.registry.validate_properties(node_type, properties)?;

        let mut names: Vec<&String> = self.registry.get_identifying_properties(node_type)?.iter().collect();
        names.sort();

        let mut parts = Vec::with_capacity(names.len());
        for name in names {
            let text = match properties.get(name) {
                Some(value) => value
                    .canonical_text()
                    .map_err(|source| CoreError::Canonicalization {
                        property: name.clone(),
                        source,
                    })?,
                None => "null".to_string(),
            };
            parts.push(format!("{}={}", name, text));
        }

        Ok(format!("{}:{}", node_type, parts.join("|")))
    }

    /// Generates the identifier for a candidate node.
    ///
    /// Fails with [`CoreError::TypeNotRegistered`] for unknown types and with
    /// [`CoreError::MissingIdentifyingProperties`] when any identifying
    /// property is absent, null, or blank.
    pub fn generate(&self, node_type: &str, properties: &Properties) -> Result<CanonicalId, CoreError> {
        let canonical = self.canonical_string(node_type, properties)?;
        Ok(CanonicalId::from_canonical(node_type, &canonical))
    }

    /// Generates identifiers for a batch; each entry succeeds or fails on its own.
    pub fn generate_many<'a, I>(&self, nodes: I) -> Vec<Result<CanonicalId, CoreError>>
    where
        I: IntoIterator<Item = (&'a str, &'a Properties)>,
    {
        nodes
            .into_iter()
            .map(|(node_type, properties)| self.generate(node_type, properties))
            .collect()
    }
}
