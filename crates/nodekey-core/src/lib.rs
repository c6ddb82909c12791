pub mod value;
pub mod registry;
pub mod id;
pub mod taxonomy;
pub mod query;
pub mod error;

// Re-export commonly used types
pub use value::{PropertyValue, Properties};
pub use registry::{RegistryConfig, RegistryHandle, TypeRegistry};
pub use id::{CanonicalId, IdGenerator};
pub use taxonomy::{ParentRelationship, Taxonomy, TaxonomyError};
pub use query::{MissionScope, Query, RunContext, ScopeError, ScopeFilter};
pub use error::CoreError;
