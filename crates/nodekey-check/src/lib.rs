//! Structural validation for knowledge-graph nodes.
//!
//! Decides whether a candidate node may be admitted: a child type must carry
//! a parent reference, and each core type's own field rules must hold.
//! Validation never generates identifiers; callers do that separately once
//! a node passes.

pub mod error;
pub mod rules;
pub mod validator;

pub use error::{ValidationError, Violation};
pub use rules::CoreNodeType;
pub use validator::Validator;
