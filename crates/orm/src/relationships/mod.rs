//! Relationships Module - Relation declarations and the schema registry

pub mod metadata;
pub mod registry;

// Re-export metadata system types
pub use metadata::*;
pub use registry::*;
