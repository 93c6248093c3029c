//! Relationship Registry - Runtime relation declarations and batching capability

use std::sync::Arc;
use dashmap::{DashMap, DashSet};

use crate::error::{ModelError, ModelResult};
use super::metadata::RelationDescriptor;

/// Source of relation declarations for the batch loader.
///
/// Implemented by whatever reflects the application's models; the batch loader
/// only asks which relations an owner type declares and whether a type opts
/// into batch loading.
pub trait RelationSchema: Send + Sync {
    /// Relations declared by `owner_type`, in declaration order
    fn declared_relations(&self, owner_type: &str) -> Vec<RelationDescriptor>;

    /// Whether records of `type_name` carry a batch loader back-reference
    fn supports_batching(&self, type_name: &str) -> bool;
}

/// Thread-safe relationship registry for storing and accessing relation declarations
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    /// Map of model name -> relations in declaration order
    relationships: Arc<DashMap<String, Vec<RelationDescriptor>>>,

    /// Models that opted into batch loading
    batching: Arc<DashSet<String>>,
}

impl SchemaRegistry {
    /// Create a new empty relationship registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a model, opting it into batch loading or not
    pub fn model(&self, model_name: &str, batching: bool) -> &Self {
        self.relationships.entry(model_name.to_string()).or_default();
        if batching {
            self.batching.insert(model_name.to_string());
        } else {
            self.batching.remove(model_name);
        }
        self
    }

    /// Register a relationship for a model
    pub fn register(&self, model_name: &str, descriptor: RelationDescriptor) -> ModelResult<()> {
        descriptor.validate()?;

        let mut model_relationships = self.relationships
            .entry(model_name.to_string())
            .or_default();

        if model_relationships.iter().any(|r| r.name == descriptor.name) {
            return Err(ModelError::Schema(format!(
                "Relationship '{}' is already declared on model '{}'",
                descriptor.name, model_name
            )));
        }

        model_relationships.push(descriptor);
        Ok(())
    }

    /// Get relationship metadata by model and relationship name
    pub fn get(&self, model_name: &str, relationship_name: &str) -> Option<RelationDescriptor> {
        self.relationships
            .get(model_name)?
            .iter()
            .find(|r| r.name == relationship_name)
            .cloned()
    }
}

impl RelationSchema for SchemaRegistry {
    fn declared_relations(&self, owner_type: &str) -> Vec<RelationDescriptor> {
        self.relationships
            .get(owner_type)
            .map(|relationships| relationships.clone())
            .unwrap_or_default()
    }

    fn supports_batching(&self, type_name: &str) -> bool {
        self.batching.contains(type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationships::RelationshipType;

    fn blog_schema() -> SchemaRegistry {
        let schema = SchemaRegistry::new();
        schema.model("User", true).model("Post", true).model("AuditLog", true);
        schema.register("Post", RelationDescriptor::has_many("comments", "Comment")).unwrap();
        schema.register("Post", RelationDescriptor::belongs_to("user", "User")).unwrap();
        schema.register("AuditLog", RelationDescriptor::morph_to("record")).unwrap();
        schema
    }

    #[test]
    fn test_declaration_order_is_preserved() {
        let schema = blog_schema();
        let declared = schema.declared_relations("Post");
        assert_eq!(declared[0].name, "comments");
        assert_eq!(declared[1].name, "user");
    }

    #[test]
    fn test_duplicate_relationship_is_rejected() {
        let schema = blog_schema();
        let err = schema
            .register("Post", RelationDescriptor::has_many("comments", "Comment"))
            .unwrap_err();
        assert!(matches!(err, ModelError::Schema(_)));
    }

    #[test]
    fn test_invalid_descriptor_is_rejected() {
        let schema = SchemaRegistry::new();
        let bad = RelationDescriptor::new("user", RelationshipType::BelongsTo, None);
        assert!(schema.register("Post", bad).is_err());
        assert!(schema.get("Post", "user").is_none());
    }

    #[test]
    fn test_batching_capability() {
        let schema = blog_schema();
        assert!(schema.supports_batching("Post"));
        assert!(!schema.supports_batching("Comment"));

        schema.model("Post", false);
        assert!(!schema.supports_batching("Post"));
    }

    #[test]
    fn test_unknown_model_has_no_relations() {
        let schema = blog_schema();
        assert!(schema.declared_relations("Tag").is_empty());
        assert!(schema.get("Tag", "posts").is_none());
    }
}
