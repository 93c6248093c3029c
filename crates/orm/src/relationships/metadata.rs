//! Relationship Metadata - Relation declarations consumed by the batch loader

use serde::{Deserialize, Serialize};
use crate::error::{ModelError, ModelResult};

/// Defines the type of relationship between models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipType {
    /// One-to-one relationship (hasOne)
    HasOne,
    /// One-to-many relationship (hasMany)
    HasMany,
    /// Many-to-one relationship (belongsTo)
    BelongsTo,
    /// One-to-one relationship where the related model points back through a morph pair
    MorphOne,
    /// One-to-many relationship where the related models point back through a morph pair
    MorphMany,
    /// Inverse polymorphic relationship, the related type is stored on the owner row
    MorphTo,
}

impl RelationshipType {
    /// Returns true if the related type is only known once data is read
    pub fn is_polymorphic(self) -> bool {
        matches!(self, Self::MorphTo)
    }

    /// Returns true if this relationship returns a collection
    pub fn is_collection(self) -> bool {
        matches!(self, Self::HasMany | Self::MorphMany)
    }

    /// Cardinality of the relationship
    pub fn cardinality(self) -> Cardinality {
        if self.is_collection() {
            Cardinality::Many
        } else {
            Cardinality::One
        }
    }
}

/// How many related records a single owner can have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    One,
    Many,
}

/// A relation declared by an owner type.
///
/// Descriptors are immutable once registered; the batch loader only reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    /// Name of the relationship (accessor name on the owner)
    pub name: String,

    /// The type of relationship
    pub relationship_type: RelationshipType,

    /// The related model's type name, `None` for polymorphic relations
    pub target_type: Option<String>,
}

impl RelationDescriptor {
    /// Create a new descriptor
    pub fn new(
        name: impl Into<String>,
        relationship_type: RelationshipType,
        target_type: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            relationship_type,
            target_type,
        }
    }

    pub fn has_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationshipType::HasOne, Some(target.into()))
    }

    pub fn has_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationshipType::HasMany, Some(target.into()))
    }

    pub fn belongs_to(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationshipType::BelongsTo, Some(target.into()))
    }

    pub fn morph_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationshipType::MorphOne, Some(target.into()))
    }

    pub fn morph_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationshipType::MorphMany, Some(target.into()))
    }

    pub fn morph_to(name: impl Into<String>) -> Self {
        Self::new(name, RelationshipType::MorphTo, None)
    }

    /// Whether the target type is resolved per record at load time
    pub fn is_polymorphic(&self) -> bool {
        self.relationship_type.is_polymorphic()
    }

    pub fn cardinality(&self) -> Cardinality {
        self.relationship_type.cardinality()
    }

    /// Validate the descriptor for consistency
    pub fn validate(&self) -> ModelResult<()> {
        if self.name.is_empty() {
            return Err(ModelError::Schema(
                "Relationship name must not be empty".to_string(),
            ));
        }

        match (self.is_polymorphic(), &self.target_type) {
            (true, Some(target)) => Err(ModelError::Schema(format!(
                "Polymorphic relationship '{}' must not declare a target type (got '{}')",
                self.name, target
            ))),
            (false, None) => Err(ModelError::Schema(format!(
                "Relationship '{}' of type {:?} requires a target type",
                self.name, self.relationship_type
            ))),
            (false, Some(target)) if target.is_empty() => Err(ModelError::Schema(format!(
                "Relationship '{}' has an empty target type",
                self.name
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_type_properties() {
        assert!(RelationshipType::MorphTo.is_polymorphic());
        assert!(!RelationshipType::MorphOne.is_polymorphic());
        assert!(RelationshipType::HasMany.is_collection());
        assert!(RelationshipType::MorphMany.is_collection());
        assert_eq!(RelationshipType::BelongsTo.cardinality(), Cardinality::One);
        assert_eq!(RelationshipType::HasMany.cardinality(), Cardinality::Many);
    }

    #[test]
    fn test_descriptor_validation() {
        assert!(RelationDescriptor::has_many("posts", "Post").validate().is_ok());
        assert!(RelationDescriptor::morph_to("record").validate().is_ok());

        let bad = RelationDescriptor::new("record", RelationshipType::MorphTo, Some("Post".into()));
        assert!(matches!(bad.validate(), Err(ModelError::Schema(_))));

        let bad = RelationDescriptor::new("user", RelationshipType::BelongsTo, None);
        assert!(matches!(bad.validate(), Err(ModelError::Schema(_))));

        let bad = RelationDescriptor::has_many("", "Post");
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_descriptor_serialization() {
        let desc = RelationDescriptor::belongs_to("user", "User");
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(json["relationship_type"], "BelongsTo");
        let back: RelationDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(back, desc);
    }
}
