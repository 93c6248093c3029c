use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::relationships::{RelationDescriptor, RelationSchema};

/// Relation selection for one owner type
pub struct BatchConfig {
    owner_type: String,
    /// Explicit allow-list; all declared relations when `None`
    relations: Option<Vec<String>>,
    schema: Arc<dyn RelationSchema>,
    selected: OnceCell<Vec<RelationDescriptor>>,
}

impl BatchConfig {
    pub fn new(
        schema: Arc<dyn RelationSchema>,
        owner_type: &str,
        relations: Option<Vec<String>>,
    ) -> Self {
        Self {
            owner_type: owner_type.to_string(),
            relations,
            schema,
            selected: OnceCell::new(),
        }
    }

    pub fn owner_type(&self) -> &str {
        &self.owner_type
    }

    pub fn relations(&self) -> Option<&[String]> {
        self.relations.as_deref()
    }

    /// Relations eligible for batch loading, in declaration order.
    ///
    /// A relation is eligible when it is polymorphic or its target type
    /// supports batching; other relations are left out without error. The
    /// result is computed once and never changes afterwards.
    pub fn selected_relations(&self) -> ModelResult<&[RelationDescriptor]> {
        self.selected
            .get_or_try_init(|| self.compute_selected())
            .map(Vec::as_slice)
    }

    /// Check the allow-list against the schema without memoizing anything
    pub fn validate(&self) -> ModelResult<()> {
        self.check_allow_list(&self.schema.declared_relations(&self.owner_type))
    }

    fn compute_selected(&self) -> ModelResult<Vec<RelationDescriptor>> {
        let declared = self.schema.declared_relations(&self.owner_type);
        self.check_allow_list(&declared)?;

        Ok(declared
            .into_iter()
            .filter(|r| self.is_allowed(&r.name))
            .filter(|r| {
                r.is_polymorphic()
                    || r.target_type
                        .as_deref()
                        .is_some_and(|target| self.schema.supports_batching(target))
            })
            .collect())
    }

    fn is_allowed(&self, name: &str) -> bool {
        self.relations
            .as_ref()
            .map_or(true, |allowed| allowed.iter().any(|a| a == name))
    }

    fn check_allow_list(&self, declared: &[RelationDescriptor]) -> ModelResult<()> {
        let Some(allowed) = &self.relations else {
            return Ok(());
        };

        let unknown: Vec<&str> = allowed
            .iter()
            .filter(|name| !declared.iter().any(|r| &r.name == *name))
            .map(String::as_str)
            .collect();

        if unknown.is_empty() {
            Ok(())
        } else {
            Err(ModelError::Configuration(format!(
                "Model '{}' does not declare relation(s): {}",
                self.owner_type,
                unknown.join(", ")
            )))
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("owner_type", &self.owner_type)
            .field("relations", &self.relations)
            .field("selected", &self.selected.get().map(|s| s.len()))
            .finish()
    }
}

/// Allow-lists for several owner types, loadable from JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Owner type -> relations eligible for batch loading
    #[serde(default)]
    pub relations: BTreeMap<String, Vec<String>>,
}

impl BatchSettings {
    pub fn from_json(json: &str) -> ModelResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_relations(mut self, owner_type: &str, relations: &[&str]) -> Self {
        self.relations.insert(
            owner_type.to_string(),
            relations.iter().map(|r| r.to_string()).collect(),
        );
        self
    }
}
