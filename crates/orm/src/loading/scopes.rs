//! Per-traversal scope overrides
//!
//! Overrides are namespaced by relation: the scope for `posts` restricts the
//! posts fetch, and the nested overrides for `posts` (`posts_scopes` in the
//! JSON form) apply one level down, to relations loaded from those posts.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{ModelError, ModelResult};
use crate::store::Scope;

/// Key suffix marking nested overrides in the JSON form
pub const NESTED_SUFFIX: &str = "_scopes";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoaderScopes {
    scopes: HashMap<String, Scope>,
    nested: HashMap<String, LoaderScopes>,
}

impl LoaderScopes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the fetch of `relation`
    pub fn scope(mut self, relation: &str, scope: Scope) -> Self {
        self.scopes.insert(relation.to_string(), scope);
        self
    }

    /// Overrides for relations loaded from the records of `relation`
    pub fn nested(mut self, relation: &str, scopes: LoaderScopes) -> Self {
        self.nested.insert(relation.to_string(), scopes);
        self
    }

    pub fn scope_for(&self, relation: &str) -> Option<&Scope> {
        self.scopes.get(relation)
    }

    /// The overrides handed to the loader built for `relation`
    pub fn nested_for(&self, relation: &str) -> LoaderScopes {
        self.nested.get(relation).cloned().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty() && self.nested.is_empty()
    }

    /// Parse overrides from a JSON object.
    ///
    /// Keys ending in `_scopes` hold nested overrides for the relation named by
    /// the rest of the key; every other key holds a [`Scope`].
    pub fn from_value(value: Value) -> ModelResult<Self> {
        let Value::Object(entries) = value else {
            return Err(ModelError::Serialization(
                "Loader scopes must be a JSON object".to_string(),
            ));
        };

        let mut scopes = Self::new();
        for (key, entry) in entries {
            match key.strip_suffix(NESTED_SUFFIX) {
                Some(relation) if !relation.is_empty() => {
                    scopes.nested.insert(relation.to_string(), Self::from_value(entry)?);
                }
                _ => {
                    scopes.scopes.insert(key, serde_json::from_value(entry)?);
                }
            }
        }
        Ok(scopes)
    }
}
