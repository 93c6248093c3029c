//! Store collaborator - the query executor behind every batch fetch

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ModelResult;
use crate::record::RecordRef;

/// Field projection and equality filters pushed down to a store call.
///
/// The batch loader never interprets a scope; it only decides which fetch it
/// applies to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scope {
    /// Columns to load, all columns when `None`
    pub select: Option<Vec<String>>,
    /// Column equality filters, all must match
    pub filters: Vec<(String, Value)>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the loaded columns
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.select = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Add an equality filter
    pub fn where_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push((column.to_string(), value.into()));
        self
    }

    /// Whether a row with these attributes passes the filters
    pub fn matches(&self, row: &serde_json::Map<String, Value>) -> bool {
        self.filters
            .iter()
            .all(|(column, expected)| row.get(column) == Some(expected))
    }

    /// Apply the projection to a row
    pub fn project(&self, row: &serde_json::Map<String, Value>) -> serde_json::Map<String, Value> {
        match &self.select {
            Some(columns) => columns
                .iter()
                .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
                .collect(),
            None => row.clone(),
        }
    }
}

/// One bulk fetch: resolve `relation` for every owner at once
#[derive(Clone)]
pub struct BulkFetch {
    pub owner_type: String,
    pub relation: String,
    pub owners: Vec<RecordRef>,
    pub scope: Option<Scope>,
}

impl fmt::Debug for BulkFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkFetch")
            .field("owner_type", &self.owner_type)
            .field("relation", &self.relation)
            .field("owners", &self.owners.len())
            .field("scope", &self.scope)
            .finish()
    }
}

/// Query executor consumed by the batch loader.
///
/// Errors are propagated to whoever triggered the fetch as-is; the batch loader
/// neither wraps nor retries them.
#[async_trait]
pub trait Store: Send + Sync {
    /// Root query: every record of `owner_type` matching `scope`
    async fn fetch(&self, owner_type: &str, scope: Option<&Scope>) -> ModelResult<Vec<RecordRef>>;

    /// Resolve a relation for all owners in one call.
    ///
    /// Implementations must attach the matching targets to every owner through
    /// [`Associations::set`](crate::record::Associations::set), with an empty list
    /// for owners that have none, and return the distinct targets.
    async fn bulk_fetch(&self, request: &BulkFetch) -> ModelResult<Vec<RecordRef>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_scope_filters() {
        let scope = Scope::new().where_eq("state", "active");
        assert!(scope.matches(&row(json!({"id": 1, "state": "active"}))));
        assert!(!scope.matches(&row(json!({"id": 2, "state": "inactive"}))));
        assert!(!scope.matches(&row(json!({"id": 3}))));
        assert!(Scope::new().matches(&row(json!({"id": 4}))));
    }

    #[test]
    fn test_scope_projection() {
        let scope = Scope::new().select(&["id", "user_id"]);
        let projected = scope.project(&row(json!({"id": 1, "user_id": 7, "name": "x"})));
        assert_eq!(Value::Object(projected), json!({"id": 1, "user_id": 7}));

        let all = Scope::new().project(&row(json!({"id": 1, "name": "x"})));
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_scope_deserialization() {
        let scope: Scope = serde_json::from_value(json!({
            "select": ["id", "state"],
            "filters": [["state", "active"]]
        }))
        .unwrap();
        assert_eq!(scope, Scope::new().select(&["id", "state"]).where_eq("state", "active"));

        let empty: Scope = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty, Scope::default());
    }
}
