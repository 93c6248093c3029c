//! In-memory store for tests and prototyping
//!
//! Rows are JSON objects keyed by table (model) name. Relations are declared
//! on the store, which registers them in its [`SchemaRegistry`] and keeps the
//! join keys needed to correlate targets back to owners. Every fetch is
//! logged so callers can assert how many queries a traversal issued.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::error::{ModelError, ModelResult};
use crate::record::{Associations, BatchSlot, Record, RecordRef};
use crate::relationships::{Cardinality, RelationDescriptor, RelationSchema, SchemaRegistry};
use crate::store::{BulkFetch, Scope, Store};

/// A row loaded from a [`MemoryStore`]
#[derive(Debug)]
pub struct MemoryRecord {
    type_name: String,
    attributes: Map<String, Value>,
    associations: Associations,
    slot: Option<BatchSlot>,
}

impl MemoryRecord {
    pub fn new(type_name: &str, attributes: Map<String, Value>, batching: bool) -> Self {
        Self {
            type_name: type_name.to_string(),
            attributes,
            associations: Associations::new(),
            slot: batching.then(BatchSlot::new),
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.attributes.get("id").and_then(Value::as_i64)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes.get(column)
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Loaded column names
    pub fn columns(&self) -> Vec<&str> {
        self.attributes.keys().map(String::as_str).collect()
    }
}

impl Record for MemoryRecord {
    fn runtime_type(&self) -> &str {
        &self.type_name
    }

    fn associations(&self) -> &Associations {
        &self.associations
    }

    fn batch_slot(&self) -> Option<&BatchSlot> {
        self.slot.as_ref()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// How a relation's targets are matched to owners
#[derive(Debug, Clone)]
enum Join {
    /// `target.foreign_key == owner.id`
    Children { target: String, foreign_key: String },
    /// `target.id == owner.foreign_key`
    Parent { target: String, foreign_key: String },
    /// `target.<as>_type == owner type && target.<as>_id == owner.id`
    MorphChildren { target: String, morph_name: String },
    /// Target type and id read from `owner.<name>_type` / `owner.<name>_id`
    MorphParent { morph_name: String },
    /// Targets of `source` on the `middle` records reached through `through`
    Through {
        through: String,
        middle: String,
        source: String,
    },
}

/// Targets per owner, in owner order, and the distinct targets
type Correlated = (Vec<Vec<RecordRef>>, Vec<RecordRef>);

/// A logged store call
#[derive(Debug, Clone, PartialEq)]
pub struct FetchLog {
    pub owner_type: String,
    /// `None` for root queries
    pub relation: Option<String>,
    pub owners: usize,
    pub scope: Option<Scope>,
}

/// [`Store`] and [`RelationSchema`] over in-memory tables
#[derive(Debug, Default)]
pub struct MemoryStore {
    schema: SchemaRegistry,
    tables: RwLock<HashMap<String, Vec<Map<String, Value>>>>,
    joins: RwLock<HashMap<(String, String), Join>>,
    log: RwLock<Vec<FetchLog>>,
    failing: RwLock<HashSet<(String, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    /// Declare a table, opting its records into batch loading or not
    pub fn model(&self, name: &str, batching: bool) -> &Self {
        self.schema.model(name, batching);
        self.tables.write().entry(name.to_string()).or_default();
        self
    }

    pub fn has_many(&self, owner: &str, name: &str, target: &str, foreign_key: &str) -> ModelResult<()> {
        self.declare(owner, RelationDescriptor::has_many(name, target), Join::Children {
            target: target.to_string(),
            foreign_key: foreign_key.to_string(),
        })
    }

    pub fn has_one(&self, owner: &str, name: &str, target: &str, foreign_key: &str) -> ModelResult<()> {
        self.declare(owner, RelationDescriptor::has_one(name, target), Join::Children {
            target: target.to_string(),
            foreign_key: foreign_key.to_string(),
        })
    }

    pub fn belongs_to(&self, owner: &str, name: &str, target: &str, foreign_key: &str) -> ModelResult<()> {
        self.declare(owner, RelationDescriptor::belongs_to(name, target), Join::Parent {
            target: target.to_string(),
            foreign_key: foreign_key.to_string(),
        })
    }

    /// One target pointing back through `<morph_name>_type` / `<morph_name>_id`
    pub fn morph_one(&self, owner: &str, name: &str, target: &str, morph_name: &str) -> ModelResult<()> {
        self.declare(owner, RelationDescriptor::morph_one(name, target), Join::MorphChildren {
            target: target.to_string(),
            morph_name: morph_name.to_string(),
        })
    }

    pub fn morph_many(&self, owner: &str, name: &str, target: &str, morph_name: &str) -> ModelResult<()> {
        self.declare(owner, RelationDescriptor::morph_many(name, target), Join::MorphChildren {
            target: target.to_string(),
            morph_name: morph_name.to_string(),
        })
    }

    /// Polymorphic parent stored in `<name>_type` / `<name>_id`
    pub fn morph_to(&self, owner: &str, name: &str) -> ModelResult<()> {
        self.declare(owner, RelationDescriptor::morph_to(name), Join::MorphParent {
            morph_name: name.to_string(),
        })
    }

    /// `source` of every record reached through `through`, resolved in one store call.
    ///
    /// Both relations must already be declared and have a fixed target type.
    pub fn has_many_through(
        &self,
        owner: &str,
        name: &str,
        through: &str,
        source: &str,
    ) -> ModelResult<()> {
        let middle = self.target_of(owner, through)?;
        let target = self.target_of(&middle, source)?;
        self.declare(owner, RelationDescriptor::has_many(name, target), Join::Through {
            through: through.to_string(),
            middle,
            source: source.to_string(),
        })
    }

    /// Insert a row, assigning the next id when the row has none
    pub fn insert(&self, table: &str, row: Value) -> ModelResult<i64> {
        let Value::Object(mut row) = row else {
            return Err(ModelError::Serialization(format!(
                "Rows inserted into '{}' must be JSON objects",
                table
            )));
        };

        let mut tables = self.tables.write();
        let rows = tables.entry(table.to_string()).or_default();
        let id = match row.get("id").and_then(Value::as_i64) {
            Some(id) => id,
            None => {
                let next = rows
                    .iter()
                    .filter_map(|r| r.get("id").and_then(Value::as_i64))
                    .max()
                    .unwrap_or(0)
                    + 1;
                row.insert("id".to_string(), Value::from(next));
                next
            }
        };
        rows.push(row);
        Ok(id)
    }

    /// Make every bulk fetch of `relation` on `owner_type` fail
    pub fn fail_relation(&self, owner_type: &str, relation: &str) {
        self.failing
            .write()
            .insert((owner_type.to_string(), relation.to_string()));
    }

    pub fn clear_failures(&self) {
        self.failing.write().clear();
    }

    /// Number of store calls so far
    pub fn fetch_count(&self) -> usize {
        self.log.read().len()
    }

    pub fn fetches(&self) -> Vec<FetchLog> {
        self.log.read().clone()
    }

    /// Number of bulk fetches of `relation`, any owner type
    pub fn fetches_of(&self, relation: &str) -> usize {
        self.log
            .read()
            .iter()
            .filter(|entry| entry.relation.as_deref() == Some(relation))
            .count()
    }

    pub fn clear_log(&self) {
        self.log.write().clear();
    }

    fn declare(&self, owner: &str, descriptor: RelationDescriptor, join: Join) -> ModelResult<()> {
        let name = descriptor.name.clone();
        self.schema.register(owner, descriptor)?;
        self.joins.write().insert((owner.to_string(), name), join);
        Ok(())
    }

    fn target_of(&self, owner: &str, relation: &str) -> ModelResult<String> {
        self.schema
            .get(owner, relation)
            .and_then(|descriptor| descriptor.target_type)
            .ok_or_else(|| {
                ModelError::Schema(format!(
                    "Model '{}' has no relation '{}' with a fixed target type",
                    owner, relation
                ))
            })
    }

    fn record(&self, type_name: &str, row: &Map<String, Value>, scope: Option<&Scope>) -> RecordRef {
        let attributes = match scope {
            Some(scope) => scope.project(row),
            None => row.clone(),
        };
        Arc::new(MemoryRecord::new(
            type_name,
            attributes,
            self.schema.supports_batching(type_name),
        ))
    }

    fn rows(&self, table: &str, scope: Option<&Scope>) -> Vec<Map<String, Value>> {
        self.tables
            .read()
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| scope.map_or(true, |s| s.matches(row)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Match `relation` of `owner_type` for every owner, without attaching anything
    fn correlate(
        &self,
        owner_type: &str,
        relation: &str,
        owners: &[&MemoryRecord],
        scope: Option<&Scope>,
    ) -> ModelResult<Correlated> {
        let undeclared = || {
            ModelError::Relationship(format!(
                "Model '{}' has no relation '{}'",
                owner_type, relation
            ))
        };
        let descriptor = self.schema.get(owner_type, relation).ok_or_else(undeclared)?;
        let join = self
            .joins
            .read()
            .get(&(owner_type.to_string(), relation.to_string()))
            .cloned()
            .ok_or_else(undeclared)?;
        let many = descriptor.cardinality() == Cardinality::Many;

        let correlated = match join {
            Join::Children { target, foreign_key } => {
                self.match_rows(owners, &target, scope, many, |owner, row| {
                    owner.id().is_some()
                        && row.get(&foreign_key).and_then(Value::as_i64) == owner.id()
                })
            }
            Join::Parent { target, foreign_key } => {
                self.match_rows(owners, &target, scope, false, |owner, row| {
                    let key = owner.get(&foreign_key).and_then(Value::as_i64);
                    key.is_some() && row.get("id").and_then(Value::as_i64) == key
                })
            }
            Join::MorphChildren { target, morph_name } => {
                let type_column = format!("{}_type", morph_name);
                let id_column = format!("{}_id", morph_name);
                self.match_rows(owners, &target, scope, many, |owner, row| {
                    owner.id().is_some()
                        && row.get(&type_column).and_then(Value::as_str)
                            == Some(owner.runtime_type())
                        && row.get(&id_column).and_then(Value::as_i64) == owner.id()
                })
            }
            Join::MorphParent { morph_name } => {
                self.match_morph_parents(owners, &morph_name, scope)
            }
            Join::Through { through, middle, source } => {
                let (per_owner, middles) = self.correlate(owner_type, &through, owners, None)?;
                let middle_records = middles
                    .iter()
                    .map(memory_record)
                    .collect::<ModelResult<Vec<_>>>()?;
                let (per_middle, targets) =
                    self.correlate(&middle, &source, &middle_records, scope)?;

                let per_owner: Vec<Vec<RecordRef>> = per_owner
                    .iter()
                    .map(|reached| {
                        let mut matched: Vec<RecordRef> = Vec::new();
                        for record in reached {
                            let Some(index) =
                                middles.iter().position(|m| Arc::ptr_eq(m, record))
                            else {
                                continue;
                            };
                            for target in &per_middle[index] {
                                if !matched.iter().any(|t| Arc::ptr_eq(t, target)) {
                                    matched.push(Arc::clone(target));
                                }
                            }
                        }
                        matched
                    })
                    .collect();
                (per_owner, targets)
            }
        };

        Ok(correlated)
    }

    fn match_rows(
        &self,
        owners: &[&MemoryRecord],
        target: &str,
        scope: Option<&Scope>,
        many: bool,
        belongs: impl Fn(&MemoryRecord, &Map<String, Value>) -> bool,
    ) -> Correlated {
        let rows = self.rows(target, scope);
        let mut loaded: Vec<(Map<String, Value>, RecordRef)> = Vec::new();
        let mut per_owner = Vec::with_capacity(owners.len());

        for &owner in owners {
            let mut matched = Vec::new();
            for row in rows.iter().filter(|row| belongs(owner, *row)) {
                let record = match loaded.iter().find(|(r, _)| r == row) {
                    Some((_, record)) => Arc::clone(record),
                    None => {
                        let record = self.record(target, row, scope);
                        loaded.push((row.clone(), Arc::clone(&record)));
                        record
                    }
                };
                matched.push(record);
                if !many {
                    break;
                }
            }
            per_owner.push(matched);
        }

        (per_owner, loaded.into_iter().map(|(_, record)| record).collect())
    }

    fn match_morph_parents(
        &self,
        owners: &[&MemoryRecord],
        morph_name: &str,
        scope: Option<&Scope>,
    ) -> Correlated {
        let type_column = format!("{}_type", morph_name);
        let id_column = format!("{}_id", morph_name);
        let mut loaded: Vec<((String, i64), RecordRef)> = Vec::new();
        let mut per_owner = Vec::with_capacity(owners.len());

        for &owner in owners {
            let key = owner
                .get(&type_column)
                .and_then(Value::as_str)
                .zip(owner.get(&id_column).and_then(Value::as_i64));

            let Some((target_type, target_id)) = key else {
                per_owner.push(Vec::new());
                continue;
            };

            let existing = loaded
                .iter()
                .find(|((t, id), _)| t == target_type && *id == target_id)
                .map(|(_, record)| Arc::clone(record));

            let record = existing.or_else(|| {
                let row = self
                    .rows(target_type, scope)
                    .into_iter()
                    .find(|row| row.get("id").and_then(Value::as_i64) == Some(target_id))?;
                let record = self.record(target_type, &row, scope);
                loaded.push(((target_type.to_string(), target_id), Arc::clone(&record)));
                Some(record)
            });

            per_owner.push(record.into_iter().collect());
        }

        (per_owner, loaded.into_iter().map(|(_, record)| record).collect())
    }
}

fn memory_record(record: &RecordRef) -> ModelResult<&MemoryRecord> {
    record.downcast_ref::<MemoryRecord>().ok_or_else(|| {
        ModelError::Query(format!(
            "MemoryStore can't correlate a '{}' record it did not load",
            record.runtime_type()
        ))
    })
}

#[async_trait]
impl Store for MemoryStore {
    async fn fetch(&self, owner_type: &str, scope: Option<&Scope>) -> ModelResult<Vec<RecordRef>> {
        self.log.write().push(FetchLog {
            owner_type: owner_type.to_string(),
            relation: None,
            owners: 0,
            scope: scope.cloned(),
        });

        if !self.tables.read().contains_key(owner_type) {
            return Err(ModelError::NotFound(owner_type.to_string()));
        }

        Ok(self
            .rows(owner_type, scope)
            .iter()
            .map(|row| self.record(owner_type, row, scope))
            .collect())
    }

    async fn bulk_fetch(&self, request: &BulkFetch) -> ModelResult<Vec<RecordRef>> {
        self.log.write().push(FetchLog {
            owner_type: request.owner_type.clone(),
            relation: Some(request.relation.clone()),
            owners: request.owners.len(),
            scope: request.scope.clone(),
        });

        let key = (request.owner_type.clone(), request.relation.clone());
        if self.failing.read().contains(&key) {
            return Err(ModelError::Database(format!(
                "Bulk fetch of '{}' on '{}' failed",
                request.relation, request.owner_type
            )));
        }

        let owners = request
            .owners
            .iter()
            .map(memory_record)
            .collect::<ModelResult<Vec<_>>>()?;

        let (per_owner, targets) = self.correlate(
            &request.owner_type,
            &request.relation,
            &owners,
            request.scope.as_ref(),
        )?;
        for (owner, matched) in owners.iter().zip(per_owner) {
            owner.associations().set(&request.relation, matched);
        }

        Ok(targets)
    }
}

impl RelationSchema for MemoryStore {
    fn declared_relations(&self, owner_type: &str) -> Vec<RelationDescriptor> {
        self.schema.declared_relations(owner_type)
    }

    fn supports_batching(&self, type_name: &str) -> bool {
        self.schema.supports_batching(type_name)
    }
}
