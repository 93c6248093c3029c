//! Traversal session: ties a proxy registry to a store

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use super::batch_loader::{BatchLoader, BatchSource, ProxyRegistry};
use super::scopes::LoaderScopes;
use crate::error::ModelResult;
use crate::record::{BatchSlot, RecordRef};
use crate::store::{BulkFetch, Scope, Store};

/// Entry point for batch-loaded traversals.
///
/// Cheap to clone; every loader of a traversal holds a copy.
#[derive(Clone)]
pub struct Batcher {
    registry: ProxyRegistry,
    store: Arc<dyn Store>,
}

impl Batcher {
    pub fn new(registry: ProxyRegistry, store: Arc<dyn Store>) -> Self {
        Self { registry, store }
    }

    /// Session over the process-wide proxy registry
    pub fn global(store: Arc<dyn Store>) -> ModelResult<Self> {
        Ok(Self::new(ProxyRegistry::global()?.clone(), store))
    }

    pub fn registry(&self) -> &ProxyRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Batch loader over every `owner_type` record matching `scope`.
    ///
    /// Nothing is fetched until the loader's records are first needed.
    /// Records only hold a weak link to their loader: keep the returned
    /// loader alive for the whole traversal, or relation access on its
    /// records falls back to one fetch per record.
    pub fn load_all(
        &self,
        owner_type: &str,
        scope: Option<Scope>,
        scopes: LoaderScopes,
    ) -> ModelResult<Arc<BatchLoader>> {
        let proxy = self.registry.proxy(owner_type)?;
        let store = Arc::clone(&self.store);
        let owner_type = owner_type.to_string();

        let source = BatchSource::deferred(move || {
            let store = Arc::clone(&store);
            let owner_type = owner_type.clone();
            let scope = scope.clone();
            async move { store.fetch(&owner_type, scope.as_ref()).await }
        });

        Ok(proxy.loader_for(self, source, scopes))
    }

    /// Batch loader over records that are already loaded.
    ///
    /// As with [`load_all`](Self::load_all), the returned loader must outlive
    /// the traversal.
    pub fn loader_for(
        &self,
        owner_type: &str,
        records: Vec<RecordRef>,
        scopes: LoaderScopes,
    ) -> ModelResult<Arc<BatchLoader>> {
        let proxy = self.registry.proxy(owner_type)?;
        Ok(proxy.loader_for(self, BatchSource::records(records), scopes))
    }

    /// Read a relation of `record`.
    ///
    /// Goes through the record's current batch loader when it has one, then
    /// returns the value the store attached. Without a loader, or for relations
    /// that are not batched, the relation is fetched for this record alone.
    pub async fn relation(&self, record: &RecordRef, relation: &str) -> ModelResult<Vec<RecordRef>> {
        match record.batch_loader() {
            Some(loader) => {
                if let Some(relation_loader) = loader.loader_for(relation).await? {
                    relation_loader.load().await?;
                }
            }
            None if record.batch_slot().is_some_and(BatchSlot::is_bound) => {
                debug!(
                    owner_type = record.runtime_type(),
                    relation,
                    "Batch loader dropped, loading per record"
                );
            }
            None => {}
        }

        if let Some(loaded) = record.associations().get(relation) {
            return Ok(loaded);
        }

        trace!(
            owner_type = record.runtime_type(),
            relation,
            "Loading relation for a single record"
        );
        let request = BulkFetch {
            owner_type: record.runtime_type().to_string(),
            relation: relation.to_string(),
            owners: vec![Arc::clone(record)],
            scope: None,
        };
        self.store.bulk_fetch(&request).await
    }

    /// Read a to-one relation of `record`
    pub async fn relation_one(&self, record: &RecordRef, relation: &str) -> ModelResult<Option<RecordRef>> {
        Ok(self.relation(record, relation).await?.into_iter().next())
    }
}

impl fmt::Debug for Batcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batcher")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
