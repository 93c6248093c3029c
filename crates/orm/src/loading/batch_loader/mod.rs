//! Lazy, memoizing relation batch loading
//!
//! A [`BatchLoader`] wraps a set of owner records, either already loaded or
//! behind a deferred store fetch. The first time any owner asks for a
//! relation, all owners are realized with one fetch and the relation is
//! loaded for all of them with one bulk fetch. The resulting loader is
//! stamped on every target record, so the next level of the traversal
//! batches the same way.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use crate::error::ModelResult;
use crate::loading::{Batcher, LoaderScopes};
use crate::record::RecordRef;

pub mod builder;
pub mod config;
pub mod polymorphic;
pub mod proxy;

pub use builder::Builder;
pub use config::{BatchConfig, BatchSettings};
pub use polymorphic::PolymorphicBatchLoader;
pub use proxy::{Proxy, ProxyRegistry};

/// Future produced by a deferred fetch
pub type FetchFuture = Pin<Box<dyn Future<Output = ModelResult<Vec<RecordRef>>> + Send>>;

/// Re-runnable fetch of a record set
pub type DeferredFetch = Arc<dyn Fn() -> FetchFuture + Send + Sync>;

/// Loader returned for a relation
pub type Loader = Arc<dyn RelationLoader>;

/// Where a loader's records come from
#[derive(Clone)]
pub enum BatchSource {
    /// Not fetched yet
    Deferred(DeferredFetch),
    /// Already materialized
    Records(Vec<RecordRef>),
}

impl BatchSource {
    pub fn deferred<F, Fut>(fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ModelResult<Vec<RecordRef>>> + Send + 'static,
    {
        Self::Deferred(Arc::new(move || -> FetchFuture { Box::pin(fetch()) }))
    }

    pub fn records(records: Vec<RecordRef>) -> Self {
        Self::Records(records)
    }

    async fn realize(&self) -> ModelResult<Vec<RecordRef>> {
        match self {
            Self::Deferred(fetch) => fetch().await,
            Self::Records(records) => Ok(records.clone()),
        }
    }
}

impl fmt::Debug for BatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deferred(_) => f.write_str("Deferred"),
            Self::Records(records) => write!(f, "Records({})", records.len()),
        }
    }
}

/// Common shape of batch loaders
#[async_trait]
pub trait RelationLoader: Send + Sync + fmt::Debug {
    /// Realize the records, once
    async fn records(&self) -> ModelResult<&[RecordRef]>;

    /// Loader of `relation` for these records, `None` when it isn't batched
    async fn loader_for(&self, relation: &str) -> ModelResult<Option<Loader>>;

    fn is_realized(&self) -> bool;

    fn is_polymorphic(&self) -> bool {
        false
    }

    async fn load(&self) -> ModelResult<&[RecordRef]> {
        self.records().await
    }

    async fn to_vec(&self) -> ModelResult<Vec<RecordRef>> {
        Ok(self.records().await?.to_vec())
    }
}

/// Batch loader over the records of one owner type
pub struct BatchLoader {
    this: Weak<BatchLoader>,
    proxy: Arc<Proxy>,
    session: Batcher,
    scopes: LoaderScopes,
    source: BatchSource,
    records: OnceCell<Vec<RecordRef>>,
    loaders: DashMap<String, Arc<OnceCell<Option<Loader>>>>,
}

impl BatchLoader {
    pub(crate) fn new(
        proxy: Arc<Proxy>,
        session: Batcher,
        source: BatchSource,
        scopes: LoaderScopes,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            proxy,
            session,
            scopes,
            source,
            records: OnceCell::new(),
            loaders: DashMap::new(),
        })
    }

    pub fn owner_type(&self) -> &str {
        self.proxy.owner_type()
    }

    pub fn proxy(&self) -> &Arc<Proxy> {
        &self.proxy
    }

    pub fn scopes(&self) -> &LoaderScopes {
        &self.scopes
    }

    pub fn is_realized(&self) -> bool {
        self.records.initialized()
    }

    /// Realize the owner records.
    ///
    /// The fetch runs at most once; every record is stamped with a
    /// back-reference to this loader. A failed fetch leaves the loader
    /// unrealized.
    pub async fn records(&self) -> ModelResult<&[RecordRef]> {
        let records = self.records.get_or_try_init(|| self.realize()).await?;
        Ok(records.as_slice())
    }

    pub async fn load(&self) -> ModelResult<&[RecordRef]> {
        self.records().await
    }

    pub async fn to_vec(&self) -> ModelResult<Vec<RecordRef>> {
        Ok(self.records().await?.to_vec())
    }

    /// Loader of `relation` across all owner records, built once.
    ///
    /// Returns `None` for relations that are not selected for batch loading;
    /// accessing those falls back to per-record loading.
    pub async fn loader_for(&self, relation: &str) -> ModelResult<Option<Loader>> {
        let cell = self.loaders.entry(relation.to_string()).or_default().clone();
        if cell.initialized() {
            trace!(owner_type = self.owner_type(), relation, "Reusing relation loader");
        }
        let loader = cell.get_or_try_init(|| self.build_loader(relation)).await?;
        Ok(loader.clone())
    }

    /// Relations that have a memoized loader (or a memoized `None`)
    pub fn loaded_relations(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .loaders
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    async fn realize(&self) -> ModelResult<Vec<RecordRef>> {
        let records = self.source.realize().await?;
        let this = self.this.upgrade();
        for record in &records {
            record.set_batch_loader(this.as_ref());
        }
        debug!(
            owner_type = self.owner_type(),
            records = records.len(),
            "Batch loader realized"
        );
        Ok(records)
    }

    async fn build_loader(&self, relation: &str) -> ModelResult<Option<Loader>> {
        let Some(builder) = self.proxy.builder_for(relation)? else {
            trace!(
                owner_type = self.owner_type(),
                relation,
                "Relation not batched, falling back to per-record loading"
            );
            return Ok(None);
        };

        let owners = self.records().await?;
        builder.build(&self.session, owners, &self.scopes).map(Some)
    }
}

#[async_trait]
impl RelationLoader for BatchLoader {
    async fn records(&self) -> ModelResult<&[RecordRef]> {
        BatchLoader::records(self).await
    }

    async fn loader_for(&self, relation: &str) -> ModelResult<Option<Loader>> {
        BatchLoader::loader_for(self, relation).await
    }

    fn is_realized(&self) -> bool {
        BatchLoader::is_realized(self)
    }
}

impl fmt::Debug for BatchLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchLoader")
            .field("owner_type", &self.owner_type())
            .field("source", &self.source)
            .field("realized", &self.is_realized())
            .field("relations", &self.loaded_relations())
            .finish()
    }
}
