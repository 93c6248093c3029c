use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use super::{BatchLoader, BatchSource, Loader, RelationLoader};
use crate::error::ModelResult;
use crate::loading::{Batcher, LoaderScopes};
use crate::record::RecordRef;

/// Loader for relations whose target type is only known from the data.
///
/// Realization groups the fetched records by runtime type and hands each group
/// to a batch loader of its own type, so nested relations still load once per
/// type. Records of types without batch support are returned as they are.
pub struct PolymorphicBatchLoader {
    session: Batcher,
    source: BatchSource,
    scopes: LoaderScopes,
    realized: OnceCell<Realized>,
}

struct Realized {
    records: Vec<RecordRef>,
    groups: Vec<Arc<BatchLoader>>,
}

impl PolymorphicBatchLoader {
    pub(crate) fn new(session: Batcher, source: BatchSource, scopes: LoaderScopes) -> Self {
        Self {
            session,
            source,
            scopes,
            realized: OnceCell::new(),
        }
    }

    pub fn scopes(&self) -> &LoaderScopes {
        &self.scopes
    }

    pub fn is_realized(&self) -> bool {
        self.realized.initialized()
    }

    /// Realized records, grouped by runtime type in first-seen order
    pub async fn records(&self) -> ModelResult<&[RecordRef]> {
        let realized = self.realized.get_or_try_init(|| self.realize()).await?;
        Ok(&realized.records)
    }

    /// Per-type loaders created during realization
    pub fn group_loaders(&self) -> &[Arc<BatchLoader>] {
        self.realized
            .get()
            .map(|realized| realized.groups.as_slice())
            .unwrap_or_default()
    }

    async fn realize(&self) -> ModelResult<Realized> {
        let fetched = self.source.realize().await?;

        let mut groups: Vec<(String, Vec<RecordRef>)> = Vec::new();
        for record in fetched {
            match groups.iter_mut().find(|(t, _)| t == record.runtime_type()) {
                Some((_, members)) => members.push(record),
                None => groups.push((record.runtime_type().to_string(), vec![record])),
            }
        }

        let registry = self.session.registry();
        let mut records = Vec::new();
        let mut loaders = Vec::with_capacity(groups.len());

        for (runtime_type, members) in groups {
            if !registry.schema().supports_batching(&runtime_type) {
                trace!(
                    runtime_type = %runtime_type,
                    records = members.len(),
                    "Type not batched, records left unannotated"
                );
                records.extend(members);
                continue;
            }

            let proxy = registry.proxy(&runtime_type)?;
            let loader = proxy.loader_for(
                &self.session,
                BatchSource::records(members),
                self.scopes.clone(),
            );
            records.extend_from_slice(loader.records().await?);
            loaders.push(loader);
        }

        debug!(
            records = records.len(),
            types = loaders.len(),
            "Polymorphic batch loader realized"
        );

        Ok(Realized {
            records,
            groups: loaders,
        })
    }
}

#[async_trait]
impl RelationLoader for PolymorphicBatchLoader {
    async fn records(&self) -> ModelResult<&[RecordRef]> {
        PolymorphicBatchLoader::records(self).await
    }

    /// Always `None`: each realized record already routes to the loader of its own type
    async fn loader_for(&self, _relation: &str) -> ModelResult<Option<Loader>> {
        Ok(None)
    }

    fn is_realized(&self) -> bool {
        PolymorphicBatchLoader::is_realized(self)
    }

    fn is_polymorphic(&self) -> bool {
        true
    }
}

impl fmt::Debug for PolymorphicBatchLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolymorphicBatchLoader")
            .field("source", &self.source)
            .field("realized", &self.is_realized())
            .field("groups", &self.group_loaders().len())
            .finish()
    }
}
