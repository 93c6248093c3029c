use std::sync::Arc;

use tracing::debug;

use super::polymorphic::PolymorphicBatchLoader;
use super::{BatchSource, Loader};
use crate::error::{ModelError, ModelResult};
use crate::loading::{Batcher, LoaderScopes};
use crate::record::RecordRef;
use crate::relationships::RelationDescriptor;
use crate::store::BulkFetch;

/// Turns a set of owner records into the loader of one relation
#[derive(Debug, Clone)]
pub struct Builder {
    owner_type: String,
    relation: RelationDescriptor,
}

impl Builder {
    pub fn new(owner_type: &str, relation: RelationDescriptor) -> Self {
        Self {
            owner_type: owner_type.to_string(),
            relation,
        }
    }

    pub fn relation(&self) -> &RelationDescriptor {
        &self.relation
    }

    /// Prepare one bulk fetch of the relation across all `owners`.
    ///
    /// Only the override for this exact relation applies to the fetch; the
    /// overrides nested under it become the scopes of the returned loader.
    /// Nothing is fetched until the loader is realized, and never for an
    /// empty owner set.
    pub fn build(
        &self,
        session: &Batcher,
        owners: &[RecordRef],
        scopes: &LoaderScopes,
    ) -> ModelResult<Loader> {
        let name = self.relation.name.as_str();
        let request = Arc::new(BulkFetch {
            owner_type: self.owner_type.clone(),
            relation: name.to_string(),
            owners: owners.to_vec(),
            scope: scopes.scope_for(name).cloned(),
        });
        let nested = scopes.nested_for(name);

        debug!(
            owner_type = %self.owner_type,
            relation = name,
            owners = owners.len(),
            scoped = request.scope.is_some(),
            "Preparing bulk fetch"
        );

        let source = if owners.is_empty() {
            BatchSource::records(Vec::new())
        } else {
            let store = Arc::clone(session.store());
            BatchSource::deferred(move || {
                let store = Arc::clone(&store);
                let request = Arc::clone(&request);
                async move { store.bulk_fetch(&request).await }
            })
        };

        if self.relation.is_polymorphic() {
            return Ok(Arc::new(PolymorphicBatchLoader::new(session.clone(), source, nested)));
        }

        let target = self.relation.target_type.as_deref().ok_or_else(|| {
            ModelError::Relationship(format!(
                "Relationship '{}' on '{}' has no target type",
                name, self.owner_type
            ))
        })?;
        let proxy = session.registry().proxy(target)?;

        Ok(proxy.loader_for(session, source, nested))
    }
}
