use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::debug;

use super::builder::Builder;
use super::config::{BatchConfig, BatchSettings};
use super::{BatchLoader, BatchSource};
use crate::error::{ModelError, ModelResult};
use crate::loading::{Batcher, LoaderScopes};
use crate::relationships::RelationSchema;

/// Batch loading entry point for one owner type.
///
/// Holds the type's [`BatchConfig`] and one [`Builder`] per selected relation,
/// shared by every batch loader of that type.
pub struct Proxy {
    config: BatchConfig,
    builders: OnceCell<HashMap<String, Builder>>,
}

impl Proxy {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            builders: OnceCell::new(),
        }
    }

    pub fn owner_type(&self) -> &str {
        self.config.owner_type()
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Builder for `relation`, `None` when the relation is not selected
    pub fn builder_for(&self, relation: &str) -> ModelResult<Option<&Builder>> {
        let builders = self.builders.get_or_try_init(|| {
            let selected = self.config.selected_relations()?;
            Ok::<_, ModelError>(
                selected
                    .iter()
                    .map(|r| (r.name.clone(), Builder::new(self.owner_type(), r.clone())))
                    .collect(),
            )
        })?;
        Ok(builders.get(relation))
    }

    /// Start a traversal over `source`
    pub fn loader_for(
        self: &Arc<Self>,
        session: &Batcher,
        source: BatchSource,
        scopes: LoaderScopes,
    ) -> Arc<BatchLoader> {
        BatchLoader::new(Arc::clone(self), session.clone(), source, scopes)
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("config", &self.config)
            .field("builders", &self.builders.get().map(|b| b.len()))
            .finish()
    }
}

static GLOBAL_REGISTRY: OnceCell<ProxyRegistry> = OnceCell::new();

/// Registry of proxies keyed by owner type name.
///
/// Proxies are created on first use and kept until [`reset`](Self::reset);
/// existing entries are never replaced. Cloning shares the same registry.
#[derive(Clone)]
pub struct ProxyRegistry {
    schema: Arc<dyn RelationSchema>,
    proxies: Arc<DashMap<String, Arc<Proxy>>>,
    allow_lists: Arc<DashMap<String, Vec<String>>>,
}

impl ProxyRegistry {
    pub fn new(schema: Arc<dyn RelationSchema>) -> Self {
        Self {
            schema,
            proxies: Arc::new(DashMap::new()),
            allow_lists: Arc::new(DashMap::new()),
        }
    }

    /// Install the process-wide registry. Fails if one is already installed.
    pub fn install_global(schema: Arc<dyn RelationSchema>) -> ModelResult<&'static ProxyRegistry> {
        GLOBAL_REGISTRY.set(Self::new(schema)).map_err(|_| {
            ModelError::Configuration("A global proxy registry is already installed".to_string())
        })?;
        Self::global()
    }

    pub fn global() -> ModelResult<&'static ProxyRegistry> {
        GLOBAL_REGISTRY.get().ok_or_else(|| {
            ModelError::Configuration("No global proxy registry installed".to_string())
        })
    }

    pub fn schema(&self) -> &Arc<dyn RelationSchema> {
        &self.schema
    }

    /// Restrict batch loading of `owner_type` to `relations`.
    ///
    /// Must happen before the type's proxy is first used; the allow-list is
    /// validated against the schema right away.
    pub fn configure(&self, owner_type: &str, relations: &[&str]) -> ModelResult<()> {
        let relations: Vec<String> = relations.iter().map(|r| r.to_string()).collect();
        BatchConfig::new(self.schema.clone(), owner_type, Some(relations.clone())).validate()?;

        match self.proxies.entry(owner_type.to_string()) {
            Entry::Occupied(_) => Err(ModelError::Configuration(format!(
                "Relations of '{}' can't be changed once its batch loader proxy is in use",
                owner_type
            ))),
            Entry::Vacant(_) => {
                self.allow_lists.insert(owner_type.to_string(), relations);
                Ok(())
            }
        }
    }

    /// Apply every allow-list in `settings`
    pub fn apply(&self, settings: &BatchSettings) -> ModelResult<()> {
        for (owner_type, relations) in &settings.relations {
            let relations: Vec<&str> = relations.iter().map(String::as_str).collect();
            self.configure(owner_type, &relations)?;
        }
        Ok(())
    }

    /// Proxy for `owner_type`, created on first use
    pub fn proxy(&self, owner_type: &str) -> ModelResult<Arc<Proxy>> {
        if let Some(proxy) = self.proxies.get(owner_type) {
            return Ok(Arc::clone(&proxy));
        }

        if !self.schema.supports_batching(owner_type) {
            return Err(ModelError::Configuration(format!(
                "Model '{}' does not support batch loading",
                owner_type
            )));
        }

        let proxy = self
            .proxies
            .entry(owner_type.to_string())
            .or_insert_with(|| {
                let relations = self.allow_lists.get(owner_type).map(|r| r.clone());
                debug!(owner_type, ?relations, "Creating batch loader proxy");
                Arc::new(Proxy::new(BatchConfig::new(
                    self.schema.clone(),
                    owner_type,
                    relations,
                )))
            })
            .clone();

        Ok(proxy)
    }

    pub fn contains(&self, owner_type: &str) -> bool {
        self.proxies.contains_key(owner_type)
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Drop every proxy and allow-list
    pub fn reset(&self) {
        self.proxies.clear();
        self.allow_lists.clear();
    }
}

impl fmt::Debug for ProxyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut owner_types: Vec<String> = self.proxies.iter().map(|e| e.key().clone()).collect();
        owner_types.sort();
        f.debug_struct("ProxyRegistry")
            .field("proxies", &owner_types)
            .finish()
    }
}
