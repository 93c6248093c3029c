//! Loading modules for the elif ORM
//! Provides relation batch loading across a traversal

pub mod batch_loader;
pub mod batcher;
pub mod scopes;

pub use batch_loader::{
    BatchConfig, BatchLoader, BatchSettings, BatchSource, Builder, DeferredFetch, FetchFuture,
    Loader, PolymorphicBatchLoader, Proxy, ProxyRegistry, RelationLoader,
};
pub use batcher::Batcher;
pub use scopes::LoaderScopes;
