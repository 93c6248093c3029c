//! # elif-orm-batch: Relation batch loading for elif.rs
//!
//! Removes N+1 queries from relation traversals. A root query yields a
//! [`BatchLoader`]; the first time any of its records reads a relation, the
//! relation is loaded for every record with a single bulk fetch, and the
//! loaded records carry the context needed to batch the next level too.
//!
//! ```rust,ignore
//! let batcher = Batcher::new(ProxyRegistry::new(schema), store);
//! let users = batcher.load_all("User", None, LoaderScopes::new())?;
//! for user in users.records().await? {
//!     for post in batcher.relation(user, "posts").await? {
//!         let comments = batcher.relation(&post, "comments").await?;
//!     }
//! }
//! // 3 store calls: users, posts, comments
//! ```
//!
//! Loaded records point back at their loader weakly. `users` has to stay
//! alive until the traversal is done; once it is dropped, relation access
//! on its records loads one record at a time.
//!
//! The store and the relation schema are collaborators behind the [`Store`]
//! and [`RelationSchema`] traits; [`memory`] provides in-memory versions of both.

pub mod error;
pub mod loading;
pub mod memory;
pub mod record;
pub mod relationships;
pub mod store;

// Re-export core traits and types
pub use error::*;
pub use loading::*;
pub use record::{without_batch_loader, Associations, BatchSlot, Record, RecordRef, SuspendGuard};
pub use relationships::*;
pub use store::{BulkFetch, Scope, Store};
