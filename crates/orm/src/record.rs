//! Record capability used by the batch loader
//!
//! A record exposes its runtime type, a cache of relation values the store
//! attaches to it, and, when its type opts into batch loading, a slot holding
//! a back-reference to the [`BatchLoader`] that last realized it.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::loading::BatchLoader;

/// Shared handle to a loaded record
pub type RecordRef = Arc<dyn Record>;

/// An entity loaded from a store
pub trait Record: Any + Send + Sync + fmt::Debug {
    /// Concrete type name, used to pick a proxy and to group polymorphic results
    fn runtime_type(&self) -> &str;

    /// Relation values attached to this record by the store
    fn associations(&self) -> &Associations;

    /// Back-reference slot; `None` means the type does not support batch loading
    fn batch_slot(&self) -> Option<&BatchSlot> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn supports_batching(&self) -> bool {
        self.batch_slot().is_some()
    }

    /// The batch loader that last realized this record, if it is still alive
    fn batch_loader(&self) -> Option<Arc<BatchLoader>> {
        self.batch_slot().and_then(BatchSlot::get)
    }

    /// Rebind the back-reference. Ignored by types without a slot.
    fn set_batch_loader(&self, loader: Option<&Arc<BatchLoader>>) {
        if let Some(slot) = self.batch_slot() {
            slot.set(loader);
        }
    }
}

impl dyn Record {
    /// Downcast to the concrete record type
    pub fn downcast_ref<T: Record>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Rebindable, non-owning back-reference to a batch loader.
///
/// The latest assignment wins. The loader is held weakly: once the traversal
/// that created it is dropped, relation access falls back to per-record loading.
#[derive(Default)]
pub struct BatchSlot {
    loader: RwLock<Option<Weak<BatchLoader>>>,
}

impl BatchSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current back-reference, if any and still alive
    pub fn get(&self) -> Option<Arc<BatchLoader>> {
        self.loader.read().as_ref().and_then(Weak::upgrade)
    }

    pub fn set(&self, loader: Option<&Arc<BatchLoader>>) {
        *self.loader.write() = loader.map(Arc::downgrade);
    }

    /// Whether a back-reference is bound, live or not
    pub fn is_bound(&self) -> bool {
        self.loader.read().is_some()
    }

    /// Clear the back-reference until the returned guard is dropped.
    ///
    /// The previous value is restored verbatim on drop, whether the scope ends
    /// normally, through an error return, a panic or a cancelled future.
    pub fn suspend(&self) -> SuspendGuard<'_> {
        let saved = self.replace(None);
        SuspendGuard { slot: self, saved }
    }

    fn replace(&self, value: Option<Weak<BatchLoader>>) -> Option<Weak<BatchLoader>> {
        std::mem::replace(&mut *self.loader.write(), value)
    }
}

impl fmt::Debug for BatchSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchSlot")
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// Guard returned by [`BatchSlot::suspend`]
#[must_use = "the back-reference is restored as soon as the guard is dropped"]
pub struct SuspendGuard<'a> {
    slot: &'a BatchSlot,
    saved: Option<Weak<BatchLoader>>,
}

impl Drop for SuspendGuard<'_> {
    fn drop(&mut self) {
        self.slot.replace(self.saved.take());
    }
}

/// Run `f` with batch loading disabled for `record`.
///
/// Relation access on the record inside the block takes the default per-record
/// path. Relation values already attached to the record are left as they are.
pub async fn without_batch_loader<F, Fut, T>(record: &dyn Record, f: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let _guard = record.batch_slot().map(BatchSlot::suspend);
    f().await
}

/// Relation values attached to a record, keyed by relation name.
///
/// A relation is "loaded" once the store has set it, even to an empty list.
#[derive(Default)]
pub struct Associations {
    loaded: RwLock<HashMap<String, Vec<RecordRef>>>,
}

impl Associations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, relation: &str) -> Option<Vec<RecordRef>> {
        self.loaded.read().get(relation).cloned()
    }

    pub fn set(&self, relation: &str, records: Vec<RecordRef>) {
        self.loaded.write().insert(relation.to_string(), records);
    }

    pub fn is_loaded(&self, relation: &str) -> bool {
        self.loaded.read().contains_key(relation)
    }

    /// Forget a loaded relation so the next access fetches it again
    pub fn reset(&self, relation: &str) -> bool {
        self.loaded.write().remove(relation).is_some()
    }

    pub fn loaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loaded.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for Associations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Names only, relation values can be large graphs
        f.debug_struct("Associations")
            .field("loaded", &self.loaded_names())
            .finish()
    }
}
