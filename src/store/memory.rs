use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, Document};

use crate::ingestion::ID_FIELD;
use crate::types::NativeDocument;

use super::{DocumentStore, StoreConnection, StoreError, StoreOperation, StoreResult};

/// Injected behavior for one [`StoreOperation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Fail the operation with [`StoreError::Rejected`] carrying this message.
    Fail(String),
    /// Never complete; the caller has to cancel.
    Stall,
}

#[derive(Default)]
struct Inner {
    collections: Mutex<BTreeMap<String, Vec<Document>>>,
    faults: Mutex<HashMap<StoreOperation, Fault>>,
    open_connections: AtomicUsize,
    connects: AtomicUsize,
}

/// In-process [`DocumentStore`].
///
/// Mirrors the driver's ordered `insert_many`: documents without `_id` get a fresh ObjectId, a
/// duplicate `_id` stops the insert, and documents written before it stay. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("collections", &self.collection_names())
            .field("open_connections", &self.open_connections())
            .finish()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a fault for every later call of `op`.
    pub fn inject(&self, op: StoreOperation, fault: Fault) {
        lock(&self.inner.faults).insert(op, fault);
    }

    /// Remove an injected fault.
    pub fn clear_fault(&self, op: StoreOperation) {
        lock(&self.inner.faults).remove(&op);
    }

    /// Replace a collection's contents without going through a connection.
    pub fn seed(&self, collection: &str, docs: Vec<Document>) {
        lock(&self.inner.collections).insert(collection.to_string(), docs);
    }

    /// Documents of a collection, in insertion order (empty if it does not exist).
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        lock(&self.inner.collections)
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn count(&self, collection: &str) -> usize {
        lock(&self.inner.collections)
            .get(collection)
            .map_or(0, Vec::len)
    }

    pub fn collection_names(&self) -> Vec<String> {
        lock(&self.inner.collections).keys().cloned().collect()
    }

    /// Connections opened and not yet closed.
    pub fn open_connections(&self) -> usize {
        self.inner.open_connections.load(Ordering::SeqCst)
    }

    /// Successful connects since creation.
    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    async fn check(&self, op: StoreOperation) -> StoreResult<()> {
        let fault = lock(&self.inner.faults).get(&op).cloned();
        match fault {
            None => Ok(()),
            Some(Fault::Fail(message)) => Err(StoreError::Rejected(message)),
            Some(Fault::Stall) => std::future::pending().await,
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    type Connection = MemoryConnection;

    async fn connect(&self, address: &str) -> StoreResult<MemoryConnection> {
        if !(address.starts_with("mongodb://") || address.starts_with("mongodb+srv://")) {
            return Err(StoreError::InvalidAddress(address.to_string()));
        }
        self.check(StoreOperation::Connect).await?;
        self.inner.open_connections.fetch_add(1, Ordering::SeqCst);
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            store: self.clone(),
        })
    }
}

/// A connection opened by [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryConnection {
    store: MemoryStore,
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn collection_exists(&self, collection: &str) -> StoreResult<bool> {
        self.store.check(StoreOperation::CollectionExists).await?;
        Ok(lock(&self.store.inner.collections).contains_key(collection))
    }

    async fn drop_collection(&self, collection: &str) -> StoreResult<()> {
        self.store.check(StoreOperation::Drop).await?;
        lock(&self.store.inner.collections).remove(collection);
        Ok(())
    }

    async fn insert_many(&self, collection: &str, docs: Vec<NativeDocument>) -> StoreResult<usize> {
        self.store.check(StoreOperation::Insert).await?;
        let mut collections = lock(&self.store.inner.collections);
        let target = collections.entry(collection.to_string()).or_default();

        let mut inserted = 0usize;
        for doc in docs {
            if !doc.contains_key(ID_FIELD) {
                target.push(with_id(doc));
                inserted += 1;
                continue;
            }
            let id = doc.get(ID_FIELD).cloned().unwrap_or(Bson::Null);
            if target.iter().any(|existing| existing.get(ID_FIELD) == Some(&id)) {
                return Err(StoreError::DuplicateKey {
                    collection: collection.to_string(),
                    key: id.to_string(),
                    inserted,
                });
            }
            target.push(doc);
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn close(self) {
        self.store
            .inner
            .open_connections
            .fetch_sub(1, Ordering::SeqCst);
    }
}

/// Prepend a generated `_id`, like the driver does for documents without one.
fn with_id(doc: Document) -> Document {
    let mut out = Document::new();
    out.insert(ID_FIELD, ObjectId::new());
    for (key, value) in doc {
        out.insert(key, value);
    }
    out
}
