//! Document store traits used by the load pipeline.
//!
//! The pipeline only needs four operations against a collection: check that it exists, drop
//! it, bulk-insert documents, and release the connection. They are expressed as two traits:
//!
//! - [`DocumentStore`]: opens connections from a connection string
//! - [`StoreConnection`]: one live connection; closed exactly once by the pipeline
//!
//! ## Implementations
//!
//! - [`MongoStore`]: the MongoDB driver
//! - [`MemoryStore`]: an in-process store with fault injection, for tests and dry runs
//!
//! ## Example
//!
//! ```ignore
//! use mongo_json_load::store::{DocumentStore, StoreConnection, StoreResult};
//!
//! struct MyStore { /* ... */ }
//!
//! #[async_trait]
//! impl DocumentStore for MyStore {
//!     type Connection = MyConnection;
//!     async fn connect(&self, address: &str) -> StoreResult<MyConnection> {
//!         // Your implementation
//!     }
//! }
//! ```

mod memory;
mod mongo;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::NativeDocument;

pub use memory::{Fault, MemoryConnection, MemoryStore};
pub use mongo::{MongoConnection, MongoStore};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a [`DocumentStore`] or [`StoreConnection`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Error reported by the MongoDB driver.
    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    /// The connection string is not usable by this store.
    #[error("invalid connection string '{0}'")]
    InvalidAddress(String),

    /// An ordered insert hit a document whose `_id` already exists.
    #[error("duplicate key {key} in collection '{collection}' after {inserted} documents")]
    DuplicateKey {
        collection: String,
        key: String,
        inserted: usize,
    },

    /// The store refused the operation.
    #[error("{0}")]
    Rejected(String),
}

/// Operations a store performs on behalf of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Connect,
    CollectionExists,
    Drop,
    Insert,
}

/// Opens connections to a document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Connection type handed to the pipeline.
    type Connection: StoreConnection;

    /// Open a connection. Implementations must verify the target is reachable, so connection
    /// failures surface here rather than on the first write.
    async fn connect(&self, address: &str) -> StoreResult<Self::Connection>;
}

/// A live connection to the target database.
#[async_trait]
pub trait StoreConnection: Send + Sync {
    /// Whether a collection with exactly this name exists.
    async fn collection_exists(&self, collection: &str) -> StoreResult<bool>;

    /// Drop a collection.
    async fn drop_collection(&self, collection: &str) -> StoreResult<()>;

    /// Insert documents in order, stopping at the first failure. Documents written before the
    /// failure stay written. Returns the number inserted.
    async fn insert_many(&self, collection: &str, docs: Vec<NativeDocument>) -> StoreResult<usize>;

    /// Release the connection.
    async fn close(self);
}
