use async_trait::async_trait;
use mongodb::bson::{doc, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};

use crate::config::DEFAULT_DATABASE;
use crate::types::NativeDocument;

use super::{DocumentStore, StoreConnection, StoreResult};

/// [`DocumentStore`] backed by the MongoDB driver.
///
/// The database is the connection string's default database (`mongodb://host/<db>`), or
/// [`DEFAULT_DATABASE`] when the string names none.
#[derive(Debug, Clone, Default)]
pub struct MongoStore {
    app_name: Option<String>,
}

impl MongoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `app_name` to the server unless the connection string sets one.
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    type Connection = MongoConnection;

    async fn connect(&self, address: &str) -> StoreResult<MongoConnection> {
        let mut options = ClientOptions::parse(address).await?;
        if options.app_name.is_none() {
            options.app_name = self.app_name.clone();
        }
        let client = Client::with_options(options)?;
        let db = client
            .default_database()
            .unwrap_or_else(|| client.database(DEFAULT_DATABASE));

        // The driver connects lazily; ping so an unreachable server fails here.
        if let Err(err) = db.run_command(doc! { "ping": 1 }).await {
            client.shutdown().await;
            return Err(err.into());
        }

        tracing::debug!(database = %db.name(), "connected to mongodb");
        Ok(MongoConnection { client, db })
    }
}

/// A connection opened by [`MongoStore`].
#[derive(Debug)]
pub struct MongoConnection {
    client: Client,
    db: Database,
}

impl MongoConnection {
    /// The database this connection writes to.
    pub fn database_name(&self) -> &str {
        self.db.name()
    }
}

#[async_trait]
impl StoreConnection for MongoConnection {
    async fn collection_exists(&self, collection: &str) -> StoreResult<bool> {
        let names = self
            .db
            .list_collection_names()
            .filter(doc! { "name": collection })
            .await?;
        Ok(names.iter().any(|n| n == collection))
    }

    async fn drop_collection(&self, collection: &str) -> StoreResult<()> {
        self.db.collection::<Document>(collection).drop().await?;
        Ok(())
    }

    async fn insert_many(&self, collection: &str, docs: Vec<NativeDocument>) -> StoreResult<usize> {
        let result = self
            .db
            .collection::<Document>(collection)
            .insert_many(docs)
            .await?;
        Ok(result.inserted_ids.len())
    }

    async fn close(self) {
        self.client.shutdown().await;
    }
}
