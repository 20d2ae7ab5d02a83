//! MongoDB driver adapters for the feed and snapshot traits.

use crate::error::SourceError;
use crate::feed::{operation_filter, ChangeFeed, FeedConnector, FeedRecord};
use crate::snapshot::{SnapshotCursor, SnapshotSource};
use async_trait::async_trait;
use futures::stream::{StreamExt, TryStreamExt};
use mongodb::bson::Document;
use mongodb::change_stream::event::{ChangeStreamEvent, OperationType};
use mongodb::change_stream::ChangeStream;
use mongodb::options::ClientOptions;
use mongodb::{Client, Cursor, Database};
use std::time::Duration;
use sync_core::{Namespace, OperationKind};
use tracing::{debug, info};

/// Connection options for the source store.
#[derive(Clone, Debug)]
pub struct SourceOpts {
    pub source_uri: String,
    /// Falls back to the default database of the URI
    pub source_database: Option<String>,
}

/// A connected MongoDB database.
#[derive(Clone, Debug)]
pub struct MongoSource {
    client: Client,
    database: Database,
}

impl MongoSource {
    pub async fn connect(opts: &SourceOpts) -> Result<Self, SourceError> {
        info!("Connecting to MongoDB");
        let mut mongo_options = ClientOptions::parse(&opts.source_uri).await?;
        // Add connection timeout to prevent hanging
        mongo_options.connect_timeout = Some(Duration::from_secs(10));
        mongo_options.server_selection_timeout = Some(Duration::from_secs(10));

        let database_name = opts
            .source_database
            .clone()
            .or_else(|| mongo_options.default_database.clone())
            .ok_or(SourceError::MissingDatabase)?;

        let client = Client::with_options(mongo_options)?;
        let database = client.database(&database_name);
        debug!("Using MongoDB database: {}", database_name);

        Ok(Self { client, database })
    }

    pub fn database_name(&self) -> &str {
        self.database.name()
    }

    /// Close every connection of the client.
    pub async fn shutdown(self) {
        info!("Disconnecting from MongoDB");
        self.client.shutdown().await;
    }
}

#[async_trait]
impl FeedConnector for MongoSource {
    type Feed = MongoChangeFeed;

    async fn open(
        &self,
        collection: &str,
        operations: &[OperationKind],
    ) -> Result<Self::Feed, SourceError> {
        let stream = self
            .database
            .collection::<Document>(collection)
            .watch()
            .pipeline(vec![operation_filter(operations)])
            .await
            .map_err(|e| feed_error(collection, e))?;
        Ok(MongoChangeFeed {
            collection: collection.to_string(),
            stream: Some(stream),
        })
    }
}

/// A MongoDB change stream.
pub struct MongoChangeFeed {
    collection: String,
    stream: Option<ChangeStream<ChangeStreamEvent<Document>>>,
}

#[async_trait]
impl ChangeFeed for MongoChangeFeed {
    async fn next(&mut self) -> Result<Option<FeedRecord>, SourceError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        match stream.next().await {
            Some(Ok(event)) => Ok(Some(to_feed_record(event))),
            Some(Err(e)) => Err(feed_error(&self.collection, e)),
            None => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.stream.take();
    }
}

fn feed_error(collection: &str, error: impl std::fmt::Display) -> SourceError {
    SourceError::Feed {
        collection: collection.to_string(),
        message: error.to_string(),
    }
}

fn scan_error(collection: &str, error: impl std::fmt::Display) -> SourceError {
    SourceError::Scan {
        collection: collection.to_string(),
        message: error.to_string(),
    }
}

fn to_feed_record(event: ChangeStreamEvent<Document>) -> FeedRecord {
    let (updated_fields, removed_fields) = match event.update_description {
        Some(description) => (Some(description.updated_fields), description.removed_fields),
        None => (None, Vec::new()),
    };
    FeedRecord {
        operation: operation_name(&event.operation_type),
        full_document: event.full_document,
        document_key: event.document_key,
        updated_fields,
        removed_fields,
        cluster_time: event.cluster_time,
        namespace: event.ns.map(|ns| Namespace {
            database: ns.db,
            collection: ns.coll,
        }),
    }
}

fn operation_name(operation: &OperationType) -> String {
    match operation {
        OperationType::Insert => "insert".to_string(),
        OperationType::Update => "update".to_string(),
        OperationType::Replace => "replace".to_string(),
        OperationType::Delete => "delete".to_string(),
        OperationType::Drop => "drop".to_string(),
        OperationType::Rename => "rename".to_string(),
        OperationType::DropDatabase => "dropDatabase".to_string(),
        OperationType::Invalidate => "invalidate".to_string(),
        OperationType::Other(name) => name.clone(),
        other => format!("{other:?}"),
    }
}

#[async_trait]
impl SnapshotSource for MongoSource {
    type Cursor = MongoSnapshotCursor;

    async fn count(&self, collection: &str, filter: &Document) -> Result<u64, SourceError> {
        Ok(self
            .database
            .collection::<Document>(collection)
            .count_documents(filter.clone())
            .await
            .map_err(|e| scan_error(collection, e))?)
    }

    async fn open(&self, collection: &str, filter: &Document) -> Result<Self::Cursor, SourceError> {
        let cursor = self
            .database
            .collection::<Document>(collection)
            .find(filter.clone())
            .await
            .map_err(|e| scan_error(collection, e))?;
        Ok(MongoSnapshotCursor {
            collection: collection.to_string(),
            cursor: Some(cursor),
        })
    }
}

/// A MongoDB find cursor.
pub struct MongoSnapshotCursor {
    collection: String,
    cursor: Option<Cursor<Document>>,
}

#[async_trait]
impl SnapshotCursor for MongoSnapshotCursor {
    async fn next(&mut self) -> Result<Option<Document>, SourceError> {
        match self.cursor.as_mut() {
            Some(cursor) => cursor
                .try_next()
                .await
                .map_err(|e| scan_error(&self.collection, e)),
            None => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.cursor.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_errors_name_the_collection() {
        match feed_error("users", "connection reset") {
            SourceError::Feed {
                collection,
                message,
            } => {
                assert_eq!(collection, "users");
                assert!(message.contains("connection reset"));
            }
            other => panic!("expected a feed error, got {other:?}"),
        }

        let error = scan_error("orders", "cursor killed");
        assert!(matches!(error, SourceError::Scan { ref collection, .. } if collection == "orders"));
        assert!(error.to_string().starts_with("Snapshot scan error on 'orders'"));
    }

    #[test]
    fn test_operation_name() {
        assert_eq!(operation_name(&OperationType::Insert), "insert");
        assert_eq!(operation_name(&OperationType::DropDatabase), "dropDatabase");
        assert_eq!(
            operation_name(&OperationType::Other("shardCollection".to_string())),
            "shardCollection"
        );
    }
}
