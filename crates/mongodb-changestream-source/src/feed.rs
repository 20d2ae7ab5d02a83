//! Live feed records and their normalization into change events.

use crate::convert::{bson_to_document, timestamp_to_chrono};
use crate::error::SourceError;
use async_trait::async_trait;
use mongodb::bson::{self, Bson};
use sync_core::{ChangeEvent, EventMeta, Namespace, OperationKind};

/// One record of a collection's live feed, in source shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedRecord {
    /// Wire name of the operation (`insert`, `update`, `dropDatabase`, ...)
    pub operation: String,
    /// Full document for inserts
    pub full_document: Option<bson::Document>,
    /// Identity of the changed document
    pub document_key: Option<bson::Document>,
    /// Fields set by an update
    pub updated_fields: Option<bson::Document>,
    /// Fields removed by an update
    pub removed_fields: Vec<String>,
    pub cluster_time: Option<bson::Timestamp>,
    pub namespace: Option<Namespace>,
}

impl FeedRecord {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Self::default()
        }
    }

    pub fn insert(full_document: bson::Document) -> Self {
        let document_key = full_document
            .get("_id")
            .map(|id| bson::doc! { "_id": id.clone() });
        Self {
            full_document: Some(full_document),
            document_key,
            ..Self::new("insert")
        }
    }

    pub fn update(
        document_key: bson::Document,
        updated_fields: bson::Document,
        removed_fields: Vec<String>,
    ) -> Self {
        Self {
            document_key: Some(document_key),
            updated_fields: Some(updated_fields),
            removed_fields,
            ..Self::new("update")
        }
    }

    pub fn delete(document_key: bson::Document) -> Self {
        Self {
            document_key: Some(document_key),
            ..Self::new("delete")
        }
    }

    /// Operation kind, if it belongs to the known vocabulary.
    pub fn kind(&self) -> Option<OperationKind> {
        OperationKind::parse(&self.operation)
    }
}

/// An open live feed on one collection.
#[async_trait]
pub trait ChangeFeed: Send {
    /// Next record. `Ok(None)` means the feed ended normally.
    async fn next(&mut self) -> Result<Option<FeedRecord>, SourceError>;

    /// Release the underlying stream.
    async fn close(&mut self);
}

/// Opens live feeds.
#[async_trait]
pub trait FeedConnector: Send + Sync + 'static {
    type Feed: ChangeFeed + 'static;

    /// Open a feed on `collection`, restricted server-side to `operations`
    /// where the store supports it.
    async fn open(
        &self,
        collection: &str,
        operations: &[OperationKind],
    ) -> Result<Self::Feed, SourceError>;
}

/// Turn a feed record into the canonical change event.
///
/// `insert`, `update` and `delete` map to their data variants; every other
/// known operation becomes [`ChangeEvent::Unsupported`].
pub fn normalize(record: FeedRecord) -> Result<ChangeEvent, SourceError> {
    let Some(kind) = record.kind() else {
        return Err(malformed(&record.operation, "unknown operation type"));
    };
    let meta = EventMeta {
        source_time: record.cluster_time.and_then(timestamp_to_chrono),
        namespace: record.namespace.clone(),
    };

    let event = match kind {
        OperationKind::Insert => {
            let document = record
                .full_document
                .ok_or_else(|| malformed(&record.operation, "missing full document"))?;
            ChangeEvent::insert(bson_to_document(document)?)
        }
        OperationKind::Update => {
            let identity = record
                .document_key
                .ok_or_else(|| malformed(&record.operation, "missing document key"))?;
            let set = record.updated_fields.unwrap_or_default();
            ChangeEvent::update(
                bson_to_document(set)?,
                record.removed_fields,
                bson_to_document(identity)?,
            )
        }
        OperationKind::Delete => {
            let identity = record
                .document_key
                .ok_or_else(|| malformed(&record.operation, "missing document key"))?;
            ChangeEvent::delete(bson_to_document(identity)?)
        }
        operation => ChangeEvent::Unsupported {
            operation,
            meta: EventMeta::default(),
        },
    };
    Ok(event.with_meta(meta))
}

fn malformed(operation: &str, message: &str) -> SourceError {
    SourceError::Normalize {
        operation: operation.to_string(),
        message: message.to_string(),
    }
}

/// `$match` stage restricting a change stream to `operations`.
pub fn operation_filter(operations: &[OperationKind]) -> bson::Document {
    let names: Vec<Bson> = operations
        .iter()
        .map(|op| Bson::String(op.as_str().to_string()))
        .collect();
    bson::doc! { "$match": { "operationType": { "$in": names } } }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;
    use sync_core::{Document, RawValue};

    #[test]
    fn test_normalize_insert() {
        let event = normalize(FeedRecord::insert(doc! { "id": 1, "name": "a" })).unwrap();
        assert_eq!(
            event,
            ChangeEvent::insert(Document::new().with("id", 1).with("name", "a"))
        );
    }

    #[test]
    fn test_normalize_update_keeps_removed_fields_in_order() {
        let record = FeedRecord::update(
            doc! { "_id": 5 },
            doc! { "name": "b" },
            vec!["tags".to_string(), "age".to_string()],
        );
        let ChangeEvent::Update {
            set,
            unset,
            identity,
            ..
        } = normalize(record).unwrap()
        else {
            panic!("expected update");
        };
        assert_eq!(set, Document::new().with("name", "b"));
        assert_eq!(unset, vec!["tags".to_string(), "age".to_string()]);
        assert_eq!(identity.get("_id"), Some(&RawValue::Int(5)));
    }

    #[test]
    fn test_normalize_delete_requires_document_key() {
        let result = normalize(FeedRecord::new("delete"));
        assert!(matches!(result, Err(SourceError::Normalize { .. })));
    }

    #[test]
    fn test_unmodelled_operation_is_unsupported() {
        let event = normalize(FeedRecord::new("rename")).unwrap();
        assert!(matches!(
            event,
            ChangeEvent::Unsupported {
                operation: OperationKind::Rename,
                ..
            }
        ));
    }

    #[test]
    fn test_metadata_is_attached() {
        let mut record = FeedRecord::delete(doc! { "_id": 1 });
        record.cluster_time = Some(bson::Timestamp {
            time: 1_704_067_200,
            increment: 3,
        });
        record.namespace = Some(Namespace {
            database: "app".to_string(),
            collection: Some("users".to_string()),
        });

        let event = normalize(record).unwrap();
        let meta = event.meta().unwrap();
        assert_eq!(
            meta.source_time.map(|t| t.to_rfc3339()),
            Some("2024-01-01T00:00:00+00:00".to_string())
        );
        assert_eq!(meta.namespace.as_ref().unwrap().to_string(), "app.users");
    }

    #[test]
    fn test_operation_filter() {
        let filter = operation_filter(&[OperationKind::Insert, OperationKind::DropDatabase]);
        assert_eq!(
            filter,
            doc! { "$match": { "operationType": { "$in": ["insert", "dropDatabase"] } } }
        );
    }
}
