//! MongoDB readers for mongo2pg.
//!
//! - [`ChangeStreamReader`] follows a collection's change stream
//! - [`SnapshotReader`] scans a collection once for bulk catch-up
//! - [`MongoSource`] adapts the MongoDB driver to both
//!
//! Both readers hand items over a [`Delivery`] channel and wait for the
//! consumer's acknowledgement before reading further.
//!
//! # Example
//!
//! ```
//! use mongodb::bson::doc;
//! use mongodb_changestream_source::testing::{FeedStep, ScriptedConnector};
//! use mongodb_changestream_source::{ChangeStreamReader, FeedRecord, ImmediateRetry};
//! use std::sync::Arc;
//! use sync_core::{ChangeEvent, ColumnSchema, OperationKind, TableBinding};
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let connector = Arc::new(ScriptedConnector::new(vec![vec![
//!     FeedStep::Record(FeedRecord::insert(doc! { "_id": 1 })),
//!     FeedStep::End,
//! ]]));
//! let reader = ChangeStreamReader::new(connector, Arc::new(ImmediateRetry::unbounded()));
//! let binding = TableBinding::new("users", "users", ColumnSchema::new(vec![]).unwrap()).shared();
//!
//! let mut rx = reader.watch(binding, vec![OperationKind::Insert], CancellationToken::new());
//! let (item, ack) = rx.recv().await.unwrap().into_parts();
//! assert!(matches!(item, Ok(ChangeEvent::Insert { .. })));
//! ack.done();
//! # });
//! ```

pub mod convert;
pub mod delivery;
pub mod error;
pub mod feed;
pub mod mongo;
pub mod reader;
pub mod retry;
pub mod snapshot;
pub mod testing;

pub use convert::{bson_to_document, bson_to_raw_value};
pub use delivery::{Ack, Delivery};
pub use error::SourceError;
pub use feed::{normalize, ChangeFeed, FeedConnector, FeedRecord};
pub use mongo::{MongoSource, SourceOpts};
pub use reader::{ChangeStreamReader, FeedItem};
pub use retry::{ExponentialBackoff, ImmediateRetry, RetryPolicy};
pub use snapshot::{ScanStep, SnapshotCursor, SnapshotReader, SnapshotScan, SnapshotSource};
