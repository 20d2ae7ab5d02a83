//! PostgreSQL sink for replicated change events.
//!
//! - [`SinkWriter`] builds and runs DDL/DML through a [`StatementExecutor`]
//! - [`TableWriter`] is a per-table session owning an [`InsertBuffer`]
//! - [`PostgresExecutor`] runs statements on a single tokio-postgres connection
//! - [`testing::MemoryExecutor`] records statements for tests
//!
//! # Example
//!
//! ```
//! use postgresql_sink::testing::MemoryExecutor;
//! use postgresql_sink::{InsertOptions, SinkWriter};
//! use postgresql_types::SinkValue;
//! use std::sync::Arc;
//! use sync_core::{ColumnDefinition, ColumnSchema, ColumnType, TableBinding};
//!
//! # tokio_test::block_on(async {
//! let schema = ColumnSchema::new(vec![
//!     ColumnDefinition::new("id", ColumnType::Number).primary_key(),
//!     ColumnDefinition::new("name", ColumnType::Text),
//! ])
//! .unwrap();
//! let binding = TableBinding::new("users", "users", schema).shared();
//!
//! let executor = Arc::new(MemoryExecutor::new());
//! let writer = SinkWriter::new(Arc::clone(&executor));
//! let mut session = writer.session(binding, 2);
//!
//! for id in 1..=2 {
//!     let row = vec![SinkValue::new("id", id)];
//!     session.insert(row, InsertOptions::queued(false)).await.unwrap();
//! }
//! assert_eq!(
//!     executor.statements(),
//!     vec![r#"INSERT INTO "users" ("id", "name") VALUES ($$1$$, NULL), ($$2$$, NULL)"#]
//! );
//! # });
//! ```

pub mod buffer;
pub mod error;
pub mod executor;
pub mod testing;
pub mod writer;

pub use buffer::{InsertBuffer, DEFAULT_BUFFER_LIMIT};
pub use error::SinkError;
pub use executor::{PostgresExecutor, StatementExecutor};
pub use writer::{ApplyOutcome, InsertOptions, SinkWriter, TableWriter};
