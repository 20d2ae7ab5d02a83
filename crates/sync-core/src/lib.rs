//! Core types for the mongo2pg replication pipeline.
//!
//! This crate provides the foundational types shared by the source readers
//! and the sink writer:
//!
//! - [`ChangeEvent`] - Canonical insert/update/delete/control record
//! - [`RawValue`] / [`Document`] - Closed value variant for source documents
//! - [`OperationKind`] - Live-feed operation vocabulary
//! - [`ColumnSchema`] / [`TableBinding`] - Declared sink table shape
//!
//! # Architecture
//!
//! ```text
//! sync-core (this crate)
//!    │
//!    ├─── mongodb-changestream-source  (produces ChangeEvents)
//!    ├─── postgresql-types             (translates values, builds statements)
//!    └─── postgresql-sink              (applies statements)
//! ```

pub mod event;
pub mod schema;
pub mod values;

pub use event::{ChangeEvent, ControlSignal, EventMeta, Namespace, OperationKind};
pub use schema::{
    ColumnDefinition, ColumnList, ColumnSchema, ColumnType, SchemaError, SharedBinding,
    TableBinding,
};
pub use values::{Document, RawValue};
