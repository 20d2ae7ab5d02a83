//! Value translation and statement text for the PostgreSQL sink.
//!
//! # Modules
//!
//! - [`translate`] - Document → [`SinkValue`] translation against a column schema
//! - [`literal`] - The escaping choke point for values, and identifier quoting
//! - [`ddl`] - CREATE TABLE generation
//! - [`dml`] - INSERT / UPDATE / DELETE generation
//!
//! # Example
//!
//! ```
//! use postgresql_types::{dml, translate};
//! use sync_core::{ColumnDefinition, ColumnSchema, ColumnType, Document};
//!
//! let schema = ColumnSchema::new(vec![
//!     ColumnDefinition::new("id", ColumnType::Number).primary_key(),
//!     ColumnDefinition::new("name", ColumnType::Text),
//! ])
//! .unwrap();
//!
//! let doc = Document::new().with("id", 1).with("name", "a").with("__v", 0);
//! let values = translate(&doc, &schema);
//! let sql = dml::insert_statement("t", &values).unwrap();
//! assert_eq!(sql, r#"INSERT INTO "t" ("id", "name") VALUES ($$1$$, $$a$$)"#);
//! ```

pub mod ddl;
pub mod dml;
pub mod literal;
pub mod translate;

pub use ddl::{PostgreSQLDdl, ToDdl};
pub use dml::StatementError;
pub use literal::{escape_literal, quote_ident};
pub use translate::{
    drop_columns, translate, SinkValue, TimestampStyle, ValueTranslator,
    DEFAULT_IGNORED_COLUMNS,
};
