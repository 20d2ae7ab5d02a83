//! Column schema and table binding definitions.
//!
//! A [`ColumnSchema`] is the declared shape of one sink table. It is the only
//! source of column identifiers that may appear in generated statements: any
//! document field without a matching column is dropped before it gets near
//! the sink.
//!
//! ## Configuration forms
//!
//! A schema deserializes from either an ordered list:
//!
//! ```yaml
//! - name: id
//!   type: number
//!   primary: true
//! - name: email
//!   type: text
//!   unique: true
//! ```
//!
//! or an object keyed by column name, whose key order is preserved:
//!
//! ```json
//! { "id": { "type": "number", "primary": true }, "email": { "type": "text" } }
//! ```

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Error Types
// ============================================================================

/// Error type for schema operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    /// Two columns share a name
    #[error("Duplicate column '{column}' in schema")]
    DuplicateColumn { column: String },

    /// Column has an empty name
    #[error("Column name must not be empty")]
    EmptyColumnName,

    /// Type tag outside the supported vocabulary
    #[error("Unknown column type '{0}'")]
    UnknownType(String),
}

// ============================================================================
// Column Types
// ============================================================================

/// Declared type of a sink column.
///
/// The set is intentionally small: it drives DDL generation and the (minimal)
/// value coercion. The sink performs final type enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Number,
    Boolean,
    Timestamp,
    Json,
}

impl ColumnType {
    /// Parse a type tag, accepting common SQL spellings.
    ///
    /// Matching is case-insensitive and ignores any length/precision suffix,
    /// so `VARCHAR(255)` and `numeric(10,2)` are accepted.
    pub fn parse(tag: &str) -> Result<Self, SchemaError> {
        let normalized = tag.trim().to_ascii_lowercase();
        let base = normalized
            .split('(')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        match base.as_str() {
            "text" | "string" | "varchar" | "char" | "character varying" | "uuid" => {
                Ok(Self::Text)
            }
            "number" | "numeric" | "decimal" | "integer" | "int" | "int4" | "int8"
            | "bigint" | "smallint" | "real" | "float" | "double" | "double precision"
            | "serial" | "bigserial" => Ok(Self::Number),
            "boolean" | "bool" => Ok(Self::Boolean),
            "timestamp" | "timestamptz" | "datetime" | "date" => Ok(Self::Timestamp),
            "json" | "jsonb" | "object" | "array" => Ok(Self::Json),
            _ => Err(SchemaError::UnknownType(tag.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        ColumnType::parse(&tag).map_err(de::Error::custom)
    }
}

// ============================================================================
// Column Definitions
// ============================================================================

/// A single column descriptor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDefinition {
    /// Column name, unique within the table
    pub name: String,

    /// Declared type
    #[serde(rename = "type")]
    pub column_type: ColumnType,

    /// Advisory PRIMARY KEY flag for DDL generation
    #[serde(rename = "primary")]
    pub primary_key: bool,

    /// Advisory UNIQUE flag for DDL generation
    pub unique: bool,
}

impl ColumnDefinition {
    /// Create a new column definition.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary_key: false,
            unique: false,
        }
    }

    /// Mark this column as the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark this column as unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Column attributes as written in configuration, without the name.
#[derive(Debug, Deserialize)]
struct ColumnSpec {
    #[serde(rename = "type")]
    column_type: ColumnType,
    #[serde(default, alias = "primaryKey", alias = "isPrimaryKey")]
    primary: bool,
    #[serde(default, alias = "isUnique")]
    unique: bool,
}

/// List-form column entry.
#[derive(Debug, Deserialize)]
struct NamedColumnSpec {
    #[serde(alias = "columnName")]
    name: String,
    #[serde(flatten)]
    spec: ColumnSpec,
}

impl ColumnSpec {
    fn into_definition(self, name: String) -> ColumnDefinition {
        ColumnDefinition {
            name,
            column_type: self.column_type,
            primary_key: self.primary,
            unique: self.unique,
        }
    }
}

// ============================================================================
// Column Schema
// ============================================================================

/// Ordered, validated sequence of column descriptors.
///
/// Column names are guaranteed unique and non-empty; a malformed schema cannot
/// be constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ColumnSchema {
    columns: Vec<ColumnDefinition>,
}

impl ColumnSchema {
    /// Build a schema, rejecting duplicate or empty column names.
    pub fn new(columns: Vec<ColumnDefinition>) -> Result<Self, SchemaError> {
        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if column.name.is_empty() {
                return Err(SchemaError::EmptyColumnName);
            }
            if !seen.insert(column.name.as_str()) {
                return Err(SchemaError::DuplicateColumn {
                    column: column.name.clone(),
                });
            }
        }
        Ok(Self { columns })
    }

    /// Find a column by name.
    pub fn get(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Check whether the schema declares a column.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Column definitions as written in configuration, not yet validated.
///
/// Accepts the same two forms as [`ColumnSchema`]. Converting it with
/// [`ColumnList::validate`] reports a malformed schema as a [`SchemaError`]
/// instead of a deserialization error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnList(pub Vec<ColumnDefinition>);

impl ColumnList {
    pub fn validate(self) -> Result<ColumnSchema, SchemaError> {
        ColumnSchema::new(self.0)
    }
}

impl<'de> Deserialize<'de> for ColumnList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ColumnListVisitor;

        impl<'de> Visitor<'de> for ColumnListVisitor {
            type Value = ColumnList;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a list of columns or a map of column name to column attributes")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut columns = Vec::new();
                while let Some(entry) = seq.next_element::<NamedColumnSpec>()? {
                    columns.push(entry.spec.into_definition(entry.name));
                }
                Ok(ColumnList(columns))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut columns = Vec::new();
                while let Some((name, spec)) = map.next_entry::<String, ColumnSpec>()? {
                    columns.push(spec.into_definition(name));
                }
                Ok(ColumnList(columns))
            }
        }

        deserializer.deserialize_any(ColumnListVisitor)
    }
}

impl<'de> Deserialize<'de> for ColumnSchema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        ColumnList::deserialize(deserializer)?
            .validate()
            .map_err(de::Error::custom)
    }
}

// ============================================================================
// Table Binding
// ============================================================================

/// Pairing of a source collection with its sink table and column schema.
///
/// Created once at startup and shared read-only by the reader and writer of
/// that collection.
#[derive(Debug, Clone, PartialEq)]
pub struct TableBinding {
    /// Source collection name
    pub collection: String,

    /// Target table name
    pub table: String,

    /// Declared columns of the target table
    pub schema: ColumnSchema,
}

impl TableBinding {
    pub fn new(
        collection: impl Into<String>,
        table: impl Into<String>,
        schema: ColumnSchema,
    ) -> Self {
        Self {
            collection: collection.into(),
            table: table.into(),
            schema,
        }
    }

    /// Wrap in an `Arc` for sharing between reader and writer tasks.
    pub fn shared(self) -> SharedBinding {
        Arc::new(self)
    }
}

/// Read-only handle to a table binding.
pub type SharedBinding = Arc<TableBinding>;
