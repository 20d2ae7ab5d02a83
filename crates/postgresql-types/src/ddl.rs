//! PostgreSQL DDL generation from column schemas.

use crate::literal::quote_ident;
use sync_core::{ColumnDefinition, ColumnSchema, ColumnType};

/// Trait for generating DDL type strings.
pub trait ToDdl {
    /// Convert a declared column type to a DDL type string.
    fn to_ddl(&self, column_type: ColumnType) -> String;

    /// Generate a complete CREATE TABLE statement.
    fn to_create_table(&self, table_name: &str, schema: &ColumnSchema, if_not_exists: bool)
        -> String;
}

/// PostgreSQL DDL generator.
pub struct PostgreSQLDdl;

impl PostgreSQLDdl {
    /// `"<name>" <type>[ PRIMARY KEY][ UNIQUE]`; a primary key never also gets UNIQUE.
    fn column_clause(&self, column: &ColumnDefinition) -> String {
        let mut clause = format!(
            "{} {}",
            quote_ident(&column.name),
            self.to_ddl(column.column_type)
        );
        if column.primary_key {
            clause.push_str(" PRIMARY KEY");
        } else if column.unique {
            clause.push_str(" UNIQUE");
        }
        clause
    }
}

impl ToDdl for PostgreSQLDdl {
    fn to_ddl(&self, column_type: ColumnType) -> String {
        match column_type {
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Number => "NUMERIC".to_string(),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Timestamp => "TIMESTAMP".to_string(),
            ColumnType::Json => "JSONB".to_string(),
        }
    }

    fn to_create_table(
        &self,
        table_name: &str,
        schema: &ColumnSchema,
        if_not_exists: bool,
    ) -> String {
        let column_defs: Vec<String> = schema
            .columns()
            .iter()
            .map(|column| self.column_clause(column))
            .collect();

        format!(
            "CREATE TABLE {}{} ({})",
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            quote_ident(table_name),
            column_defs.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table_if_not_exists() {
        let schema = ColumnSchema::new(vec![
            ColumnDefinition::new("id", ColumnType::Number).primary_key(),
            ColumnDefinition::new("email", ColumnType::Text).unique(),
            ColumnDefinition::new("updatedAt", ColumnType::Timestamp),
            ColumnDefinition::new("meta", ColumnType::Json),
        ])
        .unwrap();

        let sql = PostgreSQLDdl.to_create_table("users", &schema, true);
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"users\" (\"id\" NUMERIC PRIMARY KEY, \
             \"email\" TEXT UNIQUE, \"updatedAt\" TIMESTAMP, \"meta\" JSONB)"
        );
    }

    #[test]
    fn test_primary_key_omits_unique() {
        let schema = ColumnSchema::new(vec![ColumnDefinition::new("id", ColumnType::Text)
            .primary_key()
            .unique()])
        .unwrap();

        let sql = PostgreSQLDdl.to_create_table("t", &schema, false);
        assert_eq!(sql, "CREATE TABLE \"t\" (\"id\" TEXT PRIMARY KEY)");
    }
}
