//! INSERT / UPDATE / DELETE statement text.
//!
//! Every value goes through [`escape_literal`]; every identifier comes from a
//! [`SinkValue`] (already matched against the schema) or from the schema
//! itself. Builders refuse inputs that would produce invalid or unbounded
//! statements.

use crate::literal::{escape_literal, quote_ident, NULL_LITERAL};
use crate::translate::SinkValue;
use sync_core::{ColumnSchema, RawValue};
use thiserror::Error;

/// Reasons a statement cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatementError {
    /// Insert with no column values
    #[error("no values to insert")]
    EmptyValues,

    /// Update with nothing to set
    #[error("no fields to set")]
    EmptySet,

    /// Update/delete whose identity predicate matched no column
    #[error("identity predicate is empty")]
    EmptyPredicate,

    /// Batched insert with no rows
    #[error("no rows to insert")]
    EmptyBatch,
}

/// `INSERT INTO "t" ("a", "b") VALUES (<a>, <b>)`
pub fn insert_statement(table: &str, values: &[SinkValue]) -> Result<String, StatementError> {
    if values.is_empty() {
        return Err(StatementError::EmptyValues);
    }
    let columns: Vec<String> = values.iter().map(|v| quote_ident(&v.column)).collect();
    let literals: Vec<String> = values.iter().map(|v| escape_literal(&v.value)).collect();
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        columns.join(", "),
        literals.join(", ")
    ))
}

/// Multi-row insert over the full declared schema.
///
/// The column list is every schema column in declaration order; a column
/// absent from a given row is written as `NULL`. Rows keep their order.
pub fn insert_rows_statement(
    table: &str,
    schema: &ColumnSchema,
    rows: &[Vec<SinkValue>],
) -> Result<String, StatementError> {
    if rows.is_empty() {
        return Err(StatementError::EmptyBatch);
    }
    if schema.is_empty() {
        return Err(StatementError::EmptyValues);
    }
    let columns: Vec<String> = schema.column_names().map(quote_ident).collect();
    let tuples: Vec<String> = rows
        .iter()
        .map(|row| {
            let literals: Vec<String> = schema
                .column_names()
                .map(|name| match row.iter().find(|v| v.column == name) {
                    Some(v) => escape_literal(&v.value),
                    None => NULL_LITERAL.to_string(),
                })
                .collect();
            format!("({})", literals.join(", "))
        })
        .collect();
    Ok(format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_ident(table),
        columns.join(", "),
        tuples.join(", ")
    ))
}

/// `UPDATE "t" SET "a" = <a>, "gone" = NULL WHERE "id" = <id>`
pub fn update_statement(
    table: &str,
    set: &[SinkValue],
    unset: &[String],
    identity: &[SinkValue],
) -> Result<String, StatementError> {
    if set.is_empty() {
        return Err(StatementError::EmptySet);
    }
    let predicate = where_clause(identity)?;
    let assignments: Vec<String> = set
        .iter()
        .map(|v| format!("{} = {}", quote_ident(&v.column), escape_literal(&v.value)))
        .chain(
            unset
                .iter()
                .map(|column| format!("{} = {}", quote_ident(column), NULL_LITERAL)),
        )
        .collect();
    Ok(format!(
        "UPDATE {} SET {} WHERE {}",
        quote_ident(table),
        assignments.join(", "),
        predicate
    ))
}

/// `DELETE FROM "t" WHERE "id" = <id>`
pub fn delete_statement(table: &str, identity: &[SinkValue]) -> Result<String, StatementError> {
    let predicate = where_clause(identity)?;
    Ok(format!(
        "DELETE FROM {} WHERE {}",
        quote_ident(table),
        predicate
    ))
}

fn where_clause(identity: &[SinkValue]) -> Result<String, StatementError> {
    if identity.is_empty() {
        return Err(StatementError::EmptyPredicate);
    }
    let terms: Vec<String> = identity
        .iter()
        .map(|v| match &v.value {
            RawValue::Null => format!("{} IS NULL", quote_ident(&v.column)),
            value => format!("{} = {}", quote_ident(&v.column), escape_literal(value)),
        })
        .collect();
    Ok(terms.join(" AND "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_core::{ColumnDefinition, ColumnType};

    fn schema() -> ColumnSchema {
        ColumnSchema::new(vec![
            ColumnDefinition::new("id", ColumnType::Number).primary_key(),
            ColumnDefinition::new("name", ColumnType::Text),
            ColumnDefinition::new("updatedAt", ColumnType::Timestamp),
        ])
        .unwrap()
    }

    #[test]
    fn test_insert_statement() {
        let sql = insert_statement(
            "t",
            &[
                SinkValue::new("id", 1),
                SinkValue::new("name", "a"),
                SinkValue::new("updatedAt", "2024-01-01 00:00:00"),
            ],
        )
        .unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"t\" (\"id\", \"name\", \"updatedAt\") \
             VALUES ($$1$$, $$a$$, $$2024-01-01 00:00:00$$)"
        );
    }

    #[test]
    fn test_insert_rows_fills_missing_columns_with_null() {
        let rows = vec![
            vec![SinkValue::new("name", "a"), SinkValue::new("id", 1)],
            vec![SinkValue::new("id", 2)],
        ];
        let sql = insert_rows_statement("t", &schema(), &rows).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"t\" (\"id\", \"name\", \"updatedAt\") \
             VALUES ($$1$$, $$a$$, NULL), ($$2$$, NULL, NULL)"
        );
    }

    #[test]
    fn test_update_statement_with_unsets() {
        let sql = update_statement(
            "t",
            &[SinkValue::new("name", "b")],
            &["updatedAt".to_string()],
            &[SinkValue::new("id", 1)],
        )
        .unwrap();
        assert_eq!(
            sql,
            "UPDATE \"t\" SET \"name\" = $$b$$, \"updatedAt\" = NULL WHERE \"id\" = $$1$$"
        );
    }

    #[test]
    fn test_update_requires_set_and_predicate() {
        assert_eq!(
            update_statement("t", &[], &["name".to_string()], &[SinkValue::new("id", 1)]),
            Err(StatementError::EmptySet)
        );
        assert_eq!(
            update_statement("t", &[SinkValue::new("name", "b")], &[], &[]),
            Err(StatementError::EmptyPredicate)
        );
    }

    #[test]
    fn test_delete_statement_joins_predicate_with_and() {
        let sql = delete_statement(
            "t",
            &[SinkValue::new("id", 1), SinkValue::new("name", RawValue::Null)],
        )
        .unwrap();
        assert_eq!(
            sql,
            "DELETE FROM \"t\" WHERE \"id\" = $$1$$ AND \"name\" IS NULL"
        );
        assert_eq!(delete_statement("t", &[]), Err(StatementError::EmptyPredicate));
    }

    #[test]
    fn test_empty_inputs_are_rejected() {
        assert_eq!(insert_statement("t", &[]), Err(StatementError::EmptyValues));
        assert_eq!(
            insert_rows_statement("t", &schema(), &[]),
            Err(StatementError::EmptyBatch)
        );
    }
}
