//! Error types for the PostgreSQL sink.

use postgresql_types::StatementError;
use thiserror::Error;

/// Errors raised while applying statements to the sink.
#[derive(Error, Debug)]
pub enum SinkError {
    /// PostgreSQL connection or query error.
    #[error("PostgreSQL error: {0}")]
    PostgreSQL(#[from] tokio_postgres::Error),

    /// The sink connection has been closed.
    #[error("Sink connection is closed")]
    Closed,

    /// Statement could not be built from the given values.
    #[error("Invalid statement: {0}")]
    Statement(#[from] StatementError),

    /// Statement rejected by the executor (used by non-PostgreSQL executors).
    #[error("Statement failed: {0}")]
    Execution(String),
}
