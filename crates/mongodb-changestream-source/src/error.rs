//! Error types for the MongoDB readers.

use thiserror::Error;

/// Errors raised by the change stream and snapshot readers.
#[derive(Error, Debug)]
pub enum SourceError {
    /// MongoDB driver error
    #[error("MongoDB error: {0}")]
    MongoDB(#[from] mongodb::error::Error),

    /// Live feed failure (disconnect, invalidated cursor, ...)
    #[error("Change stream error on '{collection}': {message}")]
    Feed { collection: String, message: String },

    /// Snapshot cursor failure
    #[error("Snapshot scan error on '{collection}': {message}")]
    Scan { collection: String, message: String },

    /// A feed record that cannot be turned into a change event
    #[error("Malformed '{operation}' change: {message}")]
    Normalize { operation: String, message: String },

    /// A BSON value with no raw value counterpart
    #[error("Failed to convert BSON value: {0}")]
    Conversion(String),

    /// No database name in the configuration or the connection string
    #[error("MongoDB database name is required")]
    MissingDatabase,
}
