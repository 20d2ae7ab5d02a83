//! Configuration file loading and validation.
//!
//! The file format follows the extension: `.yaml`/`.yml` and `.toml` are
//! read with their respective parsers, everything else as JSON.
//!
//! ```json
//! {
//!   "mongo": {
//!     "connection": { "uri": "mongodb://localhost:27017/app" },
//!     "collectionModels": {
//!       "users": { "_id": { "type": "text", "primary": true }, "name": { "type": "text" } }
//!     }
//!   },
//!   "postgres": { "connection": { "config": "postgresql://postgres@localhost/app" } },
//!   "sync": [{ "collection": "users", "watchOperations": ["insert", "update", "delete"] }]
//! }
//! ```

use mongodb::options::ConnectionString;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use sync_core::{ColumnList, OperationKind, SchemaError, SharedBinding, TableBinding};
use thiserror::Error;

/// Errors raised while loading the configuration. All of them are fatal
/// before any store connection is opened.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid column schema for collection '{collection}': {source}")]
    SchemaMismatch {
        collection: String,
        #[source]
        source: SchemaError,
    },

    #[error("Sync entry references collection '{0}' which has no model in mongo.collectionModels")]
    UnknownCollection(String),

    #[error("No MongoDB database given: set mongo.connection.database or add it to the URI")]
    MissingDatabase,

    #[error("Bulk insert size must be at least 1")]
    ZeroBulkInsert,
}

/// Top-level configuration document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub mongo: MongoConfig,
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub sync: Vec<SyncEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoConfig {
    pub connection: MongoConnection,
    #[serde(default)]
    pub collection_models: HashMap<String, ColumnList>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoConnection {
    pub uri: String,
    #[serde(default)]
    pub database: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostgresConfig {
    pub connection: PostgresConnection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostgresConnection {
    /// libpq-style key/value string or `postgresql://` URL
    pub config: String,
}

/// One replicated collection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEntry {
    pub collection: String,
    /// Target table; defaults to the collection name
    #[serde(default)]
    pub table: Option<String>,
    /// Operation names; unknown names are ignored
    #[serde(default)]
    pub watch_operations: Vec<String>,
    #[serde(default)]
    pub sync_all: bool,
}

/// A validated sync entry, ready for the orchestrator.
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    pub binding: SharedBinding,
    pub operations: Vec<OperationKind>,
    /// Bulk catch-up requested by the config file
    pub sync_all: bool,
}

impl CollectionConfig {
    pub fn collection(&self) -> &str {
        &self.binding.collection
    }
}

enum Format {
    Json,
    Yaml,
    Toml,
}

impl Format {
    fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("yaml") | Some("yml") => Self::Yaml,
            Some("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

impl Config {
    /// Read, parse and validate a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content, Format::from_path(path)).map_err(|message| {
            ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document without touching the filesystem.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config = Self::parse(content, Format::Json).map_err(|message| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            message,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str, format: Format) -> Result<Self, String> {
        match format {
            Format::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
            Format::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            Format::Toml => toml::from_str(content).map_err(|e| e.to_string()),
        }
    }

    /// Check everything that can be checked without a connection.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database_name()?;
        self.collections()?;
        Ok(())
    }

    /// Source database: explicit setting first, then the URI path.
    pub fn database_name(&self) -> Result<String, ConfigError> {
        self.mongo
            .connection
            .database
            .clone()
            .filter(|db| !db.is_empty())
            .or_else(|| uri_database(&self.mongo.connection.uri))
            .ok_or(ConfigError::MissingDatabase)
    }

    /// Resolve every sync entry to a table binding, in file order.
    pub fn collections(&self) -> Result<Vec<CollectionConfig>, ConfigError> {
        self.sync
            .iter()
            .map(|entry| {
                let columns = self
                    .mongo
                    .collection_models
                    .get(&entry.collection)
                    .ok_or_else(|| ConfigError::UnknownCollection(entry.collection.clone()))?;
                let schema =
                    columns
                        .clone()
                        .validate()
                        .map_err(|source| ConfigError::SchemaMismatch {
                            collection: entry.collection.clone(),
                            source,
                        })?;
                let table = entry
                    .table
                    .clone()
                    .unwrap_or_else(|| entry.collection.clone());
                Ok(CollectionConfig {
                    binding: TableBinding::new(&entry.collection, table, schema).shared(),
                    operations: OperationKind::parse_all(&entry.watch_operations),
                    sync_all: entry.sync_all,
                })
            })
            .collect()
    }
}

/// Default database of a connection string, as the driver reads it.
fn uri_database(uri: &str) -> Option<String> {
    ConnectionString::parse(uri).ok()?.default_database
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use sync_core::ColumnType;

    const JSON_CONFIG: &str = r#"{
        "mongo": {
            "connection": { "uri": "mongodb://localhost:27017/app?replicaSet=rs0" },
            "collectionModels": {
                "users": {
                    "_id": { "type": "text", "primary": true },
                    "email": { "type": "varchar", "unique": true },
                    "createdAt": { "type": "timestamp" }
                }
            }
        },
        "postgres": { "connection": { "config": "host=localhost user=postgres" } },
        "sync": [
            { "collection": "users", "watchOperations": ["INSERT", "update", "upsert"], "syncAll": true }
        ]
    }"#;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_json_config() {
        let file = write_temp(".json", JSON_CONFIG);
        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(config.database_name().unwrap(), "app");
        let collections = config.collections().unwrap();
        assert_eq!(collections.len(), 1);

        let users = &collections[0];
        assert_eq!(users.binding.table, "users");
        assert!(users.sync_all);
        assert_eq!(
            users.operations,
            vec![OperationKind::Insert, OperationKind::Update]
        );
        assert_eq!(
            users.binding.schema.column_names().collect::<Vec<_>>(),
            vec!["_id", "email", "createdAt"]
        );
        assert_eq!(
            users.binding.schema.get("email").unwrap().column_type,
            ColumnType::Text
        );
    }

    #[test]
    fn test_load_yaml_config_with_list_schema() {
        let yaml = r#"
mongo:
  connection:
    uri: mongodb://localhost:27017
    database: shop
  collectionModels:
    orders:
      - name: _id
        type: text
        primary: true
      - name: total
        type: number
postgres:
  connection:
    config: postgresql://postgres@localhost/shop
sync:
  - collection: orders
    table: order_rows
    watchOperations: [insert, delete]
"#;
        let file = write_temp(".yaml", yaml);
        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(config.database_name().unwrap(), "shop");
        let orders = &config.collections().unwrap()[0];
        assert_eq!(orders.binding.table, "order_rows");
        assert!(!orders.sync_all);
        assert_eq!(orders.binding.schema.len(), 2);
    }

    #[test]
    fn test_load_toml_config() {
        let toml = r#"
[mongo.connection]
uri = "mongodb://localhost:27017/app"

[mongo.collectionModels.users._id]
type = "text"
primary = true

[postgres.connection]
config = "host=localhost"

[[sync]]
collection = "users"
watchOperations = ["insert"]
"#;
        let file = write_temp(".toml", toml);
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.collections().unwrap()[0].collection(), "users");
    }

    #[test]
    fn test_duplicate_column_is_schema_mismatch() {
        let json = r#"{
            "mongo": {
                "connection": { "uri": "mongodb://localhost/app" },
                "collectionModels": {
                    "users": [
                        { "name": "id", "type": "number" },
                        { "name": "id", "type": "text" }
                    ]
                }
            },
            "postgres": { "connection": { "config": "host=localhost" } },
            "sync": [{ "collection": "users" }]
        }"#;
        let err = Config::from_json(json).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::SchemaMismatch { ref collection, .. } if collection == "users"
        ));
    }

    #[test]
    fn test_unknown_collection_is_rejected() {
        let json = JSON_CONFIG.replace(r#""collection": "users""#, r#""collection": "ghosts""#);
        let err = Config::from_json(&json).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownCollection(ref c) if c == "ghosts"));
    }

    #[test]
    fn test_missing_database_is_rejected() {
        let json = JSON_CONFIG.replace("27017/app?replicaSet=rs0", "27017");
        let err = Config::from_json(&json).unwrap_err();
        assert!(matches!(err, ConfigError::MissingDatabase));
    }

    #[test]
    fn test_unreadable_and_unparseable_files() {
        let err = Config::from_file("/nonexistent/mongo2pg.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));

        let file = write_temp(".json", "{ not json");
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_uri_database() {
        assert_eq!(uri_database("mongodb://h:1/db"), Some("db".to_string()));
        assert_eq!(
            uri_database("mongodb+srv://u:p@cluster0.example.com/db?retryWrites=true"),
            Some("db".to_string())
        );
        assert_eq!(
            uri_database("mongodb://us%2Fer:p%40ss@h1:1,h2:2/app?authSource=admin"),
            Some("app".to_string())
        );
        assert_eq!(uri_database("mongodb://h:1/"), None);
        assert_eq!(uri_database("mongodb://h:1"), None);
    }

    #[test]
    fn test_uri_database_rejects_malformed_uri() {
        assert_eq!(uri_database("localhost:27017/db"), None);
        assert_eq!(uri_database("postgres://h:1/db"), None);
    }
}
