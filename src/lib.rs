//! mongo2pg
//!
//! Replicates MongoDB collections into PostgreSQL tables. Each configured
//! collection can be caught up once from a full scan and then followed
//! through its change stream.
//!
//! # Crates
//!
//! - `sync_core` - change events, raw values, column schemas
//! - `postgresql_types` - value translation and SQL statement text
//! - `postgresql_sink` - statement execution and batched inserts
//! - `mongodb_changestream_source` - change stream and snapshot readers
//!
//! # CLI Usage
//!
//! ```bash
//! # Catch up every collection, then listen
//! mongo2pg start config.json --create-tables --sync-all --bulk-insert 500
//!
//! # Listen to two collections only, exit on the first feed error
//! mongo2pg start config.yaml --listen-only users,orders --strict-listen
//! ```

use clap::{Parser, ValueEnum};
use mongodb_changestream_source::ExponentialBackoff;
use postgresql_types::TimestampStyle;
use std::time::Duration;

pub mod config;
pub mod logging;
pub mod progress;
pub mod shutdown;
pub mod sync;

pub use config::{CollectionConfig, Config, ConfigError};
pub use sync::{
    plan_collection, CollectionPlan, PipelineReport, PipelineState, Replicator, RunOptions,
    RunOutcome,
};

/// Upper bound of the reconnect backoff.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Timestamp column rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum TimestampStyleArg {
    /// Date and time of day in UTC
    #[default]
    Utc,
    /// UTC date with the local time of day
    LegacyLocal,
}

impl From<TimestampStyleArg> for TimestampStyle {
    fn from(style: TimestampStyleArg) -> Self {
        match style {
            TimestampStyleArg::Utc => TimestampStyle::Utc,
            TimestampStyleArg::LegacyLocal => TimestampStyle::LegacyLocal,
        }
    }
}

/// Options of the `start` command.
#[derive(Parser, Clone, Debug, Default)]
pub struct StartOpts {
    /// Create every bound table with CREATE TABLE IF NOT EXISTS
    #[arg(long)]
    pub create_tables: bool,

    /// Catch up every configured collection before listening
    #[arg(long)]
    pub sync_all: bool,

    /// Catch up only these collections (comma-separated)
    #[arg(long, value_delimiter = ',', value_name = "COLLECTIONS")]
    pub sync_all_only: Vec<String>,

    /// Listen only to these collections (comma-separated); they never catch up
    #[arg(long, value_delimiter = ',', value_name = "COLLECTIONS")]
    pub listen_only: Vec<String>,

    /// Batch catch-up inserts, flushing every N rows (default: 10)
    #[arg(long, value_name = "N", num_args = 0..=1, default_missing_value = "10")]
    pub bulk_insert: Option<usize>,

    /// Exit with an error when a change stream fails
    #[arg(long)]
    pub strict_listen: bool,

    /// Log level: error, warn, info, http, verbose, debug, silly, or a RUST_LOG directive
    #[arg(long, env = "MONGO2PG_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Give up reopening a stream after this many attempts (0 = never give up)
    #[arg(long, default_value = "0")]
    pub max_reconnect_attempts: u32,

    /// Initial reconnect delay in milliseconds, doubled per attempt up to 30s
    #[arg(long, default_value = "100")]
    pub reconnect_backoff_ms: u64,

    /// Timestamp column rendering
    #[arg(long, value_enum, default_value_t = TimestampStyleArg::Utc)]
    pub timestamp_style: TimestampStyleArg,
}

impl StartOpts {
    /// Retry strategy shared by feed reopen and scan restart.
    pub fn retry_policy(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.reconnect_backoff_ms),
            MAX_RECONNECT_DELAY,
        )
        .with_max_attempts(self.max_reconnect_attempts)
    }
}

impl From<&StartOpts> for RunOptions {
    fn from(opts: &StartOpts) -> Self {
        Self {
            create_tables: opts.create_tables,
            sync_all: opts.sync_all,
            sync_all_only: opts.sync_all_only.clone(),
            listen_only: opts.listen_only.clone(),
            bulk_insert: opts.bulk_insert,
            strict_listen: opts.strict_listen,
        }
    }
}
