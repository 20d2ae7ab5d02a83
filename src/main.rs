//! Command-line interface for mongo2pg
//!
//! # Usage Examples
//!
//! ```bash
//! # Create tables, catch up every collection in batches of 500, then listen
//! mongo2pg start mongo2pg.json --create-tables --sync-all --bulk-insert 500
//!
//! # Catch up `users` only; listen to everything
//! mongo2pg start mongo2pg.yaml --sync-all-only users
//!
//! # Listen to `orders` only and exit with status 1 on a change stream error
//! mongo2pg start mongo2pg.toml --listen-only orders --strict-listen
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use mongo2pg::{logging, shutdown, Config, Replicator, RunOptions, RunOutcome, StartOpts};
use mongodb_changestream_source::{ChangeStreamReader, MongoSource, SnapshotReader, SourceOpts};
use postgresql_sink::{PostgresExecutor, SinkWriter};
use postgresql_types::ValueTranslator;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "mongo2pg")]
#[command(about = "Replicate MongoDB collections into PostgreSQL tables")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start replicating the collections of a config file
    Start {
        /// Path to the JSON, YAML or TOML config file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        #[command(flatten)]
        opts: StartOpts,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config, opts } => {
            logging::init(opts.log_level.as_deref());
            run_start(config, opts).await
        }
    }
}

async fn run_start(config_path: PathBuf, opts: StartOpts) -> anyhow::Result<()> {
    let config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {config_path:?}"))?;
    let run_options = RunOptions::from(&opts);
    run_options.validate()?;
    let collections = config.collections()?;
    info!(
        "Loaded {} collection(s) from {:?}",
        collections.len(),
        config_path
    );

    let retry = Arc::new(opts.retry_policy());
    debug!("Reconnect policy: {:?}", retry);

    let source = Arc::new(
        MongoSource::connect(&SourceOpts {
            source_uri: config.mongo.connection.uri.clone(),
            source_database: Some(config.database_name()?),
        })
        .await
        .context("Failed to connect to MongoDB")?,
    );
    let executor = Arc::new(
        PostgresExecutor::connect(&config.postgres.connection.config)
            .await
            .context("Failed to connect to PostgreSQL")?,
    );

    let cancel = CancellationToken::new();
    shutdown::setup_shutdown_handler(cancel.clone());

    let writer = SinkWriter::new(Arc::clone(&executor))
        .with_translator(ValueTranslator::new(opts.timestamp_style.into()));
    let replicator = Replicator::new(
        ChangeStreamReader::new(Arc::clone(&source), retry.clone()),
        SnapshotReader::new(Arc::clone(&source), retry),
        writer,
        run_options,
        cancel.clone(),
    );

    let outcome = replicator.run(collections).await;

    // Stop any reader still running before the connections go away
    cancel.cancel();
    let writer = replicator.writer().clone();
    drop(replicator);
    let released =
        shutdown::release_connections(writer.close(), MongoSource::clone(&source).shutdown())
            .await;

    let outcome = outcome?;
    released?;
    match outcome {
        RunOutcome::Completed(reports) => {
            info!("All {} pipeline(s) finished", reports.len());
            Ok(())
        }
        RunOutcome::Interrupted(reports) => {
            info!("Stopped {} pipeline(s) on shutdown signal", reports.len());
            Ok(())
        }
        RunOutcome::StrictFailure { collection, .. } => Err(anyhow::anyhow!(
            "Change stream on '{collection}' failed with --strict-listen set"
        )),
    }
}
