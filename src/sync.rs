//! Replication orchestrator.
//!
//! Every configured collection gets its own pipeline task:
//!
//! ```text
//! Idle ──> [BulkSyncing] ──> [Listening] ──> Terminated
//! ```
//!
//! Bulk catch-up drains a [`SnapshotReader`] scan through the table's writer
//! session in queued-insert mode. Listening drains a [`ChangeStreamReader`]
//! and applies each event directly. Pipelines share one sink connection but
//! never share an insert buffer.

use crate::config::{CollectionConfig, ConfigError};
use crate::progress::{ScanProgress, CHANGES_EVERY};
use anyhow::Context;
use mongodb_changestream_source::{
    ChangeStreamReader, FeedConnector, SnapshotReader, SnapshotSource,
};
use postgresql_sink::{InsertOptions, SinkWriter, StatementExecutor, TableWriter, DEFAULT_BUFFER_LIMIT};
use std::fmt;
use std::sync::Arc;
use sync_core::{ChangeEvent, ControlSignal};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Run-wide switches from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Issue `CREATE TABLE IF NOT EXISTS` for every binding before starting
    pub create_tables: bool,
    /// Bulk catch-up for every collection
    pub sync_all: bool,
    /// Bulk catch-up for these collections
    pub sync_all_only: Vec<String>,
    /// Listen to these collections only; they never bulk-sync
    pub listen_only: Vec<String>,
    /// Queued inserts with this buffer limit during catch-up
    pub bulk_insert: Option<usize>,
    /// A feed error terminates the process
    pub strict_listen: bool,
}

impl RunOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bulk_insert == Some(0) {
            return Err(ConfigError::ZeroBulkInsert);
        }
        Ok(())
    }

    fn buffer_limit(&self) -> usize {
        self.bulk_insert.unwrap_or(DEFAULT_BUFFER_LIMIT)
    }
}

/// Per-collection pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    BulkSyncing,
    Listening,
    Terminated,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::BulkSyncing => "bulk-syncing",
            Self::Listening => "listening",
            Self::Terminated => "terminated",
        })
    }
}

/// Which stages a collection goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionPlan {
    pub bulk_sync: bool,
    pub listen: bool,
}

/// Decide the stages of one collection.
///
/// Catch-up runs when requested globally, by name, or by the collection's
/// own `syncAll`, unless the collection is in the listen-only list. A
/// non-empty listen-only list restricts listening to the collections it names.
pub fn plan_collection(config: &CollectionConfig, options: &RunOptions) -> CollectionPlan {
    let name = config.collection();
    let listen_only = options.listen_only.iter().any(|c| c == name);
    let requested = options.sync_all
        || options.sync_all_only.iter().any(|c| c == name)
        || config.sync_all;
    CollectionPlan {
        bulk_sync: requested && !listen_only,
        listen: options.listen_only.is_empty() || listen_only,
    }
}

/// How a pipeline finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub collection: String,
    pub state: PipelineState,
    /// Documents written during catch-up
    pub scanned: u64,
    /// Live changes handled
    pub changes: u64,
    /// The feed failed while `strict_listen` was set
    pub strict_failure: bool,
}

/// How the whole run finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every pipeline reached `Terminated` on its own
    Completed(Vec<PipelineReport>),
    /// Stopped by the shutdown signal
    Interrupted(Vec<PipelineReport>),
    /// A feed failed under `strict_listen`; the other pipelines were stopped
    StrictFailure {
        collection: String,
        reports: Vec<PipelineReport>,
    },
}

/// Wires readers and the sink writer for every configured collection.
pub struct Replicator<C, S, E> {
    feeds: ChangeStreamReader<C>,
    snapshots: SnapshotReader<S>,
    writer: SinkWriter<E>,
    options: Arc<RunOptions>,
    cancel: CancellationToken,
}

impl<C, S, E> Replicator<C, S, E>
where
    C: FeedConnector,
    S: SnapshotSource,
    E: StatementExecutor + 'static,
{
    pub fn new(
        feeds: ChangeStreamReader<C>,
        snapshots: SnapshotReader<S>,
        writer: SinkWriter<E>,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            feeds,
            snapshots,
            writer,
            options: Arc::new(options),
            cancel,
        }
    }

    /// Run every pipeline to completion.
    pub async fn run(&self, collections: Vec<CollectionConfig>) -> anyhow::Result<RunOutcome> {
        self.options.validate()?;

        if self.options.create_tables {
            for config in &collections {
                self.writer
                    .create_table(&config.binding, true)
                    .await
                    .with_context(|| {
                        format!("Failed to create table '{}'", config.binding.table)
                    })?;
                info!("Table '{}' is ready", config.binding.table);
            }
        }

        let plans: Vec<_> = collections
            .into_iter()
            .map(|config| {
                let plan = plan_collection(&config, &self.options);
                (config, plan)
            })
            .collect();
        if !plans.iter().any(|(_, plan)| plan.listen) {
            info!("No collection has a live listener; stopping after catch-up");
        }

        let mut tasks = JoinSet::new();
        for (config, plan) in plans {
            let pipeline = Pipeline {
                session: self
                    .writer
                    .session(Arc::clone(&config.binding), self.options.buffer_limit()),
                config,
                plan,
                feeds: self.feeds.clone(),
                snapshots: self.snapshots.clone(),
                options: Arc::clone(&self.options),
                cancel: self.cancel.clone(),
                state: PipelineState::Idle,
                scanned: 0,
                changes: 0,
            };
            tasks.spawn(pipeline.run());
        }

        let mut reports = Vec::new();
        let mut failed = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => {
                    if report.strict_failure && failed.is_none() {
                        error!(
                            "Stopping all pipelines after change stream failure on '{}'",
                            report.collection
                        );
                        failed = Some(report.collection.clone());
                        self.cancel.cancel();
                    }
                    reports.push(report);
                }
                Err(e) => error!("Pipeline task failed: {e}"),
            }
        }

        Ok(match failed {
            Some(collection) => RunOutcome::StrictFailure {
                collection,
                reports,
            },
            None if self.cancel.is_cancelled() => RunOutcome::Interrupted(reports),
            None => RunOutcome::Completed(reports),
        })
    }

    pub fn writer(&self) -> &SinkWriter<E> {
        &self.writer
    }
}

struct Pipeline<C, S, E> {
    config: CollectionConfig,
    plan: CollectionPlan,
    feeds: ChangeStreamReader<C>,
    snapshots: SnapshotReader<S>,
    session: TableWriter<E>,
    options: Arc<RunOptions>,
    cancel: CancellationToken,
    state: PipelineState,
    scanned: u64,
    changes: u64,
}

impl<C, S, E> Pipeline<C, S, E>
where
    C: FeedConnector,
    S: SnapshotSource,
    E: StatementExecutor + 'static,
{
    async fn run(mut self) -> PipelineReport {
        let mut strict_failure = false;

        if self.plan.bulk_sync && !self.cancel.is_cancelled() {
            self.transition(PipelineState::BulkSyncing);
            self.bulk_sync().await;
        }
        if self.plan.listen && !self.cancel.is_cancelled() {
            self.transition(PipelineState::Listening);
            strict_failure = self.listen().await;
        }
        self.transition(PipelineState::Terminated);

        PipelineReport {
            collection: self.config.collection().to_string(),
            state: self.state,
            scanned: self.scanned,
            changes: self.changes,
            strict_failure,
        }
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(
            "Pipeline '{}': {} -> {}",
            self.config.collection(),
            self.state,
            next
        );
        self.state = next;
    }

    async fn bulk_sync(&mut self) {
        let collection = self.config.collection().to_string();
        info!("Starting catch-up of '{}'", collection);

        let scan = match self
            .snapshots
            .scan(
                Arc::clone(&self.config.binding),
                bson::Document::new(),
                self.cancel.clone(),
            )
            .await
        {
            Ok(scan) => scan,
            Err(e) => {
                error!("Failed to start catch-up of '{}': {}", collection, e);
                return;
            }
        };

        let use_queue = self.options.bulk_insert.is_some();
        let mut progress = ScanProgress::new(&collection, scan.total);
        let mut steps = scan.steps;
        while let Some(delivery) = steps.recv().await {
            let (step, ack) = delivery.into_parts();
            match step.event {
                ChangeEvent::Control(ControlSignal::Ended) => {
                    self.flush(&collection).await;
                    progress.finish();
                    info!("Catch-up of '{}' complete", collection);
                }
                ChangeEvent::Control(ControlSignal::Errored) => {
                    error!(
                        "Catch-up of '{}' gave up after repeated cursor errors",
                        collection
                    );
                    self.flush(&collection).await;
                }
                ChangeEvent::Control(ControlSignal::Closed) => break,
                event => {
                    let options = InsertOptions {
                        use_queue,
                        force_send: !step.has_next,
                    };
                    if let Err(e) = self.session.apply(&event, options).await {
                        error!("Failed to write document of '{}': {}", collection, e);
                    }
                    progress.tick();
                }
            }
            ack.done();
        }
        self.scanned = progress.count();
    }

    async fn flush(&mut self, collection: &str) {
        if let Err(e) = self.session.flush().await {
            error!("Failed to flush buffered rows of '{}': {}", collection, e);
        }
    }

    /// Returns `true` on a strict-mode feed failure.
    async fn listen(&mut self) -> bool {
        let collection = self.config.collection().to_string();
        let mut deliveries = self.feeds.watch(
            Arc::clone(&self.config.binding),
            self.config.operations.clone(),
            self.cancel.clone(),
        );

        while let Some(delivery) = deliveries.recv().await {
            let (item, ack) = delivery.into_parts();
            match item {
                Err(e) => error!("Dropping change on '{}': {}", collection, e),
                Ok(ChangeEvent::Control(ControlSignal::Errored)) => {
                    if self.options.strict_listen {
                        error!(
                            "Change stream on '{}' failed and --strict-listen is set",
                            collection
                        );
                        return true;
                    }
                    warn!("Change stream on '{}' errored", collection);
                }
                Ok(ChangeEvent::Control(ControlSignal::Ended)) => {
                    info!("Change stream on '{}' ended", collection);
                }
                Ok(ChangeEvent::Control(ControlSignal::Closed)) => break,
                Ok(event) => {
                    if let Err(e) = self.session.apply(&event, InsertOptions::direct()).await {
                        error!(
                            "Failed to apply {} on '{}': {}",
                            event.kind(),
                            collection,
                            e
                        );
                    }
                    self.changes += 1;
                    if self.changes % CHANGES_EVERY == 0 {
                        info!("Processed {} changes", self.changes);
                    }
                }
            }
            ack.done();
        }

        info!(
            "Stopped listening to '{}'. Processed {} changes",
            collection, self.changes
        );
        false
    }
}
