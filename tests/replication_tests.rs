//! End-to-end replication through in-memory feeds, collections and executor.

use bson::doc;
use mongo2pg::{CollectionConfig, PipelineState, Replicator, RunOptions, RunOutcome};
use mongodb_changestream_source::testing::{FeedStep, MemoryCollection, ScriptedConnector};
use mongodb_changestream_source::{
    ChangeStreamReader, FeedRecord, ImmediateRetry, RetryPolicy, SnapshotReader,
};
use postgresql_sink::testing::MemoryExecutor;
use postgresql_sink::SinkWriter;
use std::sync::Arc;
use std::time::Duration;
use sync_core::{ColumnDefinition, ColumnSchema, ColumnType, OperationKind, TableBinding};
use tokio_util::sync::CancellationToken;

const COLUMNS: &str = "\"id\", \"name\", \"updatedAt\"";

fn collection_config(sync_all: bool) -> CollectionConfig {
    let schema = ColumnSchema::new(vec![
        ColumnDefinition::new("id", ColumnType::Number).primary_key(),
        ColumnDefinition::new("name", ColumnType::Text),
        ColumnDefinition::new("updatedAt", ColumnType::Timestamp),
    ])
    .unwrap();
    CollectionConfig {
        binding: TableBinding::new("things", "t", schema).shared(),
        operations: vec![
            OperationKind::Insert,
            OperationKind::Update,
            OperationKind::Delete,
        ],
        sync_all,
    }
}

struct Harness {
    executor: Arc<MemoryExecutor>,
    connector: Arc<ScriptedConnector>,
    collection: Arc<MemoryCollection>,
    cancel: CancellationToken,
    replicator: Replicator<ScriptedConnector, MemoryCollection, MemoryExecutor>,
}

fn harness(
    sessions: Vec<Vec<FeedStep>>,
    collection: MemoryCollection,
    retry: impl RetryPolicy + 'static,
    options: RunOptions,
) -> Harness {
    let executor = Arc::new(MemoryExecutor::new());
    let connector = Arc::new(ScriptedConnector::new(sessions));
    let collection = Arc::new(collection);
    let retry: Arc<dyn RetryPolicy> = Arc::new(retry);
    let cancel = CancellationToken::new();
    let replicator = Replicator::new(
        ChangeStreamReader::new(Arc::clone(&connector), Arc::clone(&retry)),
        SnapshotReader::new(Arc::clone(&collection), retry),
        SinkWriter::new(Arc::clone(&executor)),
        options,
        cancel.clone(),
    );
    Harness {
        executor,
        connector,
        collection,
        cancel,
        replicator,
    }
}

async fn run(harness: &Harness, config: CollectionConfig) -> RunOutcome {
    tokio::time::timeout(Duration::from_secs(5), harness.replicator.run(vec![config]))
        .await
        .expect("replication did not finish")
        .unwrap()
}

fn completed(outcome: RunOutcome) -> Vec<mongo2pg::PipelineReport> {
    match outcome {
        RunOutcome::Completed(reports) => reports,
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_live_insert_is_applied() {
    let h = harness(
        vec![vec![
            FeedStep::Record(FeedRecord::insert(doc! {
                "_id": "65a1",
                "id": 1,
                "name": "a",
                "updatedAt": "2024-01-01T00:00:00Z",
                "__v": 0,
            })),
            FeedStep::End,
        ]],
        MemoryCollection::default(),
        ImmediateRetry::unbounded(),
        RunOptions::default(),
    );

    let reports = completed(run(&h, collection_config(false)).await);

    assert_eq!(
        h.executor.statements(),
        vec![format!(
            "INSERT INTO \"t\" ({COLUMNS}) VALUES ($$1$$, $$a$$, $$2024-01-01 00:00:00$$)"
        )]
    );
    assert_eq!(reports[0].state, PipelineState::Terminated);
    assert_eq!(reports[0].changes, 1);
    assert_eq!(h.collection.opens(), 0);
    assert_eq!(
        h.connector.filters(),
        vec![vec![
            OperationKind::Insert,
            OperationKind::Update,
            OperationKind::Delete
        ]]
    );
}

#[tokio::test]
async fn test_live_updates_and_deletes() {
    let h = harness(
        vec![vec![
            FeedStep::Record(FeedRecord::update(
                doc! { "id": 1 },
                doc! { "name": "b" },
                vec![],
            )),
            FeedStep::Record(FeedRecord::update(
                doc! { "id": 1 },
                doc! {},
                vec!["name".to_string()],
            )),
            FeedStep::Record(FeedRecord::delete(doc! { "id": 1 })),
            FeedStep::End,
        ]],
        MemoryCollection::default(),
        ImmediateRetry::unbounded(),
        RunOptions::default(),
    );

    let reports = completed(run(&h, collection_config(false)).await);

    assert_eq!(
        h.executor.statements(),
        vec![
            "UPDATE \"t\" SET \"name\" = $$b$$ WHERE \"id\" = $$1$$".to_string(),
            "DELETE FROM \"t\" WHERE \"id\" = $$1$$".to_string(),
        ]
    );
    assert_eq!(reports[0].changes, 3);
}

#[tokio::test]
async fn test_bulk_sync_flushes_by_limit_and_at_end() {
    let h = harness(
        vec![vec![FeedStep::End]],
        MemoryCollection::new(vec![
            doc! { "id": 1, "name": "a" },
            doc! { "id": 2, "name": "b" },
            doc! { "id": 3, "name": "c" },
        ]),
        ImmediateRetry::unbounded(),
        RunOptions {
            sync_all: true,
            bulk_insert: Some(2),
            ..RunOptions::default()
        },
    );

    let reports = completed(run(&h, collection_config(false)).await);

    assert_eq!(
        h.executor.statements(),
        vec![
            format!(
                "INSERT INTO \"t\" ({COLUMNS}) VALUES ($$1$$, $$a$$, NULL), ($$2$$, $$b$$, NULL)"
            ),
            format!("INSERT INTO \"t\" ({COLUMNS}) VALUES ($$3$$, $$c$$, NULL)"),
        ]
    );
    assert_eq!(reports[0].scanned, 3);
    assert_eq!(h.connector.opens(), 1);
}

#[tokio::test]
async fn test_bulk_sync_without_batching_flushes_last_row() {
    let h = harness(
        vec![vec![FeedStep::End]],
        MemoryCollection::new(vec![doc! { "id": 1, "name": "a" }, doc! { "id": 2 }]),
        ImmediateRetry::unbounded(),
        RunOptions::default(),
    );

    completed(run(&h, collection_config(true)).await);

    assert_eq!(
        h.executor.statements(),
        vec![
            "INSERT INTO \"t\" (\"id\", \"name\") VALUES ($$1$$, $$a$$)".to_string(),
            format!("INSERT INTO \"t\" ({COLUMNS}) VALUES ($$2$$, NULL, NULL)"),
        ]
    );
}

#[tokio::test]
async fn test_listen_only_skips_bulk_sync() {
    let h = harness(
        vec![vec![FeedStep::End]],
        MemoryCollection::new(vec![doc! { "id": 1 }]),
        ImmediateRetry::unbounded(),
        RunOptions {
            sync_all: true,
            listen_only: vec!["things".to_string()],
            ..RunOptions::default()
        },
    );

    completed(run(&h, collection_config(true)).await);

    assert_eq!(h.collection.opens(), 0);
    assert!(h.executor.statements().is_empty());
}

#[tokio::test]
async fn test_collection_without_listener_terminates_after_bulk_sync() {
    let h = harness(
        vec![],
        MemoryCollection::new(vec![doc! { "id": 1 }]),
        ImmediateRetry::unbounded(),
        RunOptions {
            sync_all: true,
            listen_only: vec!["others".to_string()],
            ..RunOptions::default()
        },
    );

    let reports = completed(run(&h, collection_config(false)).await);

    assert_eq!(h.executor.statements().len(), 1);
    assert_eq!(h.connector.opens(), 0);
    assert_eq!(reports[0].state, PipelineState::Terminated);
}

#[tokio::test]
async fn test_create_tables() {
    let h = harness(
        vec![vec![FeedStep::End]],
        MemoryCollection::default(),
        ImmediateRetry::unbounded(),
        RunOptions {
            create_tables: true,
            ..RunOptions::default()
        },
    );

    completed(run(&h, collection_config(false)).await);

    let statements = h.executor.statements();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS \"t\""));
}

#[tokio::test]
async fn test_feed_error_is_recovered_without_strict_listen() {
    let h = harness(
        vec![
            vec![FeedStep::Fail("connection reset".to_string())],
            vec![
                FeedStep::Record(FeedRecord::insert(doc! { "id": 5 })),
                FeedStep::End,
            ],
        ],
        MemoryCollection::default(),
        ImmediateRetry::with_max_attempts(1),
        RunOptions::default(),
    );

    let reports = completed(run(&h, collection_config(false)).await);

    assert_eq!(h.connector.opens(), 2);
    assert_eq!(
        h.executor.statements(),
        vec!["INSERT INTO \"t\" (\"id\") VALUES ($$5$$)".to_string()]
    );
    assert_eq!(reports[0].changes, 1);
}

#[tokio::test]
async fn test_feed_error_is_fatal_with_strict_listen() {
    let h = harness(
        vec![
            vec![FeedStep::Fail("connection reset".to_string())],
            vec![FeedStep::Record(FeedRecord::insert(doc! { "id": 5 }))],
        ],
        MemoryCollection::default(),
        ImmediateRetry::unbounded(),
        RunOptions {
            strict_listen: true,
            ..RunOptions::default()
        },
    );

    match run(&h, collection_config(false)).await {
        RunOutcome::StrictFailure {
            collection,
            reports,
        } => {
            assert_eq!(collection, "things");
            assert!(reports[0].strict_failure);
        }
        other => panic!("expected strict failure, got {other:?}"),
    }
    assert!(h.cancel.is_cancelled());
    assert!(h.executor.statements().is_empty());
}

#[tokio::test]
async fn test_apply_error_does_not_stop_the_pipeline() {
    let h = harness(
        vec![vec![
            FeedStep::Record(FeedRecord::insert(doc! { "id": 1, "name": "bad" })),
            FeedStep::Record(FeedRecord::insert(doc! { "id": 2 })),
            FeedStep::End,
        ]],
        MemoryCollection::default(),
        ImmediateRetry::unbounded(),
        RunOptions::default(),
    );
    h.executor.fail_on("bad");

    let reports = completed(run(&h, collection_config(false)).await);

    assert_eq!(
        h.executor.statements(),
        vec!["INSERT INTO \"t\" (\"id\") VALUES ($$2$$)".to_string()]
    );
    assert_eq!(reports[0].changes, 2);
}

#[tokio::test]
async fn test_shutdown_interrupts_idle_listener() {
    let h = harness(
        vec![vec![]],
        MemoryCollection::default(),
        ImmediateRetry::unbounded(),
        RunOptions::default(),
    );

    let cancel = h.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    match run(&h, collection_config(false)).await {
        RunOutcome::Interrupted(reports) => {
            assert_eq!(reports[0].state, PipelineState::Terminated);
        }
        other => panic!("expected interruption, got {other:?}"),
    }
}

#[tokio::test]
async fn test_zero_bulk_insert_is_rejected() {
    let h = harness(
        vec![],
        MemoryCollection::default(),
        ImmediateRetry::unbounded(),
        RunOptions {
            bulk_insert: Some(0),
            ..RunOptions::default()
        },
    );

    let result = h.replicator.run(vec![collection_config(false)]).await;
    assert!(result.is_err());
    assert!(h.executor.statements().is_empty());
}
