//! Snapshot reader behavior against in-memory collections.

use mongodb::bson::doc;
use mongodb_changestream_source::testing::MemoryCollection;
use mongodb_changestream_source::{
    Delivery, ImmediateRetry, RetryPolicy, ScanStep, SnapshotReader, SnapshotScan,
};
use std::sync::Arc;
use std::time::Duration;
use sync_core::{
    ChangeEvent, ColumnDefinition, ColumnSchema, ColumnType, ControlSignal, RawValue,
    SharedBinding, TableBinding,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn binding() -> SharedBinding {
    let schema = ColumnSchema::new(vec![ColumnDefinition::new("id", ColumnType::Number)]).unwrap();
    TableBinding::new("users", "users", schema).shared()
}

fn collection(count: i32) -> MemoryCollection {
    MemoryCollection::new((1..=count).map(|id| doc! { "id": id }).collect())
}

async fn start(
    collection: MemoryCollection,
    retry: impl RetryPolicy + 'static,
) -> (Arc<MemoryCollection>, SnapshotScan) {
    let source = Arc::new(collection);
    let reader = SnapshotReader::new(Arc::clone(&source), Arc::new(retry));
    let scan = reader
        .scan(binding(), doc! {}, CancellationToken::new())
        .await
        .unwrap();
    (source, scan)
}

async fn next_step(rx: &mut mpsc::Receiver<Delivery<ScanStep>>) -> ScanStep {
    let delivery = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for step")
        .expect("scan channel closed");
    let (step, ack) = delivery.into_parts();
    ack.done();
    step
}

/// Drain the scan, returning (id, has_next) per document and the control signals.
async fn collect(rx: &mut mpsc::Receiver<Delivery<ScanStep>>) -> (Vec<(i64, bool)>, Vec<ControlSignal>) {
    let mut documents = Vec::new();
    let mut signals = Vec::new();
    loop {
        let step = next_step(rx).await;
        match step.event {
            ChangeEvent::Insert { document, .. } => {
                let Some(RawValue::Int(id)) = document.get("id") else {
                    panic!("document without id");
                };
                documents.push((*id, step.has_next));
            }
            ChangeEvent::Control(signal) => {
                signals.push(signal);
                if signal == ControlSignal::Closed {
                    return (documents, signals);
                }
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_scan_flags_last_document() {
    let (_source, mut scan) = start(collection(3), ImmediateRetry::unbounded()).await;

    assert_eq!(scan.total, 3);
    let (documents, signals) = collect(&mut scan.steps).await;
    assert_eq!(documents, vec![(1, true), (2, true), (3, false)]);
    assert_eq!(signals, vec![ControlSignal::Ended, ControlSignal::Closed]);
}

#[tokio::test]
async fn test_empty_collection_ends_immediately() {
    let (_source, mut scan) = start(collection(0), ImmediateRetry::unbounded()).await;

    assert_eq!(scan.total, 0);
    let (documents, signals) = collect(&mut scan.steps).await;
    assert!(documents.is_empty());
    assert_eq!(signals, vec![ControlSignal::Ended, ControlSignal::Closed]);
}

#[tokio::test]
async fn test_cursor_error_restarts_from_beginning() {
    let (source, mut scan) = start(collection(3).fail_after(2), ImmediateRetry::unbounded()).await;

    let (documents, signals) = collect(&mut scan.steps).await;
    assert_eq!(documents, vec![(1, true), (1, true), (2, true), (3, false)]);
    assert_eq!(signals, vec![ControlSignal::Ended, ControlSignal::Closed]);
    assert_eq!(source.opens(), 2);
}

#[tokio::test]
async fn test_scan_gives_up_when_policy_says_so() {
    let (source, mut scan) = start(
        collection(3).fail_after(0).fail_after(0),
        ImmediateRetry::with_max_attempts(1),
    )
    .await;

    let (documents, signals) = collect(&mut scan.steps).await;
    assert!(documents.is_empty());
    assert_eq!(signals, vec![ControlSignal::Errored, ControlSignal::Closed]);
    assert_eq!(source.opens(), 2);
}

#[tokio::test]
async fn test_cursor_is_not_advanced_until_ack() {
    let (source, mut scan) = start(collection(3), ImmediateRetry::unbounded()).await;

    let first = scan.steps.recv().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    // The current document plus the one peeked for `has_next`.
    assert_eq!(source.polls(), 2);

    first.ack.done();
    let second = next_step(&mut scan.steps).await;
    assert!(second.has_next);
    assert_eq!(source.polls(), 3);
}
