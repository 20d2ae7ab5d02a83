//! One-time full-collection scan.
//!
//! Every document becomes a synthetic insert. Each step tells the consumer
//! whether another document follows, so a batched writer can flush on the
//! last one. A cursor failure restarts the whole scan from the beginning;
//! documents already delivered may be delivered again. Restarts count
//! against the retry policy for the lifetime of the scan.

use crate::convert::bson_to_document;
use crate::delivery::{self, Delivery};
use crate::error::SourceError;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use mongodb::bson;
use std::sync::Arc;
use sync_core::{ChangeEvent, ControlSignal, SharedBinding};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// An open cursor over a collection.
#[async_trait]
pub trait SnapshotCursor: Send {
    /// Next document, or `Ok(None)` when exhausted.
    async fn next(&mut self) -> Result<Option<bson::Document>, SourceError>;

    /// Release the cursor.
    async fn close(&mut self);
}

/// Opens cursors for snapshot scans.
#[async_trait]
pub trait SnapshotSource: Send + Sync + 'static {
    type Cursor: SnapshotCursor + 'static;

    /// Number of documents matching `filter`.
    async fn count(&self, collection: &str, filter: &bson::Document) -> Result<u64, SourceError>;

    /// Open a cursor over the documents matching `filter`.
    async fn open(
        &self,
        collection: &str,
        filter: &bson::Document,
    ) -> Result<Self::Cursor, SourceError>;
}

/// One scanned document, or a lifecycle signal.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanStep {
    pub event: ChangeEvent,
    /// Another document follows this one
    pub has_next: bool,
}

impl ScanStep {
    fn control(signal: ControlSignal) -> Self {
        Self {
            event: ChangeEvent::Control(signal),
            has_next: false,
        }
    }
}

/// A started scan.
#[derive(Debug)]
pub struct SnapshotScan {
    /// Document count taken before the scan started; for progress only
    pub total: u64,
    pub steps: mpsc::Receiver<Delivery<ScanStep>>,
}

/// Runs snapshot scans through a [`SnapshotSource`].
pub struct SnapshotReader<S> {
    source: Arc<S>,
    retry: Arc<dyn RetryPolicy>,
}

impl<S> Clone for SnapshotReader<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            retry: Arc::clone(&self.retry),
        }
    }
}

impl<S: SnapshotSource> SnapshotReader<S> {
    pub fn new(source: Arc<S>, retry: Arc<dyn RetryPolicy>) -> Self {
        Self { source, retry }
    }

    /// Count the matching documents, then start streaming them.
    ///
    /// The channel yields inserts, then `Ended` and `Closed`. If the retry
    /// policy gives up it yields `Errored` and `Closed` instead.
    pub async fn scan(
        &self,
        binding: SharedBinding,
        filter: bson::Document,
        cancel: CancellationToken,
    ) -> Result<SnapshotScan, SourceError> {
        let total = self.source.count(&binding.collection, &filter).await?;
        info!(
            "Collection '{}' contains {} documents",
            binding.collection, total
        );

        let (tx, steps) = delivery::channel();
        let reader = self.clone();
        tokio::spawn(async move {
            reader.run(&binding.collection, &filter, &tx, &cancel).await;
            debug!("Snapshot reader for '{}' stopped", binding.collection);
        });
        Ok(SnapshotScan { total, steps })
    }

    async fn run(
        &self,
        collection: &str,
        filter: &bson::Document,
        tx: &mpsc::Sender<Delivery<ScanStep>>,
        cancel: &CancellationToken,
    ) {
        let mut attempt = 0;
        loop {
            let outcome = match self.source.open(collection, filter).await {
                Ok(mut cursor) => {
                    let outcome = self.drain(&mut cursor, collection, tx, cancel).await;
                    cursor.close().await;
                    outcome
                }
                Err(e) => Scanned::Failed(e),
            };

            match outcome {
                Scanned::Finished => {
                    info!("Snapshot of '{}' finished", collection);
                    if delivery::deliver(tx, ScanStep::control(ControlSignal::Ended)).await {
                        delivery::deliver(tx, ScanStep::control(ControlSignal::Closed)).await;
                    }
                    return;
                }
                Scanned::Stopped => {
                    delivery::deliver(tx, ScanStep::control(ControlSignal::Closed)).await;
                    return;
                }
                Scanned::ConsumerGone => return,
                Scanned::Failed(e) => {
                    error!("Snapshot cursor error on '{}': {}", collection, e);
                    attempt += 1;
                    let Some(delay) = self.retry.next_delay(attempt) else {
                        error!(
                            "Giving up on snapshot of '{}' after {} attempts",
                            collection,
                            attempt - 1
                        );
                        if delivery::deliver(tx, ScanStep::control(ControlSignal::Errored)).await {
                            delivery::deliver(tx, ScanStep::control(ControlSignal::Closed)).await;
                        }
                        return;
                    };
                    warn!(
                        "Restarting snapshot of '{}' from the beginning in {:?}",
                        collection, delay
                    );
                    let resumed = tokio::select! {
                        _ = cancel.cancelled() => false,
                        _ = tokio::time::sleep(delay) => true,
                    };
                    if !resumed {
                        delivery::deliver(tx, ScanStep::control(ControlSignal::Closed)).await;
                        return;
                    }
                }
            }
        }
    }

    /// Deliver every document of an open cursor, peeking one ahead for `has_next`.
    async fn drain(
        &self,
        cursor: &mut S::Cursor,
        collection: &str,
        tx: &mpsc::Sender<Delivery<ScanStep>>,
        cancel: &CancellationToken,
    ) -> Scanned {
        let mut current = match next_or_stop(cursor, cancel).await {
            Some(Ok(Some(doc))) => doc,
            Some(Ok(None)) => return Scanned::Finished,
            Some(Err(e)) => return Scanned::Failed(e),
            None => return Scanned::Stopped,
        };

        loop {
            let following = match next_or_stop(cursor, cancel).await {
                Some(Ok(following)) => following,
                Some(Err(e)) => return Scanned::Failed(e),
                None => return Scanned::Stopped,
            };
            let has_next = following.is_some();
            match bson_to_document(current) {
                Ok(document) => {
                    let step = ScanStep {
                        event: ChangeEvent::insert(document),
                        has_next,
                    };
                    if !delivery::deliver(tx, step).await {
                        return Scanned::ConsumerGone;
                    }
                }
                Err(e) => error!("Skipping document of '{}': {}", collection, e),
            }

            match following {
                Some(doc) => current = doc,
                None => return Scanned::Finished,
            }
        }
    }
}

enum Scanned {
    Finished,
    Stopped,
    ConsumerGone,
    Failed(SourceError),
}

async fn next_or_stop<C: SnapshotCursor>(
    cursor: &mut C,
    cancel: &CancellationToken,
) -> Option<Result<Option<bson::Document>, SourceError>> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        next = cursor.next() => Some(next),
    }
}
