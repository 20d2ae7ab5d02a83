//! Live change stream reader.
//!
//! One task per watched collection pulls records from a [`ChangeFeed`],
//! drops operations outside the allow-list, normalizes the rest and hands
//! them to the consumer one at a time. A failed feed is closed and reopened
//! according to the [`RetryPolicy`].

use crate::delivery::{self, Delivery};
use crate::error::SourceError;
use crate::feed::{normalize, ChangeFeed, FeedConnector};
use crate::retry::RetryPolicy;
use std::sync::Arc;
use sync_core::{ChangeEvent, ControlSignal, OperationKind, SharedBinding};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// What the change stream reader hands to its consumer.
///
/// `Err` reports a record that could not be normalized; the stream goes on.
pub type FeedItem = Result<ChangeEvent, SourceError>;

/// Watches collections through a [`FeedConnector`].
pub struct ChangeStreamReader<C> {
    connector: Arc<C>,
    retry: Arc<dyn RetryPolicy>,
}

impl<C> Clone for ChangeStreamReader<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            retry: Arc::clone(&self.retry),
        }
    }
}

impl<C: FeedConnector> ChangeStreamReader<C> {
    pub fn new(connector: Arc<C>, retry: Arc<dyn RetryPolicy>) -> Self {
        Self { connector, retry }
    }

    /// Start watching the binding's collection.
    ///
    /// The returned channel yields data events, then terminal control
    /// events: `Ended` and `Closed` when the feed finishes, `Errored` for
    /// every feed failure, and `Closed` when the retry policy gives up or
    /// `cancel` fires.
    pub fn watch(
        &self,
        binding: SharedBinding,
        allowed: Vec<OperationKind>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<Delivery<FeedItem>> {
        let (tx, rx) = delivery::channel();
        let reader = self.clone();
        tokio::spawn(async move {
            reader.run(&binding.collection, &allowed, &tx, &cancel).await;
            debug!("Change stream reader for '{}' stopped", binding.collection);
        });
        rx
    }

    async fn run(
        &self,
        collection: &str,
        allowed: &[OperationKind],
        tx: &mpsc::Sender<Delivery<FeedItem>>,
        cancel: &CancellationToken,
    ) {
        let mut attempt = 0;
        loop {
            let opened = tokio::select! {
                _ = cancel.cancelled() => None,
                result = self.connector.open(collection, allowed) => Some(result),
            };
            let mut feed = match opened {
                None => {
                    send_control(tx, ControlSignal::Closed).await;
                    return;
                }
                Some(Ok(feed)) => feed,
                Some(Err(e)) => {
                    error!("Failed to open change stream on '{}': {}", collection, e);
                    if !send_control(tx, ControlSignal::Errored).await
                        || !self.wait_retry(collection, &mut attempt, cancel).await
                    {
                        send_control(tx, ControlSignal::Closed).await;
                        return;
                    }
                    continue;
                }
            };
            info!("Listening to changes on '{}'", collection);

            match self.pump(&mut feed, collection, allowed, tx, cancel, &mut attempt).await {
                Pumped::Ended => {
                    feed.close().await;
                    info!("Change stream on '{}' ended", collection);
                    if send_control(tx, ControlSignal::Ended).await {
                        send_control(tx, ControlSignal::Closed).await;
                    }
                    return;
                }
                Pumped::Stopped => {
                    feed.close().await;
                    send_control(tx, ControlSignal::Closed).await;
                    return;
                }
                Pumped::ConsumerGone => {
                    feed.close().await;
                    return;
                }
                Pumped::Failed(e) => {
                    error!("Change stream error on '{}': {}", collection, e);
                    feed.close().await;
                    if !send_control(tx, ControlSignal::Errored).await
                        || !self.wait_retry(collection, &mut attempt, cancel).await
                    {
                        send_control(tx, ControlSignal::Closed).await;
                        return;
                    }
                    info!("Reopening change stream on '{}'", collection);
                }
            }
        }
    }

    /// Deliver records until the feed ends, fails, or the reader is stopped.
    async fn pump(
        &self,
        feed: &mut C::Feed,
        collection: &str,
        allowed: &[OperationKind],
        tx: &mpsc::Sender<Delivery<FeedItem>>,
        cancel: &CancellationToken,
        attempt: &mut u32,
    ) -> Pumped {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Pumped::Stopped,
                next = feed.next() => next,
            };
            let record = match next {
                Ok(Some(record)) => record,
                Ok(None) => return Pumped::Ended,
                Err(e) => return Pumped::Failed(e),
            };
            *attempt = 0;

            if !record.kind().is_some_and(|kind| allowed.contains(&kind)) {
                trace!(
                    "Skipping '{}' change on '{}': not watched",
                    record.operation,
                    collection
                );
                continue;
            }

            let item = normalize(record);
            if let Err(e) = &item {
                error!("Failed to normalize change on '{}': {}", collection, e);
            }
            if !delivery::deliver(tx, item).await {
                return Pumped::ConsumerGone;
            }
        }
    }

    /// Sleep before the next attempt. Returns `false` when giving up.
    async fn wait_retry(
        &self,
        collection: &str,
        attempt: &mut u32,
        cancel: &CancellationToken,
    ) -> bool {
        *attempt += 1;
        let Some(delay) = self.retry.next_delay(*attempt) else {
            error!(
                "Giving up on change stream for '{}' after {} attempts",
                collection,
                *attempt - 1
            );
            return false;
        };
        if !delay.is_zero() {
            warn!(
                "Retrying change stream on '{}' in {:?} (attempt {})",
                collection, delay, attempt
            );
        }
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

enum Pumped {
    Ended,
    Stopped,
    ConsumerGone,
    Failed(SourceError),
}

async fn send_control(tx: &mpsc::Sender<Delivery<FeedItem>>, signal: ControlSignal) -> bool {
    delivery::deliver(tx, Ok(ChangeEvent::Control(signal))).await
}
