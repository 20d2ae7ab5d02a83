//! Single-slot handoff between a reader task and its consumer.
//!
//! A reader sends one [`Delivery`] at a time over a channel of depth 1 and
//! does not pull from the store again until the consumer acknowledges it, so
//! at most one item per stream is ever in flight.

use tokio::sync::{mpsc, oneshot};

/// An item handed to the consumer together with its acknowledgement.
#[derive(Debug)]
pub struct Delivery<T> {
    pub item: T,
    pub ack: Ack,
}

/// Releases the reader. Dropping it releases the reader as well.
#[derive(Debug)]
pub struct Ack(oneshot::Sender<()>);

impl Ack {
    pub fn done(self) {
        let _ = self.0.send(());
    }
}

impl<T> Delivery<T> {
    /// Split into the item and its acknowledgement.
    pub fn into_parts(self) -> (T, Ack) {
        (self.item, self.ack)
    }
}

/// Send `item` and wait until the consumer is done with it.
///
/// Returns `false` if the consumer has gone away.
pub(crate) async fn deliver<T>(tx: &mpsc::Sender<Delivery<T>>, item: T) -> bool {
    let (ack_tx, ack_rx) = oneshot::channel();
    let delivery = Delivery {
        item,
        ack: Ack(ack_tx),
    };
    if tx.send(delivery).await.is_err() {
        return false;
    }
    // A dropped ack means the consumer finished without acknowledging.
    let _ = ack_rx.await;
    true
}

/// Channel used by every reader.
pub(crate) fn channel<T>() -> (mpsc::Sender<Delivery<T>>, mpsc::Receiver<Delivery<T>>) {
    mpsc::channel(1)
}
