//! Latest-value hand-off from the encoder worker to its consumer.
//!
//! Backed by a `tokio::sync::watch` channel: the worker overwrites a single
//! slot and never blocks, the consumer sees each delivery at most once and in
//! order, and may miss intermediate values if it falls behind.

use chrono::{DateTime, Utc};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub value: i64,
    /// 1-based position of this value in the stream of decoded frames
    pub seq: u64,
    pub received_at: DateTime<Utc>,
}

pub struct DeliverySender {
    tx: watch::Sender<Option<Delivery>>,
    seq: u64,
}

#[derive(Clone)]
pub struct DeliveryReceiver {
    rx: watch::Receiver<Option<Delivery>>,
    last_seen: u64,
}

/// Create a connected sender/receiver pair with an empty slot
pub fn slot() -> (DeliverySender, DeliveryReceiver) {
    let (tx, rx) = watch::channel(None);
    (DeliverySender { tx, seq: 0 }, DeliveryReceiver { rx, last_seen: 0 })
}

impl DeliverySender {
    /// Overwrite the slot with a new value. Never blocks.
    pub fn publish(&mut self, value: i64) {
        self.seq += 1;
        // send_replace stores the value even when no receiver is alive
        self.tx.send_replace(Some(Delivery { value, seq: self.seq, received_at: Utc::now() }));
    }

    pub fn published(&self) -> u64 {
        self.seq
    }
}

impl DeliveryReceiver {
    /// Take the latest delivery if it has not been seen yet
    pub fn try_take(&mut self) -> Option<Delivery> {
        let current = *self.rx.borrow_and_update();
        match current {
            Some(delivery) if delivery.seq > self.last_seen => {
                self.last_seen = delivery.seq;
                Some(delivery)
            }
            _ => None,
        }
    }

    /// Wait for the next unseen delivery. Returns `None` once the sender is
    /// gone and everything it published has been seen.
    pub async fn next(&mut self) -> Option<Delivery> {
        loop {
            if let Some(delivery) = self.try_take() {
                return Some(delivery);
            }
            if self.rx.changed().await.is_err() {
                return self.try_take();
            }
        }
    }

    /// Latest delivery regardless of whether it was already taken
    pub fn latest(&self) -> Option<Delivery> {
        *self.rx.borrow()
    }

    /// Sequence number of the last delivery taken through this receiver
    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }
}
