//! Unbounded multi-writer, single-reader queue feeding a batch worker.

use std::fmt;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};

use crate::worker::BatchLimits;

/// Queue entry: either a payload or the poison pill that stops the worker.
#[derive(Debug, PartialEq, Eq)]
pub enum Envelope<T> {
    Item(T),
    Stop,
}

/// Returned when the receiving side of the queue is gone.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("batch queue receiver dropped")]
pub struct QueueClosed;

/// Create a connected sender/receiver pair.
pub fn queue<T>() -> (BatchSender<T>, BatchReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        BatchSender { tx },
        BatchReceiver {
            rx,
            stale_stops: 0,
        },
    )
}

/// Cloneable producer handle. Never blocks.
pub struct BatchSender<T> {
    tx: mpsc::UnboundedSender<Envelope<T>>,
}

impl<T> Clone for BatchSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> fmt::Debug for BatchSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchSender")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<T> BatchSender<T> {
    /// Enqueue one item.
    pub fn put(&self, item: T) -> Result<(), QueueClosed> {
        self.tx.send(Envelope::Item(item)).map_err(|_| QueueClosed)
    }

    /// Enqueue the poison pill.
    pub fn stop(&self) -> Result<(), QueueClosed> {
        self.tx.send(Envelope::Stop).map_err(|_| QueueClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Result of one collection cycle.
#[derive(Debug, PartialEq, Eq)]
pub enum Collected<T> {
    /// Size or latency bound reached; keep going.
    Batch(Vec<T>),
    /// Poison pill dequeued. Holds the items collected before it.
    Stopped(Vec<T>),
    /// Every sender was dropped.
    Closed(Vec<T>),
}

impl<T> Collected<T> {
    pub fn items(&self) -> &[T] {
        match self {
            Collected::Batch(items) | Collected::Stopped(items) | Collected::Closed(items) => items,
        }
    }
}

/// Consumer side of the queue. Owned by exactly one worker at a time.
pub struct BatchReceiver<T> {
    rx: mpsc::UnboundedReceiver<Envelope<T>>,
    stale_stops: usize,
}

impl<T> fmt::Debug for BatchReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchReceiver")
            .field("stale_stops", &self.stale_stops)
            .finish()
    }
}

impl<T> BatchReceiver<T> {
    /// Collect up to `limits.max_items` entries.
    ///
    /// Waits indefinitely for the first entry, then at most
    /// `limits.max_latency` for the rest. A poison pill ends the cycle early;
    /// anything queued behind it is left in the queue.
    pub async fn collect(&mut self, limits: &BatchLimits) -> Collected<T> {
        let mut items = Vec::new();

        loop {
            match self.rx.recv().await {
                Some(Envelope::Item(item)) => {
                    items.push(item);
                    break;
                }
                Some(Envelope::Stop) => {
                    if self.take_stale_stop() {
                        continue;
                    }
                    return Collected::Stopped(items);
                }
                None => return Collected::Closed(items),
            }
        }

        let deadline = Instant::now() + limits.max_latency;
        while items.len() < limits.max_items {
            match timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(Envelope::Item(item))) => items.push(item),
                Ok(Some(Envelope::Stop)) => {
                    if self.take_stale_stop() {
                        continue;
                    }
                    return Collected::Stopped(items);
                }
                Ok(None) => return Collected::Closed(items),
                Err(_) => break,
            }
        }

        Collected::Batch(items)
    }

    /// Ignore the next poison pill this receiver sees.
    ///
    /// Used when a pill was sent to a worker that had already exited.
    pub fn discard_next_stop(&mut self) {
        self.stale_stops += 1;
    }

    fn take_stale_stop(&mut self) -> bool {
        if self.stale_stops > 0 {
            self.stale_stops -= 1;
            true
        } else {
            false
        }
    }
}
