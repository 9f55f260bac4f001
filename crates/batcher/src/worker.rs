//! Background worker that turns queued entries into handler calls.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, Instrument};

use crate::queue::{BatchReceiver, Collected};

/// Default number of entries collected per cycle
pub const DEFAULT_MAX_ITEMS: usize = 100;

/// Default extra wait after the first entry of a cycle (10ms)
pub const DEFAULT_MAX_LATENCY: Duration = Duration::from_millis(10);

/// Size and latency bounds for one collection cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_items: usize,
    pub max_latency: Duration,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
            max_latency: DEFAULT_MAX_LATENCY,
        }
    }
}

/// Consumer of collected batches
#[async_trait]
pub trait BatchHandler<T: Send + 'static>: Send + Sync {
    type Error: std::error::Error + Send + 'static;

    /// Process one batch. An error stops the worker.
    async fn handle(&self, batch: Vec<T>) -> Result<(), Self::Error>;

    /// Called once with the error that stopped the worker.
    fn failed(&self, _error: &Self::Error) {}

    /// Called once with the panic message when `handle` panicked.
    fn panicked(&self, _message: &str) {}
}

/// Why a worker returned
#[derive(Debug)]
pub enum ExitReason<E> {
    Stopped,
    Closed,
    Failed(E),
    /// The handler panicked; carries the panic message.
    Panicked(String),
}

/// Handed back when the worker returns, so the queue can be reused.
#[derive(Debug)]
pub struct WorkerExit<T, E> {
    pub receiver: BatchReceiver<T>,
    pub reason: ExitReason<E>,
    /// Whether the worker dequeued a poison pill before returning.
    pub stop_consumed: bool,
}

pub struct BatchWorker<T, H> {
    receiver: BatchReceiver<T>,
    handler: Arc<H>,
    limits: BatchLimits,
    name: &'static str,
}

impl<T, H> BatchWorker<T, H>
where
    T: Send + 'static,
    H: BatchHandler<T> + 'static,
{
    pub fn new(receiver: BatchReceiver<T>, handler: Arc<H>, limits: BatchLimits) -> Self {
        Self {
            receiver,
            handler,
            limits,
            name: "batch-worker",
        }
    }

    /// Name used in the worker's tracing span and log lines.
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Run until a poison pill, queue closure, handler error or handler panic.
    pub async fn run(mut self) -> WorkerExit<T, H::Error> {
        loop {
            let (items, next) = match self.receiver.collect(&self.limits).await {
                Collected::Batch(items) => (items, None),
                Collected::Stopped(items) => (items, Some(ExitReason::Stopped)),
                Collected::Closed(items) => (items, Some(ExitReason::Closed)),
            };
            let stop_consumed = matches!(next, Some(ExitReason::Stopped));

            if !items.is_empty() {
                let count = items.len();
                let outcome = AssertUnwindSafe(self.handler.handle(items))
                    .catch_unwind()
                    .await;
                let reason = match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => {
                        error!(worker = self.name, count, error = %e, "batch handler failed, worker exiting");
                        self.handler.failed(&e);
                        Some(ExitReason::Failed(e))
                    }
                    Err(payload) => {
                        let message = panic_message(&*payload);
                        error!(worker = self.name, count, panic = %message, "batch handler panicked, worker exiting");
                        self.handler.panicked(&message);
                        Some(ExitReason::Panicked(message))
                    }
                };
                if let Some(reason) = reason {
                    return WorkerExit {
                        receiver: self.receiver,
                        reason,
                        stop_consumed,
                    };
                }
            }

            if let Some(reason) = next {
                debug!(worker = self.name, stopped = stop_consumed, "batch worker exiting");
                return WorkerExit {
                    receiver: self.receiver,
                    reason,
                    stop_consumed,
                };
            }
        }
    }

    /// Run on a detached tokio task.
    pub fn spawn(self) -> JoinHandle<WorkerExit<T, H::Error>> {
        let span = tracing::debug_span!("batch_worker", name = self.name);
        debug!(worker = self.name, "spawning batch worker");
        tokio::spawn(self.run().instrument(span))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
