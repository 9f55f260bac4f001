//! Batching dispatcher for acknowledgement-domain requests.
//!
//! Message handles push [`RequestItem`]s onto the shared request queue from
//! any thread or task. One background worker drains that queue in bounded
//! batches and hands each batch to the dispatcher, which turns it into lease
//! tracker calls and chunked streaming pull requests.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use streampull_batcher::{BatchHandler, BatchWorker, ExitReason, WorkerExit};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::manager::{Leaser, Manager};
use crate::metrics::DispatcherMetrics;
use crate::protocol::{ack_requests, modify_deadline_requests};
use crate::requests::{
    AckRequest, DropRequest, LeaseRequest, ModAckRequest, NackRequest, RequestItem,
    RequestQueue, RequestReceiver,
};

const WORKER_NAME: &str = "callback-request-dispatcher";

type WorkerHandle = JoinHandle<WorkerExit<RequestItem, DispatchError>>;

enum WorkerState {
    /// No worker; the dispatcher holds the queue's receiving end.
    Idle(RequestReceiver),
    Running(WorkerHandle),
    /// The worker panicked and took the receiver with it.
    Detached,
}

pub struct Dispatcher {
    inner: Arc<DispatchInner>,
    queue: RequestQueue,
    state: Mutex<WorkerState>,
}

struct DispatchInner {
    manager: Arc<dyn Manager>,
    leaser: Arc<dyn Leaser>,
    config: DispatcherConfig,
    metrics: Option<DispatcherMetrics>,
}

impl Dispatcher {
    /// `queue` and `receiver` must be the two ends of one request queue.
    pub fn new(
        manager: Arc<dyn Manager>,
        leaser: Arc<dyn Leaser>,
        queue: RequestQueue,
        receiver: RequestReceiver,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            inner: Arc::new(DispatchInner {
                manager,
                leaser,
                config,
                metrics: None,
            }),
            queue,
            state: Mutex::new(WorkerState::Idle(receiver)),
        }
    }

    /// Attach counters. Rejected with [`DispatchError::AlreadyRunning`]
    /// while a worker holds the dispatch state.
    pub fn set_metrics(&mut self, metrics: DispatcherMetrics) -> Result<(), DispatchError> {
        let inner = Arc::get_mut(&mut self.inner).ok_or(DispatchError::AlreadyRunning)?;
        inner.metrics = Some(metrics);
        Ok(())
    }

    /// Producer handle for message handles.
    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    /// True while a worker task is alive.
    pub async fn is_running(&self) -> bool {
        matches!(&*self.state.lock().await, WorkerState::Running(handle) if !handle.is_finished())
    }

    /// Spawn the dispatch worker.
    ///
    /// Fails with [`DispatchError::AlreadyRunning`] until `stop` has been
    /// called, even if the previous worker has since died.
    pub async fn start(&self) -> Result<(), DispatchError> {
        let mut state = self.state.lock().await;
        let receiver = match std::mem::replace(&mut *state, WorkerState::Detached) {
            WorkerState::Idle(receiver) => receiver,
            running @ WorkerState::Running(_) => {
                *state = running;
                return Err(DispatchError::AlreadyRunning);
            }
            WorkerState::Detached => return Err(DispatchError::QueueDetached),
        };

        let handle = BatchWorker::new(
            receiver,
            Arc::clone(&self.inner),
            self.inner.config.batch_limits(),
        )
        .named(WORKER_NAME)
        .spawn();
        debug!(worker = WORKER_NAME, "started dispatch worker");

        *state = WorkerState::Running(handle);
        Ok(())
    }

    /// Stop the worker and wait for it to exit. No-op when not running.
    ///
    /// Returns [`DispatchError::WorkerFailed`] if the worker had already
    /// died on a downstream error, or [`DispatchError::WorkerPanicked`] if a
    /// collaborator panicked. The dispatcher is idle afterwards either way,
    /// and can be started again on the same queue.
    pub async fn stop(&self) -> Result<(), DispatchError> {
        let mut state = self.state.lock().await;
        let handle = match std::mem::replace(&mut *state, WorkerState::Detached) {
            WorkerState::Running(handle) => handle,
            other => {
                *state = other;
                return Ok(());
            }
        };

        let sent_stop = if handle.is_finished() {
            false
        } else if self.queue.stop().is_err() {
            warn!(worker = WORKER_NAME, "request queue closed before stop");
            false
        } else {
            true
        };

        let WorkerExit {
            mut receiver,
            reason,
            stop_consumed,
        } = match handle.await {
            Ok(exit) => exit,
            Err(e) => {
                error!(worker = WORKER_NAME, error = %e, "dispatch worker panicked");
                return Err(DispatchError::WorkerPanicked(e.to_string()));
            }
        };

        if sent_stop && !stop_consumed {
            receiver.discard_next_stop();
        }
        *state = WorkerState::Idle(receiver);
        debug!(worker = WORKER_NAME, "stopped dispatch worker");

        match reason {
            ExitReason::Stopped | ExitReason::Closed => Ok(()),
            ExitReason::Failed(e) => Err(DispatchError::WorkerFailed(Box::new(e))),
            ExitReason::Panicked(message) => Err(DispatchError::WorkerPanicked(message)),
        }
    }

    /// Handle one batch: lease, then modify-deadline, ack, nack and drop.
    pub async fn dispatch_callback(&self, items: Vec<RequestItem>) -> Result<(), DispatchError> {
        self.inner.dispatch_callback(items).await
    }

    pub fn lease(&self, items: &[LeaseRequest]) -> Result<(), DispatchError> {
        self.inner.lease(items)
    }

    pub async fn modify_ack_deadline(&self, items: &[ModAckRequest]) -> Result<(), DispatchError> {
        self.inner.modify_ack_deadline(items).await
    }

    pub async fn ack(&self, items: &[AckRequest]) -> Result<(), DispatchError> {
        self.inner.ack(items).await
    }

    pub async fn nack(&self, items: &[NackRequest]) -> Result<(), DispatchError> {
        self.inner.nack(items).await
    }

    pub fn drop(&self, items: &[DropRequest]) -> Result<(), DispatchError> {
        self.inner.drop_items(items)
    }
}

impl DispatchInner {
    async fn dispatch_callback(&self, items: Vec<RequestItem>) -> Result<(), DispatchError> {
        let total = items.len();
        let mut lease_requests = Vec::new();
        let mut modack_requests = Vec::new();
        let mut ack_requests = Vec::new();
        let mut nack_requests = Vec::new();
        let mut drop_requests = Vec::new();

        for item in items {
            match item {
                RequestItem::Lease(r) => lease_requests.push(r),
                RequestItem::ModAck(r) => modack_requests.push(r),
                RequestItem::Ack(r) => ack_requests.push(r),
                RequestItem::Nack(r) => nack_requests.push(r),
                RequestItem::Drop(r) => drop_requests.push(r),
            }
        }

        debug!(count = total, "handling batched requests");
        if let Some(metrics) = &self.metrics {
            metrics.batches.inc();
            metrics.record_items("lease", lease_requests.len());
            metrics.record_items("modack", modack_requests.len());
            metrics.record_items("ack", ack_requests.len());
            metrics.record_items("nack", nack_requests.len());
            metrics.record_items("drop", drop_requests.len());
        }

        if !lease_requests.is_empty() {
            self.lease(&lease_requests)?;
        }

        if !modack_requests.is_empty() {
            self.modify_ack_deadline(&modack_requests).await?;
        }

        // Ack and drop must run after lease: a message can be leased and
        // settled within the same batch.
        if !ack_requests.is_empty() {
            self.ack(&ack_requests).await?;
        }

        if !nack_requests.is_empty() {
            self.nack(&nack_requests).await?;
        }

        if !drop_requests.is_empty() {
            self.drop_items(&drop_requests)?;
        }

        Ok(())
    }

    fn lease(&self, items: &[LeaseRequest]) -> Result<(), DispatchError> {
        self.leaser.add(items)?;
        self.manager.maybe_pause_consumer();
        Ok(())
    }

    async fn modify_ack_deadline(&self, items: &[ModAckRequest]) -> Result<(), DispatchError> {
        for request in modify_deadline_requests(items, self.config.ack_ids_batch_size) {
            self.manager.send(request).await?;
            self.record_sent("modack");
        }
        Ok(())
    }

    async fn ack(&self, items: &[AckRequest]) -> Result<(), DispatchError> {
        for seconds in items.iter().filter_map(|item| item.time_to_ack) {
            self.manager.record_ack_latency(seconds);
        }

        for request in ack_requests(items, self.config.ack_ids_batch_size) {
            self.manager.send(request).await?;
            self.record_sent("ack");
        }

        let drops: Vec<DropRequest> = items.iter().map(DropRequest::from).collect();
        self.drop_items(&drops)
    }

    async fn nack(&self, items: &[NackRequest]) -> Result<(), DispatchError> {
        let modacks: Vec<ModAckRequest> = items.iter().map(ModAckRequest::from).collect();
        self.modify_ack_deadline(&modacks).await?;

        let drops: Vec<DropRequest> = items.iter().map(DropRequest::from).collect();
        self.drop_items(&drops)
    }

    fn drop_items(&self, items: &[DropRequest]) -> Result<(), DispatchError> {
        self.leaser.remove(items)?;

        let mut seen = HashSet::new();
        let ordering_keys: Vec<String> = items
            .iter()
            .map(|item| item.ordering_key.as_str())
            .filter(|key| !key.is_empty() && seen.insert(*key))
            .map(str::to_owned)
            .collect();
        self.manager.activate_ordering_keys(&ordering_keys);
        self.manager.maybe_resume_consumer();
        Ok(())
    }

    fn record_sent(&self, kind: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_sent(kind);
        }
    }
}

#[async_trait]
impl BatchHandler<RequestItem> for DispatchInner {
    type Error = DispatchError;

    async fn handle(&self, batch: Vec<RequestItem>) -> Result<(), DispatchError> {
        self.dispatch_callback(batch).await
    }

    fn failed(&self, error: &DispatchError) {
        if let Some(metrics) = &self.metrics {
            metrics.worker_failures.inc();
        }
        self.manager.dispatch_failed(error);
    }

    fn panicked(&self, message: &str) {
        self.failed(&DispatchError::WorkerPanicked(message.to_string()));
    }
}
