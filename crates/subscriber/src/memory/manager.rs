use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::{DispatchError, TransportError};
use crate::manager::Manager;
use crate::memory::InMemoryLeaser;
use crate::protocol::StreamingPullRequest;

/// Load at which the consumer pauses
const MAX_LOAD: f64 = 1.0;

/// Load below which a paused consumer resumes
const RESUME_THRESHOLD: f64 = 0.8;

/// Leased-message limits. Zero disables a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowControl {
    pub max_messages: usize,
    pub max_bytes: usize,
}

impl Default for FlowControl {
    fn default() -> Self {
        Self {
            max_messages: 1000,
            max_bytes: 100 * 1024 * 1024,
        }
    }
}

/// Manager that writes requests to a channel and applies flow control
/// against an [`InMemoryLeaser`].
pub struct InMemoryManager {
    leaser: Arc<InMemoryLeaser>,
    flow_control: FlowControl,
    outbound: mpsc::UnboundedSender<StreamingPullRequest>,
    paused: AtomicBool,
    ack_histogram: DashMap<u64, u64>,
    activations: DashMap<String, u64>,
    failures: AtomicU64,
}

impl InMemoryManager {
    /// Returns the manager and the receiving end of its request stream.
    pub fn new(
        leaser: Arc<InMemoryLeaser>,
        flow_control: FlowControl,
    ) -> (Self, mpsc::UnboundedReceiver<StreamingPullRequest>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let manager = Self {
            leaser,
            flow_control,
            outbound,
            paused: AtomicBool::new(false),
            ack_histogram: DashMap::new(),
            activations: DashMap::new(),
            failures: AtomicU64::new(0),
        };
        (manager, rx)
    }

    /// Fraction of the tighter flow-control limit currently leased.
    pub fn load(&self) -> f64 {
        let ratio = |used: usize, limit: usize| {
            if limit == 0 {
                0.0
            } else {
                used as f64 / limit as f64
            }
        };
        ratio(self.leaser.message_count(), self.flow_control.max_messages)
            .max(ratio(self.leaser.bytes(), self.flow_control.max_bytes))
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Number of acks observed with this latency
    pub fn ack_latency_count(&self, seconds: u64) -> u64 {
        self.ack_histogram.get(&seconds).map(|c| *c).unwrap_or(0)
    }

    pub fn ack_latency_samples(&self) -> u64 {
        self.ack_histogram.iter().map(|entry| *entry.value()).sum()
    }

    /// Times this ordering key was reactivated
    pub fn activation_count(&self, ordering_key: &str) -> u64 {
        self.activations.get(ordering_key).map(|c| *c).unwrap_or(0)
    }

    pub fn dispatch_failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Manager for InMemoryManager {
    async fn send(&self, request: StreamingPullRequest) -> Result<(), TransportError> {
        self.outbound
            .send(request)
            .map_err(|_| TransportError::StreamClosed)
    }

    fn record_ack_latency(&self, seconds: u64) {
        *self.ack_histogram.entry(seconds).or_insert(0) += 1;
    }

    fn activate_ordering_keys(&self, keys: &[String]) {
        for key in keys {
            *self.activations.entry(key.clone()).or_insert(0) += 1;
        }
    }

    fn maybe_pause_consumer(&self) {
        let load = self.load();
        if load >= MAX_LOAD && !self.paused.swap(true, Ordering::SeqCst) {
            debug!(load, "pausing consumer");
        }
    }

    fn maybe_resume_consumer(&self) {
        if !self.is_paused() {
            return;
        }
        let load = self.load();
        if load < RESUME_THRESHOLD {
            if self.paused.swap(false, Ordering::SeqCst) {
                debug!(load, "resuming consumer");
            }
        } else {
            debug!(load, "did not resume consumer");
        }
    }

    fn dispatch_failed(&self, error: &DispatchError) {
        self.failures.fetch_add(1, Ordering::SeqCst);
        error!(error = %error, "dispatch worker stopped, acks and leases are no longer processed");
    }
}
