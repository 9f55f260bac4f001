#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use streampull_subscriber::{
    DispatchError, DropRequest, LeaseError, LeaseRequest, Leaser, Manager, StreamingPullRequest,
    TransportError,
};

/// One observed collaborator call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    LeaseAdd(Vec<LeaseRequest>),
    LeaseRemove(Vec<DropRequest>),
    Send(StreamingPullRequest),
    AckLatency(u64),
    ActivateOrderingKeys(Vec<String>),
    MaybePause,
    MaybeResume,
    DispatchFailed(String),
}

/// Manager and leaser in one, recording every call in order.
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<Call>>,
    panic_on_send: AtomicBool,
}

impl Recorder {
    /// Make `send` panic until turned off again.
    pub fn panic_on_send(&self, enabled: bool) {
        self.panic_on_send.store(enabled, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sends(&self) -> Vec<StreamingPullRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Send(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Manager for Recorder {
    async fn send(&self, request: StreamingPullRequest) -> Result<(), TransportError> {
        if self.panic_on_send.load(Ordering::SeqCst) {
            panic!("transport exploded");
        }
        self.push(Call::Send(request));
        Ok(())
    }

    fn record_ack_latency(&self, seconds: u64) {
        self.push(Call::AckLatency(seconds));
    }

    fn activate_ordering_keys(&self, keys: &[String]) {
        self.push(Call::ActivateOrderingKeys(keys.to_vec()));
    }

    fn maybe_pause_consumer(&self) {
        self.push(Call::MaybePause);
    }

    fn maybe_resume_consumer(&self) {
        self.push(Call::MaybeResume);
    }

    fn dispatch_failed(&self, error: &DispatchError) {
        self.push(Call::DispatchFailed(error.to_string()));
    }
}

impl Leaser for Recorder {
    fn add(&self, items: &[LeaseRequest]) -> Result<(), LeaseError> {
        self.push(Call::LeaseAdd(items.to_vec()));
        Ok(())
    }

    fn remove(&self, items: &[DropRequest]) -> Result<(), LeaseError> {
        self.push(Call::LeaseRemove(items.to_vec()));
        Ok(())
    }
}

/// Leaser whose `add` always fails.
pub struct BrokenLeaser;

impl Leaser for BrokenLeaser {
    fn add(&self, _items: &[LeaseRequest]) -> Result<(), LeaseError> {
        Err(LeaseError::AddFailed("tracker unavailable".to_string()))
    }

    fn remove(&self, _items: &[DropRequest]) -> Result<(), LeaseError> {
        Ok(())
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn lease(ack_id: &str, byte_size: usize, ordering_key: &str) -> LeaseRequest {
    LeaseRequest {
        ack_id: ack_id.to_string(),
        byte_size,
        ordering_key: ordering_key.to_string(),
    }
}

pub fn drop_request(ack_id: &str, byte_size: usize, ordering_key: &str) -> DropRequest {
    DropRequest {
        ack_id: ack_id.to_string(),
        byte_size,
        ordering_key: ordering_key.to_string(),
    }
}
