use async_trait::async_trait;

use crate::error::{DispatchError, LeaseError, TransportError};
use crate::protocol::StreamingPullRequest;
use crate::requests::{DropRequest, LeaseRequest};

/// Streaming pull manager: transport, flow control and ordering keys.
///
/// All methods are called from the dispatcher's worker task.
#[async_trait]
pub trait Manager: Send + Sync {
    /// Send one request on the stream
    async fn send(&self, request: StreamingPullRequest) -> Result<(), TransportError>;

    /// Record one observed ack latency, in whole seconds
    fn record_ack_latency(&self, seconds: u64);

    /// Unblock delivery for messages waiting on these ordering keys
    fn activate_ordering_keys(&self, keys: &[String]);

    /// Pause the receive side if leased load is above the high-water mark.
    /// Idempotent.
    fn maybe_pause_consumer(&self);

    /// Resume the receive side if leased load is below the low-water mark.
    /// Idempotent.
    fn maybe_resume_consumer(&self);

    /// The dispatch worker died on `error` and no longer drains the queue.
    fn dispatch_failed(&self, _error: &DispatchError) {}
}

/// Lease tracker. Both calls must accept an empty slice.
pub trait Leaser: Send + Sync {
    fn add(&self, items: &[LeaseRequest]) -> Result<(), LeaseError>;

    fn remove(&self, items: &[DropRequest]) -> Result<(), LeaseError>;
}
