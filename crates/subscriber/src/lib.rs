//! streampull-subscriber: acknowledgement pipeline of a streaming pull subscriber
//!
//! Message handles enqueue ack / nack / modify-deadline / drop requests from
//! any thread; the dispatcher batches them on one background worker and turns
//! them into lease tracker calls and size-bounded streaming pull requests.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod latency;
pub mod manager;
pub mod memory;
pub mod message;
pub mod metrics;
pub mod protocol;
pub mod requests;

pub use config::DispatcherConfig;
pub use dispatcher::Dispatcher;
pub use error::{ConfigError, DispatchError, LeaseError, TransportError};
pub use manager::{Leaser, Manager};
pub use message::{Message, PubsubMessage};
pub use metrics::DispatcherMetrics;
pub use protocol::{StreamingPullRequest, ACK_IDS_BATCH_SIZE};
pub use requests::{
    request_queue, AckRequest, DropRequest, LeaseRequest, ModAckRequest, NackRequest,
    RequestItem, RequestQueue, RequestReceiver,
};
