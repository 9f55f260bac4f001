//! Outbound streaming-pull request and size-bounded chunking.

use serde::{Deserialize, Serialize};

use crate::requests::{AckRequest, ModAckRequest};

/// Backend limit for one acknowledge / modify-deadline request (512 KiB)
pub const MAX_REQUEST_BYTES: usize = 524_288;

/// Largest ack id the backend hands out
pub const MAX_ACK_ID_BYTES: usize = 164;

/// Per-id field framing on the wire
const ACK_ID_FRAMING_BYTES: usize = 12;

/// Max ack ids (or ack id / seconds pairs) per outbound request
pub const ACK_IDS_BATCH_SIZE: usize = 2500;

/// One request on the streaming pull connection.
///
/// Any combination of the fields may be set. `modify_deadline_ack_ids` and
/// `modify_deadline_seconds` pair up positionally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingPullRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ack_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modify_deadline_ack_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modify_deadline_seconds: Vec<u32>,
}

impl StreamingPullRequest {
    pub fn acknowledge(ack_ids: Vec<String>) -> Self {
        Self {
            ack_ids,
            ..Self::default()
        }
    }

    pub fn modify_deadline(ack_ids: Vec<String>, seconds: Vec<u32>) -> Self {
        Self {
            modify_deadline_ack_ids: ack_ids,
            modify_deadline_seconds: seconds,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ack_ids.is_empty() && self.modify_deadline_ack_ids.is_empty()
    }
}

/// Derive a per-request id cap from the request size ceiling.
///
/// Rounds down to a multiple of 500 to leave room for request overhead.
pub fn ack_ids_batch_size_for(max_request_bytes: usize, max_ack_id_bytes: usize) -> usize {
    let raw = max_request_bytes / (max_ack_id_bytes + ACK_ID_FRAMING_BYTES);
    if raw >= 500 {
        raw - raw % 500
    } else {
        raw.max(1)
    }
}

/// Split acks into `ceil(len / cap)` acknowledge requests, in order.
pub fn ack_requests(items: &[AckRequest], cap: usize) -> Vec<StreamingPullRequest> {
    items
        .chunks(cap.max(1))
        .map(|chunk| {
            StreamingPullRequest::acknowledge(chunk.iter().map(|i| i.ack_id.clone()).collect())
        })
        .collect()
}

/// Split deadline changes into `ceil(len / cap)` requests, in order.
pub fn modify_deadline_requests(items: &[ModAckRequest], cap: usize) -> Vec<StreamingPullRequest> {
    items
        .chunks(cap.max(1))
        .map(|chunk| {
            let (ack_ids, seconds) = chunk
                .iter()
                .map(|i| (i.ack_id.clone(), i.seconds))
                .unzip();
            StreamingPullRequest::modify_deadline(ack_ids, seconds)
        })
        .collect()
}
