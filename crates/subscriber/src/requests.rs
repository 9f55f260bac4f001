//! Pending acknowledgement-domain actions, as queued by message handles.

use streampull_batcher::{BatchReceiver, BatchSender};

/// Message newly delivered; track it against flow-control limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRequest {
    pub ack_id: String,
    pub byte_size: usize,
    pub ordering_key: String,
}

/// Set the redelivery deadline of one message. `seconds == 0` nacks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModAckRequest {
    pub ack_id: String,
    pub seconds: u32,
}

/// Message fully processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckRequest {
    pub ack_id: String,
    pub byte_size: usize,
    /// Whole seconds between receipt and ack, rounded up.
    pub time_to_ack: Option<u64>,
    pub ordering_key: String,
}

/// Message declined; the server redelivers it immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NackRequest {
    pub ack_id: String,
    pub byte_size: usize,
    pub ordering_key: String,
}

/// Stop lease tracking without telling the server anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropRequest {
    pub ack_id: String,
    pub byte_size: usize,
    pub ordering_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestItem {
    Lease(LeaseRequest),
    ModAck(ModAckRequest),
    Ack(AckRequest),
    Nack(NackRequest),
    Drop(DropRequest),
}

impl RequestItem {
    pub fn ack_id(&self) -> &str {
        match self {
            RequestItem::Lease(r) => &r.ack_id,
            RequestItem::ModAck(r) => &r.ack_id,
            RequestItem::Ack(r) => &r.ack_id,
            RequestItem::Nack(r) => &r.ack_id,
            RequestItem::Drop(r) => &r.ack_id,
        }
    }

    /// Label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RequestItem::Lease(_) => "lease",
            RequestItem::ModAck(_) => "modack",
            RequestItem::Ack(_) => "ack",
            RequestItem::Nack(_) => "nack",
            RequestItem::Drop(_) => "drop",
        }
    }
}

impl From<LeaseRequest> for RequestItem {
    fn from(r: LeaseRequest) -> Self {
        RequestItem::Lease(r)
    }
}

impl From<ModAckRequest> for RequestItem {
    fn from(r: ModAckRequest) -> Self {
        RequestItem::ModAck(r)
    }
}

impl From<AckRequest> for RequestItem {
    fn from(r: AckRequest) -> Self {
        RequestItem::Ack(r)
    }
}

impl From<NackRequest> for RequestItem {
    fn from(r: NackRequest) -> Self {
        RequestItem::Nack(r)
    }
}

impl From<DropRequest> for RequestItem {
    fn from(r: DropRequest) -> Self {
        RequestItem::Drop(r)
    }
}

impl From<&AckRequest> for DropRequest {
    fn from(r: &AckRequest) -> Self {
        DropRequest {
            ack_id: r.ack_id.clone(),
            byte_size: r.byte_size,
            ordering_key: r.ordering_key.clone(),
        }
    }
}

impl From<&NackRequest> for DropRequest {
    fn from(r: &NackRequest) -> Self {
        DropRequest {
            ack_id: r.ack_id.clone(),
            byte_size: r.byte_size,
            ordering_key: r.ordering_key.clone(),
        }
    }
}

impl From<&NackRequest> for ModAckRequest {
    fn from(r: &NackRequest) -> Self {
        ModAckRequest {
            ack_id: r.ack_id.clone(),
            seconds: 0,
        }
    }
}

/// Producer side of the shared request queue. Cheap to clone.
pub type RequestQueue = BatchSender<RequestItem>;

/// Consumer side of the shared request queue, owned by the dispatcher.
pub type RequestReceiver = BatchReceiver<RequestItem>;

/// Create the shared request queue.
pub fn request_queue() -> (RequestQueue, RequestReceiver) {
    streampull_batcher::queue()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nack_converts_to_zero_modack_and_drop() {
        let nack = NackRequest {
            ack_id: "n1".to_string(),
            byte_size: 42,
            ordering_key: "k".to_string(),
        };

        assert_eq!(
            ModAckRequest::from(&nack),
            ModAckRequest {
                ack_id: "n1".to_string(),
                seconds: 0
            }
        );
        assert_eq!(
            DropRequest::from(&nack),
            DropRequest {
                ack_id: "n1".to_string(),
                byte_size: 42,
                ordering_key: "k".to_string()
            }
        );
    }

    #[test]
    fn test_ack_converts_to_drop() {
        let ack = AckRequest {
            ack_id: "a1".to_string(),
            byte_size: 7,
            time_to_ack: Some(3),
            ordering_key: String::new(),
        };
        let drop = DropRequest::from(&ack);
        assert_eq!(drop.ack_id, "a1");
        assert_eq!(drop.byte_size, 7);
        assert!(drop.ordering_key.is_empty());
    }

    #[test]
    fn test_item_kind_and_ack_id() {
        let item: RequestItem = ModAckRequest {
            ack_id: "m".to_string(),
            seconds: 30,
        }
        .into();
        assert_eq!(item.kind(), "modack");
        assert_eq!(item.ack_id(), "m");
    }
}
