//! Delivered message handle.
//!
//! Every acknowledgement action on a [`Message`] is a non-blocking push onto
//! the shared request queue. The handle never talks to the transport or the
//! lease tracker itself; the dispatcher does that from its worker.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use quanta::{Clock, Instant};
use tracing::warn;

use crate::latency::{ceil_secs, CLOCK};
use crate::requests::{
    AckRequest, DropRequest, ModAckRequest, NackRequest, RequestItem, RequestQueue,
};

/// Data bytes shown by `Display` before truncation
const DISPLAY_DATA_BYTES: usize = 50;

/// Message payload as received off the stream
#[derive(Debug, Clone, PartialEq)]
pub struct PubsubMessage {
    pub message_id: String,
    pub data: Bytes,
    pub attributes: HashMap<String, String>,
    pub publish_time: DateTime<Utc>,
    pub ordering_key: String,
}

impl PubsubMessage {
    /// Serialized size of the message in its protobuf wire form.
    pub fn byte_size(&self) -> usize {
        let mut size = 0;
        if !self.data.is_empty() {
            size += len_delimited(self.data.len());
        }
        for (key, value) in &self.attributes {
            let entry = len_delimited(key.len()) + len_delimited(value.len());
            size += len_delimited(entry);
        }
        if !self.message_id.is_empty() {
            size += len_delimited(self.message_id.len());
        }
        size += len_delimited(timestamp_size(&self.publish_time));
        if !self.ordering_key.is_empty() {
            size += len_delimited(self.ordering_key.len());
        }
        size
    }
}

fn varint_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// One-byte tag + length prefix + payload
fn len_delimited(len: usize) -> usize {
    1 + varint_len(len as u64) + len
}

fn timestamp_size(ts: &DateTime<Utc>) -> usize {
    let seconds = ts.timestamp();
    let nanos = ts.timestamp_subsec_nanos();
    let mut size = 0;
    if seconds != 0 {
        // int64 varints sign-extend to ten bytes when negative
        size += 1 + varint_len(seconds as u64);
    }
    if nanos != 0 {
        size += 1 + varint_len(u64::from(nanos));
    }
    size
}

/// Handle for one delivery attempt of one message.
///
/// Calling more than one of `ack`, `nack` and `drop` is not guarded against;
/// the caller is responsible for settling a message once.
#[derive(Debug)]
pub struct Message {
    message_id: String,
    ack_id: String,
    delivery_attempt: Option<u32>,
    data: Bytes,
    attributes: HashMap<String, String>,
    publish_time: DateTime<Utc>,
    ordering_key: String,
    size: usize,
    received_at: Instant,
    clock: Clock,
    queue: RequestQueue,
}

impl Message {
    /// Wrap a received message. `delivery_attempt <= 0` means no dead-letter
    /// policy is configured on the subscription.
    pub fn new(
        message: PubsubMessage,
        ack_id: impl Into<String>,
        delivery_attempt: i32,
        queue: RequestQueue,
    ) -> Self {
        Self::with_clock(message, ack_id, delivery_attempt, queue, CLOCK.clone())
    }

    /// Like [`Message::new`] with an explicit clock for latency measurement.
    pub fn with_clock(
        message: PubsubMessage,
        ack_id: impl Into<String>,
        delivery_attempt: i32,
        queue: RequestQueue,
        clock: Clock,
    ) -> Self {
        let received_at = clock.now();
        let size = message.byte_size();
        Self {
            message_id: message.message_id,
            ack_id: ack_id.into(),
            delivery_attempt: u32::try_from(delivery_attempt).ok().filter(|n| *n > 0),
            data: message.data,
            attributes: message.attributes,
            publish_time: message.publish_time,
            ordering_key: message.ordering_key,
            size,
            received_at,
            clock,
            queue,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn ack_id(&self) -> &str {
        &self.ack_id
    }

    /// 1 + number of nacks and expired deadlines so far. `None` without a
    /// dead-letter policy. Approximate.
    pub fn delivery_attempt(&self) -> Option<u32> {
        self.delivery_attempt
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }

    pub fn publish_time(&self) -> DateTime<Utc> {
        self.publish_time
    }

    /// Empty when the message was published without an ordering key.
    pub fn ordering_key(&self) -> &str {
        &self.ordering_key
    }

    /// Serialized size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Acknowledge the message. Best effort; redelivery is still possible.
    pub fn ack(&self) {
        let elapsed = self.clock.now().duration_since(self.received_at);
        self.enqueue(
            AckRequest {
                ack_id: self.ack_id.clone(),
                byte_size: self.size,
                time_to_ack: Some(ceil_secs(elapsed)),
                ordering_key: self.ordering_key.clone(),
            }
            .into(),
        );
    }

    /// Decline the message so it is redelivered right away.
    pub fn nack(&self) {
        self.enqueue(
            NackRequest {
                ack_id: self.ack_id.clone(),
                byte_size: self.size,
                ordering_key: self.ordering_key.clone(),
            }
            .into(),
        );
    }

    /// Reset the ack deadline to `seconds` from now.
    ///
    /// Should be within 0..=600; values under 10 are risky with network
    /// latency but are passed through unchanged.
    pub fn modify_ack_deadline(&self, seconds: u32) {
        self.enqueue(
            ModAckRequest {
                ack_id: self.ack_id.clone(),
                seconds,
            }
            .into(),
        );
    }

    /// Release the message from lease management without acking it.
    ///
    /// `ack` and `nack` already drop the message; this is for lifecycle
    /// cleanup. The server redelivers after the current lease expires.
    pub fn drop(&self) {
        self.enqueue(
            DropRequest {
                ack_id: self.ack_id.clone(),
                byte_size: self.size,
                ordering_key: self.ordering_key.clone(),
            }
            .into(),
        );
    }

    fn enqueue(&self, item: RequestItem) {
        if let Err(e) = self.queue.put(item) {
            warn!(ack_id = %self.ack_id, error = %e, "request queue closed, request discarded");
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut data = String::from_utf8_lossy(&self.data[..self.data.len().min(DISPLAY_DATA_BYTES)])
            .into_owned();
        if self.data.len() > DISPLAY_DATA_BYTES {
            data.push_str("...");
        }
        let sorted: BTreeMap<&String, &String> = self.attributes.iter().collect();
        let attributes = serde_json::to_string_pretty(&sorted).map_err(|_| fmt::Error)?;

        writeln!(f, "Message {{")?;
        writeln!(f, "  data: {:?}", data)?;
        writeln!(f, "  ordering_key: {:?}", self.ordering_key)?;
        writeln!(f, "  attributes: {}", attributes.replace('\n', "\n  "))?;
        write!(f, "}}")
    }
}
