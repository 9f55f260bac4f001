use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use quanta::{Clock, Instant};
use tracing::{debug, error};

use crate::error::LeaseError;
use crate::latency::CLOCK;
use crate::manager::Leaser;
use crate::requests::{DropRequest, LeaseRequest};

/// Lease bookkeeping for one in-flight message
#[derive(Debug, Clone, PartialEq)]
pub struct LeasedMessage {
    pub byte_size: usize,
    pub ordering_key: String,
    pub leased_at: Instant,
}

/// Lease tracker backed by a concurrent map.
///
/// Mutated by the dispatcher worker only; counts may be read from anywhere.
pub struct InMemoryLeaser {
    leased: DashMap<String, LeasedMessage>,
    bytes: AtomicUsize,
    clock: Clock,
}

impl InMemoryLeaser {
    pub fn new() -> Self {
        Self::with_clock(CLOCK.clone())
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            leased: DashMap::new(),
            bytes: AtomicUsize::new(0),
            clock,
        }
    }

    pub fn message_count(&self) -> usize {
        self.leased.len()
    }

    /// Total byte size of leased messages
    pub fn bytes(&self) -> usize {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn contains(&self, ack_id: &str) -> bool {
        self.leased.contains_key(ack_id)
    }

    pub fn get(&self, ack_id: &str) -> Option<LeasedMessage> {
        self.leased.get(ack_id).map(|entry| entry.value().clone())
    }

    pub fn ack_ids(&self) -> Vec<String> {
        self.leased.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl Default for InMemoryLeaser {
    fn default() -> Self {
        Self::new()
    }
}

impl Leaser for InMemoryLeaser {
    fn add(&self, items: &[LeaseRequest]) -> Result<(), LeaseError> {
        for item in items {
            match self.leased.entry(item.ack_id.clone()) {
                Entry::Occupied(_) => {
                    debug!(ack_id = %item.ack_id, "message already lease managed");
                }
                Entry::Vacant(slot) => {
                    slot.insert(LeasedMessage {
                        byte_size: item.byte_size,
                        ordering_key: item.ordering_key.clone(),
                        leased_at: self.clock.now(),
                    });
                    self.bytes.fetch_add(item.byte_size, Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }

    fn remove(&self, items: &[DropRequest]) -> Result<(), LeaseError> {
        for item in items {
            let Some((_, leased)) = self.leased.remove(&item.ack_id) else {
                debug!(ack_id = %item.ack_id, "message not lease managed");
                continue;
            };
            let previous = self
                .bytes
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |b| {
                    Some(b.saturating_sub(leased.byte_size))
                })
                .unwrap_or_else(|b| b);
            if previous < leased.byte_size {
                error!(
                    ack_id = %item.ack_id,
                    bytes = previous,
                    byte_size = leased.byte_size,
                    "leased bytes would go negative"
                );
            }
        }
        Ok(())
    }
}
