//! Prometheus counters for the dispatch pipeline

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

const LABEL_KIND: &str = "kind";

/// Dispatcher counters, registered into a caller-owned registry.
#[derive(Clone)]
pub struct DispatcherMetrics {
    pub batches: IntCounter,
    pub items: IntCounterVec,
    pub requests_sent: IntCounterVec,
    pub worker_failures: IntCounter,
}

impl DispatcherMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let batches = IntCounter::new(
            "streampull_dispatch_batches_total",
            "Request batches handled by the dispatcher",
        )?;
        let items = IntCounterVec::new(
            Opts::new(
                "streampull_dispatch_items_total",
                "Request items dispatched, by kind",
            ),
            &[LABEL_KIND],
        )?;
        let requests_sent = IntCounterVec::new(
            Opts::new(
                "streampull_requests_sent_total",
                "Streaming pull requests sent, by kind",
            ),
            &[LABEL_KIND],
        )?;
        let worker_failures = IntCounter::new(
            "streampull_dispatch_worker_failures_total",
            "Dispatch workers stopped by a downstream error",
        )?;

        registry.register(Box::new(batches.clone()))?;
        registry.register(Box::new(items.clone()))?;
        registry.register(Box::new(requests_sent.clone()))?;
        registry.register(Box::new(worker_failures.clone()))?;

        Ok(Self {
            batches,
            items,
            requests_sent,
            worker_failures,
        })
    }

    pub(crate) fn record_items(&self, kind: &str, count: usize) {
        if count > 0 {
            self.items.with_label_values(&[kind]).inc_by(count as u64);
        }
    }

    pub(crate) fn record_sent(&self, kind: &str) {
        self.requests_sent.with_label_values(&[kind]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once() {
        let registry = Registry::new();
        let metrics = DispatcherMetrics::new(&registry).unwrap();
        metrics.record_items("ack", 3);
        metrics.record_items("nack", 0);
        metrics.record_sent("ack");

        assert_eq!(metrics.items.with_label_values(&["ack"]).get(), 3);
        assert_eq!(metrics.items.with_label_values(&["nack"]).get(), 0);
        assert_eq!(metrics.requests_sent.with_label_values(&["ack"]).get(), 1);

        assert!(DispatcherMetrics::new(&registry).is_err());
    }
}
