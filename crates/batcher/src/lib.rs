//! streampull-batcher: bounded-size, bounded-latency batch collection
//!
//! A single background worker drains an unbounded queue into batches and
//! hands each batch to a [`BatchHandler`]. A poison pill sent through the
//! queue stops the worker.

pub mod queue;
pub mod worker;

pub use queue::{queue, BatchReceiver, BatchSender, Collected, Envelope, QueueClosed};
pub use worker::{BatchHandler, BatchLimits, BatchWorker, ExitReason, WorkerExit};
