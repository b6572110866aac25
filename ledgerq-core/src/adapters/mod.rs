//! Queue adapters: bind scanner discovery to the work queue.
//!
//! An adapter owns a [`crate::scanner::HistoryScanner`] and a
//! [`ledgerq_sdk::queue::WorkQueue`] and exposes a single caller-driven
//! `run_cycle` step:
//!
//! - `ScanSchedule` decides whether a regular or extended scan is due
//! - `EnqueueListener` turns discovered events into idempotent queue adds
//! - `QueueAdapter` runs the scan-then-drain cycle and the enqueue
//!   integrity check

pub mod enqueue;
pub mod queue_adapter;
pub mod schedule;

pub use enqueue::{EventSelector, Granularity};
pub use queue_adapter::{AdapterError, QueueAdapter};
pub use schedule::{DueScan, ScanSchedule};
