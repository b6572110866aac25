//! The caller-driven adapter cycle.
//!
//! A [`QueueAdapter`] is responsible for:
//! - Owning the scanner, listener registry, and work queue handle
//! - Deciding per [`run_cycle`](QueueAdapter::run_cycle) whether a scan is
//!   due and running at most one
//! - Driving the queue's own processing step every cycle
//! - Enforcing the enqueue identity integrity check
//!
//! The adapter expects a single external driver (a timer loop) to invoke
//! `run_cycle` sequentially. Overlapping invocations are not an error: the
//! schedule state sits behind an async mutex, so a second caller waits and
//! then finds the cadence freshly stamped and skips the scan.

use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;

use ledgerq_sdk::codec::{CodecError, RequestCodec};
use ledgerq_sdk::identity::{LedgerEvent, RequestId};
use ledgerq_sdk::ledger::LedgerClient;
use ledgerq_sdk::queue::{AddOptions, QueueError, RunStepOptions, WorkQueue};

use crate::adapters::enqueue::{EnqueueListener, EventSelector, Granularity};
use crate::adapters::schedule::ScanSchedule;
use crate::config::AdapterConfig;
use crate::listeners::{BlockListener, ListenerRegistry, Registration};
use crate::scanner::{HistoryScanner, ScanError, ScanHorizon, ScanOutcome};

/// Errors surfaced to an adapter's caller.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The caller supplied an explicit id that does not match the identity
    /// derived from the event's coordinates. This is a caller bug, raised
    /// before any queue write and never retried.
    #[error("explicit request id {supplied} does not match derived identity {derived}")]
    IdentityMismatch {
        supplied: RequestId,
        derived: RequestId,
    },
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Binds the scanner's discovery stream to the work queue.
///
/// Constructed at block or operation granularity; everything else is shared.
pub struct QueueAdapter<S: EventSelector> {
    scanner: HistoryScanner,
    listeners: Arc<ListenerRegistry>,
    queue: Arc<dyn WorkQueue>,
    selector: Arc<S>,
    codec: Arc<dyn RequestCodec<S::Request>>,
    auto_scan: bool,
    schedule: tokio::sync::Mutex<ScanSchedule>,
    // Keeps the enqueue listener registered for the adapter's lifetime.
    _registration: Registration,
}

impl<S: EventSelector> QueueAdapter<S> {
    /// Adapter producing one work item per matching block.
    pub fn block_level(
        ledger: Arc<dyn LedgerClient>,
        queue: Arc<dyn WorkQueue>,
        selector: S,
        codec: Arc<dyn RequestCodec<S::Request>>,
        config: AdapterConfig,
    ) -> Self {
        Self::new(Granularity::Block, ledger, queue, selector, codec, config)
    }

    /// Adapter producing one work item per matching operation.
    pub fn operation_level(
        ledger: Arc<dyn LedgerClient>,
        queue: Arc<dyn WorkQueue>,
        selector: S,
        codec: Arc<dyn RequestCodec<S::Request>>,
        config: AdapterConfig,
    ) -> Self {
        Self::new(
            Granularity::Operation,
            ledger,
            queue,
            selector,
            codec,
            config,
        )
    }

    fn new(
        granularity: Granularity,
        ledger: Arc<dyn LedgerClient>,
        queue: Arc<dyn WorkQueue>,
        selector: S,
        codec: Arc<dyn RequestCodec<S::Request>>,
        config: AdapterConfig,
    ) -> Self {
        let listeners = Arc::new(ListenerRegistry::new());
        let selector = Arc::new(selector);
        let registration = listeners.register(Arc::new(EnqueueListener::new(
            granularity,
            selector.clone(),
            codec.clone(),
            queue.clone(),
        )));
        Self {
            scanner: HistoryScanner::new(ledger, listeners.clone()),
            listeners,
            queue,
            selector,
            codec,
            auto_scan: config.auto_scan,
            schedule: tokio::sync::Mutex::new(ScanSchedule::new(
                config.regular_interval(),
                config.extended_interval(),
            )),
            _registration: registration,
        }
    }

    /// Subscribe an additional listener to blocks discovered by this
    /// adapter's scans.
    pub fn register(&self, listener: Arc<dyn BlockListener>) -> Registration {
        self.listeners.register(listener)
    }

    /// Run one scan immediately. `None` uses the default short window.
    pub async fn scan(&self, horizon: Option<ScanHorizon>) -> Result<ScanOutcome, ScanError> {
        self.scanner.scan(horizon.unwrap_or_default()).await
    }

    /// One adapter cycle: scan when due, then drive the queue.
    ///
    /// Returns `true` when the scan found work or the queue reports more
    /// work remaining.
    pub async fn run_cycle(&self) -> Result<bool, AdapterError> {
        let mut found_work = false;

        if self.auto_scan {
            let mut schedule = self.schedule.lock().await;
            let now = OffsetDateTime::now_utc();
            if let Some(due) = schedule.decide(now) {
                debug!(horizon = ?due.horizon, "scan due, running it");
                let outcome = self.scanner.scan(due.horizon).await?;
                schedule.mark_ran(&due, now);
                found_work = outcome.found_work;
            }
        }

        let more_work = self.queue.run_step(RunStepOptions::default()).await?;
        Ok(found_work || more_work)
    }

    /// Enqueue work for `event` directly, outside a scan.
    ///
    /// When `options.id` is supplied it must equal the identity derived
    /// from the event's coordinates; a mismatch fails before any queue
    /// write. The entry is always stored under the derived identity.
    pub async fn enqueue(
        &self,
        event: &LedgerEvent,
        options: AddOptions,
    ) -> Result<RequestId, AdapterError> {
        let derived = event.request_id();
        if let Some(supplied) = options.id
            && supplied != derived
        {
            return Err(AdapterError::IdentityMismatch { supplied, derived });
        }

        let payload = self.codec.encode(&self.selector.request(event))?;
        let id = self
            .queue
            .add(
                payload,
                AddOptions {
                    id: Some(derived),
                    parents: options.parents,
                },
            )
            .await?;
        Ok(id)
    }
}
