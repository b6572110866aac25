//! Reverse-chronological history scanning.
//!
//! The [`HistoryScanner`] is responsible for:
//! - Walking the ledger's history backward in fixed-depth pages
//! - Stopping at a time horizon or at the end of history
//! - Dispatching every in-window block to all registered listeners
//!   concurrently, with per-listener failures logged and isolated
//! - Aggregating a scan-wide "any listener found work" signal
//!
//! Collaborator failures never escape a scan. A failed page fetch stops the
//! scan early and the partial result is returned with
//! [`ScanOutcome::complete`] set to `false`; the caller only ever sees a
//! synchronous error for an invalid explicit horizon, raised before the
//! first fetch.

use std::sync::Arc;

use futures_util::future::join_all;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};

use ledgerq_sdk::ledger::{Block, HistoryPage, LedgerClient, StapleHash};

use crate::listeners::ListenerRegistry;

/// Records fetched per history page.
pub const HISTORY_PAGE_DEPTH: usize = 20;

/// Lookback of the default short window.
pub const DEFAULT_LOOKBACK: time::Duration = time::Duration::hours(4);

/// Lookback of the extended window.
pub const EXTENDED_LOOKBACK: time::Duration = time::Duration::days(30);

/// The oldest timestamp a scan will still traverse.
///
/// Exactly one form is active per scan invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanHorizon {
    /// Short window: 4 hours before the scan starts.
    Short,
    /// Extended window: 30 days before the scan starts.
    Extended,
    /// Explicit cutoff instant. Must be strictly in the past and strictly
    /// after the epoch; anything else is rejected before the first fetch.
    At(OffsetDateTime),
}

impl Default for ScanHorizon {
    fn default() -> Self {
        Self::Short
    }
}

impl ScanHorizon {
    /// Resolve into an absolute cutoff instant, validating explicit forms.
    pub fn resolve(self, now: OffsetDateTime) -> Result<OffsetDateTime, ScanError> {
        match self {
            Self::Short => Ok(now - DEFAULT_LOOKBACK),
            Self::Extended => Ok(now - EXTENDED_LOOKBACK),
            Self::At(instant) => {
                if instant.unix_timestamp() <= 0 {
                    return Err(ScanError::HorizonNotPositive(instant));
                }
                if instant >= now {
                    return Err(ScanError::HorizonNotInPast(instant));
                }
                Ok(instant)
            }
        }
    }
}

/// Caller-input errors raised synchronously by [`HistoryScanner::scan`].
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan horizon {0} is not strictly in the past")]
    HorizonNotInPast(OffsetDateTime),
    #[error("scan horizon {0} is not after the epoch")]
    HorizonNotPositive(OffsetDateTime),
}

/// Result of one scan invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    /// True when any listener reported outstanding work for any dispatched
    /// block. A scan-wide logical OR, never reset once set.
    pub found_work: bool,
    /// Blocks dispatched before the scan stopped.
    pub blocks_seen: usize,
    /// False when a collaborator failure cut the scan short and this is a
    /// partial result.
    pub complete: bool,
}

impl Default for ScanOutcome {
    fn default() -> Self {
        Self {
            found_work: false,
            blocks_seen: 0,
            complete: true,
        }
    }
}

/// Walks ledger history backward and feeds discovered blocks to listeners.
pub struct HistoryScanner {
    ledger: Arc<dyn LedgerClient>,
    listeners: Arc<ListenerRegistry>,
}

impl HistoryScanner {
    pub fn new(ledger: Arc<dyn LedgerClient>, listeners: Arc<ListenerRegistry>) -> Self {
        Self { ledger, listeners }
    }

    /// The registry this scanner dispatches to.
    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    /// Walk history newest-first until `horizon`, the end of history, or a
    /// collaborator failure.
    ///
    /// Only horizon validation can fail here; everything downstream is
    /// reported through [`ScanOutcome`].
    pub async fn scan(&self, horizon: ScanHorizon) -> Result<ScanOutcome, ScanError> {
        let now = OffsetDateTime::now_utc();
        let cutoff = horizon.resolve(now)?;
        debug!(%cutoff, "starting history scan");
        Ok(self.scan_until(cutoff).await)
    }

    async fn scan_until(&self, cutoff: OffsetDateTime) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        // The cursor starts empty every scan: page one is always the newest
        // data, regardless of where any previous scan stopped.
        let mut cursor: Option<StapleHash> = None;

        'pages: loop {
            let page = HistoryPage {
                depth: HISTORY_PAGE_DEPTH,
                start: cursor.clone(),
            };
            let records = match self.ledger.history(page).await {
                Ok(records) => records,
                Err(err) => {
                    warn!(error = %err, "history fetch failed, returning partial scan result");
                    outcome.complete = false;
                    break;
                }
            };
            if records.is_empty() {
                // Reached the end of all history.
                break;
            }

            for record in &records {
                if record.timestamp < cutoff {
                    // Timestamps are monotonically non-increasing across
                    // pages, so nothing older can still be in the window.
                    break 'pages;
                }
                for block in &record.blocks {
                    outcome.found_work |= self.dispatch(block).await;
                    outcome.blocks_seen += 1;
                }
            }

            match records.last().and_then(|record| record.cursor.clone()) {
                Some(next) => cursor = Some(next),
                // The ledger cannot paginate past this record.
                None => break,
            }
        }

        debug!(
            found_work = outcome.found_work,
            blocks_seen = outcome.blocks_seen,
            complete = outcome.complete,
            "history scan finished"
        );
        outcome
    }

    /// Dispatch one block to every registered listener concurrently.
    async fn dispatch(&self, block: &Block) -> bool {
        let listeners = self.listeners.snapshot();
        if listeners.is_empty() {
            return false;
        }
        let block = Arc::new(block.clone());
        let results = join_all(
            listeners
                .iter()
                .map(|listener| listener.on_block(block.clone())),
        )
        .await;

        let mut found_work = false;
        for result in results {
            match result {
                Ok(requires_work) => found_work |= requires_work,
                Err(err) => {
                    warn!(block = %block.hash, error = %err, "listener failed, continuing scan");
                }
            }
        }
        found_work
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use async_trait::async_trait;
    use ledgerq_sdk::ledger::{BlockHash, HistoryRecord, LedgerError};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::listeners::BlockListener;

    fn block(hash: &str) -> Block {
        Block {
            hash: BlockHash::new(hash),
            operations: Vec::new(),
        }
    }

    fn record(minutes_ago: i64, cursor: Option<&str>, blocks: Vec<Block>) -> HistoryRecord {
        HistoryRecord {
            timestamp: OffsetDateTime::now_utc() - time::Duration::minutes(minutes_ago),
            cursor: cursor.map(StapleHash::new),
            blocks,
        }
    }

    /// Serves a fixed sequence of pages and records every requested cursor.
    #[derive(Default)]
    struct MockLedger {
        pages: Vec<Vec<HistoryRecord>>,
        requests: Mutex<Vec<Option<StapleHash>>>,
        fail_after: Option<usize>,
    }

    impl MockLedger {
        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LedgerClient for MockLedger {
        async fn history(&self, page: HistoryPage) -> Result<Vec<HistoryRecord>, LedgerError> {
            let mut requests = self.requests.lock().unwrap();
            let index = requests.len();
            requests.push(page.start);
            if self.fail_after.is_some_and(|limit| index >= limit) {
                return Err(LedgerError::Transport("node unreachable".into()));
            }
            Ok(self.pages.get(index).cloned().unwrap_or_default())
        }
    }

    /// Counts invocations and answers with a fixed work signal.
    struct CountingListener {
        calls: AtomicUsize,
        requires_work: bool,
    }

    impl CountingListener {
        fn new(requires_work: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                requires_work,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BlockListener for CountingListener {
        async fn on_block(&self, _block: Arc<Block>) -> anyhow::Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.requires_work)
        }
    }

    struct FailingListener;

    #[async_trait]
    impl BlockListener for FailingListener {
        async fn on_block(&self, _block: Arc<Block>) -> anyhow::Result<bool> {
            anyhow::bail!("listener exploded")
        }
    }

    fn scanner_with(ledger: MockLedger) -> (HistoryScanner, Arc<ListenerRegistry>) {
        let registry = Arc::new(ListenerRegistry::new());
        (
            HistoryScanner::new(Arc::new(ledger), registry.clone()),
            registry,
        )
    }

    #[tokio::test]
    async fn default_horizon_is_four_hours() {
        let now = OffsetDateTime::now_utc();
        let cutoff = ScanHorizon::default().resolve(now).unwrap();
        assert_eq!(cutoff, now - time::Duration::hours(4));
    }

    #[tokio::test]
    async fn extended_horizon_is_thirty_days() {
        let now = OffsetDateTime::now_utc();
        let cutoff = ScanHorizon::Extended.resolve(now).unwrap();
        assert_eq!(cutoff, now - time::Duration::days(30));
    }

    #[tokio::test]
    async fn future_horizon_is_rejected_before_any_fetch() {
        let ledger = Arc::new(MockLedger {
            pages: vec![vec![record(1, None, vec![block("aa")])]],
            ..Default::default()
        });
        let registry = Arc::new(ListenerRegistry::new());
        let scanner = HistoryScanner::new(ledger.clone(), registry);
        let future = ScanHorizon::At(OffsetDateTime::now_utc() + time::Duration::hours(1));
        let err = scanner.scan(future).await.unwrap_err();
        assert!(matches!(err, ScanError::HorizonNotInPast(_)));
        assert_eq!(ledger.request_count(), 0);
    }

    #[tokio::test]
    async fn pre_epoch_horizon_is_rejected() {
        let instant = OffsetDateTime::from_unix_timestamp(0).unwrap();
        let err = ScanHorizon::At(instant)
            .resolve(OffsetDateTime::now_utc())
            .unwrap_err();
        assert!(matches!(err, ScanError::HorizonNotPositive(_)));
    }

    #[tokio::test]
    async fn explicit_past_horizon_is_used_verbatim() {
        let now = OffsetDateTime::now_utc();
        let instant = now - time::Duration::hours(2);
        assert_eq!(ScanHorizon::At(instant).resolve(now).unwrap(), instant);
    }

    #[tokio::test]
    async fn stops_at_first_record_past_the_horizon() {
        // Five pages; page 3 holds a record older than the 4h window. The
        // scanner must request pages 1-3 only and skip page 3's remainder.
        let ledger = MockLedger {
            pages: vec![
                vec![record(10, Some("c1"), vec![block("a1")])],
                vec![record(20, Some("c2"), vec![block("a2"), block("a3")])],
                vec![
                    record(30, Some("c3"), vec![block("a4")]),
                    record(60 * 5, Some("c3b"), vec![block("stale1")]),
                    record(60 * 6, Some("c3c"), vec![block("stale2")]),
                ],
                vec![record(60 * 7, Some("c4"), vec![block("stale3")])],
                vec![record(60 * 8, None, vec![block("stale4")])],
            ],
            ..Default::default()
        };
        let (scanner, registry) = scanner_with(ledger);
        let listener = CountingListener::new(false);
        let _registration = registry.register(listener.clone());

        let outcome = scanner.scan(ScanHorizon::Short).await.unwrap();
        assert!(outcome.complete);
        assert_eq!(outcome.blocks_seen, 4);
        assert_eq!(listener.calls(), 4);
    }

    #[tokio::test]
    async fn requests_follow_page_cursors() {
        let ledger = Arc::new(MockLedger {
            pages: vec![
                vec![record(10, Some("c1"), vec![block("a1")])],
                vec![record(20, Some("c2"), vec![block("a2")])],
                vec![],
            ],
            ..Default::default()
        });
        let registry = Arc::new(ListenerRegistry::new());
        let scanner = HistoryScanner::new(ledger.clone(), registry);

        let outcome = scanner.scan(ScanHorizon::Short).await.unwrap();
        assert!(outcome.complete);

        let requests = ledger.requests.lock().unwrap().clone();
        assert_eq!(
            requests,
            vec![
                None,
                Some(StapleHash::new("c1")),
                Some(StapleHash::new("c2")),
            ]
        );
    }

    #[tokio::test]
    async fn horizon_break_prevents_further_page_requests() {
        let ledger = Arc::new(MockLedger {
            pages: vec![
                vec![record(10, Some("c1"), vec![block("a1")])],
                vec![record(20, Some("c2"), vec![block("a2")])],
                vec![
                    record(30, Some("c3"), vec![block("a3")]),
                    record(60 * 5, Some("c3b"), vec![block("stale")]),
                ],
                vec![record(60 * 7, Some("c4"), vec![block("never")])],
            ],
            ..Default::default()
        });
        let registry = Arc::new(ListenerRegistry::new());
        let scanner = HistoryScanner::new(ledger.clone(), registry.clone());
        let listener = CountingListener::new(false);
        let _registration = registry.register(listener.clone());

        scanner.scan(ScanHorizon::Short).await.unwrap();
        assert_eq!(ledger.request_count(), 3);
        // The stale record and everything after it were never dispatched.
        assert_eq!(listener.calls(), 3);
    }

    #[tokio::test]
    async fn missing_cursor_ends_the_scan() {
        let ledger = Arc::new(MockLedger {
            pages: vec![
                vec![record(10, None, vec![block("a1")])],
                vec![record(20, Some("c2"), vec![block("unreached")])],
            ],
            ..Default::default()
        });
        let registry = Arc::new(ListenerRegistry::new());
        let scanner = HistoryScanner::new(ledger.clone(), registry);

        let outcome = scanner.scan(ScanHorizon::Short).await.unwrap();
        assert!(outcome.complete);
        assert_eq!(outcome.blocks_seen, 1);
        assert_eq!(ledger.request_count(), 1);
    }

    #[tokio::test]
    async fn failing_listener_does_not_block_siblings() {
        let ledger = MockLedger {
            pages: vec![vec![record(10, None, vec![block("a1")])]],
            ..Default::default()
        };
        let (scanner, registry) = scanner_with(ledger);
        let first = CountingListener::new(false);
        let third = CountingListener::new(false);
        let _r1 = registry.register(first.clone());
        let _r2 = registry.register(Arc::new(FailingListener));
        let _r3 = registry.register(third.clone());

        let outcome = scanner.scan(ScanHorizon::Short).await.unwrap();
        assert!(outcome.complete);
        assert!(!outcome.found_work);
        assert_eq!(first.calls(), 1);
        assert_eq!(third.calls(), 1);
    }

    #[tokio::test]
    async fn work_signal_is_a_scan_wide_or() {
        let ledger = MockLedger {
            pages: vec![vec![record(
                10,
                None,
                vec![block("a1"), block("a2"), block("a3")],
            )]],
            ..Default::default()
        };
        let (scanner, registry) = scanner_with(ledger);
        let quiet = CountingListener::new(false);
        let busy = CountingListener::new(true);
        let _r1 = registry.register(quiet.clone());
        let _r2 = registry.register(busy.clone());

        let outcome = scanner.scan(ScanHorizon::Short).await.unwrap();
        assert!(outcome.found_work);
    }

    #[tokio::test]
    async fn no_work_when_no_listener_reports_any() {
        let ledger = MockLedger {
            pages: vec![vec![record(10, None, vec![block("a1")])]],
            ..Default::default()
        };
        let (scanner, registry) = scanner_with(ledger);
        let _r = registry.register(CountingListener::new(false));

        let outcome = scanner.scan(ScanHorizon::Short).await.unwrap();
        assert!(!outcome.found_work);
    }

    #[tokio::test]
    async fn fetch_failure_returns_partial_progress() {
        let ledger = Arc::new(MockLedger {
            pages: vec![vec![record(10, Some("c1"), vec![block("a1")])]],
            fail_after: Some(1),
            ..Default::default()
        });
        let registry = Arc::new(ListenerRegistry::new());
        let scanner = HistoryScanner::new(ledger.clone(), registry.clone());
        let busy = CountingListener::new(true);
        let _r = registry.register(busy.clone());

        // Page two errors out; the work found on page one survives.
        let outcome = scanner.scan(ScanHorizon::Short).await.unwrap();
        assert!(!outcome.complete);
        assert!(outcome.found_work);
        assert_eq!(outcome.blocks_seen, 1);
    }

    #[tokio::test]
    async fn empty_history_completes_with_no_work() {
        let ledger = MockLedger::default();
        let (scanner, _registry) = scanner_with(ledger);
        let outcome = scanner.scan(ScanHorizon::Short).await.unwrap();
        assert!(outcome.complete);
        assert!(!outcome.found_work);
        assert_eq!(outcome.blocks_seen, 0);
    }
}
