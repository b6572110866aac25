//! The dispatch target that turns discovered events into queue work.
//!
//! One [`EnqueueListener`] is registered per adapter. For every block the
//! scanner hands it, the listener enumerates the adapter's events (the whole
//! block, or each operation position), asks the caller-supplied
//! [`EventSelector`] which of them matter, and enqueues the matching ones
//! under their derived identities. The idempotent queue `add` makes
//! re-discovery across overlapping scans harmless.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::warn;

use ledgerq_sdk::codec::RequestCodec;
use ledgerq_sdk::identity::LedgerEvent;
use ledgerq_sdk::ledger::Block;
use ledgerq_sdk::queue::{AddOptions, WorkQueue};

use crate::listeners::BlockListener;

/// How an adapter maps one discovered block onto queue work items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// One work item per matching block.
    Block,
    /// One work item per matching operation within a block.
    Operation,
}

/// Capability supplied per adapter instantiation: which discovered events
/// become queue work, and what request payload they carry.
#[async_trait]
pub trait EventSelector: Send + Sync + 'static {
    /// Domain request type enqueued for matching events.
    type Request: Send + Sync;

    /// Whether `event` should be enqueued.
    async fn include(&self, event: &LedgerEvent) -> anyhow::Result<bool>;

    /// Build the request payload for an included event.
    fn request(&self, event: &LedgerEvent) -> Self::Request;
}

/// Internal listener binding a selector, codec, and queue together.
pub(crate) struct EnqueueListener<S: EventSelector> {
    granularity: Granularity,
    selector: Arc<S>,
    codec: Arc<dyn RequestCodec<S::Request>>,
    queue: Arc<dyn WorkQueue>,
}

impl<S: EventSelector> EnqueueListener<S> {
    pub(crate) fn new(
        granularity: Granularity,
        selector: Arc<S>,
        codec: Arc<dyn RequestCodec<S::Request>>,
        queue: Arc<dyn WorkQueue>,
    ) -> Self {
        Self {
            granularity,
            selector,
            codec,
            queue,
        }
    }

    /// Filter one event and enqueue it when included. Returns whether the
    /// event matched.
    async fn consider(&self, event: LedgerEvent) -> anyhow::Result<bool> {
        if !self.selector.include(&event).await? {
            return Ok(false);
        }
        let payload = self.codec.encode(&self.selector.request(&event))?;
        self.queue
            .add(
                payload,
                AddOptions {
                    id: Some(event.request_id()),
                    parents: None,
                },
            )
            .await?;
        Ok(true)
    }
}

#[async_trait]
impl<S: EventSelector> BlockListener for EnqueueListener<S> {
    async fn on_block(&self, block: Arc<Block>) -> anyhow::Result<bool> {
        match self.granularity {
            Granularity::Block => self.consider(LedgerEvent::whole_block(block)).await,
            Granularity::Operation => {
                let considered = (0..block.operations.len())
                    .map(|index| self.consider(LedgerEvent::operation_at(block.clone(), index)));
                let results = join_all(considered).await;

                let mut found_work = false;
                for (index, result) in results.into_iter().enumerate() {
                    match result {
                        Ok(matched) => found_work |= matched,
                        // Sibling operations are unaffected by one failing
                        // predicate or enqueue.
                        Err(err) => {
                            warn!(
                                block = %block.hash,
                                operation = index,
                                error = %err,
                                "operation enqueue failed"
                            );
                        }
                    }
                }
                Ok(found_work)
            }
        }
    }
}
