//! The work queue contract consumed by the indexing core.
//!
//! The queue itself is an external collaborator: durable entry storage,
//! retry scheduling, and completion bookkeeping all live behind this trait.
//! The core only relies on two behaviors:
//!
//! * `add` is idempotent by id — adding an entry whose id is already
//!   present must not duplicate it.
//! * `run_step` drains or executes some queued work and reports whether
//!   more remains.

use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::identity::RequestId;

/// Dedup and ordering metadata for [`WorkQueue::add`].
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    /// Explicit dedup key. When absent, the queue derives its own.
    pub id: Option<RequestId>,
    /// Identities this entry must not coexist with as parents. The queue
    /// rejects the add with [`QueueError::ParentsAlreadyPresent`] when the
    /// constraint is violated.
    pub parents: Option<BTreeSet<RequestId>>,
}

/// Options for one [`WorkQueue::run_step`] invocation.
#[derive(Debug, Clone, Default)]
pub struct RunStepOptions {
    /// Upper bound on entries to process this step. `None` lets the queue
    /// pick its own batch size.
    pub max_items: Option<usize>,
}

/// Errors surfaced by a work queue implementation.
#[derive(Debug, Error)]
pub enum QueueError {
    /// A parent-conflict constraint was violated. This signals a
    /// business-logic ordering problem, not a transient fault, so it carries
    /// the offending identities for the caller to act on.
    #[error("parent request(s) already present: {}", format_ids(.parents))]
    ParentsAlreadyPresent { parents: Vec<RequestId> },
    /// Failure in the queue's storage engine.
    #[error("queue storage error: {0}")]
    Storage(String),
}

fn format_ids(ids: &[RequestId]) -> String {
    ids.iter()
        .map(RequestId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A durable, deduplicated store of pending work.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Add a work item. Idempotent by `options.id`: a second add with the
    /// same id returns the existing entry's id without duplicating it.
    async fn add(
        &self,
        request: serde_json::Value,
        options: AddOptions,
    ) -> Result<RequestId, QueueError>;

    /// Process some queued work. Returns `true` when more work remains
    /// after this step.
    async fn run_step(&self, options: RunStepOptions) -> Result<bool, QueueError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_conflict_error_names_the_offenders() {
        let err = QueueError::ParentsAlreadyPresent {
            parents: vec![
                crate::identity::block_request_id(&crate::ledger::BlockHash::new("aa")),
                crate::identity::block_request_id(&crate::ledger::BlockHash::new("bb")),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("parent request(s) already present"));
        assert!(text.contains(", "));
    }
}
