//! Ledger history types and the client contract.
//!
//! The indexing core never talks to the network itself. It consumes an
//! implementation of [`LedgerClient`], which wraps the ledger's only read
//! surface: a reverse-chronological, paginated history API. There is no
//! subscription or push interface; everything downstream is built on
//! repeatedly walking these pages.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

/// Hex text of a block hash, as reported by the ledger.
///
/// The ledger is not consistent about casing in its textual representation,
/// so this type preserves whatever it was given; case normalization happens
/// where it matters, in [`crate::identity`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockHash(String);

impl BlockHash {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlockHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockHash {
    fn from(text: &str) -> Self {
        Self(text.to_owned())
    }
}

/// Hash identifying a whole vote staple (a block group within one history
/// record). Used as the pagination cursor for the next older page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StapleHash(String);

impl StapleHash {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StapleHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single operation inside a block.
///
/// The operation schema belongs to the ledger client; the indexer carries it
/// as opaque JSON so that predicates can inspect it without this crate
/// committing to a ledger version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Operation(pub serde_json::Value);

/// A block discovered in the ledger's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub hash: BlockHash,
    /// Operations in ledger order. Operation-level work items are keyed by
    /// position in this list.
    #[serde(default)]
    pub operations: Vec<Operation>,
}

/// One timestamped record from a history page: a vote staple with the blocks
/// it settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Settlement time of the staple. History pages are ordered by this,
    /// newest first, monotonically non-increasing across pages.
    pub timestamp: OffsetDateTime,
    /// Terminal staple hash, used as the cursor for the next older page.
    /// Absent on records the ledger cannot paginate past.
    pub cursor: Option<StapleHash>,
    pub blocks: Vec<Block>,
}

/// Request for one page of history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    /// Number of records to return, newest first.
    pub depth: usize,
    /// Resume point from a previous page's terminal cursor. `None` starts
    /// from the newest record.
    pub start: Option<StapleHash>,
}

/// Errors surfaced by a ledger client.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Network or node failure while fetching a page.
    #[error("ledger transport error: {0}")]
    Transport(String),
    /// The node answered with something the client could not interpret.
    #[error("malformed history response: {0}")]
    Malformed(String),
}

/// The ledger's history API, as consumed by the indexing core.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetch one page of history, newest first. An empty page signals the
    /// end of all history.
    async fn history(&self, page: HistoryPage) -> Result<Vec<HistoryRecord>, LedgerError>;
}
