//! Deterministic request identities for queue deduplication.
//!
//! Every piece of queued work is keyed by a [`RequestId`] derived from the
//! coordinates of the ledger event that produced it:
//!
//! * **Block-level**: `SHA-256(lowercase(block_hash_text))`
//! * **Operation-level**: `SHA-256(lowercase(block_hash_text) ":" index)`
//!
//! The hash text is lowercased first, so identity is case-insensitive with
//! respect to the ledger's textual hash representation. The operation form
//! appends the position with a delimiter, which keeps the two identity
//! spaces disjoint: the inputs differ, so the digests differ.
//!
//! Identities are pure functions of their coordinates. Two events with the
//! same coordinates always map to the same id, which is what makes the work
//! queue's idempotent `add` safe across overlapping scans and restarts.

use std::sync::Arc;

use ring::digest;
use serde::{Deserialize, Serialize};

use crate::ledger::{Block, BlockHash, Operation};

/// Delimiter between the block hash and the operation position in the
/// operation-level identity input.
pub const OPERATION_DELIMITER: &str = ":";

/// A content-derived dedup key: lowercase hex of a SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    fn from_input(input: &str) -> Self {
        let digest = digest::digest(&digest::SHA256, input.as_bytes());
        Self(hex::encode(digest.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity for work covering a whole block.
pub fn block_request_id(hash: &BlockHash) -> RequestId {
    RequestId::from_input(&hash.as_str().to_lowercase())
}

/// Identity for work covering one operation within a block.
pub fn operation_request_id(hash: &BlockHash, index: usize) -> RequestId {
    let input = format!(
        "{}{}{}",
        hash.as_str().to_lowercase(),
        OPERATION_DELIMITER,
        index
    );
    RequestId::from_input(&input)
}

/// A discovered ledger event: a block, optionally narrowed to a single
/// operation within it. Immutable once discovered.
#[derive(Debug, Clone)]
pub struct LedgerEvent {
    block: Arc<Block>,
    operation: Option<usize>,
}

impl LedgerEvent {
    /// Event covering the whole block.
    pub fn whole_block(block: Arc<Block>) -> Self {
        Self {
            block,
            operation: None,
        }
    }

    /// Event narrowed to the operation at `index` (zero-based).
    pub fn operation_at(block: Arc<Block>, index: usize) -> Self {
        Self {
            block,
            operation: Some(index),
        }
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn operation_index(&self) -> Option<usize> {
        self.operation
    }

    /// The operation this event is narrowed to, when it exists in the block.
    pub fn operation(&self) -> Option<&Operation> {
        self.operation
            .and_then(|index| self.block.operations.get(index))
    }

    /// The dedup key for this event's coordinates.
    pub fn request_id(&self) -> RequestId {
        match self.operation {
            Some(index) => operation_request_id(&self.block.hash, index),
            None => block_request_id(&self.block.hash),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(text: &str) -> BlockHash {
        BlockHash::new(text)
    }

    #[test]
    fn block_identity_is_case_insensitive() {
        let upper = block_request_id(&hash("AB12CD"));
        let lower = block_request_id(&hash("ab12cd"));
        let mixed = block_request_id(&hash("Ab12Cd"));
        assert_eq!(upper, lower);
        assert_eq!(upper, mixed);
    }

    #[test]
    fn operation_identities_differ_by_position() {
        let h = hash("ab12cd");
        let first = operation_request_id(&h, 0);
        let second = operation_request_id(&h, 1);
        assert_ne!(first, second);
        // Same position, same block: stable.
        assert_eq!(first, operation_request_id(&h, 0));
    }

    #[test]
    fn block_and_operation_spaces_are_disjoint() {
        let h = hash("ab12cd");
        let block = block_request_id(&h);
        assert_ne!(block, operation_request_id(&h, 0));
    }

    #[test]
    fn different_blocks_yield_different_identities() {
        assert_ne!(block_request_id(&hash("aa")), block_request_id(&hash("bb")));
    }

    #[test]
    fn identity_is_lowercase_hex() {
        let id = block_request_id(&hash("AB12CD"));
        assert_eq!(id.as_str().len(), 64);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id.as_str(), id.as_str().to_lowercase());
    }

    #[test]
    fn event_identity_follows_coordinates() {
        let block = Arc::new(Block {
            hash: hash("AB12CD"),
            operations: vec![Operation(serde_json::json!({"kind": "send"}))],
        });

        let whole = LedgerEvent::whole_block(block.clone());
        assert_eq!(whole.request_id(), block_request_id(&block.hash));
        assert!(whole.operation().is_none());

        let narrowed = LedgerEvent::operation_at(block.clone(), 0);
        assert_eq!(narrowed.request_id(), operation_request_id(&block.hash, 0));
        assert!(narrowed.operation().is_some());

        // Index past the operation list still has an identity, but resolves
        // to no operation payload.
        let past_end = LedgerEvent::operation_at(block, 7);
        assert!(past_end.operation().is_none());
    }
}
