//! Shared types for the indexing pipeline.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::operation::Operation;

// ─── SignedBlock ──────────────────────────────────────────────────────────────

/// A full block as delivered by the chain source or a checkpoint file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedBlock {
    /// Block id; the first 8 hex characters encode the block number.
    pub block_id: String,
    /// Id of the parent block.
    pub previous: String,
    /// Block production time (UTC, no zone suffix on the wire).
    pub timestamp: NaiveDateTime,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

/// A transaction inside a block. Only the operations matter to the indexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub operations: Vec<Operation>,
}

impl SignedBlock {
    /// Block number, decoded from the block id prefix.
    pub fn number(&self) -> Result<u64, IndexerError> {
        block_num_from_id(&self.block_id)
    }

    /// The linkage record persisted for this block.
    pub fn record(&self) -> Result<BlockRecord, IndexerError> {
        Ok(BlockRecord {
            number: self.number()?,
            hash: self.block_id.clone(),
            previous_hash: self.previous.clone(),
            transaction_count: self.transactions.len() as u32,
            timestamp: self.timestamp,
        })
    }

    /// Iterate every operation of every transaction, in block order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.transactions.iter().flat_map(|tx| tx.operations.iter())
    }
}

/// Decode the block number carried in the first 8 hex chars of a block id.
pub fn block_num_from_id(block_id: &str) -> Result<u64, IndexerError> {
    let prefix = block_id
        .get(..8)
        .ok_or_else(|| IndexerError::Decode(format!("block id too short: {block_id:?}")))?;
    u64::from_str_radix(prefix, 16)
        .map_err(|_| IndexerError::Decode(format!("bad block id prefix: {block_id:?}")))
}

// ─── BlockRecord ──────────────────────────────────────────────────────────────

/// The persisted chain-linkage record of an applied block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub number: u64,
    pub hash: String,
    pub previous_hash: String,
    pub transaction_count: u32,
    pub timestamp: NaiveDateTime,
}

impl BlockRecord {
    /// Check that `self` may be applied on top of `parent`.
    pub fn verify_link(&self, parent: &BlockRecord) -> Result<(), IndexerError> {
        if self.number != parent.number + 1 {
            return Err(IndexerError::BlockOutOfSequence {
                expected: parent.number + 1,
                actual: self.number,
            });
        }
        if self.previous_hash != parent.hash {
            return Err(IndexerError::UnlinkableBlock {
                block_number: self.number,
                expected: parent.hash.clone(),
                actual: self.previous_hash.clone(),
            });
        }
        Ok(())
    }
}

// ─── Posts ────────────────────────────────────────────────────────────────────

/// `author/permlink` identity of a post, as carried by chain operations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PostUrl {
    pub author: String,
    pub permlink: String,
}

impl PostUrl {
    pub fn new(author: impl Into<String>, permlink: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            permlink: permlink.into(),
        }
    }
}

impl fmt::Display for PostUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.author, self.permlink)
    }
}

/// Posts whose cached view went stale while applying blocks.
pub type DirtySet = BTreeSet<PostUrl>;

/// A resolved post handed to the cache subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostKey {
    pub id: u64,
    pub author: String,
    pub permlink: String,
}

// ─── Tests ────────────────────────────────────────────────────────────────────
