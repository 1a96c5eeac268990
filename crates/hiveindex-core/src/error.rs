//! Error types for the hiveindex pipeline.
//!
//! Every variant here is fatal for the batch it occurs in: the in-flight
//! transaction is rolled back and the error propagates to the caller.
//! Soft validation failures never become an `IndexerError`; handlers log
//! them and return a skip outcome instead.

use thiserror::Error;

/// Errors that can occur during indexing.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Checkpoint file error: {0}")]
    Checkpoint(String),

    #[error("Unlinkable block {block_number}: have {expected}, got {actual}")]
    UnlinkableBlock {
        block_number: u64,
        expected: String,
        actual: String,
    },

    #[error("Block out of sequence: expected {expected}, got {actual}")]
    BlockOutOfSequence { expected: u64, actual: u64 },

    #[error("Post not found: {author}/{permlink}")]
    PostNotFound { author: String, permlink: String },

    #[error("Parent post not found: {author}/{permlink}")]
    ParentNotFound { author: String, permlink: String },

    #[error("Community subsystem error: {0}")]
    Community(String),

    #[error("Cache subsystem error: {0}")]
    Cache(String),

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` if the error is a chain-continuity violation.
    ///
    /// There is no fork handling: an operator has to intervene.
    pub fn is_continuity(&self) -> bool {
        matches!(
            self,
            Self::UnlinkableBlock { .. } | Self::BlockOutOfSequence { .. }
        )
    }

    /// Returns `true` if the error came from the chain source.
    pub fn is_rpc(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }
}

impl From<serde_json::Error> for IndexerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
