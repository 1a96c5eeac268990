//! Boundary to the chain node.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::types::SignedBlock;

/// The subset of dynamic global properties the indexer needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainProperties {
    pub head_block_number: u64,
    pub last_irreversible_block_num: u64,
    /// Chain time of the head block.
    pub time: NaiveDateTime,
}

/// Read access to a chain node.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Fetch one block. `None` if the node does not have it (yet).
    async fn get_block(&self, number: u64) -> Result<Option<SignedBlock>, IndexerError>;

    /// Fetch blocks `[from, to)` in ascending order, with no gaps.
    async fn get_blocks_range(&self, from: u64, to: u64)
        -> Result<Vec<SignedBlock>, IndexerError>;

    async fn dynamic_properties(&self) -> Result<ChainProperties, IndexerError>;

    async fn head_block_number(&self) -> Result<u64, IndexerError> {
        Ok(self.dynamic_properties().await?.head_block_number)
    }

    async fn last_irreversible_block_number(&self) -> Result<u64, IndexerError> {
        Ok(self.dynamic_properties().await?.last_irreversible_block_num)
    }

    async fn chain_time(&self) -> Result<NaiveDateTime, IndexerError> {
        Ok(self.dynamic_properties().await?.time)
    }
}
