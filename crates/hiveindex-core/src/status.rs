//! Sync status query.

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::source::ChainSource;
use crate::store::StoreGateway;

/// How far the store is behind the chain.
///
/// `chain_head` is the node's last irreversible block: the height catch-up
/// syncs to, and the one a healthy indexer should stay close to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub chain_head: u64,
    pub applied_head: u64,
    /// `chain_head - applied_head`; negative if the node itself lags.
    pub lag: i64,
}

pub async fn head_state(
    chain: &dyn ChainSource,
    store: &dyn StoreGateway,
) -> Result<SyncStatus, IndexerError> {
    let chain_head = chain.last_irreversible_block_number().await?;
    let applied_head = store.last_block_number().await?;
    Ok(SyncStatus {
        chain_head,
        applied_head,
        lag: chain_head as i64 - applied_head as i64,
    })
}
