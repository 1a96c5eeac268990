//! The sync orchestrator: checkpoint replay, batch catch-up, live tail.
//!
//! # Phase 1: CHECKPOINT REPLAY
//! Apply block dump files from the configured directory, if any.
//!
//! # Phase 2: BATCH CATCH-UP
//! While the store lags the last irreversible block, fetch windows of
//! blocks and apply each window in one transaction. Then either rebuild
//! the whole post cache (initial sync) or reconcile the accumulated dirty
//! set once.
//!
//! # Phase 3: LIVE TAIL
//! Follow the head, trailing it by a few blocks. Each block is applied and
//! reconciled in its own transaction.

use std::sync::Arc;
use std::time::Instant;

use crate::cache::PostCache;
use crate::checkpoint::replay_checkpoints;
use crate::community::CommunityService;
use crate::config::{IndexerConfig, SyncPhase};
use crate::error::IndexerError;
use crate::processor::{settle, BlockProcessor};
use crate::reconcile::{reconcile, ReconcileReport};
use crate::source::ChainSource;
use crate::store::StoreGateway;
use crate::types::{DirtySet, SignedBlock};

/// Drives the three sync phases against one store.
pub struct SyncOrchestrator<C: ChainSource> {
    config: IndexerConfig,
    chain: C,
    store: Arc<dyn StoreGateway>,
    cache: Arc<dyn PostCache>,
    processor: BlockProcessor,
    phase: SyncPhase,
}

impl<C: ChainSource> SyncOrchestrator<C> {
    pub fn new(
        config: IndexerConfig,
        chain: C,
        store: Arc<dyn StoreGateway>,
        cache: Arc<dyn PostCache>,
        communities: Arc<dyn CommunityService>,
    ) -> Self {
        let processor = BlockProcessor::new(store.clone(), communities, config.heights);
        Self {
            config,
            chain,
            store,
            cache,
            processor,
            phase: SyncPhase::Idle,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Run all phases. Returns only on error or once `stop_at` is reached.
    pub async fn run(&mut self) -> Result<(), IndexerError> {
        // An interrupted initial sync leaves the cache empty, so it restarts
        // as an initial sync and the closing rebuild covers what it committed.
        let initial = self.cache.is_empty().await?;
        if initial {
            tracing::info!("post cache empty, running initial sync");
        } else {
            let repaired = self.cache.repair_missing().await?;
            if repaired > 0 {
                tracing::info!(repaired, "cached missing posts");
            }
        }

        let mut dirty = DirtySet::new();
        if let Some(dir) = self.config.checkpoint_dir.clone() {
            self.phase = SyncPhase::CheckpointReplay;
            let report = replay_checkpoints(
                &dir,
                &self.processor,
                self.config.sync.checkpoint_chunk,
                self.config.stop_at,
            )
            .await?;
            tracing::info!(
                files = report.files,
                blocks = report.blocks,
                "checkpoint replay complete"
            );
            dirty = report.dirty;
        }

        self.phase = SyncPhase::BatchCatchup;
        dirty.extend(self.catch_up().await?);
        self.finish_catch_up(initial, &dirty).await?;

        self.phase = SyncPhase::LiveTail;
        self.live_tail().await?;
        self.phase = SyncPhase::Stopped;
        Ok(())
    }

    /// Apply irreversible blocks window by window until the store reaches
    /// the last irreversible block (or `stop_at`).
    pub async fn catch_up(&mut self) -> Result<DirtySet, IndexerError> {
        let window = self.config.sync.catchup_window.max(1);
        let mut dirty = DirtySet::new();

        loop {
            let last = self.store.last_block_number().await?;
            let irreversible = self.chain.last_irreversible_block_number().await?;
            let target = self.config.stop_at.map_or(irreversible, |s| s.min(irreversible));
            if last >= target {
                break;
            }

            let from = last + 1;
            let to = (from + window).min(target + 1);
            let started = Instant::now();
            let blocks = self.chain.get_blocks_range(from, to).await?;
            check_range(&blocks, from, to)?;
            dirty.extend(self.processor.process_blocks(&blocks).await?);

            let secs = started.elapsed().as_secs_f64().max(1e-3);
            let rate = blocks.len() as f64 / secs;
            let remaining = target.saturating_sub(to - 1);
            tracing::info!(
                from,
                to = to - 1,
                target,
                blocks_per_sec = rate.round(),
                eta_min = (remaining as f64 / rate / 60.0).ceil(),
                "catch-up window applied"
            );
        }
        Ok(dirty)
    }

    async fn finish_catch_up(&self, initial: bool, dirty: &DirtySet) -> Result<(), IndexerError> {
        let as_of = self.chain.chain_time().await?;
        if initial {
            let rebuilt = self.cache.rebuild_all(as_of).await?;
            tracing::info!(rebuilt, "initial sync complete, post cache rebuilt");
            return Ok(());
        }

        self.store.begin().await?;
        let result = reconcile(self.store.as_ref(), self.cache.as_ref(), dirty, as_of).await;
        let report = settle(self.store.as_ref(), result).await?;
        tracing::info!(edited = report.edited, paidout = report.paidout, "catch-up reconciled");
        Ok(())
    }

    /// Follow the head block by block.
    pub async fn live_tail(&mut self) -> Result<(), IndexerError> {
        let poll = self.config.sync.poll_interval();
        let trail = self.config.sync.trail_blocks;
        let mut last_hash: Option<String> = None;

        loop {
            let curr = self.store.last_block_number().await? + 1;
            if self.config.stop_at.is_some_and(|stop| curr > stop) {
                tracing::info!(block = curr - 1, "reached stop block");
                return Ok(());
            }

            let mut head = self.chain.head_block_number().await?;
            while curr + trail > head {
                tokio::time::sleep(poll).await;
                head = self.chain.head_block_number().await?;
            }

            let block = loop {
                match self.chain.get_block(curr).await? {
                    Some(block) => break block,
                    None => {
                        tracing::warn!(block = curr, "block not available, retrying");
                        tokio::time::sleep(poll).await;
                    }
                }
            };

            if let Some(expected) = &last_hash {
                if block.previous != *expected {
                    return Err(IndexerError::UnlinkableBlock {
                        block_number: curr,
                        expected: expected.clone(),
                        actual: block.previous.clone(),
                    });
                }
            }

            let report = self.apply_live_block(&block).await?;
            tracing::info!(
                block = curr,
                head,
                txs = block.transactions.len(),
                edited = report.edited,
                paidout = report.paidout,
                "live block applied"
            );
            last_hash = Some(block.block_id);
        }
    }

    async fn apply_live_block(&self, block: &SignedBlock) -> Result<ReconcileReport, IndexerError> {
        self.store.begin().await?;
        let result = async {
            let dirty = self.processor.process_block(block).await?;
            reconcile(self.store.as_ref(), self.cache.as_ref(), &dirty, block.timestamp).await
        }
        .await;
        settle(self.store.as_ref(), result).await
    }
}

/// A node must answer a range request with exactly `[from, to)`.
fn check_range(blocks: &[SignedBlock], from: u64, to: u64) -> Result<(), IndexerError> {
    if blocks.len() as u64 != to - from {
        return Err(IndexerError::Rpc(format!(
            "range [{from}, {to}) returned {} blocks",
            blocks.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::NameOnlyCommunities;
    use crate::config::SyncPolicy;
    use crate::memory::MemoryStore;
    use crate::operation::Operation;
    use crate::test_support::{
        at, block_id, comment, empty_chain, signed_block, vote, MockChain, RecordingCache,
    };

    fn config(stop_at: Option<u64>) -> IndexerConfig {
        IndexerConfig {
            sync: SyncPolicy {
                poll_interval_ms: 0,
                trail_blocks: 2,
                catchup_window: 4,
                checkpoint_chunk: 3,
            },
            stop_at,
            ..IndexerConfig::default()
        }
    }

    fn orchestrator(
        config: IndexerConfig,
        chain: MockChain,
        cache: Arc<RecordingCache>,
    ) -> (Arc<MemoryStore>, SyncOrchestrator<MockChain>) {
        let store = Arc::new(MemoryStore::new());
        let sync = SyncOrchestrator::new(
            config,
            chain,
            store.clone(),
            cache,
            Arc::new(NameOnlyCommunities),
        );
        (store, sync)
    }

    #[tokio::test]
    async fn catch_up_fetches_windows_up_to_irreversible() {
        let chain = MockChain::new(empty_chain(1, 20), 12).irreversible_lag(2);
        let (store, mut sync) = orchestrator(config(None), chain, Arc::new(RecordingCache::default()));

        sync.catch_up().await.unwrap();

        assert_eq!(store.last_block_number().await.unwrap(), 10);
        let calls = sync.chain.range_calls.lock().unwrap().clone();
        assert_eq!(calls, vec![(1, 5), (5, 9), (9, 11)]);
    }

    #[tokio::test]
    async fn catch_up_rejects_short_ranges() {
        // The node only has blocks up to 5 but claims 10 irreversible.
        let chain = MockChain::new(empty_chain(1, 5), 10);
        let (store, mut sync) = orchestrator(config(None), chain, Arc::new(RecordingCache::default()));
        let err = sync.catch_up().await.unwrap_err();
        assert!(err.is_rpc());
        assert_eq!(store.last_block_number().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn initial_sync_rebuilds_cache_then_tails() {
        let mut blocks = empty_chain(1, 14);
        blocks[2] = signed_block(3, vec![Operation::Comment(comment("alice", "a"))]);
        blocks[11] = signed_block(12, vec![vote("bob", "alice", "a")]);
        // Irreversible tops out at 9; blocks 10..=12 arrive through the live tail.
        let chain = MockChain::new(blocks, 8).growing(1).irreversible_lag(5);
        let cache = Arc::new(RecordingCache::empty());
        let (store, mut sync) = orchestrator(config(Some(12)), chain, cache.clone());

        sync.run().await.unwrap();

        assert_eq!(sync.phase(), SyncPhase::Stopped);
        assert_eq!(store.last_block_number().await.unwrap(), 12);
        let log = cache.log.lock().unwrap();
        assert_eq!(log.rebuilds.len(), 1);
        assert_eq!(log.repairs, 0);
        drop(log);
        // Only the live vote triggers a recompute; catch-up relied on the rebuild.
        assert_eq!(cache.recomputed_urls(), vec!["alice/a"]);
    }

    #[tokio::test]
    async fn resumed_sync_repairs_and_reconciles_once() {
        let mut blocks = empty_chain(1, 6);
        blocks[1] = signed_block(2, vec![Operation::Comment(comment("alice", "a"))]);
        blocks[3] = signed_block(4, vec![vote("bob", "alice", "a")]);
        let chain = MockChain::new(blocks, 6);
        let cache = Arc::new(RecordingCache::default());
        let (store, mut sync) = orchestrator(config(Some(6)), chain, cache.clone());

        sync.run().await.unwrap();

        assert_eq!(store.last_block_number().await.unwrap(), 6);
        let log = cache.log.lock().unwrap();
        assert_eq!(log.repairs, 1);
        assert!(log.rebuilds.is_empty());
        assert_eq!(log.recomputed.len(), 1, "one reconciliation for the whole catch-up");
        assert_eq!(log.paidout_queries, vec![at(6)]);
    }

    #[tokio::test]
    async fn live_tail_trails_head_and_retries_missing_blocks() {
        let chain = MockChain::new(empty_chain(1, 10), 3).growing(1);
        chain.late.lock().unwrap().push(5);
        let (store, mut sync) = orchestrator(config(Some(8)), chain, Arc::new(RecordingCache::default()));

        sync.live_tail().await.unwrap();

        assert_eq!(store.last_block_number().await.unwrap(), 8);
        assert!(sync.chain.late.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn live_tail_never_fetches_within_trailing_margin() {
        // Head starts at 4 and grows by one every third poll.
        let chain = MockChain::new(empty_chain(1, 12), 4).growing(1).every(3);
        let (store, mut sync) = orchestrator(config(Some(10)), chain, Arc::new(RecordingCache::default()));

        sync.live_tail().await.unwrap();

        assert_eq!(store.last_block_number().await.unwrap(), 10);
        let calls = sync.chain.block_calls.lock().unwrap().clone();
        let fetched: Vec<u64> = calls.iter().map(|(n, _)| *n).collect();
        assert_eq!(fetched, (1..=10).collect::<Vec<_>>());
        for (block, head) in calls {
            assert!(block + 2 <= head, "block {block} fetched while head was {head}");
        }
        // Block 10 needs head 12, which the chain reports from the 25th poll on;
        // every sleep is followed by a fresh head poll.
        assert!(sync.chain.polls.lock().unwrap().0 >= 25);
    }

    #[tokio::test]
    async fn live_tail_rejects_unlinked_block() {
        let mut blocks = empty_chain(1, 6);
        blocks[4].previous = block_id(42);
        let chain = MockChain::new(blocks, 8);
        let (store, mut sync) = orchestrator(config(None), chain, Arc::new(RecordingCache::default()));

        let err = sync.live_tail().await.unwrap_err();
        assert!(err.is_continuity());
        assert_eq!(store.last_block_number().await.unwrap(), 4);
        assert!(!store.in_transaction());
    }

    #[tokio::test]
    async fn replays_checkpoints_before_catch_up() {
        let dir = tempfile::tempdir().unwrap();
        let blocks = empty_chain(1, 8);
        let body: String = blocks[..5]
            .iter()
            .map(|b| serde_json::to_string(b).unwrap() + "\n")
            .collect();
        std::fs::write(dir.path().join("5.json.lst"), body).unwrap();

        let chain = MockChain::new(blocks, 8);
        let mut cfg = config(Some(8));
        cfg.checkpoint_dir = Some(dir.path().to_path_buf());
        let (store, mut sync) = orchestrator(cfg, chain, Arc::new(RecordingCache::empty()));

        sync.run().await.unwrap();

        assert_eq!(store.last_block_number().await.unwrap(), 8);
        let calls = sync.chain.range_calls.lock().unwrap().clone();
        assert_eq!(calls, vec![(6, 9)]);
    }
}
