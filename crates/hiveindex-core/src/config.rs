//! Indexer configuration and sync phase.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::payload::ActivationHeights;

/// Pacing of the three sync phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncPolicy {
    /// Sleep between head polls in live mode (milliseconds).
    pub poll_interval_ms: u64,
    /// Live mode stays this many blocks behind the head.
    pub trail_blocks: u64,
    /// Blocks fetched and committed together during catch-up.
    pub catchup_window: u64,
    /// Blocks committed together during checkpoint replay.
    pub checkpoint_chunk: usize,
}

impl SyncPolicy {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3000,
            trail_blocks: 2,
            catchup_window: 1000,
            checkpoint_chunk: 250,
        }
    }
}

/// Configuration for a sync run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub sync: SyncPolicy,
    pub heights: ActivationHeights,
    /// Directory of `<last_block>.json.lst` files to replay before
    /// contacting the node. `None` skips the replay phase.
    pub checkpoint_dir: Option<PathBuf>,
    /// Stop once this block has been applied. `None` = follow the chain
    /// forever.
    pub stop_at: Option<u64>,
}

/// Phase of the sync orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    /// Not yet started.
    Idle,
    /// Replaying blocks from checkpoint files.
    CheckpointReplay,
    /// Fetching irreversible blocks in windows.
    BatchCatchup,
    /// Following the chain head block by block.
    LiveTail,
    /// Reached `stop_at`.
    Stopped,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::CheckpointReplay => write!(f, "checkpoint-replay"),
            Self::BatchCatchup => write!(f, "batch-catchup"),
            Self::LiveTail => write!(f, "live-tail"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
