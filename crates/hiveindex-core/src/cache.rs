//! Boundary to the post-cache subsystem.
//!
//! The cache owns the derived, read-optimized view of each post (payout,
//! votes, rendered body). The indexer only tells it which posts went stale
//! and asks which posts crossed their payout time.

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::IndexerError;
use crate::types::PostKey;

/// Derived post cache and payout bookkeeping.
#[async_trait]
pub trait PostCache: Send + Sync {
    /// Recompute the cached view of `posts` as of chain time `as_of`.
    async fn recompute(&self, posts: &[PostKey], as_of: NaiveDateTime) -> Result<(), IndexerError>;

    /// Posts whose payout window has elapsed at `as_of` but whose cached
    /// view does not reflect it yet.
    async fn select_paidout_posts(&self, as_of: NaiveDateTime)
        -> Result<Vec<PostKey>, IndexerError>;

    /// Create cache rows for live posts that have none (after a crash).
    async fn repair_missing(&self) -> Result<u64, IndexerError>;

    /// Rebuild every cache row (after an initial sync).
    async fn rebuild_all(&self, as_of: NaiveDateTime) -> Result<u64, IndexerError>;

    /// `true` when nothing has been cached yet, i.e. this is an initial sync.
    async fn is_empty(&self) -> Result<bool, IndexerError>;
}
