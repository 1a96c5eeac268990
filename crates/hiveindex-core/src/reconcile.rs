//! Dirty-set reconciliation.
//!
//! After blocks are applied, every post touched by a comment or vote, and
//! every post whose payout window just elapsed, is handed to the post cache
//! for recomputation.

use chrono::NaiveDateTime;

use crate::cache::PostCache;
use crate::error::IndexerError;
use crate::store::StoreGateway;
use crate::types::{DirtySet, PostKey};

/// What a reconciliation pass recomputed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Dirty posts recomputed.
    pub edited: usize,
    /// Posts recomputed because their payout elapsed.
    pub paidout: usize,
}

/// Recompute the cached view of `dirty` and of newly payable posts as of
/// chain time `as_of`.
///
/// A dirty url that does not resolve to a post is fatal: the block that
/// produced it referenced a post the store never saw. Deleted posts are
/// skipped.
pub async fn reconcile(
    store: &dyn StoreGateway,
    cache: &dyn PostCache,
    dirty: &DirtySet,
    as_of: NaiveDateTime,
) -> Result<ReconcileReport, IndexerError> {
    let mut keys = Vec::with_capacity(dirty.len());
    for url in dirty {
        let post = store
            .find_post(&url.author, &url.permlink)
            .await?
            .ok_or_else(|| IndexerError::PostNotFound {
                author: url.author.clone(),
                permlink: url.permlink.clone(),
            })?;
        if post.is_deleted {
            continue;
        }
        keys.push(PostKey {
            id: post.id,
            author: post.author,
            permlink: post.permlink,
        });
    }
    cache.recompute(&keys, as_of).await?;

    let paidout = cache.select_paidout_posts(as_of).await?;
    cache.recompute(&paidout, as_of).await?;

    let report = ReconcileReport {
        edited: keys.len(),
        paidout: paidout.len(),
    };
    if report.edited + report.paidout > 0 {
        tracing::debug!(edited = report.edited, paidout = report.paidout, %as_of, "reconciled posts");
    }
    Ok(report)
}
