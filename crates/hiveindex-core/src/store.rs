//! The store gateway: the transactional record store the indexer writes to.
//!
//! All methods are parameterized by typed values; no caller ever builds a
//! query string. Mutating methods are expected to run between
//! [`StoreGateway::begin`] and [`StoreGateway::commit`]; the block and batch
//! processors own that discipline.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::types::BlockRecord;

/// A persisted post row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRow {
    pub id: u64,
    pub parent_id: Option<u64>,
    pub author: String,
    pub permlink: String,
    pub category: String,
    pub community: String,
    pub depth: u32,
    pub is_deleted: bool,
    pub created_at: NaiveDateTime,
}

/// Where a post sits in its thread: parent link and inherited attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostPlacement {
    pub parent_id: Option<u64>,
    pub depth: u32,
    pub category: String,
    pub community: String,
}

/// A post about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub author: String,
    pub permlink: String,
    pub placement: PostPlacement,
    pub created_at: NaiveDateTime,
}

/// State of a follow relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FollowState {
    Clear = 0,
    Blog = 1,
    Ignore = 2,
}

impl FollowState {
    /// Parse the `what` keyword of a follow payload.
    pub fn from_keyword(what: &str) -> Option<Self> {
        match what {
            "clear" => Some(Self::Clear),
            "blog" => Some(Self::Blog),
            "ignore" => Some(Self::Ignore),
            _ => None,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Clear),
            1 => Some(Self::Blog),
            2 => Some(Self::Ignore),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// A follow relation row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowRow {
    pub follower: String,
    pub following: String,
    pub state: FollowState,
    pub created_at: NaiveDateTime,
}

/// Transactional record store.
///
/// Implementations: [`crate::memory::MemoryStore`] (tests / ephemeral runs)
/// and `SqliteStorage` in `hiveindex-storage`.
#[async_trait]
pub trait StoreGateway: Send + Sync {
    // ── transactions ──────────────────────────────────────────────────────────

    /// Open a transaction. Nested transactions are not supported.
    async fn begin(&self) -> Result<(), IndexerError>;

    /// Commit the open transaction.
    async fn commit(&self) -> Result<(), IndexerError>;

    /// Discard the open transaction. A no-op when none is open.
    async fn rollback(&self) -> Result<(), IndexerError>;

    // ── blocks ────────────────────────────────────────────────────────────────

    /// The highest applied block, used as the resumption checkpoint.
    async fn last_block(&self) -> Result<Option<BlockRecord>, IndexerError>;

    async fn insert_block(&self, block: &BlockRecord) -> Result<(), IndexerError>;

    /// Number of the highest applied block, `0` for an empty store.
    async fn last_block_number(&self) -> Result<u64, IndexerError> {
        Ok(self.last_block().await?.map_or(0, |b| b.number))
    }

    // ── accounts ──────────────────────────────────────────────────────────────

    async fn account_exists(&self, name: &str) -> Result<bool, IndexerError>;

    async fn insert_account(&self, name: &str, created_at: NaiveDateTime)
        -> Result<(), IndexerError>;

    // ── posts ─────────────────────────────────────────────────────────────────

    async fn find_post(&self, author: &str, permlink: &str)
        -> Result<Option<PostRow>, IndexerError>;

    /// Insert a post and return its surrogate id.
    async fn insert_post(&self, post: &NewPost) -> Result<u64, IndexerError>;

    /// Clear `is_deleted` on a previously deleted post and re-place it.
    async fn revive_post(&self, id: u64, placement: &PostPlacement) -> Result<(), IndexerError>;

    async fn mark_post_deleted(&self, id: u64) -> Result<(), IndexerError>;

    /// Drop the derived cache row of a post, if any.
    async fn delete_cached_post(&self, id: u64) -> Result<(), IndexerError>;

    // ── feed cache ────────────────────────────────────────────────────────────

    /// Insert a feed entry. Returns `false` if it already existed.
    async fn insert_feed_entry(
        &self,
        account: &str,
        post_id: u64,
        created_at: NaiveDateTime,
    ) -> Result<bool, IndexerError>;

    /// Remove one feed entry. Returns `false` if there was none.
    async fn delete_feed_entry(&self, account: &str, post_id: u64) -> Result<bool, IndexerError>;

    /// Remove every feed entry pointing at `post_id`. Returns the count removed.
    async fn delete_feed_entries(&self, post_id: u64) -> Result<u64, IndexerError>;

    // ── social graph ──────────────────────────────────────────────────────────

    /// Insert or overwrite the state of `(follower, following)`.
    async fn upsert_follow(&self, follow: &FollowRow) -> Result<(), IndexerError>;

    /// Insert a reblog. Returns `false` if it already existed.
    async fn insert_reblog(
        &self,
        account: &str,
        post_id: u64,
        created_at: NaiveDateTime,
    ) -> Result<bool, IndexerError>;

    /// Remove a reblog. Returns `false` if there was none.
    async fn delete_reblog(&self, account: &str, post_id: u64) -> Result<bool, IndexerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follow_state_codes() {
        assert_eq!(FollowState::from_keyword("blog"), Some(FollowState::Blog));
        assert_eq!(FollowState::from_keyword("mute"), None);
        assert_eq!(FollowState::Ignore.code(), 2);
        assert_eq!(FollowState::from_code(0), Some(FollowState::Clear));
        assert_eq!(FollowState::from_code(7), None);
    }
}
