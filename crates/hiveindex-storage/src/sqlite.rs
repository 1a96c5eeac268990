//! SQLite storage backend for HiveIndex.
//!
//! Persists blocks, accounts, posts, the feed cache, the social graph and
//! the post cache to a single SQLite file.
//!
//! All access goes through a pool of exactly one connection, so the
//! `BEGIN`/`COMMIT` issued by [`StoreGateway::begin`] and
//! [`StoreGateway::commit`] bracket every statement run in between, including
//! the ones issued by a [`SqlitePostCache`] sharing the pool.
//!
//! # Usage
//! ```rust,no_run
//! use hiveindex_storage::sqlite::{SqlitePostCache, SqliteStorage};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./hive.db").await?;
//! let cache = SqlitePostCache::new(&store);
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use hiveindex_core::cache::PostCache;
use hiveindex_core::error::IndexerError;
use hiveindex_core::store::{FollowRow, FollowState, NewPost, PostPlacement, PostRow, StoreGateway};
use hiveindex_core::types::{BlockRecord, PostKey};

/// Posts pay out this long after creation.
pub const PAYOUT_WINDOW_DAYS: i64 = 7;

fn db_err(e: sqlx::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

fn to_unix(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp()
}

fn from_unix(secs: i64) -> Result<NaiveDateTime, IndexerError> {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| IndexerError::Storage(format!("timestamp out of range: {secs}")))
}

/// SQLite-backed [`StoreGateway`].
pub struct SqliteStorage {
    pool: SqlitePool,
    in_tx: AtomicBool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./hive.db"`) or a full
    /// SQLite URL (`"sqlite:./hive.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };
        Self::connect(&url).await
    }

    /// Open an in-memory SQLite database.
    ///
    /// All data is lost when the storage is dropped. Ideal for tests.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        Self::connect("sqlite::memory:").await
    }

    async fn connect(url: &str) -> Result<Self, IndexerError> {
        // One connection that never expires: transactions are connection
        // state, and an in-memory database lives only as long as its
        // connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(url)
            .await
            .map_err(db_err)?;

        let storage = Self {
            pool,
            in_tx: AtomicBool::new(false),
        };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// The shared connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), IndexerError> {
        // WAL mode for concurrent readers
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        for ddl in SCHEMA {
            sqlx::query(ddl).execute(&self.pool).await.map_err(db_err)?;
        }
        Ok(())
    }

    /// Number of stored posts, deleted ones included.
    pub async fn post_count(&self) -> Result<u64, IndexerError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM posts")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.get::<i64, _>("cnt") as u64)
    }

    /// Post ids in `account`'s feed, ascending.
    pub async fn feed(&self, account: &str) -> Result<Vec<u64>, IndexerError> {
        let rows = sqlx::query("SELECT post_id FROM feed_cache WHERE account = ? ORDER BY post_id")
            .bind(account)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.iter().map(|r| r.get::<i64, _>("post_id") as u64).collect())
    }

    pub async fn follow(
        &self,
        follower: &str,
        following: &str,
    ) -> Result<Option<FollowRow>, IndexerError> {
        let row = sqlx::query(
            "SELECT follower, following, state, created_at FROM follows
             WHERE follower = ? AND following = ?",
        )
        .bind(follower)
        .bind(following)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|r| -> Result<FollowRow, IndexerError> {
            let code: i64 = r.get("state");
            Ok(FollowRow {
                follower: r.get("follower"),
                following: r.get("following"),
                state: FollowState::from_code(code)
                    .ok_or_else(|| IndexerError::Storage(format!("bad follow state {code}")))?,
                created_at: from_unix(r.get("created_at"))?,
            })
        })
        .transpose()
    }

    pub async fn has_reblog(&self, account: &str, post_id: u64) -> Result<bool, IndexerError> {
        let row = sqlx::query("SELECT 1 FROM reblogs WHERE account = ? AND post_id = ?")
            .bind(account)
            .bind(post_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.is_some())
    }
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS blocks (
        num        INTEGER PRIMARY KEY,
        hash       TEXT    NOT NULL,
        prev       TEXT    NOT NULL,
        txs        INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS accounts (
        name       TEXT    PRIMARY KEY,
        created_at INTEGER NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS posts (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        parent_id  INTEGER,
        author     TEXT    NOT NULL,
        permlink   TEXT    NOT NULL,
        category   TEXT    NOT NULL,
        community  TEXT    NOT NULL,
        depth      INTEGER NOT NULL,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        UNIQUE (author, permlink)
    );",
    "CREATE TABLE IF NOT EXISTS feed_cache (
        account    TEXT    NOT NULL,
        post_id    INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (account, post_id)
    );",
    "CREATE INDEX IF NOT EXISTS idx_feed_cache_post ON feed_cache (post_id);",
    "CREATE TABLE IF NOT EXISTS follows (
        follower   TEXT    NOT NULL,
        following  TEXT    NOT NULL,
        state      INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (follower, following)
    );",
    "CREATE TABLE IF NOT EXISTS reblogs (
        account    TEXT    NOT NULL,
        post_id    INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (account, post_id)
    );",
    "CREATE TABLE IF NOT EXISTS posts_cache (
        post_id      INTEGER PRIMARY KEY,
        author       TEXT    NOT NULL,
        permlink     TEXT    NOT NULL,
        payout_at    INTEGER NOT NULL,
        is_paidout   INTEGER NOT NULL DEFAULT 0,
        refreshed_at INTEGER NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_posts_cache_payout ON posts_cache (is_paidout, payout_at);",
];

fn post_row(r: &SqliteRow) -> Result<PostRow, IndexerError> {
    Ok(PostRow {
        id: r.get::<i64, _>("id") as u64,
        parent_id: r.get::<Option<i64>, _>("parent_id").map(|id| id as u64),
        author: r.get("author"),
        permlink: r.get("permlink"),
        category: r.get("category"),
        community: r.get("community"),
        depth: r.get::<i64, _>("depth") as u32,
        is_deleted: r.get::<i64, _>("is_deleted") != 0,
        created_at: from_unix(r.get("created_at"))?,
    })
}

// ─── StoreGateway impl ───────────────────────────────────────────────────────

#[async_trait]
impl StoreGateway for SqliteStorage {
    async fn begin(&self) -> Result<(), IndexerError> {
        if self.in_tx.swap(true, Ordering::SeqCst) {
            return Err(IndexerError::Storage("transaction already open".into()));
        }
        if let Err(e) = sqlx::query("BEGIN").execute(&self.pool).await {
            self.in_tx.store(false, Ordering::SeqCst);
            return Err(db_err(e));
        }
        Ok(())
    }

    async fn commit(&self) -> Result<(), IndexerError> {
        if !self.in_tx.load(Ordering::SeqCst) {
            return Err(IndexerError::Storage("commit without a transaction".into()));
        }
        sqlx::query("COMMIT").execute(&self.pool).await.map_err(db_err)?;
        self.in_tx.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self) -> Result<(), IndexerError> {
        if !self.in_tx.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        sqlx::query("ROLLBACK").execute(&self.pool).await.map_err(db_err)?;
        debug!("transaction rolled back");
        Ok(())
    }

    async fn last_block(&self) -> Result<Option<BlockRecord>, IndexerError> {
        let row = sqlx::query(
            "SELECT num, hash, prev, txs, created_at FROM blocks ORDER BY num DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|r| -> Result<BlockRecord, IndexerError> {
            Ok(BlockRecord {
                number: r.get::<i64, _>("num") as u64,
                hash: r.get("hash"),
                previous_hash: r.get("prev"),
                transaction_count: r.get::<i64, _>("txs") as u32,
                timestamp: from_unix(r.get("created_at"))?,
            })
        })
        .transpose()
    }

    async fn insert_block(&self, block: &BlockRecord) -> Result<(), IndexerError> {
        sqlx::query("INSERT INTO blocks (num, hash, prev, txs, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(block.number as i64)
            .bind(&block.hash)
            .bind(&block.previous_hash)
            .bind(block.transaction_count as i64)
            .bind(to_unix(block.timestamp))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn account_exists(&self, name: &str) -> Result<bool, IndexerError> {
        let row = sqlx::query("SELECT 1 FROM accounts WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.is_some())
    }

    async fn insert_account(
        &self,
        name: &str,
        created_at: NaiveDateTime,
    ) -> Result<(), IndexerError> {
        sqlx::query("INSERT OR IGNORE INTO accounts (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(to_unix(created_at))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn find_post(
        &self,
        author: &str,
        permlink: &str,
    ) -> Result<Option<PostRow>, IndexerError> {
        let row = sqlx::query(
            "SELECT id, parent_id, author, permlink, category, community, depth, is_deleted, created_at
             FROM posts WHERE author = ? AND permlink = ?",
        )
        .bind(author)
        .bind(permlink)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(post_row).transpose()
    }

    async fn insert_post(&self, post: &NewPost) -> Result<u64, IndexerError> {
        let p = &post.placement;
        let result = sqlx::query(
            "INSERT INTO posts (parent_id, author, permlink, category, community, depth, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(p.parent_id.map(|id| id as i64))
        .bind(&post.author)
        .bind(&post.permlink)
        .bind(&p.category)
        .bind(&p.community)
        .bind(p.depth as i64)
        .bind(to_unix(post.created_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let id = result.last_insert_rowid() as u64;
        debug!(author = %post.author, permlink = %post.permlink, id, "post stored");
        Ok(id)
    }

    async fn revive_post(&self, id: u64, placement: &PostPlacement) -> Result<(), IndexerError> {
        sqlx::query(
            "UPDATE posts SET is_deleted = 0, parent_id = ?, depth = ?, category = ?, community = ?
             WHERE id = ?",
        )
        .bind(placement.parent_id.map(|id| id as i64))
        .bind(placement.depth as i64)
        .bind(&placement.category)
        .bind(&placement.community)
        .bind(id as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn mark_post_deleted(&self, id: u64) -> Result<(), IndexerError> {
        sqlx::query("UPDATE posts SET is_deleted = 1 WHERE id = ?")
            .bind(id as i64)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_cached_post(&self, id: u64) -> Result<(), IndexerError> {
        sqlx::query("DELETE FROM posts_cache WHERE post_id = ?")
            .bind(id as i64)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_feed_entry(
        &self,
        account: &str,
        post_id: u64,
        created_at: NaiveDateTime,
    ) -> Result<bool, IndexerError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO feed_cache (account, post_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(account)
        .bind(post_id as i64)
        .bind(to_unix(created_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_feed_entry(&self, account: &str, post_id: u64) -> Result<bool, IndexerError> {
        let result = sqlx::query("DELETE FROM feed_cache WHERE account = ? AND post_id = ?")
            .bind(account)
            .bind(post_id as i64)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_feed_entries(&self, post_id: u64) -> Result<u64, IndexerError> {
        let result = sqlx::query("DELETE FROM feed_cache WHERE post_id = ?")
            .bind(post_id as i64)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn upsert_follow(&self, follow: &FollowRow) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO follows (follower, following, state, created_at) VALUES (?, ?, ?, ?)
             ON CONFLICT (follower, following) DO UPDATE SET state = excluded.state",
        )
        .bind(&follow.follower)
        .bind(&follow.following)
        .bind(follow.state.code() as i64)
        .bind(to_unix(follow.created_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_reblog(
        &self,
        account: &str,
        post_id: u64,
        created_at: NaiveDateTime,
    ) -> Result<bool, IndexerError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO reblogs (account, post_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(account)
        .bind(post_id as i64)
        .bind(to_unix(created_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_reblog(&self, account: &str, post_id: u64) -> Result<bool, IndexerError> {
        let result = sqlx::query("DELETE FROM reblogs WHERE account = ? AND post_id = ?")
            .bind(account)
            .bind(post_id as i64)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }
}

// ─── PostCache impl ──────────────────────────────────────────────────────────

/// Payout bookkeeping over the `posts_cache` table.
///
/// A cache row is created on first recompute; it is marked paid out by the
/// first recompute at or after `created_at + 7 days`.
#[derive(Clone)]
pub struct SqlitePostCache {
    pool: SqlitePool,
    payout_window: Duration,
}

impl SqlitePostCache {
    /// Share the connection (and thus the open transaction) of `storage`.
    pub fn new(storage: &SqliteStorage) -> Self {
        Self {
            pool: storage.pool.clone(),
            payout_window: Duration::days(PAYOUT_WINDOW_DAYS),
        }
    }

    /// `Some(is_paidout)` for a cached post, `None` if it has no cache row.
    pub async fn cached(&self, post_id: u64) -> Result<Option<bool>, IndexerError> {
        let row = sqlx::query("SELECT is_paidout FROM posts_cache WHERE post_id = ?")
            .bind(post_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(|r| r.get::<i64, _>("is_paidout") != 0))
    }

    /// Insert (or refresh) cache rows for the posts selected by `filter`.
    async fn refresh_where(&self, filter: &str, id: Option<u64>, as_of: i64) -> Result<u64, IndexerError> {
        let window = self.payout_window.num_seconds();
        let sql = format!(
            "INSERT INTO posts_cache (post_id, author, permlink, payout_at, is_paidout, refreshed_at)
             SELECT p.id, p.author, p.permlink, p.created_at + ?1, (p.created_at + ?1) <= ?2, ?2
             FROM posts p WHERE p.is_deleted = 0 AND {filter}
             ON CONFLICT (post_id) DO UPDATE SET
                 payout_at = excluded.payout_at,
                 is_paidout = excluded.is_paidout,
                 refreshed_at = excluded.refreshed_at"
        );
        let mut query = sqlx::query(&sql).bind(window).bind(as_of);
        if let Some(id) = id {
            query = query.bind(id as i64);
        }
        let result = query.execute(&self.pool).await.map_err(db_err)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PostCache for SqlitePostCache {
    async fn recompute(&self, posts: &[PostKey], as_of: NaiveDateTime) -> Result<(), IndexerError> {
        let as_of = to_unix(as_of);
        for post in posts {
            self.refresh_where("p.id = ?3", Some(post.id), as_of).await?;
        }
        Ok(())
    }

    async fn select_paidout_posts(
        &self,
        as_of: NaiveDateTime,
    ) -> Result<Vec<PostKey>, IndexerError> {
        let rows = sqlx::query(
            "SELECT post_id, author, permlink FROM posts_cache
             WHERE is_paidout = 0 AND payout_at <= ? ORDER BY post_id",
        )
        .bind(to_unix(as_of))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .iter()
            .map(|r| PostKey {
                id: r.get::<i64, _>("post_id") as u64,
                author: r.get("author"),
                permlink: r.get("permlink"),
            })
            .collect())
    }

    async fn repair_missing(&self) -> Result<u64, IndexerError> {
        let window = self.payout_window.num_seconds();
        let result = sqlx::query(
            "INSERT INTO posts_cache (post_id, author, permlink, payout_at, is_paidout, refreshed_at)
             SELECT p.id, p.author, p.permlink, p.created_at + ?, 0, p.created_at
             FROM posts p LEFT JOIN posts_cache c ON c.post_id = p.id
             WHERE p.is_deleted = 0 AND c.post_id IS NULL",
        )
        .bind(window)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let repaired = result.rows_affected();
        if repaired > 0 {
            debug!(repaired, "created missing post cache rows");
        }
        Ok(repaired)
    }

    async fn rebuild_all(&self, as_of: NaiveDateTime) -> Result<u64, IndexerError> {
        sqlx::query("DELETE FROM posts_cache")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        let rebuilt = self.refresh_where("1 = 1", None, to_unix(as_of)).await?;
        debug!(rebuilt, "post cache rebuilt");
        Ok(rebuilt)
    }

    async fn is_empty(&self) -> Result<bool, IndexerError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM posts_cache) AS present")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.get::<i64, _>("present") == 0)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::NaiveDate;
    use hiveindex_core::community::NameOnlyCommunities;
    use hiveindex_core::payload::ActivationHeights;
    use hiveindex_core::processor::BlockProcessor;
    use hiveindex_core::types::SignedBlock;
    use serde_json::{json, Value};

    fn at(secs: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2016, 6, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap()
            + Duration::seconds(secs)
    }

    fn id(n: u64) -> String {
        format!("{n:08x}{:032x}", n * 7919)
    }

    fn block(n: u64, ops: Vec<Value>) -> SignedBlock {
        serde_json::from_value(json!({
            "block_id": id(n),
            "previous": id(n - 1),
            "timestamp": at(3 * n as i64).format("%Y-%m-%dT%H:%M:%S").to_string(),
            "transactions": [{"operations": ops}],
        }))
        .unwrap()
    }

    fn post(author: &str, permlink: &str, at: NaiveDateTime) -> NewPost {
        NewPost {
            author: author.into(),
            permlink: permlink.into(),
            placement: PostPlacement {
                parent_id: None,
                depth: 0,
                category: "steem".into(),
                community: author.into(),
            },
            created_at: at,
        }
    }

    async fn in_tx(store: &SqliteStorage) {
        store.begin().await.unwrap();
    }

    #[tokio::test]
    async fn block_roundtrip() {
        let store = SqliteStorage::in_memory().await.unwrap();
        assert!(store.last_block().await.unwrap().is_none());

        let record = BlockRecord {
            number: 1,
            hash: id(1),
            previous_hash: id(0),
            transaction_count: 3,
            timestamp: at(3),
        };
        in_tx(&store).await;
        store.insert_block(&record).await.unwrap();
        store.commit().await.unwrap();

        assert_eq!(store.last_block().await.unwrap(), Some(record));
        assert_eq!(store.last_block_number().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let store = SqliteStorage::in_memory().await.unwrap();
        in_tx(&store).await;
        store.insert_account("alice", at(0)).await.unwrap();
        store.rollback().await.unwrap();
        assert!(!store.account_exists("alice").await.unwrap());

        // Rollback without a transaction is a no-op; nested begin is refused.
        store.rollback().await.unwrap();
        in_tx(&store).await;
        assert!(store.begin().await.is_err());
        store.commit().await.unwrap();
    }

    #[tokio::test]
    async fn post_lifecycle() {
        let store = SqliteStorage::in_memory().await.unwrap();
        in_tx(&store).await;
        let pid = store.insert_post(&post("alice", "hello", at(0))).await.unwrap();
        assert!(store.insert_feed_entry("alice", pid, at(0)).await.unwrap());
        assert!(!store.insert_feed_entry("alice", pid, at(0)).await.unwrap());
        assert!(store.insert_feed_entry("bob", pid, at(1)).await.unwrap());
        store.mark_post_deleted(pid).await.unwrap();
        assert_eq!(store.delete_feed_entries(pid).await.unwrap(), 2);
        store.commit().await.unwrap();

        let row = store.find_post("alice", "hello").await.unwrap().unwrap();
        assert!(row.is_deleted);
        assert_eq!(row.created_at, at(0));

        in_tx(&store).await;
        let placement = PostPlacement {
            parent_id: None,
            depth: 0,
            category: "life".into(),
            community: "alice".into(),
        };
        store.revive_post(pid, &placement).await.unwrap();
        store.commit().await.unwrap();

        let row = store.find_post("alice", "hello").await.unwrap().unwrap();
        assert!(!row.is_deleted);
        assert_eq!(row.id, pid);
        assert_eq!(row.category, "life");
        assert!(store.feed("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn follow_is_latest_wins() {
        let store = SqliteStorage::in_memory().await.unwrap();
        in_tx(&store).await;
        for (state, t) in [(FollowState::Blog, 1), (FollowState::Ignore, 2)] {
            store
                .upsert_follow(&FollowRow {
                    follower: "alice".into(),
                    following: "bob".into(),
                    state,
                    created_at: at(t),
                })
                .await
                .unwrap();
        }
        store.commit().await.unwrap();

        let row = store.follow("alice", "bob").await.unwrap().unwrap();
        assert_eq!(row.state, FollowState::Ignore);
        assert_eq!(row.created_at, at(1));
    }

    #[tokio::test]
    async fn reblog_insert_and_delete_are_idempotent() {
        let store = SqliteStorage::in_memory().await.unwrap();
        in_tx(&store).await;
        assert!(!store.delete_reblog("carol", 1).await.unwrap());
        assert!(store.insert_reblog("carol", 1, at(0)).await.unwrap());
        assert!(!store.insert_reblog("carol", 1, at(1)).await.unwrap());
        store.commit().await.unwrap();
        assert!(store.has_reblog("carol", 1).await.unwrap());

        in_tx(&store).await;
        assert!(store.delete_reblog("carol", 1).await.unwrap());
        store.commit().await.unwrap();
        assert!(!store.has_reblog("carol", 1).await.unwrap());
    }

    #[tokio::test]
    async fn payout_window_drives_paidout_selection() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let cache = SqlitePostCache::new(&store);
        assert!(cache.is_empty().await.unwrap());

        in_tx(&store).await;
        let pid = store.insert_post(&post("alice", "hello", at(0))).await.unwrap();
        let key = PostKey {
            id: pid,
            author: "alice".into(),
            permlink: "hello".into(),
        };
        cache.recompute(&[key.clone()], at(10)).await.unwrap();
        store.commit().await.unwrap();

        assert!(!cache.is_empty().await.unwrap());
        assert_eq!(cache.cached(pid).await.unwrap(), Some(false));

        let day = 24 * 3600;
        assert!(cache.select_paidout_posts(at(6 * day)).await.unwrap().is_empty());
        let due = cache.select_paidout_posts(at(8 * day)).await.unwrap();
        assert_eq!(due, vec![key.clone()]);

        cache.recompute(&due, at(8 * day)).await.unwrap();
        assert_eq!(cache.cached(pid).await.unwrap(), Some(true));
        assert!(cache.select_paidout_posts(at(9 * day)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repair_and_rebuild() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let cache = SqlitePostCache::new(&store);

        in_tx(&store).await;
        let a = store.insert_post(&post("alice", "a", at(0))).await.unwrap();
        let b = store.insert_post(&post("bob", "b", at(0))).await.unwrap();
        let gone = store.insert_post(&post("carol", "c", at(0))).await.unwrap();
        store.mark_post_deleted(gone).await.unwrap();
        store.commit().await.unwrap();

        assert_eq!(cache.repair_missing().await.unwrap(), 2);
        assert_eq!(cache.repair_missing().await.unwrap(), 0);
        assert_eq!(cache.cached(gone).await.unwrap(), None);

        assert_eq!(cache.rebuild_all(at(30 * 24 * 3600)).await.unwrap(), 2);
        assert_eq!(cache.cached(a).await.unwrap(), Some(true));
        assert_eq!(cache.cached(b).await.unwrap(), Some(true));
    }

    #[tokio::test]
    async fn processes_blocks_end_to_end() {
        let store = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let processor = BlockProcessor::new(
            store.clone(),
            Arc::new(NameOnlyCommunities),
            ActivationHeights::default(),
        );

        let blocks = vec![
            block(1, vec![json!(["account_create", {"new_account_name": "alice"}])]),
            block(2, vec![json!(["comment", {
                "parent_author": "", "parent_permlink": "steem",
                "author": "alice", "permlink": "hello", "json_metadata": ""
            }])]),
            block(3, vec![json!(["custom_json", {
                "required_auths": [], "required_posting_auths": ["bob"], "id": "follow",
                "json": r#"["reblog",{"account":"bob","author":"alice","permlink":"hello"}]"#
            }])]),
        ];
        let dirty = processor.process_blocks(&blocks).await.unwrap();
        assert_eq!(dirty.len(), 1);

        let post = store.find_post("alice", "hello").await.unwrap().unwrap();
        assert!(store.account_exists("alice").await.unwrap());
        assert!(store.has_reblog("bob", post.id).await.unwrap());
        assert_eq!(store.feed("bob").await.unwrap(), vec![post.id]);
        assert_eq!(store.post_count().await.unwrap(), 1);

        // A block that does not link is rejected and leaves no trace.
        let mut bad = block(4, vec![json!(["delete_comment", {"author": "alice", "permlink": "hello"}])]);
        bad.previous = id(2);
        assert!(processor.process_blocks(&[bad]).await.is_err());
        assert_eq!(store.last_block_number().await.unwrap(), 3);
        assert!(!store.find_post("alice", "hello").await.unwrap().unwrap().is_deleted);
    }
}
