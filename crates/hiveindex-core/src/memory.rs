//! In-memory store gateway.
//!
//! Keeps every table in RAM. `begin` snapshots the committed tables into a
//! staging copy, writes go to the staging copy, `commit` swaps it in and
//! `rollback` drops it. Useful for tests and short-lived runs; all data is
//! lost when the process exits.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::IndexerError;
use crate::store::{FollowRow, NewPost, PostPlacement, PostRow, StoreGateway};
use crate::types::BlockRecord;

#[derive(Debug, Clone, Default)]
struct Tables {
    blocks: BTreeMap<u64, BlockRecord>,
    accounts: BTreeMap<String, NaiveDateTime>,
    /// Indexed by `id - 1`.
    posts: Vec<PostRow>,
    post_ids: HashMap<(String, String), u64>,
    cached_posts: BTreeSet<u64>,
    feed: BTreeMap<(String, u64), NaiveDateTime>,
    follows: BTreeMap<(String, String), FollowRow>,
    reblogs: BTreeMap<(String, u64), NaiveDateTime>,
}

impl Tables {
    fn post_mut(&mut self, id: u64) -> Result<&mut PostRow, IndexerError> {
        id.checked_sub(1)
            .and_then(|i| self.posts.get_mut(i as usize))
            .ok_or_else(|| IndexerError::Storage(format!("no post with id {id}")))
    }
}

#[derive(Default)]
struct State {
    committed: Tables,
    staged: Option<Tables>,
}

impl State {
    fn read(&self) -> &Tables {
        self.staged.as_ref().unwrap_or(&self.committed)
    }

    fn write(&mut self) -> Result<&mut Tables, IndexerError> {
        self.staged
            .as_mut()
            .ok_or_else(|| IndexerError::Storage("write outside of a transaction".into()))
    }
}

/// In-memory indexer storage.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` while a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.state.lock().unwrap().staged.is_some()
    }

    /// Creation date of an account, if it exists.
    pub fn account(&self, name: &str) -> Option<NaiveDateTime> {
        self.state.lock().unwrap().read().accounts.get(name).copied()
    }

    pub fn account_count(&self) -> usize {
        self.state.lock().unwrap().read().accounts.len()
    }

    pub fn post(&self, author: &str, permlink: &str) -> Option<PostRow> {
        let state = self.state.lock().unwrap();
        let tables = state.read();
        let id = tables
            .post_ids
            .get(&(author.to_string(), permlink.to_string()))?;
        tables.posts.get(*id as usize - 1).cloned()
    }

    pub fn post_count(&self) -> usize {
        self.state.lock().unwrap().read().posts.len()
    }

    pub fn block(&self, number: u64) -> Option<BlockRecord> {
        self.state.lock().unwrap().read().blocks.get(&number).cloned()
    }

    pub fn has_feed_entry(&self, account: &str, post_id: u64) -> bool {
        self.state
            .lock()
            .unwrap()
            .read()
            .feed
            .contains_key(&(account.to_string(), post_id))
    }

    /// Post ids in an account's feed, ascending.
    pub fn feed(&self, account: &str) -> Vec<u64> {
        self.state
            .lock()
            .unwrap()
            .read()
            .feed
            .keys()
            .filter(|(a, _)| a == account)
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn follow(&self, follower: &str, following: &str) -> Option<FollowRow> {
        self.state
            .lock()
            .unwrap()
            .read()
            .follows
            .get(&(follower.to_string(), following.to_string()))
            .cloned()
    }

    pub fn follow_count(&self) -> usize {
        self.state.lock().unwrap().read().follows.len()
    }

    pub fn has_reblog(&self, account: &str, post_id: u64) -> bool {
        self.state
            .lock()
            .unwrap()
            .read()
            .reblogs
            .contains_key(&(account.to_string(), post_id))
    }

    /// Pretend the cache subsystem built a row for `post_id`.
    pub fn mark_cached(&self, post_id: u64) {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let tables = state.staged.as_mut().unwrap_or(&mut state.committed);
        tables.cached_posts.insert(post_id);
    }

    pub fn is_cached(&self, post_id: u64) -> bool {
        self.state
            .lock()
            .unwrap()
            .read()
            .cached_posts
            .contains(&post_id)
    }

    /// Every non-deleted post, ascending by id.
    pub fn live_posts(&self) -> Vec<PostRow> {
        self.state
            .lock()
            .unwrap()
            .read()
            .posts
            .iter()
            .filter(|p| !p.is_deleted)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl StoreGateway for MemoryStore {
    async fn begin(&self) -> Result<(), IndexerError> {
        let mut state = self.state.lock().unwrap();
        if state.staged.is_some() {
            return Err(IndexerError::Storage("transaction already open".into()));
        }
        state.staged = Some(state.committed.clone());
        Ok(())
    }

    async fn commit(&self) -> Result<(), IndexerError> {
        let mut state = self.state.lock().unwrap();
        let staged = state
            .staged
            .take()
            .ok_or_else(|| IndexerError::Storage("commit without a transaction".into()))?;
        state.committed = staged;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), IndexerError> {
        self.state.lock().unwrap().staged = None;
        Ok(())
    }

    async fn last_block(&self) -> Result<Option<BlockRecord>, IndexerError> {
        let state = self.state.lock().unwrap();
        Ok(state.read().blocks.values().next_back().cloned())
    }

    async fn insert_block(&self, block: &BlockRecord) -> Result<(), IndexerError> {
        let mut state = self.state.lock().unwrap();
        let tables = state.write()?;
        if tables.blocks.contains_key(&block.number) {
            return Err(IndexerError::Storage(format!(
                "block {} already applied",
                block.number
            )));
        }
        tables.blocks.insert(block.number, block.clone());
        Ok(())
    }

    async fn account_exists(&self, name: &str) -> Result<bool, IndexerError> {
        Ok(self.state.lock().unwrap().read().accounts.contains_key(name))
    }

    async fn insert_account(
        &self,
        name: &str,
        created_at: NaiveDateTime,
    ) -> Result<(), IndexerError> {
        let mut state = self.state.lock().unwrap();
        state
            .write()?
            .accounts
            .entry(name.to_string())
            .or_insert(created_at);
        Ok(())
    }

    async fn find_post(
        &self,
        author: &str,
        permlink: &str,
    ) -> Result<Option<PostRow>, IndexerError> {
        Ok(self.post(author, permlink))
    }

    async fn insert_post(&self, post: &NewPost) -> Result<u64, IndexerError> {
        let mut state = self.state.lock().unwrap();
        let tables = state.write()?;
        let key = (post.author.clone(), post.permlink.clone());
        if tables.post_ids.contains_key(&key) {
            return Err(IndexerError::Storage(format!(
                "duplicate post {}/{}",
                post.author, post.permlink
            )));
        }
        let id = tables.posts.len() as u64 + 1;
        tables.posts.push(PostRow {
            id,
            parent_id: post.placement.parent_id,
            author: post.author.clone(),
            permlink: post.permlink.clone(),
            category: post.placement.category.clone(),
            community: post.placement.community.clone(),
            depth: post.placement.depth,
            is_deleted: false,
            created_at: post.created_at,
        });
        tables.post_ids.insert(key, id);
        Ok(id)
    }

    async fn revive_post(&self, id: u64, placement: &PostPlacement) -> Result<(), IndexerError> {
        let mut state = self.state.lock().unwrap();
        let post = state.write()?.post_mut(id)?;
        post.is_deleted = false;
        post.parent_id = placement.parent_id;
        post.depth = placement.depth;
        post.category = placement.category.clone();
        post.community = placement.community.clone();
        Ok(())
    }

    async fn mark_post_deleted(&self, id: u64) -> Result<(), IndexerError> {
        let mut state = self.state.lock().unwrap();
        state.write()?.post_mut(id)?.is_deleted = true;
        Ok(())
    }

    async fn delete_cached_post(&self, id: u64) -> Result<(), IndexerError> {
        let mut state = self.state.lock().unwrap();
        state.write()?.cached_posts.remove(&id);
        Ok(())
    }

    async fn insert_feed_entry(
        &self,
        account: &str,
        post_id: u64,
        created_at: NaiveDateTime,
    ) -> Result<bool, IndexerError> {
        let mut state = self.state.lock().unwrap();
        let feed = &mut state.write()?.feed;
        let key = (account.to_string(), post_id);
        if feed.contains_key(&key) {
            return Ok(false);
        }
        feed.insert(key, created_at);
        Ok(true)
    }

    async fn delete_feed_entry(&self, account: &str, post_id: u64) -> Result<bool, IndexerError> {
        let mut state = self.state.lock().unwrap();
        Ok(state
            .write()?
            .feed
            .remove(&(account.to_string(), post_id))
            .is_some())
    }

    async fn delete_feed_entries(&self, post_id: u64) -> Result<u64, IndexerError> {
        let mut state = self.state.lock().unwrap();
        let feed = &mut state.write()?.feed;
        let before = feed.len();
        feed.retain(|(_, id), _| *id != post_id);
        Ok((before - feed.len()) as u64)
    }

    async fn upsert_follow(&self, follow: &FollowRow) -> Result<(), IndexerError> {
        let mut state = self.state.lock().unwrap();
        let follows = &mut state.write()?.follows;
        follows
            .entry((follow.follower.clone(), follow.following.clone()))
            .and_modify(|row| row.state = follow.state)
            .or_insert_with(|| follow.clone());
        Ok(())
    }

    async fn insert_reblog(
        &self,
        account: &str,
        post_id: u64,
        created_at: NaiveDateTime,
    ) -> Result<bool, IndexerError> {
        let mut state = self.state.lock().unwrap();
        let reblogs = &mut state.write()?.reblogs;
        let key = (account.to_string(), post_id);
        if reblogs.contains_key(&key) {
            return Ok(false);
        }
        reblogs.insert(key, created_at);
        Ok(true)
    }

    async fn delete_reblog(&self, account: &str, post_id: u64) -> Result<bool, IndexerError> {
        let mut state = self.state.lock().unwrap();
        Ok(state
            .write()?
            .reblogs
            .remove(&(account.to_string(), post_id))
            .is_some())
    }
}
