//! Fixtures shared by the unit tests of this crate.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::cache::PostCache;
use crate::error::IndexerError;
use crate::operation::{CommentOp, CustomJsonOp, DeleteCommentOp, Operation, VoteOp};
use crate::source::{ChainProperties, ChainSource};
use crate::types::{PostKey, SignedBlock, Transaction};

/// Timestamp of block `n` on a 3-second chain starting at the genesis time.
pub(crate) fn at(n: u64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2016, 3, 24)
        .and_then(|d| d.and_hms_opt(16, 0, 0))
        .unwrap()
        + chrono::Duration::seconds(3 * n as i64)
}

/// Deterministic 40-char block id whose prefix encodes `n`.
pub(crate) fn block_id(n: u64) -> String {
    format!("{n:08x}{:032x}", n.wrapping_mul(0x9e37_79b9_7f4a_7c15))
}

pub(crate) fn comment(author: &str, permlink: &str) -> CommentOp {
    CommentOp {
        parent_author: String::new(),
        parent_permlink: "steem".into(),
        author: author.into(),
        permlink: permlink.into(),
        json_metadata: String::new(),
    }
}

pub(crate) fn reply(author: &str, permlink: &str, parent_author: &str, parent_permlink: &str) -> CommentOp {
    CommentOp {
        parent_author: parent_author.into(),
        parent_permlink: parent_permlink.into(),
        author: author.into(),
        permlink: permlink.into(),
        json_metadata: String::new(),
    }
}

pub(crate) fn vote(voter: &str, author: &str, permlink: &str) -> Operation {
    Operation::Vote(VoteOp {
        voter: voter.into(),
        author: author.into(),
        permlink: permlink.into(),
        weight: 10_000,
    })
}

pub(crate) fn delete(author: &str, permlink: &str) -> Operation {
    Operation::DeleteComment(DeleteCommentOp {
        author: author.into(),
        permlink: permlink.into(),
    })
}

pub(crate) fn custom_json(id: &str, posting_auths: &[&str], json: Value) -> Operation {
    Operation::CustomJson(CustomJsonOp {
        required_auths: vec![],
        required_posting_auths: posting_auths.iter().map(|s| s.to_string()).collect(),
        id: id.into(),
        json: json.to_string(),
    })
}

/// Block `n` linked to `block_id(n - 1)`, all ops in one transaction.
pub(crate) fn signed_block(n: u64, ops: Vec<Operation>) -> SignedBlock {
    let transactions = if ops.is_empty() {
        vec![]
    } else {
        vec![Transaction { operations: ops }]
    };
    SignedBlock {
        block_id: block_id(n),
        previous: block_id(n.saturating_sub(1)),
        timestamp: at(n),
        transactions,
    }
}

/// Empty, correctly linked blocks `from..=to`.
pub(crate) fn empty_chain(from: u64, to: u64) -> Vec<SignedBlock> {
    (from..=to).map(|n| signed_block(n, vec![])).collect()
}

// ─── Chain source ─────────────────────────────────────────────────────────────

/// Scripted chain node.
///
/// Every `dynamic_properties` call advances the head by `growth` (up to
/// the highest block held), so live-tail loops make progress without real
/// sleeps. The irreversible block trails the head by `irreversible_lag`.
pub(crate) struct MockChain {
    blocks: BTreeMap<u64, SignedBlock>,
    head: Mutex<u64>,
    growth: u64,
    /// The head grows once every `growth_period` polls.
    growth_period: u64,
    irreversible_lag: u64,
    /// Block numbers that answer `None` once before they become available.
    pub(crate) late: Mutex<Vec<u64>>,
    pub(crate) range_calls: Mutex<Vec<(u64, u64)>>,
    /// Number of `dynamic_properties` calls and the head last reported.
    pub(crate) polls: Mutex<(u64, u64)>,
    /// `(block, head last reported)` for every `get_block` call.
    pub(crate) block_calls: Mutex<Vec<(u64, u64)>>,
}

impl MockChain {
    pub(crate) fn new(blocks: Vec<SignedBlock>, head: u64) -> Self {
        Self {
            blocks: blocks
                .into_iter()
                .map(|b| (b.number().unwrap(), b))
                .collect(),
            head: Mutex::new(head),
            growth: 0,
            growth_period: 1,
            irreversible_lag: 0,
            late: Mutex::new(vec![]),
            range_calls: Mutex::new(vec![]),
            polls: Mutex::new((0, 0)),
            block_calls: Mutex::new(vec![]),
        }
    }

    pub(crate) fn growing(mut self, growth: u64) -> Self {
        self.growth = growth;
        self
    }

    pub(crate) fn every(mut self, polls: u64) -> Self {
        self.growth_period = polls.max(1);
        self
    }

    pub(crate) fn irreversible_lag(mut self, lag: u64) -> Self {
        self.irreversible_lag = lag;
        self
    }

    fn top(&self) -> u64 {
        self.blocks.keys().next_back().copied().unwrap_or(0)
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn get_block(&self, number: u64) -> Result<Option<SignedBlock>, IndexerError> {
        let reported = self.polls.lock().unwrap().1;
        self.block_calls.lock().unwrap().push((number, reported));
        let mut late = self.late.lock().unwrap();
        if let Some(pos) = late.iter().position(|n| *n == number) {
            late.remove(pos);
            return Ok(None);
        }
        Ok(self.blocks.get(&number).cloned())
    }

    async fn get_blocks_range(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<SignedBlock>, IndexerError> {
        self.range_calls.lock().unwrap().push((from, to));
        (from..to)
            .map(|n| {
                self.blocks
                    .get(&n)
                    .cloned()
                    .ok_or_else(|| IndexerError::Rpc(format!("block {n} not available")))
            })
            .collect()
    }

    async fn dynamic_properties(&self) -> Result<ChainProperties, IndexerError> {
        let mut head = self.head.lock().unwrap();
        let current = *head;
        let mut polls = self.polls.lock().unwrap();
        *polls = (polls.0 + 1, current);
        if polls.0 % self.growth_period == 0 {
            *head = (current + self.growth).min(self.top()).max(current);
        }
        Ok(ChainProperties {
            head_block_number: current,
            last_irreversible_block_num: current.saturating_sub(self.irreversible_lag),
            time: at(current),
        })
    }
}

// ─── Post cache ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub(crate) struct CacheLog {
    /// One entry per `recompute` call.
    pub(crate) recomputed: Vec<Vec<PostKey>>,
    /// Returned (and drained) by the next `select_paidout_posts`.
    pub(crate) payable: Vec<PostKey>,
    pub(crate) paidout_queries: Vec<NaiveDateTime>,
    pub(crate) repairs: u32,
    pub(crate) rebuilds: Vec<NaiveDateTime>,
    pub(crate) empty: bool,
}

/// Post cache that records every call.
#[derive(Debug, Default)]
pub(crate) struct RecordingCache {
    pub(crate) log: Mutex<CacheLog>,
}

impl RecordingCache {
    pub(crate) fn empty() -> Self {
        let cache = Self::default();
        cache.log.lock().unwrap().empty = true;
        cache
    }

    /// Every post key passed to `recompute`, in call order.
    pub(crate) fn recomputed_urls(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .recomputed
            .iter()
            .flatten()
            .map(|k| format!("{}/{}", k.author, k.permlink))
            .collect()
    }
}

#[async_trait]
impl PostCache for RecordingCache {
    async fn recompute(&self, posts: &[PostKey], _as_of: NaiveDateTime) -> Result<(), IndexerError> {
        if !posts.is_empty() {
            self.log.lock().unwrap().recomputed.push(posts.to_vec());
        }
        Ok(())
    }

    async fn select_paidout_posts(
        &self,
        as_of: NaiveDateTime,
    ) -> Result<Vec<PostKey>, IndexerError> {
        let mut log = self.log.lock().unwrap();
        log.paidout_queries.push(as_of);
        Ok(std::mem::take(&mut log.payable))
    }

    async fn repair_missing(&self) -> Result<u64, IndexerError> {
        self.log.lock().unwrap().repairs += 1;
        Ok(0)
    }

    async fn rebuild_all(&self, as_of: NaiveDateTime) -> Result<u64, IndexerError> {
        let mut log = self.log.lock().unwrap();
        log.rebuilds.push(as_of);
        log.empty = false;
        Ok(0)
    }

    async fn is_empty(&self) -> Result<bool, IndexerError> {
        Ok(self.log.lock().unwrap().empty)
    }
}
