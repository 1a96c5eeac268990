//! Block and batch processing.
//!
//! [`BlockProcessor::process_block`] applies one block inside a transaction
//! owned by the caller. [`BlockProcessor::process_blocks`] wraps a whole
//! batch in a single transaction: either every block of the batch is
//! committed or none is.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::accounts::register_accounts;
use crate::community::CommunityService;
use crate::error::IndexerError;
use crate::follow::process_follow_payload;
use crate::operation::{CommentOp, CustomJsonOp, DeleteCommentOp, Operation};
use crate::payload::{decode_custom_json, ActivationHeights, CustomPayload, PayloadSkip};
use crate::posts::{delete_posts, register_posts};
use crate::store::StoreGateway;
use crate::types::{DirtySet, PostUrl, SignedBlock};

/// Applies blocks to the store through the operation handlers.
#[derive(Clone)]
pub struct BlockProcessor {
    store: Arc<dyn StoreGateway>,
    communities: Arc<dyn CommunityService>,
    heights: ActivationHeights,
}

impl BlockProcessor {
    pub fn new(
        store: Arc<dyn StoreGateway>,
        communities: Arc<dyn CommunityService>,
        heights: ActivationHeights,
    ) -> Self {
        Self {
            store,
            communities,
            heights,
        }
    }

    pub fn store(&self) -> &dyn StoreGateway {
        self.store.as_ref()
    }

    /// Apply `blocks` in one transaction and return the union of their
    /// dirty sets. Rolls back on the first error.
    pub async fn process_blocks(&self, blocks: &[SignedBlock]) -> Result<DirtySet, IndexerError> {
        self.store.begin().await?;
        let result = async {
            let mut dirty = DirtySet::new();
            for block in blocks {
                dirty.extend(self.process_block(block).await?);
            }
            Ok::<_, IndexerError>(dirty)
        }
        .await;
        settle(self.store(), result).await
    }

    /// Apply one block inside the caller's transaction.
    pub async fn process_block(&self, block: &SignedBlock) -> Result<DirtySet, IndexerError> {
        let record = block.record()?;
        if let Some(last) = self.store.last_block().await? {
            record.verify_link(&last)?;
        }
        self.store.insert_block(&record).await?;

        let num = record.number;
        let date = block.timestamp;
        let mut batch = OpBatch::default();
        for op in block.operations() {
            batch.classify(op, num);
        }

        register_accounts(self.store(), &batch.accounts, date).await?;
        register_posts(self.store(), self.communities.as_ref(), &batch.comments, date).await?;
        delete_posts(self.store(), &batch.deletes).await?;
        for op in &batch.custom {
            self.process_custom_json(op, num, date).await?;
        }

        tracing::trace!(
            block = num,
            txs = record.transaction_count,
            dirty = batch.dirty.len(),
            "block applied"
        );
        Ok(batch.dirty)
    }

    async fn process_custom_json(
        &self,
        op: &CustomJsonOp,
        block_num: u64,
        date: NaiveDateTime,
    ) -> Result<(), IndexerError> {
        match decode_custom_json(op, block_num, &self.heights) {
            Ok(CustomPayload::Follow { account, payload }) => {
                process_follow_payload(self.store(), &account, &payload, date).await?;
            }
            Ok(CustomPayload::Community { account, payload }) => {
                self.communities.process_op(&account, &payload, date).await?;
            }
            Err(PayloadSkip::UnknownId) => {}
            Err(PayloadSkip::Inactive) => {
                tracing::debug!(block = block_num, id = %op.id, "community op before activation");
            }
            Err(reason) => {
                tracing::warn!(
                    block = block_num,
                    id = %op.id,
                    ?reason,
                    auths = ?op.required_posting_auths,
                    "skipping custom_json"
                );
            }
        }
        Ok(())
    }
}

/// Operations of one block, grouped by the handler that consumes them.
#[derive(Default)]
struct OpBatch<'a> {
    accounts: BTreeSet<String>,
    comments: Vec<&'a CommentOp>,
    deletes: Vec<&'a DeleteCommentOp>,
    custom: Vec<&'a CustomJsonOp>,
    dirty: DirtySet,
}

impl<'a> OpBatch<'a> {
    fn classify(&mut self, op: &'a Operation, block_num: u64) {
        match op {
            Operation::Pow(pow) => {
                self.accounts.insert(pow.worker_account.clone());
            }
            Operation::Pow2(pow) => match pow.worker_account() {
                Some(worker) => {
                    self.accounts.insert(worker.to_string());
                }
                None => tracing::debug!(block = block_num, "pow2 without worker account"),
            },
            Operation::AccountCreate(create) | Operation::AccountCreateWithDelegation(create) => {
                self.accounts.insert(create.new_account_name.clone());
            }
            Operation::Comment(comment) => {
                self.dirty
                    .insert(PostUrl::new(&comment.author, &comment.permlink));
                self.comments.push(comment);
            }
            Operation::DeleteComment(delete) => self.deletes.push(delete),
            Operation::CustomJson(custom) => self.custom.push(custom),
            Operation::Vote(vote) => {
                self.dirty.insert(PostUrl::new(&vote.author, &vote.permlink));
            }
            Operation::Other { .. } => {}
        }
    }
}

/// Commit on success, roll back on failure. The processing error wins over a
/// failed rollback.
pub(crate) async fn settle<T>(
    store: &dyn StoreGateway,
    result: Result<T, IndexerError>,
) -> Result<T, IndexerError> {
    match result {
        Ok(value) => {
            store.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = store.rollback().await {
                tracing::error!(error = %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}
