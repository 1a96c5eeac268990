//! Post registration and deletion.

use chrono::NaiveDateTime;
use serde_json::Value;

use crate::community::CommunityService;
use crate::error::IndexerError;
use crate::operation::{CommentOp, DeleteCommentOp};
use crate::store::{NewPost, PostPlacement, StoreGateway};

/// What registering one comment op did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    /// A new row was inserted.
    Created(u64),
    /// A previously deleted row was revived.
    Revived(u64),
    /// The post exists and is live: an edit, nothing to do here.
    Edit(u64),
}

/// Read the `community` declared in a comment's JSON metadata.
///
/// Anything but an object with a string `community` field means no
/// community was declared.
pub fn declared_community(comment: &CommentOp) -> Option<String> {
    if comment.json_metadata.is_empty() {
        return None;
    }
    let metadata: Value = serde_json::from_str(&comment.json_metadata).ok()?;
    metadata
        .as_object()?
        .get("community")?
        .as_str()
        .map(str::to_string)
}

/// Register new posts (not edits) and put top-level posts in their
/// author's feed.
pub async fn register_posts(
    store: &dyn StoreGateway,
    communities: &dyn CommunityService,
    ops: &[&CommentOp],
    date: NaiveDateTime,
) -> Result<Vec<PostOutcome>, IndexerError> {
    let mut outcomes = Vec::with_capacity(ops.len());
    for op in ops {
        outcomes.push(register_post(store, communities, op, date).await?);
    }
    Ok(outcomes)
}

async fn register_post(
    store: &dyn StoreGateway,
    communities: &dyn CommunityService,
    op: &CommentOp,
    date: NaiveDateTime,
) -> Result<PostOutcome, IndexerError> {
    let existing = store.find_post(&op.author, &op.permlink).await?;
    if let Some(post) = &existing {
        if !post.is_deleted {
            return Ok(PostOutcome::Edit(post.id));
        }
    }

    let placement = place_post(store, communities, op).await?;

    let outcome = match existing {
        Some(post) => {
            store.revive_post(post.id, &placement).await?;
            store.delete_feed_entry(&op.author, post.id).await?;
            tracing::debug!(author = %op.author, permlink = %op.permlink, id = post.id, "revived deleted post");
            PostOutcome::Revived(post.id)
        }
        None => {
            let id = store
                .insert_post(&NewPost {
                    author: op.author.clone(),
                    permlink: op.permlink.clone(),
                    placement: placement.clone(),
                    created_at: date,
                })
                .await?;
            PostOutcome::Created(id)
        }
    };

    if placement.depth == 0 {
        let id = match outcome {
            PostOutcome::Created(id) | PostOutcome::Revived(id) | PostOutcome::Edit(id) => id,
        };
        store.insert_feed_entry(&op.author, id, date).await?;
    }
    Ok(outcome)
}

/// Compute parent link, depth, category and community for a comment op.
async fn place_post(
    store: &dyn StoreGateway,
    communities: &dyn CommunityService,
    op: &CommentOp,
) -> Result<PostPlacement, IndexerError> {
    if op.is_root() {
        let candidate = declared_community(op).unwrap_or_else(|| op.author.clone());
        let community = communities
            .validate_post_community(&candidate, op)
            .await?
            .unwrap_or_else(|| op.author.clone());
        return Ok(PostPlacement {
            parent_id: None,
            depth: 0,
            category: op.parent_permlink.clone(),
            community,
        });
    }

    let parent = store
        .find_post(&op.parent_author, &op.parent_permlink)
        .await?
        .ok_or_else(|| IndexerError::ParentNotFound {
            author: op.parent_author.clone(),
            permlink: op.parent_permlink.clone(),
        })?;
    Ok(PostPlacement {
        parent_id: Some(parent.id),
        depth: parent.depth + 1,
        category: parent.category,
        community: parent.community,
    })
}

/// Mark posts deleted and evict them from the derived caches.
///
/// Returns how many posts were actually deleted; unknown posts are skipped.
pub async fn delete_posts(
    store: &dyn StoreGateway,
    ops: &[&DeleteCommentOp],
) -> Result<usize, IndexerError> {
    let mut deleted = 0;
    for op in ops {
        let Some(post) = store.find_post(&op.author, &op.permlink).await? else {
            tracing::debug!(author = %op.author, permlink = %op.permlink, "delete of unknown post");
            continue;
        };
        store.mark_post_deleted(post.id).await?;
        store.delete_cached_post(post.id).await?;
        store.delete_feed_entries(post.id).await?;
        deleted += 1;
    }
    Ok(deleted)
}
