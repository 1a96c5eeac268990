//! Boundary to the community subsystem.
//!
//! The indexer never decides on its own whether a community tag is
//! acceptable; it asks a [`CommunityService`].

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::Value;

use crate::accounts::is_valid_account_name;
use crate::error::IndexerError;
use crate::operation::CommentOp;

/// Community validation and community-op processing.
#[async_trait]
pub trait CommunityService: Send + Sync {
    /// Validate (and register, if the subsystem tracks membership) the
    /// community a new top-level post is created in.
    ///
    /// Returns the accepted community, or `None` to fall back to the author.
    async fn validate_post_community(
        &self,
        candidate: &str,
        op: &CommentOp,
    ) -> Result<Option<String>, IndexerError>;

    /// Process one `com.steemit.community` payload signed by `account`.
    async fn process_op(
        &self,
        account: &str,
        payload: &Value,
        date: NaiveDateTime,
    ) -> Result<(), IndexerError>;
}

/// Accepts any community that is a well-formed account name and ignores
/// community ops.
#[derive(Debug, Default, Clone, Copy)]
pub struct NameOnlyCommunities;

#[async_trait]
impl CommunityService for NameOnlyCommunities {
    async fn validate_post_community(
        &self,
        candidate: &str,
        _op: &CommentOp,
    ) -> Result<Option<String>, IndexerError> {
        Ok(is_valid_account_name(candidate).then(|| candidate.to_string()))
    }

    async fn process_op(
        &self,
        account: &str,
        payload: &Value,
        date: NaiveDateTime,
    ) -> Result<(), IndexerError> {
        tracing::debug!(account, %date, %payload, "community op ignored");
        Ok(())
    }
}
