//! Follow and reblog handling for the `follow` plugin namespace.

use chrono::NaiveDateTime;
use serde_json::{Map, Value};

use crate::accounts::is_valid_account_name;
use crate::error::IndexerError;
use crate::store::{FollowRow, FollowState, StoreGateway};

/// Result of applying one follow-namespace payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Followed(FollowState),
    Reblogged,
    Unreblogged,
    Skipped(FollowSkip),
}

/// Soft validation failures; logged, never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowSkip {
    /// Not a `[kind, {data}]` pair with a known kind.
    Shape,
    /// Required field missing or of the wrong type.
    Malformed,
    /// Unknown `what` keyword.
    UnknownState,
    /// Declared account differs from the signing account.
    Impersonation,
    InvalidAccount,
    /// Reblog target is a comment.
    CommentReblog,
    /// Reblog target does not exist.
    UnknownPost,
}

/// Apply a `follow` namespace payload signed by `account`.
pub async fn process_follow_payload(
    store: &dyn StoreGateway,
    account: &str,
    payload: &Value,
    date: NaiveDateTime,
) -> Result<FollowOutcome, IndexerError> {
    let outcome = match split_tagged(payload) {
        Some(("follow", data)) => apply_follow(store, account, data, date).await?,
        Some(("reblog", data)) => apply_reblog(store, account, data, date).await?,
        _ => FollowOutcome::Skipped(FollowSkip::Shape),
    };
    if let FollowOutcome::Skipped(reason) = outcome {
        tracing::warn!(account, %date, ?reason, %payload, "skipping follow op");
    }
    Ok(outcome)
}

fn split_tagged(payload: &Value) -> Option<(&str, &Map<String, Value>)> {
    match payload.as_array()?.as_slice() {
        [kind, data] => Some((kind.as_str()?, data.as_object()?)),
        _ => None,
    }
}

/// `null`, `false`, `0`, `""`, `[]` and `{}` all mean "no state given".
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn str_field<'a>(data: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    data.get(key)?.as_str()
}

async fn apply_follow(
    store: &dyn StoreGateway,
    account: &str,
    data: &Map<String, Value>,
    date: NaiveDateTime,
) -> Result<FollowOutcome, IndexerError> {
    let Some(what) = data.get("what").and_then(Value::as_array) else {
        return Ok(FollowOutcome::Skipped(FollowSkip::Malformed));
    };
    let keyword = match what.first() {
        None => "clear",
        Some(value) if is_falsy(value) => "clear",
        Some(Value::String(s)) => s.as_str(),
        Some(_) => return Ok(FollowOutcome::Skipped(FollowSkip::UnknownState)),
    };
    let Some(state) = FollowState::from_keyword(keyword) else {
        return Ok(FollowOutcome::Skipped(FollowSkip::UnknownState));
    };
    let (Some(follower), Some(following)) =
        (str_field(data, "follower"), str_field(data, "following"))
    else {
        return Ok(FollowOutcome::Skipped(FollowSkip::Malformed));
    };

    if follower != account {
        return Ok(FollowOutcome::Skipped(FollowSkip::Impersonation));
    }
    if !is_valid_account_name(follower) || !is_valid_account_name(following) {
        return Ok(FollowOutcome::Skipped(FollowSkip::InvalidAccount));
    }

    store
        .upsert_follow(&FollowRow {
            follower: follower.to_string(),
            following: following.to_string(),
            state,
            created_at: date,
        })
        .await?;
    Ok(FollowOutcome::Followed(state))
}

async fn apply_reblog(
    store: &dyn StoreGateway,
    account: &str,
    data: &Map<String, Value>,
    date: NaiveDateTime,
) -> Result<FollowOutcome, IndexerError> {
    let (Some(blogger), Some(author), Some(permlink)) = (
        str_field(data, "account"),
        str_field(data, "author"),
        str_field(data, "permlink"),
    ) else {
        return Ok(FollowOutcome::Skipped(FollowSkip::Malformed));
    };

    if blogger != account {
        return Ok(FollowOutcome::Skipped(FollowSkip::Impersonation));
    }
    if !is_valid_account_name(author) || !is_valid_account_name(blogger) {
        return Ok(FollowOutcome::Skipped(FollowSkip::InvalidAccount));
    }

    let Some(post) = store.find_post(author, permlink).await? else {
        return Ok(FollowOutcome::Skipped(FollowSkip::UnknownPost));
    };
    if post.depth > 0 {
        return Ok(FollowOutcome::Skipped(FollowSkip::CommentReblog));
    }

    if str_field(data, "delete") == Some("delete") {
        store.delete_reblog(blogger, post.id).await?;
        store.delete_feed_entry(blogger, post.id).await?;
        Ok(FollowOutcome::Unreblogged)
    } else {
        store.insert_reblog(blogger, post.id, date).await?;
        store.insert_feed_entry(blogger, post.id, date).await?;
        Ok(FollowOutcome::Reblogged)
    }
}
