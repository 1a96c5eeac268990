//! Versioned decoding of `custom_json` payloads.
//!
//! Which payloads are meaningful, and in which shape, depends on the block
//! height: early `follow` ops were sent as bare objects, and the community
//! namespace only has semantics after its activation height. Both rules are
//! expressed here, as a pure function of the op and the height.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::operation::CustomJsonOp;

/// `custom_json` id of the follow/reblog plugin.
pub const FOLLOW_ID: &str = "follow";
/// `custom_json` id of the community namespace.
pub const COMMUNITY_ID: &str = "com.steemit.community";

/// Heights at which payload semantics change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationHeights {
    /// Below this block, non-list `follow` payloads are coerced into
    /// `["follow", payload]`.
    pub legacy_follow_below: u64,
    /// Community ops are only dispatched strictly above this block.
    pub community_above: u64,
}

impl Default for ActivationHeights {
    fn default() -> Self {
        Self {
            legacy_follow_below: 6_000_000,
            community_above: 13_000_000,
        }
    }
}

/// A recognized custom payload together with its single posting authority.
#[derive(Debug, Clone, PartialEq)]
pub enum CustomPayload {
    Follow { account: String, payload: Value },
    Community { account: String, payload: Value },
}

/// Why a `custom_json` op was not dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSkip {
    /// Not a namespace the indexer handles.
    UnknownId,
    /// Needs exactly one posting authority.
    AuthorityCount(usize),
    /// `json` is not valid JSON.
    Unparseable,
    /// Community op below the activation height.
    Inactive,
}

/// Decode a `custom_json` op applied at `block_num`.
pub fn decode_custom_json(
    op: &CustomJsonOp,
    block_num: u64,
    heights: &ActivationHeights,
) -> Result<CustomPayload, PayloadSkip> {
    if op.id != FOLLOW_ID && op.id != COMMUNITY_ID {
        return Err(PayloadSkip::UnknownId);
    }
    let [account] = op.required_posting_auths.as_slice() else {
        return Err(PayloadSkip::AuthorityCount(op.required_posting_auths.len()));
    };
    let payload: Value = serde_json::from_str(&op.json).map_err(|_| PayloadSkip::Unparseable)?;
    let account = account.clone();

    if op.id == FOLLOW_ID {
        return Ok(CustomPayload::Follow {
            account,
            payload: coerce_legacy_follow(payload, block_num, heights),
        });
    }
    if block_num > heights.community_above {
        Ok(CustomPayload::Community { account, payload })
    } else {
        Err(PayloadSkip::Inactive)
    }
}

/// Wrap a bare pre-activation follow payload into the tagged form.
pub fn coerce_legacy_follow(payload: Value, block_num: u64, heights: &ActivationHeights) -> Value {
    if block_num < heights.legacy_follow_below && !payload.is_array() {
        json!(["follow", payload])
    } else {
        payload
    }
}
