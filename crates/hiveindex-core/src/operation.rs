//! Typed chain operations.
//!
//! On the wire every operation is a two-element list `[kind, body]`. Kinds
//! the indexer acts on are decoded into dedicated structs; everything else
//! is kept as [`Operation::Other`] and ignored by the block processor.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A decoded chain operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawOperation", into = "RawOperation")]
pub enum Operation {
    Pow(PowOp),
    Pow2(Pow2Op),
    AccountCreate(AccountCreateOp),
    AccountCreateWithDelegation(AccountCreateOp),
    Comment(CommentOp),
    DeleteComment(DeleteCommentOp),
    CustomJson(CustomJsonOp),
    Vote(VoteOp),
    Other { kind: String, body: Value },
}

impl Operation {
    /// The wire name of this operation.
    pub fn kind(&self) -> &str {
        match self {
            Self::Pow(_) => "pow",
            Self::Pow2(_) => "pow2",
            Self::AccountCreate(_) => "account_create",
            Self::AccountCreateWithDelegation(_) => "account_create_with_delegation",
            Self::Comment(_) => "comment",
            Self::DeleteComment(_) => "delete_comment",
            Self::CustomJson(_) => "custom_json",
            Self::Vote(_) => "vote",
            Self::Other { kind, .. } => kind,
        }
    }
}

/// `[kind, body]` as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOperation(pub String, pub Value);

impl TryFrom<RawOperation> for Operation {
    type Error = serde_json::Error;

    fn try_from(RawOperation(kind, body): RawOperation) -> Result<Self, Self::Error> {
        Ok(match kind.as_str() {
            "pow" => Self::Pow(serde_json::from_value(body)?),
            "pow2" => Self::Pow2(serde_json::from_value(body)?),
            "account_create" => Self::AccountCreate(serde_json::from_value(body)?),
            "account_create_with_delegation" => {
                Self::AccountCreateWithDelegation(serde_json::from_value(body)?)
            }
            "comment" => Self::Comment(serde_json::from_value(body)?),
            "delete_comment" => Self::DeleteComment(serde_json::from_value(body)?),
            "custom_json" => Self::CustomJson(serde_json::from_value(body)?),
            "vote" => Self::Vote(serde_json::from_value(body)?),
            _ => Self::Other { kind, body },
        })
    }
}

impl From<Operation> for RawOperation {
    fn from(op: Operation) -> Self {
        let kind = op.kind().to_string();
        let body = match op {
            Operation::Pow(o) => serde_json::to_value(o),
            Operation::Pow2(o) => serde_json::to_value(o),
            Operation::AccountCreate(o) | Operation::AccountCreateWithDelegation(o) => {
                serde_json::to_value(o)
            }
            Operation::Comment(o) => serde_json::to_value(o),
            Operation::DeleteComment(o) => serde_json::to_value(o),
            Operation::CustomJson(o) => serde_json::to_value(o),
            Operation::Vote(o) => serde_json::to_value(o),
            Operation::Other { body, .. } => Ok(body),
        };
        RawOperation(kind, body.unwrap_or_default())
    }
}

// ─── Operation bodies ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowOp {
    pub worker_account: String,
}

/// Proof-of-work v2. The worker sits inside a static variant:
/// `work = [variant, {"input": {"worker_account": ..}, ..}]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pow2Op {
    pub work: Value,
}

impl Pow2Op {
    pub fn worker_account(&self) -> Option<&str> {
        self.work.get(1)?.get("input")?.get("worker_account")?.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCreateOp {
    pub new_account_name: String,
}

/// A new post, reply, or edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentOp {
    /// Empty for top-level posts.
    #[serde(default)]
    pub parent_author: String,
    /// For top-level posts this is the category.
    pub parent_permlink: String,
    pub author: String,
    pub permlink: String,
    #[serde(default)]
    pub json_metadata: String,
}

impl CommentOp {
    pub fn is_root(&self) -> bool {
        self.parent_author.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteCommentOp {
    pub author: String,
    pub permlink: String,
}

/// Application-defined payload. `json` is a JSON document encoded as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomJsonOp {
    #[serde(default)]
    pub required_auths: Vec<String>,
    #[serde(default)]
    pub required_posting_auths: Vec<String>,
    pub id: String,
    pub json: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOp {
    pub voter: String,
    pub author: String,
    pub permlink: String,
    #[serde(default)]
    pub weight: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_known_kinds() {
        let op: Operation = serde_json::from_value(json!([
            "comment",
            {
                "parent_author": "",
                "parent_permlink": "steem",
                "author": "alice",
                "permlink": "hello",
                "title": "Hello",
                "body": "world",
                "json_metadata": "{\"tags\":[\"steem\"]}"
            }
        ]))
        .unwrap();
        match op {
            Operation::Comment(c) => {
                assert!(c.is_root());
                assert_eq!(c.parent_permlink, "steem");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_kinds_are_kept_as_other() {
        let op: Operation =
            serde_json::from_value(json!(["transfer", {"from": "a", "to": "b"}])).unwrap();
        assert_eq!(op.kind(), "transfer");
        assert!(matches!(op, Operation::Other { .. }));
    }

    #[test]
    fn malformed_known_kind_is_an_error() {
        let res: Result<Operation, _> = serde_json::from_value(json!(["vote", {"voter": "a"}]));
        assert!(res.is_err());
    }

    #[test]
    fn pow2_worker_account() {
        let op = Pow2Op {
            work: json!([0, {"input": {"worker_account": "miner1", "nonce": 7}}]),
        };
        assert_eq!(op.worker_account(), Some("miner1"));
        let bad = Pow2Op { work: json!({"input": {}}) };
        assert_eq!(bad.worker_account(), None);
    }

    #[test]
    fn serializes_back_to_wire_shape() {
        let op = Operation::DeleteComment(DeleteCommentOp {
            author: "alice".into(),
            permlink: "p".into(),
        });
        let v = serde_json::to_value(&op).unwrap();
        assert_eq!(v, json!(["delete_comment", {"author": "alice", "permlink": "p"}]));
    }
}
