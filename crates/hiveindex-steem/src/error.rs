//! Transport-level error types.

use hiveindex_core::error::IndexerError;
use thiserror::Error;

use crate::rpc::JsonRpcError;

/// Errors that can occur while talking to a node.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, 5xx, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Request timed out.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// The node answered, but not with what was asked for.
    #[error("Unexpected response: {0}")]
    Unexpected(String),
}

impl TransportError {
    /// Returns `true` if this error is retryable (transient).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Timeout(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}

impl From<TransportError> for IndexerError {
    fn from(e: TransportError) -> Self {
        IndexerError::Rpc(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(TransportError::Http("502".into()).is_retryable());
        assert!(TransportError::Timeout("30s".into()).is_retryable());
        let rpc = TransportError::Rpc(JsonRpcError {
            code: -32602,
            message: "Invalid parameters".into(),
            data: None,
        });
        assert!(!rpc.is_retryable());
        assert!(!TransportError::Unexpected("x".into()).is_retryable());
    }

    #[test]
    fn converts_into_indexer_rpc_error() {
        let err: IndexerError = TransportError::Http("connection refused".into()).into();
        assert!(err.is_rpc());
        assert!(err.to_string().contains("connection refused"));
    }
}
