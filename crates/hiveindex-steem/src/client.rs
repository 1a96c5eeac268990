//! HTTP JSON-RPC client for a Steem node, backed by `reqwest`.
//!
//! Features:
//! - Automatic retry with exponential backoff for transient errors
//! - Ranged block fetches as JSON-RPC batches, several batches in flight
//! - Implements [`ChainSource`] for the sync orchestrator

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use hiveindex_core::error::IndexerError;
use hiveindex_core::source::{ChainProperties, ChainSource};
use hiveindex_core::types::SignedBlock;

use crate::error::TransportError;
use crate::retry::{RetryConfig, RetryPolicy};
use crate::rpc::{JsonRpcRequest, JsonRpcResponse, RpcId};

const GET_BLOCK: &str = "condenser_api.get_block";
const GET_DYNAMIC_GLOBAL_PROPERTIES: &str = "condenser_api.get_dynamic_global_properties";

/// Configuration for [`SteemClient`].
#[derive(Debug, Clone)]
pub struct SteemClientConfig {
    pub retry: RetryConfig,
    pub request_timeout: Duration,
    /// Blocks requested per JSON-RPC batch.
    pub batch_size: usize,
    /// Batches in flight at once during ranged fetches.
    pub max_concurrency: usize,
}

impl Default for SteemClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
            batch_size: 50,
            max_concurrency: 4,
        }
    }
}

/// JSON-RPC client for one Steem node.
pub struct SteemClient {
    url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    batch_size: usize,
    max_concurrency: usize,
    next_id: AtomicU64,
}

impl SteemClient {
    /// Create a new client for the given JSON-RPC endpoint URL.
    pub fn new(url: impl Into<String>, config: SteemClientConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            url: url.into(),
            http,
            retry: RetryPolicy::new(config.retry),
            batch_size: config.batch_size.max(1),
            max_concurrency: config.max_concurrency.max(1),
            next_id: AtomicU64::new(1),
        })
    }

    /// Create with default configuration.
    pub fn default_for(url: impl Into<String>) -> Result<Self, TransportError> {
        Self::new(url, SteemClientConfig::default())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn request(&self, method: &str, params: Vec<Value>) -> JsonRpcRequest {
        JsonRpcRequest::new(self.next_id.fetch_add(1, Ordering::Relaxed), method, params)
    }

    /// Call `method` and decode its result.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, TransportError> {
        let req = self.request(method, params);
        let resp: JsonRpcResponse = self.post_with_retry(&req).await?;
        let value = resp.into_result().map_err(TransportError::Rpc)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Send `reqs` as one JSON-RPC batch; results come back in request order.
    pub async fn call_batch(&self, reqs: Vec<JsonRpcRequest>) -> Result<Vec<Value>, TransportError> {
        if reqs.is_empty() {
            return Ok(vec![]);
        }
        let responses: Vec<JsonRpcResponse> = self.post_with_retry(&reqs).await?;
        order_batch(&reqs, responses)
    }

    async fn post_with_retry<B, R>(&self, body: &B) -> Result<R, TransportError>
    where
        B: serde::Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.post_once(body).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            url = %self.url,
                            "retrying request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(attempt, error = %e, url = %self.url, "max retries exceeded");
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn post_once<B, R>(&self, body: &B) -> Result<R, TransportError>
    where
        B: serde::Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let resp = self.http.post(&self.url).json(body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {status}: {body}")));
        }

        Ok(resp.json::<R>().await?)
    }

    /// Fetch blocks `numbers` in one batch. Every block must exist.
    async fn fetch_batch(&self, numbers: Vec<u64>) -> Result<Vec<SignedBlock>, TransportError> {
        let reqs: Vec<_> = numbers
            .iter()
            .map(|n| self.request(GET_BLOCK, vec![json!(n)]))
            .collect();
        let results = self.call_batch(reqs).await?;

        numbers
            .into_iter()
            .zip(results)
            .map(|(n, value)| {
                if value.is_null() {
                    return Err(TransportError::Unexpected(format!("block {n} not found")));
                }
                let block: SignedBlock = serde_json::from_value(value)?;
                check_number(&block, n)?;
                Ok(block)
            })
            .collect()
    }
}

/// Match batch responses to requests by id; a node may reorder them.
fn order_batch(
    reqs: &[JsonRpcRequest],
    responses: Vec<JsonRpcResponse>,
) -> Result<Vec<Value>, TransportError> {
    let mut by_id: HashMap<RpcId, JsonRpcResponse> =
        responses.into_iter().map(|r| (r.id.clone(), r)).collect();
    reqs.iter()
        .map(|req| {
            let resp = by_id
                .remove(&req.id)
                .ok_or_else(|| TransportError::Unexpected(format!("no response for id {}", req.id)))?;
            resp.into_result().map_err(TransportError::Rpc)
        })
        .collect()
}

fn check_number(block: &SignedBlock, expected: u64) -> Result<(), TransportError> {
    let actual = block
        .number()
        .map_err(|e| TransportError::Unexpected(e.to_string()))?;
    if actual != expected {
        return Err(TransportError::Unexpected(format!(
            "asked for block {expected}, got {actual}"
        )));
    }
    Ok(())
}

#[async_trait]
impl ChainSource for SteemClient {
    async fn get_block(&self, number: u64) -> Result<Option<SignedBlock>, IndexerError> {
        let block: Option<SignedBlock> = self.call(GET_BLOCK, vec![json!(number)]).await?;
        if let Some(block) = &block {
            check_number(block, number)?;
        }
        Ok(block)
    }

    async fn get_blocks_range(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<SignedBlock>, IndexerError> {
        let numbers: Vec<u64> = (from..to).collect();
        let batches: Vec<Vec<u64>> = numbers.chunks(self.batch_size).map(<[u64]>::to_vec).collect();

        let fetched: Vec<Vec<SignedBlock>> = stream::iter(batches)
            .map(|batch| self.fetch_batch(batch))
            .buffered(self.max_concurrency)
            .try_collect()
            .await?;

        tracing::debug!(from, to, "fetched block range");
        Ok(fetched.into_iter().flatten().collect())
    }

    async fn dynamic_properties(&self) -> Result<ChainProperties, IndexerError> {
        Ok(self.call(GET_DYNAMIC_GLOBAL_PROPERTIES, vec![]).await?)
    }
}
