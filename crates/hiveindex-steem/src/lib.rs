//! hiveindex-steem: Steem node access for HiveIndex.
//!
//! [`SteemClient`] implements [`hiveindex_core::ChainSource`] over the
//! node's `condenser_api` JSON-RPC interface.

pub mod client;
pub mod error;
pub mod retry;
pub mod rpc;

pub use client::{SteemClient, SteemClientConfig};
pub use error::TransportError;
pub use retry::{RetryConfig, RetryPolicy};
