//! hiveindex-core: block processing and sync engine for the HiveIndex
//! social-graph indexer.
//!
//! # Architecture
//!
//! ```text
//! SyncOrchestrator (checkpoint replay → batch catch-up → live tail)
//!        │
//!        ├── ChainSource        (node RPC / checkpoint files)
//!        ├── BlockProcessor     (one block or one batch, one transaction)
//!        │      ├── accounts    (lazy account registration)
//!        │      ├── posts       (register / revive / delete)
//!        │      ├── follow      (follow + reblog payloads)
//!        │      └── CommunityService
//!        ├── reconcile          (dirty posts + payouts → PostCache)
//!        └── StoreGateway       (memory / SQLite)
//! ```

pub mod accounts;
pub mod cache;
pub mod checkpoint;
pub mod community;
pub mod config;
pub mod error;
pub mod follow;
pub mod memory;
pub mod operation;
pub mod payload;
pub mod posts;
pub mod processor;
pub mod reconcile;
pub mod source;
pub mod status;
pub mod store;
pub mod sync;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::PostCache;
pub use community::{CommunityService, NameOnlyCommunities};
pub use config::{IndexerConfig, SyncPhase, SyncPolicy};
pub use error::IndexerError;
pub use memory::MemoryStore;
pub use operation::Operation;
pub use payload::ActivationHeights;
pub use processor::BlockProcessor;
pub use reconcile::{reconcile, ReconcileReport};
pub use source::{ChainProperties, ChainSource};
pub use status::{head_state, SyncStatus};
pub use store::StoreGateway;
pub use sync::SyncOrchestrator;
pub use types::{BlockRecord, DirtySet, PostKey, PostUrl, SignedBlock};
