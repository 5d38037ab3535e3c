//! Proposal sync engine.
//!
//! Fetches an accepted proposal from the quoting platform, parses its
//! pricing content into construction elements, derives the records of every
//! configured destination table and upserts them by idempotency key.
//!
//! The two external systems sit behind [`source::ProposalSource`] and
//! [`store::RecordStore`]; HTTP implementations live in the connectors crate.

pub mod config;
pub mod logging;
pub mod orchestrator;
pub mod parser;
pub mod rate_limiter;
pub mod retry;
pub mod source;
pub mod store;
pub mod sync_client;
pub mod transform;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use config::{ConfigError, EngineConfig, TableConfig};
pub use orchestrator::SyncOrchestrator;
pub use parser::{ContentParser, ParseOutcome, ParseWarning};
pub use rate_limiter::{RateLimiter, RatePolicy};
pub use retry::RetryPolicy;
pub use source::{FetchClient, ProposalSource};
pub use store::RecordStore;
pub use sync_client::TargetSyncClient;
pub use transform::{RecordTransformer, TableBatch, TransformOutput};
