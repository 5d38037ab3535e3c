//! In-memory fakes for the source and destination seams
//!
//! Key components:
//! - `FakeProposalSource`: scripted proposals with injectable transport failures
//! - `MemoryRecordStore`: keyed tables that behave like the destination API,
//!   including whole-batch rejection of invalid select options
//! - `fixtures`: a small proposal used across tests

pub mod fake_source;
pub mod fixtures;
pub mod memory_store;

pub use fake_source::FakeProposalSource;
pub use memory_store::{MemoryRecordStore, StoreCall, StoredRecord};
