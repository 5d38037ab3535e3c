//! Shared domain types for the proposal sync engine.
//!
//! Everything in this crate is plain data: proposals as fetched from the
//! quoting platform, the elements parsed out of their pricing content, the
//! flat records produced for the destination store and the report of one
//! sync run. No I/O happens here.

pub mod element;
pub mod error;
pub mod money;
pub mod proposal;
pub mod record;
pub mod report;

pub use element::{Element, SpecMatch, SubItem};
pub use error::{FetchError, FetchErrorKind, TransportError, TransportErrorKind};
pub use money::Money;
pub use proposal::{Contact, ContentBlock, Counterparty, Proposal, ProposalHeader};
pub use record::{Fields, TableRecord};
pub use report::{
    ErrorKind, RecordError, SyncJob, SyncReport, SyncResult, SyncedRecord, TableCounts,
};
