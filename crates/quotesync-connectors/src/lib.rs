//! HTTP connectors for the proposal sync engine.
//!
//! - [`offorte::OfforteClient`] reads proposals from the quoting platform
//!   and implements [`quotesync::ProposalSource`].
//! - [`airtable::AirtableClient`] upserts records into the destination
//!   bases and implements [`quotesync::RecordStore`].

pub mod airtable;
pub mod http;
pub mod offorte;

pub use airtable::AirtableClient;
pub use offorte::OfforteClient;
