//! Airtable destination connector.

pub mod client;
pub mod models;

pub use client::{filter_formula, AirtableClient};
