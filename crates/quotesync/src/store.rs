use std::collections::HashMap;

use async_trait::async_trait;
use quotesync_api::{Fields, TransportError};

/// The seam to the destination record store.
///
/// Batches handed to the write calls never exceed the sync batch size. A
/// destination that refuses a payload on validation grounds reports
/// [`quotesync_api::TransportErrorKind::Rejected`].
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Rate limiter key of the API behind this store.
    fn api_name(&self) -> &str;

    /// Look up records whose `key_field` equals one of `keys`.
    /// Returns key → destination record id for the ones that exist.
    async fn find_existing(
        &self,
        base: &str,
        table: &str,
        key_field: &str,
        keys: &[String],
    ) -> Result<HashMap<String, String>, TransportError>;

    /// Create records; returns their new ids in input order.
    async fn create_records(
        &self,
        base: &str,
        table: &str,
        records: &[Fields],
    ) -> Result<Vec<String>, TransportError>;

    /// Update `(record id, fields)` pairs; returns the ids in input order.
    async fn update_records(
        &self,
        base: &str,
        table: &str,
        updates: &[(String, Fields)],
    ) -> Result<Vec<String>, TransportError>;
}
