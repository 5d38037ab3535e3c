//! Target sync client.
//!
//! Upserts the records of one table in batches of at most ten. Each batch
//! is looked up by key, split into creates and updates and written through
//! the rate limiter. A record the destination refuses is isolated and
//! reported on its own; it never takes the rest of its batch down with it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use quotesync_api::{ErrorKind, Fields, SyncResult, TransportError, TransportErrorKind};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, error, info, warn, Span};

use crate::config::SyncSettings;
use crate::rate_limiter::RateLimiter;
use crate::retry::{Exhausted, RetryPolicy};
use crate::store::RecordStore;
use crate::transform::TableBatch;

pub struct TargetSyncClient {
    store: Arc<dyn RecordStore>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    batch_size: usize,
    batch_pause: Duration,
}

/// A cleaned, validated record waiting to be written.
#[derive(Debug, Clone)]
struct Pending {
    key: String,
    fields: Fields,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOp {
    Create,
    Update,
}

impl WriteOp {
    fn as_str(self) -> &'static str {
        match self {
            WriteOp::Create => "create",
            WriteOp::Update => "update",
        }
    }
}

impl TargetSyncClient {
    pub fn new(
        store: Arc<dyn RecordStore>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        settings: &SyncSettings,
    ) -> Self {
        if settings.batch_size > SyncSettings::MAX_BATCH_SIZE {
            warn!(
                "[SyncClient] batch size {} exceeds destination limit, using {}",
                settings.batch_size,
                SyncSettings::MAX_BATCH_SIZE
            );
        }
        Self {
            store,
            limiter,
            retry,
            batch_size: settings.effective_batch_size(),
            batch_pause: settings.batch_pause(),
        }
    }

    /// Upsert every record of `batch` by its key field.
    #[tracing::instrument(
        name = "sync.upsert",
        skip(self, batch),
        fields(
            table = %batch.name,
            records = batch.records.len(),
            created = tracing::field::Empty,
            updated = tracing::field::Empty,
            failed = tracing::field::Empty
        )
    )]
    pub async fn upsert(&self, batch: &TableBatch) -> SyncResult {
        let mut result = SyncResult::new(&batch.name);
        let pending = prepare(batch, &mut result);

        for (index, chunk) in pending.chunks(self.batch_size).enumerate() {
            if index > 0 && !self.batch_pause.is_zero() {
                sleep(self.batch_pause).await;
            }
            self.sync_chunk(batch, chunk, &mut result).await;
        }

        let counts = result.counts();
        let span = Span::current();
        span.record("created", counts.created);
        span.record("updated", counts.updated);
        span.record("failed", counts.failed);
        info!(
            "[SyncClient] {}: created={}, updated={}, failed={}",
            batch.name, counts.created, counts.updated, counts.failed
        );
        result
    }

    async fn sync_chunk(&self, batch: &TableBatch, chunk: &[Pending], result: &mut SyncResult) {
        let keys: Vec<String> = chunk.iter().map(|p| p.key.clone()).collect();
        let existing = match self
            .with_retry("find_existing", || {
                self.store
                    .find_existing(&batch.base, &batch.table, &batch.key_field, &keys)
            })
            .await
        {
            Ok(existing) => existing,
            Err(exhausted) => {
                error!(
                    "[SyncClient] {}: lookup of {} record(s) failed: {}",
                    batch.name,
                    chunk.len(),
                    exhausted.error
                );
                for item in chunk {
                    result.record_failure(
                        &item.key,
                        ErrorKind::Sync,
                        format!(
                            "lookup failed after {} attempt(s): {}",
                            exhausted.attempts, exhausted.error
                        ),
                    );
                }
                return;
            }
        };

        let (updates, creates): (Vec<&Pending>, Vec<&Pending>) =
            chunk.iter().partition(|p| existing.contains_key(&p.key));
        debug!(
            "[SyncClient] {}: batch of {} → {} create(s), {} update(s)",
            batch.name,
            chunk.len(),
            creates.len(),
            updates.len()
        );
        self.write(batch, WriteOp::Create, &creates, &existing, result)
            .await;
        self.write(batch, WriteOp::Update, &updates, &existing, result)
            .await;
    }

    async fn write(
        &self,
        batch: &TableBatch,
        op: WriteOp,
        items: &[&Pending],
        existing: &HashMap<String, String>,
        result: &mut SyncResult,
    ) {
        if items.is_empty() {
            return;
        }
        match self.send(batch, op, items, existing).await {
            Ok(ids) => record_success(op, items, &ids, existing, result),
            Err(exhausted)
                if exhausted.error.kind == TransportErrorKind::Rejected && items.len() > 1 =>
            {
                warn!(
                    "[SyncClient] {}: {} of {} record(s) rejected, isolating: {}",
                    batch.name,
                    op.as_str(),
                    items.len(),
                    exhausted.error
                );
                for item in items {
                    let single = std::slice::from_ref(item);
                    match self.send(batch, op, single, existing).await {
                        Ok(ids) => record_success(op, single, &ids, existing, result),
                        Err(exhausted) => record_failures(op, single, &exhausted, result),
                    }
                }
            }
            Err(exhausted) => {
                error!(
                    "[SyncClient] {}: {} of {} record(s) failed: {}",
                    batch.name,
                    op.as_str(),
                    items.len(),
                    exhausted.error
                );
                record_failures(op, items, &exhausted, result);
            }
        }
    }

    async fn send(
        &self,
        batch: &TableBatch,
        op: WriteOp,
        items: &[&Pending],
        existing: &HashMap<String, String>,
    ) -> Result<Vec<String>, Exhausted> {
        match op {
            WriteOp::Create => {
                let payload: Vec<Fields> = items.iter().map(|p| p.fields.clone()).collect();
                self.with_retry("create_records", || {
                    self.store.create_records(&batch.base, &batch.table, &payload)
                })
                .await
            }
            WriteOp::Update => {
                let payload: Vec<(String, Fields)> = items
                    .iter()
                    .filter_map(|p| existing.get(&p.key).map(|id| (id.clone(), p.fields.clone())))
                    .collect();
                self.with_retry("update_records", || {
                    self.store.update_records(&batch.base, &batch.table, &payload)
                })
                .await
            }
        }
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, request: F) -> Result<T, Exhausted>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let limiter = &self.limiter;
        let api = self.store.api_name();
        let request = &request;
        self.retry
            .run(operation, move |_| async move {
                limiter.acquire(api).await;
                request().await
            })
            .await
    }
}

/// De-duplicate by key (last wins), drop empty values and check select
/// fields against their allowed options.
fn prepare(batch: &TableBatch, result: &mut SyncResult) -> Vec<Pending> {
    let mut pending: Vec<Pending> = Vec::with_capacity(batch.records.len());
    let mut positions: HashMap<String, usize> = HashMap::new();
    for record in &batch.records {
        let cleaned = record.clone().without_empty_values();
        let item = Pending {
            key: cleaned.key,
            fields: cleaned.fields,
        };
        match positions.get(&item.key) {
            Some(&index) => {
                debug!(
                    "[SyncClient] {}: duplicate key {}, keeping the last record",
                    batch.name, item.key
                );
                pending[index] = item;
            }
            None => {
                positions.insert(item.key.clone(), pending.len());
                pending.push(item);
            }
        }
    }

    pending
        .into_iter()
        .filter_map(|item| match check_choices(&item.fields, &batch.choices) {
            Ok(()) => Some(item),
            Err(message) => {
                warn!("[SyncClient] {}: record {} invalid: {}", batch.name, item.key, message);
                result.record_failure(&item.key, ErrorKind::Validation, message);
                None
            }
        })
        .collect()
}

fn check_choices(
    fields: &Fields,
    choices: &std::collections::BTreeMap<String, Vec<String>>,
) -> Result<(), String> {
    for (field, allowed) in choices {
        let Some(value) = fields.get(field) else {
            continue;
        };
        let values: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for value in values {
            let ok = value.as_str().is_some_and(|s| allowed.iter().any(|a| a == s));
            if !ok {
                return Err(format!("{value} is not an allowed option for field {field:?}"));
            }
        }
    }
    Ok(())
}

fn record_success(
    op: WriteOp,
    items: &[&Pending],
    ids: &[String],
    existing: &HashMap<String, String>,
    result: &mut SyncResult,
) {
    for (i, item) in items.iter().enumerate() {
        let id = ids
            .get(i)
            .or_else(|| existing.get(&item.key))
            .cloned()
            .unwrap_or_default();
        match op {
            WriteOp::Create => result.record_created(&item.key, id),
            WriteOp::Update => result.record_updated(&item.key, id),
        }
    }
}

fn record_failures(
    op: WriteOp,
    items: &[&Pending],
    exhausted: &Exhausted,
    result: &mut SyncResult,
) {
    let kind = if exhausted.error.kind == TransportErrorKind::Rejected {
        ErrorKind::Validation
    } else {
        ErrorKind::Sync
    };
    for item in items {
        result.record_failure(
            &item.key,
            kind,
            format!(
                "{} failed after {} attempt(s): {}",
                op.as_str(),
                exhausted.attempts,
                exhausted.error
            ),
        );
    }
}
