//! In-memory destination.
//!
//! Records live per (base, table). Select options registered with
//! [`MemoryRecordStore::with_choices`] are enforced the way the real
//! destination does it: one bad record rejects the whole request.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use quotesync_api::{Fields, TransportError};
use serde_json::Value;

use crate::store::RecordStore;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: String,
    pub fields: Fields,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Find { table: String, keys: usize },
    Create { table: String, records: usize },
    Update { table: String, records: usize },
}

#[derive(Default)]
struct StoreState {
    tables: HashMap<(String, String), Vec<StoredRecord>>,
    choices: HashMap<(String, String), Vec<String>>,
    next_id: u64,
    queued_failures: VecDeque<TransportError>,
    calls: Vec<StoreCall>,
}

pub struct MemoryRecordStore {
    api_name: String,
    state: Mutex<StoreState>,
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self {
            api_name: "airtable".to_string(),
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Restrict `field` of `table` to the given options.
    pub fn with_choices(self, table: &str, field: &str, allowed: &[&str]) -> Self {
        self.state().choices.insert(
            (table.to_string(), field.to_string()),
            allowed.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    /// Fail the next `count` calls (of any kind) with `error`.
    pub fn fail_next(&self, count: usize, error: TransportError) {
        let mut state = self.state();
        for _ in 0..count {
            state.queued_failures.push_back(error.clone());
        }
    }

    /// Records of `table` across all bases, in creation order.
    pub fn records(&self, table: &str) -> Vec<StoredRecord> {
        let state = self.state();
        let mut bases: Vec<_> = state.tables.keys().filter(|(_, t)| t == table).collect();
        bases.sort();
        bases
            .into_iter()
            .flat_map(|key| state.tables[key].iter().cloned())
            .collect()
    }

    pub fn record_count(&self, table: &str) -> usize {
        self.records(table).len()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.state().calls.clone()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, call: StoreCall) -> Result<MutexGuard<'_, StoreState>, TransportError> {
        let mut state = self.state();
        state.calls.push(call);
        match state.queued_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }
}

impl StoreState {
    fn check_choices(&self, table: &str, fields: &Fields) -> Result<(), TransportError> {
        for (name, value) in fields {
            let Some(allowed) = self.choices.get(&(table.to_string(), name.clone())) else {
                continue;
            };
            let ok = match value {
                Value::String(s) => allowed.contains(s),
                Value::Array(items) => items
                    .iter()
                    .all(|v| v.as_str().is_some_and(|s| allowed.iter().any(|a| a == s))),
                _ => false,
            };
            if !ok {
                return Err(TransportError::from_status(
                    422,
                    format!("INVALID_MULTIPLE_CHOICE_OPTIONS: {value} for field {name:?}"),
                ));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    fn api_name(&self) -> &str {
        &self.api_name
    }

    async fn find_existing(
        &self,
        base: &str,
        table: &str,
        key_field: &str,
        keys: &[String],
    ) -> Result<HashMap<String, String>, TransportError> {
        let state = self.begin(StoreCall::Find {
            table: table.to_string(),
            keys: keys.len(),
        })?;
        let mut found = HashMap::new();
        if let Some(rows) = state.tables.get(&(base.to_string(), table.to_string())) {
            for row in rows {
                if let Some(key) = row.fields.get(key_field).and_then(Value::as_str) {
                    if keys.iter().any(|k| k == key) {
                        found.entry(key.to_string()).or_insert_with(|| row.id.clone());
                    }
                }
            }
        }
        Ok(found)
    }

    async fn create_records(
        &self,
        base: &str,
        table: &str,
        records: &[Fields],
    ) -> Result<Vec<String>, TransportError> {
        let mut state = self.begin(StoreCall::Create {
            table: table.to_string(),
            records: records.len(),
        })?;
        for fields in records {
            state.check_choices(table, fields)?;
        }
        let mut ids = Vec::with_capacity(records.len());
        for fields in records {
            state.next_id += 1;
            let id = format!("rec{}", state.next_id);
            state
                .tables
                .entry((base.to_string(), table.to_string()))
                .or_default()
                .push(StoredRecord {
                    id: id.clone(),
                    fields: fields.clone(),
                });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn update_records(
        &self,
        base: &str,
        table: &str,
        records: &[(String, Fields)],
    ) -> Result<Vec<String>, TransportError> {
        let mut state = self.begin(StoreCall::Update {
            table: table.to_string(),
            records: records.len(),
        })?;
        for (_, fields) in records {
            state.check_choices(table, fields)?;
        }
        let rows = state
            .tables
            .entry((base.to_string(), table.to_string()))
            .or_default();
        for (id, _) in records {
            if !rows.iter().any(|row| &row.id == id) {
                return Err(TransportError::from_status(
                    404,
                    format!("record {id} does not exist"),
                ));
            }
        }
        let mut ids = Vec::with_capacity(records.len());
        for (id, fields) in records {
            if let Some(row) = rows.iter_mut().find(|row| &row.id == id) {
                for (name, value) in fields {
                    row.fields.insert(name.clone(), value.clone());
                }
            }
            ids.push(id.clone());
        }
        Ok(ids)
    }
}
