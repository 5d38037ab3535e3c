use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Fields = serde_json::Map<String, Value>;

/// A flat record bound for one destination table.
///
/// `key` is the idempotency key and is always mirrored into `fields` under
/// `key_field`, so the destination can match it on the next run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    pub table: String,
    pub key_field: String,
    pub key: String,
    pub fields: Fields,
}

impl TableRecord {
    pub fn new(
        table: impl Into<String>,
        key_field: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        let key_field = key_field.into();
        let key = key.into();
        let mut fields = Fields::new();
        fields.insert(key_field.clone(), Value::String(key.clone()));
        Self {
            table: table.into(),
            key_field,
            key,
            fields,
        }
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Drop nulls and empty strings. The key field is always kept.
    pub fn without_empty_values(mut self) -> Self {
        let key_field = self.key_field.clone();
        self.fields.retain(|name, value| {
            name == &key_field
                || !(value.is_null() || matches!(value, Value::String(s) if s.trim().is_empty()))
        });
        self
    }
}
