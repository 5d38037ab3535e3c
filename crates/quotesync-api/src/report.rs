use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// A unit of work handed to the engine by the ingress layer.
///
/// Delivery is at-least-once; the same job may arrive more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJob {
    pub proposal_id: i64,
    pub correlation_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The source proposal could not be retrieved.
    Fetch,
    /// One record was refused by the destination schema.
    Validation,
    /// A batch could not be written or looked up.
    Sync,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_key: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
}

impl RecordError {
    pub fn for_record(
        table: impl Into<String>,
        key: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            table_name: Some(table.into()),
            record_key: Some(key.into()),
            kind,
            message: message.into(),
        }
    }
}

/// Destination identifier of a record that was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedRecord {
    pub key: String,
    pub record_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

impl TableCounts {
    pub fn total(&self) -> usize {
        self.created + self.updated + self.failed
    }
}

/// Outcome of upserting one table. Every failed record has exactly one error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub table: String,
    pub created: Vec<SyncedRecord>,
    pub updated: Vec<SyncedRecord>,
    pub errors: Vec<RecordError>,
}

impl SyncResult {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn record_created(&mut self, key: impl Into<String>, record_id: impl Into<String>) {
        self.created.push(SyncedRecord {
            key: key.into(),
            record_id: record_id.into(),
        });
    }

    pub fn record_updated(&mut self, key: impl Into<String>, record_id: impl Into<String>) {
        self.updated.push(SyncedRecord {
            key: key.into(),
            record_id: record_id.into(),
        });
    }

    pub fn record_failure(
        &mut self,
        key: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) {
        self.errors
            .push(RecordError::for_record(self.table.clone(), key, kind, message));
    }

    pub fn counts(&self) -> TableCounts {
        TableCounts {
            created: self.created.len(),
            updated: self.updated.len(),
            failed: self.errors.len(),
        }
    }
}

/// Terminal artifact of one sync run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub correlation_id: String,
    pub proposal_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal_number: Option<String>,
    pub success: bool,
    pub per_table: BTreeMap<String, TableCounts>,
    pub errors: Vec<RecordError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub element_count: usize,
    pub duration_ms: u64,
}

impl SyncReport {
    pub fn new(correlation_id: impl Into<String>, proposal_id: i64) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            proposal_id,
            proposal_number: None,
            success: false,
            per_table: BTreeMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            element_count: 0,
            duration_ms: 0,
        }
    }

    /// A report for a run that never got past the initial fetch.
    pub fn fetch_failed(correlation_id: impl Into<String>, err: &FetchError) -> Self {
        let mut report = Self::new(correlation_id, err.proposal_id);
        report.errors.push(RecordError {
            table_name: None,
            record_key: None,
            kind: ErrorKind::Fetch,
            message: err.to_string(),
        });
        report
    }

    pub fn add_table_result(&mut self, result: SyncResult) {
        let counts = result.counts();
        let entry = self.per_table.entry(result.table).or_default();
        entry.created += counts.created;
        entry.updated += counts.updated;
        entry.failed += counts.failed;
        self.errors.extend(result.errors);
    }

    /// Seal the report: success iff no errors were accumulated.
    pub fn finish(mut self, duration_ms: u64) -> Self {
        self.success = self.errors.is_empty();
        self.duration_ms = duration_ms;
        self
    }

    pub fn total_records(&self) -> usize {
        self.per_table.values().map(TableCounts::total).sum()
    }

    pub fn total_created(&self) -> usize {
        self.per_table.values().map(|c| c.created).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchErrorKind, TransportError};

    #[test]
    fn total_records_sums_per_table_counts() {
        let mut report = SyncReport::new("c1", 1);
        let mut a = SyncResult::new("Projecten");
        a.record_created("1", "rec1");
        let mut b = SyncResult::new("Facturatie");
        b.record_updated("1-F1", "rec2");
        b.record_updated("1-F2", "rec3");
        b.record_failure("1-F3", ErrorKind::Sync, "boom");
        report.add_table_result(a);
        report.add_table_result(b);
        let report = report.finish(5);

        assert_eq!(report.total_records(), 4);
        assert!(!report.success);
        assert_eq!(report.errors[0].table_name.as_deref(), Some("Facturatie"));
    }

    #[test]
    fn fetch_failure_report_has_no_tables() {
        let err = FetchError::from_transport(9, &TransportError::from_status(500, "down"), 4);
        assert_eq!(err.kind, FetchErrorKind::Transient);
        let report = SyncReport::fetch_failed("c2", &err).finish(0);
        assert!(!report.success);
        assert!(report.per_table.is_empty());
        assert_eq!(report.errors[0].kind, ErrorKind::Fetch);
    }

    #[test]
    fn error_wire_format_omits_missing_fields() {
        let err = RecordError {
            table_name: None,
            record_key: None,
            kind: ErrorKind::Fetch,
            message: "x".into(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert!(json.get("table_name").is_none());
        assert_eq!(json["kind"], "fetch");
    }
}
