//! Record transformer.
//!
//! Maps one proposal and its parsed elements onto the configured
//! destination tables. Each table's generator decides how many records it
//! gets and what they are about; its field mappings fill them in. A bad
//! mapping never aborts the run: missing required values are reported as
//! warnings and the record is emitted without that field.

pub mod derivations;
pub mod paths;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use quotesync_api::{Element, Proposal, SubItem, TableRecord};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::{resolve_base, EngineConfig, FieldSource, Generator, TableConfig};
pub use derivations::{
    invoice_splits, scheduling_minutes, InvoiceSplit, RowContext, TransformName,
    MINUTES_PER_ELEMENT,
};
use paths::PathRoots;

/// Records generated for one destination table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableBatch {
    pub name: String,
    pub table: String,
    pub base: String,
    pub key_field: String,
    pub records: Vec<TableRecord>,
    pub choices: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct TransformOutput {
    /// In configuration order.
    pub tables: Vec<TableBatch>,
    pub warnings: Vec<String>,
}

impl TransformOutput {
    pub fn batch(&self, name: &str) -> Option<&TableBatch> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn record_count(&self) -> usize {
        self.tables.iter().map(|t| t.records.len()).sum()
    }
}

#[derive(Debug, Clone)]
pub struct RecordTransformer {
    bases: BTreeMap<String, String>,
    vat_rate_percent: u32,
}

/// One record to generate, before field mapping.
struct Row<'a> {
    key: String,
    element: Option<(&'a Element, &'a Value)>,
    sub_item: Option<&'a SubItem>,
    invoice: Option<InvoiceSplit>,
    planning: Option<Value>,
}

impl<'a> Row<'a> {
    fn new(key: String) -> Self {
        Self {
            key,
            element: None,
            sub_item: None,
            invoice: None,
            planning: None,
        }
    }

    fn with_invoice(mut self, split: InvoiceSplit) -> Self {
        self.invoice = Some(split);
        self
    }
}

impl RecordTransformer {
    pub fn new(vat_rate_percent: u32) -> Self {
        Self {
            bases: BTreeMap::new(),
            vat_rate_percent,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            bases: config.bases.clone(),
            vat_rate_percent: config.vat_rate_percent,
        }
    }

    pub fn transform(
        &self,
        proposal: &Proposal,
        elements: &[Element],
        tables: &[TableConfig],
        today: NaiveDate,
    ) -> TransformOutput {
        let proposal_value = serde_json::to_value(proposal).unwrap_or_default();
        let element_values: Vec<Value> = elements
            .iter()
            .map(|e| serde_json::to_value(e).unwrap_or_default())
            .collect();
        let run_value = json!({
            "today": today.to_string(),
            "vat_rate_percent": self.vat_rate_percent,
        });

        let mut output = TransformOutput::default();
        for table in tables {
            let rows = self.rows(table, proposal, elements, &element_values, today);
            let mut records = Vec::with_capacity(rows.len());
            for row in rows {
                let record = self.map_row(
                    table,
                    proposal,
                    elements,
                    &row,
                    &proposal_value,
                    &run_value,
                    today,
                    &mut output.warnings,
                );
                records.push(record);
            }
            debug!(
                "[RecordTransformer] {} → {} record(s)",
                table.name,
                records.len()
            );
            output.tables.push(TableBatch {
                name: table.name.clone(),
                table: table.table.clone(),
                base: resolve_base(&self.bases, &table.base).to_string(),
                key_field: table.key_field.clone(),
                records,
                choices: table.choices.clone(),
            });
        }
        output
    }

    fn rows<'a>(
        &self,
        table: &TableConfig,
        proposal: &Proposal,
        elements: &'a [Element],
        element_values: &'a [Value],
        today: NaiveDate,
    ) -> Vec<Row<'a>> {
        let with_values = || elements.iter().zip(element_values);
        match &table.generator {
            Generator::Proposal => vec![Row::new(proposal.id.to_string())],
            Generator::PerElement { allow_types } => with_values()
                .filter(|(e, _)| allow_types.is_empty() || allow_types.contains(&e.element_type))
                .map(|(e, v)| Row {
                    element: Some((e, v)),
                    ..Row::new(e.key.clone())
                })
                .collect(),
            Generator::PerSubItem => with_values()
                .flat_map(|(e, v)| {
                    e.sub_items.iter().map(move |s| Row {
                        element: Some((e, v)),
                        sub_item: Some(s),
                        ..Row::new(format!("{}-S{}", e.key, s.position))
                    })
                })
                .collect(),
            Generator::InvoiceSplits => {
                let project_date = proposal.project_date().unwrap_or(today);
                invoice_splits(proposal.total, today, project_date)
                    .into_iter()
                    .map(|split| {
                        Row::new(format!("{}-F{}", proposal.id, split.sequence)).with_invoice(split)
                    })
                    .collect()
            }
            Generator::SchedulingEstimate => vec![Row {
                planning: Some(json!({
                    "minutes": scheduling_minutes(elements.len()),
                    "element_count": elements.len(),
                })),
                ..Row::new(proposal.id.to_string())
            }],
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn map_row(
        &self,
        table: &TableConfig,
        proposal: &Proposal,
        elements: &[Element],
        row: &Row<'_>,
        proposal_value: &Value,
        run_value: &Value,
        today: NaiveDate,
        warnings: &mut Vec<String>,
    ) -> TableRecord {
        let sub_item_value = row.sub_item.map(|s| serde_json::to_value(s).unwrap_or_default());
        let invoice_value = row
            .invoice
            .as_ref()
            .map(|i| serde_json::to_value(i).unwrap_or_default());
        let roots = PathRoots {
            proposal: Some(proposal_value),
            element: row.element.map(|(_, v)| v),
            sub_item: sub_item_value.as_ref(),
            invoice: invoice_value.as_ref(),
            planning: row.planning.as_ref(),
            run: Some(run_value),
        };
        let ctx = RowContext {
            proposal,
            elements,
            element: row.element.map(|(e, _)| e),
            sub_item: row.sub_item,
            invoice: row.invoice.as_ref(),
            today,
            vat_rate_percent: self.vat_rate_percent,
        };

        let mut record = TableRecord::new(&table.table, &table.key_field, &row.key);
        for mapping in &table.fields {
            let value = match &mapping.source {
                FieldSource::Path(path) => paths::resolve(&roots, path).cloned(),
                FieldSource::Literal(value) => Some(value.clone()),
                FieldSource::Transform(name) => Some(name.apply(&ctx)),
            }
            .filter(|v| !v.is_null())
            .or_else(|| mapping.default.clone());

            match value {
                Some(value) => record.set(&mapping.field, value),
                None if mapping.required => {
                    let message = format!(
                        "{}: record {} is missing required field {:?} ({:?})",
                        table.name, row.key, mapping.field, mapping.source
                    );
                    warn!("[RecordTransformer] {}", message);
                    warnings.push(message);
                }
                None => {}
            }
        }
        record.set(&table.key_field, Value::String(row.key.clone()));
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotesync_api::{Counterparty, Money, SpecMatch};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn proposal() -> Proposal {
        Proposal {
            id: 4711,
            number: "2025-0042".into(),
            total: Money::from_cents(4_500_000),
            won_at: Some(date(2025, 2, 1)),
            counterparty: Some(Counterparty {
                name: "Fam. de Vries".into(),
                city: Some("Zwolle".into()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn element(seq: usize, element_type: &str) -> Element {
        Element {
            key: format!("2025-0042-E{seq}"),
            sequence: seq,
            group_index: seq - 1,
            name: format!("Element {seq}"),
            element_type: element_type.into(),
            width_mm: None,
            height_mm: None,
            specs: BTreeMap::new(),
            coupled: false,
            group_id: None,
            variant: None,
            brand: None,
            unit_price: Money::from_cents(100_000),
            quantity: 1.0,
            main_total: Money::from_cents(100_000),
            sub_items: Vec::new(),
            sub_items_total: Money::ZERO,
            discount: Money::ZERO,
            total_excl_vat: Money::from_cents(100_000),
            notes: Vec::new(),
            raw_text: String::new(),
        }
    }

    fn tables() -> Vec<TableConfig> {
        EngineConfig::embedded().unwrap().tables
    }

    #[test]
    fn invoice_table_gets_three_keyed_records() {
        let output = RecordTransformer::new(21).transform(
            &proposal(), &[], &tables(),
            date(2025, 2, 1),
        );
        let invoices = output.batch("facturatie").unwrap();
        let keys: Vec<&str> = invoices.records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["4711-F1", "4711-F2", "4711-F3"]);
        assert_eq!(invoices.records[0].get("Bedrag"), Some(&json!(13500.0)));
        assert_eq!(invoices.records[1].get("Bedrag"), Some(&json!(29250.0)));
        assert_eq!(invoices.records[2].get("Bedrag"), Some(&json!(2250.0)));
        assert_eq!(invoices.records[2].get("Vervaldatum"), Some(&json!("2025-04-02")));
        assert_eq!(invoices.records[0].get("Type Factuur"), Some(&json!("30% Vooraf")));
        assert_eq!(invoices.records[0].get("Factuur ID"), Some(&json!("4711-F1")));
    }

    #[test]
    fn planning_record_carries_scheduling_estimate() {
        let elements: Vec<Element> = (1..=8).map(|i| element(i, "Raam")).collect();
        let output = RecordTransformer::new(21).transform(
            &proposal(),
            &elements,
            &tables(),
            date(2025, 2, 1),
        );
        let planning = output.batch("inmeetplanning").unwrap();
        assert_eq!(planning.records.len(), 1);
        assert_eq!(planning.records[0].get("Geschatte Minuten"), Some(&json!(144)));
        assert_eq!(planning.records[0].get("Klant & Stad"), Some(&json!("Fam. de Vries - Zwolle")));
    }

    #[test]
    fn summary_mentions_dimensions_and_brand() {
        let mut door = element(1, "Deur");
        door.width_mm = Some(1000);
        door.height_mm = Some(2300);
        door.brand = Some("Merk 1".into());
        let output = RecordTransformer::new(21).transform(
            &proposal(),
            &[door, element(2, "Raam")],
            &tables(),
            date(2025, 2, 1),
        );
        let portal = output.batch("klantenportaal").unwrap();
        assert_eq!(
            portal.records[0].get("Offerte Elementen Overzicht"),
            Some(&json!("Element 1 (Deur, 1000 x 2300 mm, Merk 1)\nElement 2 (Raam)"))
        );
    }

    #[test]
    fn spec_families_fill_select_and_text_fields() {
        let spec = |label: &str, text: &str, value: &str| SpecMatch {
            label: label.into(),
            text: text.into(),
            value: value.into(),
        };
        let mut door = element(1, "Deur");
        door.specs.insert("finish".into(), spec("Houtnerf", "Houtnerf", "Houtnerf"));
        door.specs.insert("color_inside".into(), spec("Binnen", "Kleur binnen", "RAL 9010"));
        door.specs.insert("keyed_alike".into(), spec("Ja", "Gelijksluitend", "Gelijksluitend"));
        let output =
            RecordTransformer::new(21).transform(&proposal(), &[door], &tables(), date(2025, 2, 1));

        let specs = &output.batch("element_specificaties").unwrap().records[0];
        assert_eq!(specs.get("Afwerking Type"), Some(&json!("Houtnerf")));
        assert_eq!(specs.get("Kleur Binnen"), Some(&json!("RAL 9010")));
        assert_eq!(specs.get("Cilinder Gelijksluitend"), Some(&json!("Ja")));
        assert_eq!(specs.get("Brievenbus"), None);
        let doors = &output.batch("deur_specificaties").unwrap().records[0];
        assert_eq!(doors.get("Cilinder Gelijksluitend"), Some(&json!("Ja")));
    }

    #[test]
    fn door_table_only_receives_doors() {
        let elements = vec![element(1, "Deur"), element(2, "Raam"), element(3, "Deur")];
        let output = RecordTransformer::new(21).transform(
            &proposal(),
            &elements,
            &tables(),
            date(2025, 2, 1),
        );
        let doors = output.batch("deur_specificaties").unwrap();
        let keys: Vec<&str> = doors.records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["2025-0042-E1", "2025-0042-E3"]);
        assert_eq!(output.batch("elementen_overzicht").unwrap().records.len(), 3);
    }

    #[test]
    fn coupled_elements_keep_their_group_identifier() {
        let mut a = element(1, "Deur");
        let mut b = element(2, "Raam");
        for (e, tag) in [(&mut a, "D1"), (&mut b, "D2")] {
            e.coupled = true;
            e.group_id = Some("2025-0042-G1".into());
            e.variant = Some(tag.into());
        }
        let output =
            RecordTransformer::new(21).transform(&proposal(), &[a, b], &tables(), date(2025, 2, 1));
        let overview = output.batch("elementen_overzicht").unwrap();
        assert_eq!(overview.records.len(), 2);
        for record in &overview.records {
            assert_eq!(record.get("Koppel Groep"), Some(&json!("2025-0042-G1")));
            assert_eq!(record.get("Gekoppeld"), Some(&json!(true)));
        }
    }

    #[test]
    fn sub_items_get_derived_keys() {
        let mut e = element(1, "Deur");
        e.sub_items.push(SubItem {
            position: 1,
            name: "Hordeur".into(),
            description: None,
            unit_price: Money::from_cents(20_000),
            quantity: 1.0,
            subtotal: Money::from_cents(20_000),
            category: Some("Hordeur".into()),
            product_id: None,
            sku: None,
        });
        let output = RecordTransformer::new(21).transform(
            &proposal(), &[e], &tables(),
            date(2025, 2, 1),
        );
        let subs = output.batch("subproducten").unwrap();
        assert_eq!(subs.records[0].key, "2025-0042-E1-S1");
        assert_eq!(subs.records[0].get("Element ID Ref"), Some(&json!("2025-0042-E1")));
        assert_eq!(subs.records[0].get("Bron"), Some(&json!("Offorte")));
    }

    #[test]
    fn missing_required_field_warns_but_emits_record() {
        let mut p = proposal();
        p.counterparty = None;
        let output = RecordTransformer::new(21).transform(&p, &[], &tables(), date(2025, 2, 1));
        let portal = output.batch("klantenportaal").unwrap();
        assert_eq!(portal.records.len(), 1);
        assert!(portal.records[0].get("Klantnaam").is_none());
        assert!(output.warnings.iter().any(|w| w.contains("Klantnaam")));
    }

    #[test]
    fn keys_are_deterministic() {
        let elements = vec![element(1, "Deur"), element(2, "Raam")];
        let transformer = RecordTransformer::new(21);
        let a = transformer.transform(&proposal(), &elements, &tables(), date(2025, 2, 1));
        let b = transformer.transform(&proposal(), &elements, &tables(), date(2025, 2, 1));
        assert_eq!(a.tables, b.tables);
    }

    #[test]
    fn bases_are_resolved_from_aliases() {
        let config = EngineConfig::embedded().unwrap().with_base("sales", "appSALES");
        let output = RecordTransformer::from_config(&config).transform(
            &proposal(),
            &[],
            &config.tables,
            date(2025, 2, 1),
        );
        assert_eq!(output.batch("klantenportaal").unwrap().base, "appSALES");
        assert_eq!(output.batch("facturatie").unwrap().base, "administratie");
    }
}
