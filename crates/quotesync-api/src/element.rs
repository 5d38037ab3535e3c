use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::money::Money;

/// A recognized specification value, e.g. family `glazing` → label `HR++`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecMatch {
    pub label: String,
    /// The bullet or fragment the label was recognized in.
    pub text: String,
    /// Emphasized fragments of the row the match came from, else `text`.
    #[serde(default)]
    pub value: String,
}

/// A non-main row of a pricing group attached to its element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubItem {
    /// 1-based position among the element's sub-items.
    pub position: usize,
    pub name: String,
    pub description: Option<String>,
    pub unit_price: Money,
    pub quantity: f64,
    pub subtotal: Money,
    pub category: Option<String>,
    pub product_id: Option<String>,
    pub sku: Option<String>,
}

/// One parsed construction unit.
///
/// Created by the content parser and never mutated afterwards. Several
/// elements may share a `group_id` when they came from one coupled sales
/// unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Deterministic key, `<proposal_number>-E<seq>`.
    pub key: String,
    pub sequence: usize,
    pub group_index: usize,
    pub name: String,
    pub element_type: String,
    pub width_mm: Option<u32>,
    pub height_mm: Option<u32>,
    /// Family name → first match.
    pub specs: BTreeMap<String, SpecMatch>,
    pub coupled: bool,
    pub group_id: Option<String>,
    pub variant: Option<String>,
    /// Set by a preceding brand header group, e.g. `Merk 2`.
    pub brand: Option<String>,
    pub unit_price: Money,
    pub quantity: f64,
    pub main_total: Money,
    pub sub_items: Vec<SubItem>,
    pub sub_items_total: Money,
    pub discount: Money,
    pub total_excl_vat: Money,
    pub notes: Vec<String>,
    pub raw_text: String,
}

impl Element {
    pub fn dimensions_label(&self) -> Option<String> {
        match (self.width_mm, self.height_mm) {
            (Some(w), Some(h)) => Some(format!("{w} x {h} mm")),
            _ => None,
        }
    }

    pub fn spec_label(&self, family: &str) -> Option<&str> {
        self.specs.get(family).map(|m| m.label.as_str())
    }

    pub fn spec_value(&self, family: &str) -> Option<&str> {
        self.specs.get(family).map(|m| m.value.as_str())
    }
}
