//! Derived values: the invoice schedule, the scheduling estimate and the
//! closed set of named field transforms.

use chrono::{Days, NaiveDate};
use quotesync_api::{Element, Money, Proposal, SubItem};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Installation time budgeted per element.
pub const MINUTES_PER_ELEMENT: u32 = 18;

/// Days between the project date and the final invoice's due date.
pub const FINAL_INVOICE_TERM_DAYS: u64 = 60;

/// `(percentage, label)` of each invoice, in order.
pub const INVOICE_SCHEDULE: [(i64, &str); 3] = [
    (30, "30% Vooraf"),
    (65, "65% Bij Start"),
    (5, "5% Oplevering"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceSplit {
    /// 1-based position in the schedule.
    pub sequence: usize,
    pub label: String,
    pub percentage: i64,
    pub amount: Money,
    pub due_date: NaiveDate,
}

/// Split `total` 30/65/5. Each share is rounded to the cent and the rounding
/// remainder goes to the largest share, so the amounts always sum to `total`.
pub fn invoice_splits(
    total: Money,
    today: NaiveDate,
    project_date: NaiveDate,
) -> Vec<InvoiceSplit> {
    let mut amounts: Vec<Money> = INVOICE_SCHEDULE
        .iter()
        .map(|(pct, _)| total.percent(*pct))
        .collect();
    let remainder = total - amounts.iter().copied().sum::<Money>();
    let largest = INVOICE_SCHEDULE
        .iter()
        .enumerate()
        .max_by_key(|(_, (pct, _))| *pct)
        .map_or(0, |(i, _)| i);
    amounts[largest] += remainder;

    let final_due = project_date
        .checked_add_days(Days::new(FINAL_INVOICE_TERM_DAYS))
        .unwrap_or(project_date);
    let due_dates = [today, project_date, final_due];

    INVOICE_SCHEDULE
        .iter()
        .zip(amounts)
        .zip(due_dates)
        .enumerate()
        .map(|(i, (((pct, label), amount), due_date))| InvoiceSplit {
            sequence: i + 1,
            label: label.to_string(),
            percentage: *pct,
            amount,
            due_date,
        })
        .collect()
}

pub fn scheduling_minutes(element_count: usize) -> u32 {
    (element_count as u32).saturating_mul(MINUTES_PER_ELEMENT)
}

/// Named field transforms, resolved when configuration is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformName {
    SchedulingMinutes,
    ElementCount,
    FullAddress,
    CustomerAndCity,
    ElementsSummary,
    TotalExclVat,
    TotalInclVat,
    VatAmount,
    DimensionsLabel,
    NotesText,
    Today,
    ProjectDate,
}

/// What a single generated record is about.
pub struct RowContext<'a> {
    pub proposal: &'a Proposal,
    pub elements: &'a [Element],
    pub element: Option<&'a Element>,
    pub sub_item: Option<&'a SubItem>,
    pub invoice: Option<&'a InvoiceSplit>,
    pub today: NaiveDate,
    pub vat_rate_percent: u32,
}

impl RowContext<'_> {
    /// `(excl. VAT, incl. VAT)` of the row's subject. Proposal totals and
    /// invoice amounts include VAT; element and sub-item prices do not.
    fn amounts(&self) -> (Money, Money) {
        let rate = self.vat_rate_percent as i64;
        let from_excl = |excl: Money| (excl, excl.scale(100 + rate, 100));
        let from_incl = |incl: Money| (incl.scale(100, 100 + rate), incl);
        if let Some(sub) = self.sub_item {
            from_excl(sub.subtotal)
        } else if let Some(element) = self.element {
            from_excl(element.total_excl_vat)
        } else if let Some(invoice) = self.invoice {
            from_incl(invoice.amount)
        } else {
            from_incl(self.proposal.total)
        }
    }
}

impl TransformName {
    /// Evaluate for one row. `Value::Null` means "no value".
    pub fn apply(self, row: &RowContext<'_>) -> Value {
        match self {
            TransformName::SchedulingMinutes => json!(scheduling_minutes(row.elements.len())),
            TransformName::ElementCount => json!(row.elements.len()),
            TransformName::FullAddress => row
                .proposal
                .counterparty
                .as_ref()
                .and_then(|c| c.full_address())
                .map_or(Value::Null, Value::String),
            TransformName::CustomerAndCity => match &row.proposal.counterparty {
                Some(c) => match c.city.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                    Some(city) => json!(format!("{} - {}", c.name, city)),
                    None => json!(c.name),
                },
                None => Value::Null,
            },
            TransformName::ElementsSummary => {
                let lines: Vec<String> = row.elements.iter().map(summary_line).collect();
                if lines.is_empty() {
                    Value::Null
                } else {
                    json!(lines.join("\n"))
                }
            }
            TransformName::TotalExclVat => money(row.amounts().0),
            TransformName::TotalInclVat => money(row.amounts().1),
            TransformName::VatAmount => {
                let (excl, incl) = row.amounts();
                money(incl - excl)
            }
            TransformName::DimensionsLabel => row
                .element
                .and_then(Element::dimensions_label)
                .map_or(Value::Null, Value::String),
            TransformName::NotesText => match row.element {
                Some(e) if !e.notes.is_empty() => json!(e.notes.join("\n")),
                _ => Value::Null,
            },
            TransformName::Today => json!(row.today.to_string()),
            TransformName::ProjectDate => {
                json!(row.proposal.project_date().unwrap_or(row.today).to_string())
            }
        }
    }
}

fn summary_line(element: &Element) -> String {
    let dimensions = element.dimensions_label();
    let details: Vec<&str> = [
        Some(element.element_type.as_str()),
        dimensions.as_deref(),
        element.brand.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect();
    format!("{} ({})", element.name, details.join(", "))
}

fn money(amount: Money) -> Value {
    json!(amount.as_major())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn invoice_split_scenario() {
        let splits = invoice_splits(
            Money::from_cents(4_500_000),
            date(2025, 2, 1),
            date(2025, 2, 1),
        );
        let amounts: Vec<i64> = splits.iter().map(|s| s.amount.cents()).collect();
        assert_eq!(amounts, vec![1_350_000, 2_925_000, 225_000]);
        let due: Vec<NaiveDate> = splits.iter().map(|s| s.due_date).collect();
        assert_eq!(due, vec![date(2025, 2, 1), date(2025, 2, 1), date(2025, 4, 2)]);
        assert_eq!(splits[1].label, "65% Bij Start");
    }

    #[test]
    fn rounding_remainder_lands_on_largest_share() {
        let splits = invoice_splits(Money::from_cents(1), date(2025, 1, 1), date(2025, 1, 1));
        let amounts: Vec<i64> = splits.iter().map(|s| s.amount.cents()).collect();
        assert_eq!(amounts, vec![0, 1, 0]);

        let splits = invoice_splits(Money::from_cents(1_001), date(2025, 1, 1), date(2025, 1, 1));
        let amounts: Vec<i64> = splits.iter().map(|s| s.amount.cents()).collect();
        assert_eq!(amounts.iter().sum::<i64>(), 1_001);
    }

    #[test]
    fn eight_elements_take_144_minutes() {
        assert_eq!(scheduling_minutes(8), 144);
        assert_eq!(scheduling_minutes(0), 0);
    }

    #[test]
    fn proposal_totals_are_split_into_vat_parts() {
        let proposal = Proposal {
            total: Money::from_cents(12_100),
            ..Default::default()
        };
        let row = RowContext {
            proposal: &proposal,
            elements: &[],
            element: None,
            sub_item: None,
            invoice: None,
            today: date(2025, 1, 1),
            vat_rate_percent: 21,
        };
        assert_eq!(TransformName::TotalExclVat.apply(&row), json!(100.0));
        assert_eq!(TransformName::TotalInclVat.apply(&row), json!(121.0));
        assert_eq!(TransformName::VatAmount.apply(&row), json!(21.0));
        assert_eq!(TransformName::ElementsSummary.apply(&row), Value::Null);
        assert_eq!(TransformName::ProjectDate.apply(&row), json!("2025-01-01"));
    }
}
