use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// The root proposal resource, without its related entities.
///
/// This is what the source API returns for a single proposal lookup. The
/// counterparty may be embedded already; otherwise `counterparty_ref` points
/// at it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProposalHeader {
    pub id: i64,
    pub number: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub total: Money,
    pub counterparty_ref: Option<i64>,
    pub counterparty: Option<Counterparty>,
    pub contact_ids: Vec<i64>,
    pub won_at: Option<NaiveDate>,
    pub created_at: Option<NaiveDate>,
    pub owner_name: Option<String>,
}

/// A complete proposal graph as assembled by the fetch client.
///
/// Immutable once fetched and scoped to a single sync run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: i64,
    pub number: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub total: Money,
    pub counterparty: Option<Counterparty>,
    pub contacts: Vec<Contact>,
    pub blocks: Vec<ContentBlock>,
    pub won_at: Option<NaiveDate>,
    pub created_at: Option<NaiveDate>,
    pub owner_name: Option<String>,
}

impl Proposal {
    pub fn from_header(header: ProposalHeader) -> Self {
        Self {
            id: header.id,
            number: header.number,
            name: header.name,
            status: header.status,
            total: header.total,
            counterparty: header.counterparty,
            contacts: Vec::new(),
            blocks: Vec::new(),
            won_at: header.won_at,
            created_at: header.created_at,
            owner_name: header.owner_name,
        }
    }

    /// Reference date of the project: acceptance date, else creation date.
    pub fn project_date(&self) -> Option<NaiveDate> {
        self.won_at.or(self.created_at)
    }

    pub fn primary_contact(&self) -> Option<&Contact> {
        self.contacts.first()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Counterparty {
    pub id: Option<i64>,
    pub name: String,
    pub street: Option<String>,
    pub zipcode: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Counterparty {
    /// "street, zipcode city", skipping whatever is missing.
    pub fn full_address(&self) -> Option<String> {
        let locality = [self.zipcode.as_deref(), self.city.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let parts: Vec<&str> = [self.street.as_deref().map(str::trim), Some(locality.as_str())]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// One row of a proposal pricing table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    /// Position of the pricing table this row belongs to.
    pub group_index: usize,
    pub group_title: Option<String>,
    /// Position of the row within its pricing table.
    pub position: usize,
    pub product_name: Option<String>,
    /// Free-form description, usually HTML.
    pub content: String,
    pub unit_price: Money,
    pub quantity: f64,
    pub discount: Option<Money>,
    /// Discount declared on the whole pricing table, repeated on each row.
    pub group_discount: Option<Money>,
    pub optional: bool,
    pub product_id: Option<String>,
    pub sku: Option<String>,
}

impl Default for ContentBlock {
    fn default() -> Self {
        Self {
            group_index: 0,
            group_title: None,
            position: 0,
            product_name: None,
            content: String::new(),
            unit_price: Money::ZERO,
            quantity: 1.0,
            discount: None,
            group_discount: None,
            optional: false,
            product_id: None,
            sku: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_date_prefers_won_at() {
        let mut p = Proposal {
            created_at: NaiveDate::from_ymd_opt(2025, 1, 10),
            ..Default::default()
        };
        assert_eq!(p.project_date(), NaiveDate::from_ymd_opt(2025, 1, 10));
        p.won_at = NaiveDate::from_ymd_opt(2025, 2, 1);
        assert_eq!(p.project_date(), NaiveDate::from_ymd_opt(2025, 2, 1));
    }

    #[test]
    fn full_address_skips_missing_parts() {
        let c = Counterparty {
            name: "Bouw BV".into(),
            street: Some("Kerkstraat 1".into()),
            city: Some("Utrecht".into()),
            ..Default::default()
        };
        assert_eq!(c.full_address().as_deref(), Some("Kerkstraat 1, Utrecht"));
        assert_eq!(Counterparty::default().full_address(), None);
    }
}
