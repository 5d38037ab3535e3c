//! Offorte wire models.
//!
//! The API is loose about types: ids and amounts show up as numbers or as
//! strings, dates as plain dates or full timestamps. Everything here is
//! lenient on the way in and converts into the engine's types.

use chrono::NaiveDate;
use quotesync_api::{Contact, ContentBlock, Counterparty, Money, ProposalHeader};
use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Int(i64),
    Float(f64),
    Text(String),
}

fn loose_to_f64(raw: Loose) -> Option<f64> {
    match raw {
        Loose::Int(n) => Some(n as f64),
        Loose::Float(f) => Some(f),
        Loose::Text(s) => s.trim().replace(',', ".").parse().ok(),
    }
}

fn de_id<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    match Loose::deserialize(d)? {
        Loose::Int(n) => Ok(n),
        Loose::Float(f) if f.fract() == 0.0 => Ok(f as i64),
        Loose::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid id {s:?}"))),
        Loose::Float(f) => Err(serde::de::Error::custom(format!("invalid id {f}"))),
    }
}

fn de_opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(Option::<Loose>::deserialize(d)?.and_then(|raw| match raw {
        Loose::Int(n) => Some(n),
        Loose::Float(f) => Some(f as i64),
        Loose::Text(s) => s.trim().parse().ok(),
    }))
}

fn de_ids<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<i64>, D::Error> {
    let raw = Option::<Vec<Loose>>::deserialize(d)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|v| loose_to_f64(v).map(|f| f as i64))
        .collect())
}

fn de_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Option::<Loose>::deserialize(d)? {
        Some(Loose::Int(n)) => n.to_string(),
        Some(Loose::Float(f)) => f.to_string(),
        Some(Loose::Text(s)) => s,
        None => String::new(),
    })
}

fn de_quantity<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(Option::<Loose>::deserialize(d)?
        .and_then(loose_to_f64)
        .unwrap_or(1.0))
}

fn de_flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Text(String),
    }
    Ok(match Option::<Flag>::deserialize(d)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Int(n)) => n != 0,
        Some(Flag::Text(s)) => matches!(s.trim(), "1" | "true" | "yes"),
        None => false,
    })
}

/// "2025-02-01", "2025-02-01 10:22:00" and RFC 3339 all become a date.
fn de_date<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
    Ok(Option::<String>::deserialize(d)?.and_then(|s| {
        s.get(..10)
            .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
    }))
}

#[derive(Debug, Clone, Deserialize)]
pub struct OfforteProposal {
    #[serde(deserialize_with = "de_id")]
    pub id: i64,
    #[serde(default, deserialize_with = "de_text")]
    pub proposal_nr: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "total_price")]
    pub price_total: Option<Money>,
    #[serde(default)]
    pub price_total_original: Option<Money>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub company_id: Option<i64>,
    #[serde(default)]
    pub company: Option<OfforteCompany>,
    #[serde(default, deserialize_with = "de_ids")]
    pub contact_ids: Vec<i64>,
    #[serde(default, deserialize_with = "de_date")]
    pub won_at: Option<NaiveDate>,
    #[serde(default, alias = "date_created", deserialize_with = "de_date")]
    pub created_at: Option<NaiveDate>,
    #[serde(default)]
    pub account_user_name: Option<String>,
}

impl From<OfforteProposal> for ProposalHeader {
    fn from(p: OfforteProposal) -> Self {
        let number = if p.proposal_nr.is_empty() {
            p.id.to_string()
        } else {
            p.proposal_nr
        };
        ProposalHeader {
            id: p.id,
            number,
            name: p.name,
            status: p.status,
            total: p.price_total.or(p.price_total_original).unwrap_or_default(),
            counterparty_ref: p.company_id,
            counterparty: p.company.map(Counterparty::from),
            contact_ids: p.contact_ids,
            won_at: p.won_at,
            created_at: p.created_at,
            owner_name: p.account_user_name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OfforteCompany {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub id: Option<i64>,
    #[serde(default, alias = "company_name")]
    pub name: Option<String>,
    #[serde(default, alias = "street_and_number")]
    pub street: Option<String>,
    #[serde(default, alias = "zip_code")]
    pub zipcode: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl From<OfforteCompany> for Counterparty {
    fn from(c: OfforteCompany) -> Self {
        Counterparty {
            id: c.id,
            name: c.name.unwrap_or_default(),
            street: c.street,
            zipcode: c.zipcode,
            city: c.city,
            country: c.country,
            email: c.email,
            phone: c.phone,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OfforteContact {
    #[serde(deserialize_with = "de_id")]
    pub id: i64,
    #[serde(default, alias = "full_name", alias = "name")]
    pub fullname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl From<OfforteContact> for Contact {
    fn from(c: OfforteContact) -> Self {
        Contact {
            id: c.id,
            name: c.fullname.unwrap_or_default(),
            email: c.email,
            phone: c.phone,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OfforteContent {
    #[serde(default, alias = "pricing_tables")]
    pub pricetables: Vec<OffortePriceTable>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OffortePriceTable {
    #[serde(default, alias = "name")]
    pub title: Option<String>,
    #[serde(default)]
    pub discount_value: Option<Money>,
    #[serde(default)]
    pub rows: Vec<OfforteRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OfforteRow {
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default, deserialize_with = "de_text")]
    pub content: String,
    #[serde(default)]
    pub price: Money,
    #[serde(default = "one", deserialize_with = "de_quantity")]
    pub quantity: f64,
    #[serde(default)]
    pub discount: Option<Money>,
    #[serde(default, deserialize_with = "de_flag")]
    pub optional: bool,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub product_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub sku: Option<String>,
}

fn one() -> f64 {
    1.0
}

fn de_opt_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let text = de_text(d)?;
    Ok(if text.is_empty() { None } else { Some(text) })
}

impl OfforteContent {
    /// Flatten price tables into content blocks, one group per table.
    pub fn into_blocks(self) -> Vec<ContentBlock> {
        self.pricetables
            .into_iter()
            .enumerate()
            .flat_map(|(group_index, table)| {
                let group_title = table.title;
                let group_discount = table.discount_value.filter(|d| !d.is_zero());
                table
                    .rows
                    .into_iter()
                    .enumerate()
                    .map(move |(position, row)| ContentBlock {
                        group_index,
                        group_title: group_title.clone(),
                        position,
                        product_name: row.product_name,
                        content: row.content,
                        unit_price: row.price,
                        quantity: row.quantity,
                        discount: row.discount.filter(|d| !d.is_zero()),
                        group_discount,
                        optional: row.optional,
                        product_id: row.product_id,
                        sku: row.sku,
                    })
            })
            .collect()
    }
}
