//! Proposal fixtures shared by unit and integration tests.

use chrono::NaiveDate;
use quotesync_api::{Contact, ContentBlock, Counterparty, Money, ProposalHeader};

pub const PROPOSAL_ID: i64 = 4711;
pub const PROPOSAL_NUMBER: &str = "2025-0042";
pub const COUNTERPARTY_ID: i64 = 900;
pub const CONTACT_ID: i64 = 501;

/// Accepted proposal of EUR 45.000 with a company and one contact to resolve.
pub fn header() -> ProposalHeader {
    ProposalHeader {
        id: PROPOSAL_ID,
        number: PROPOSAL_NUMBER.to_string(),
        name: Some("Kozijnen woning de Vries".to_string()),
        status: Some("won".to_string()),
        total: Money::from_cents(4_500_000),
        counterparty_ref: Some(COUNTERPARTY_ID),
        counterparty: None,
        contact_ids: vec![CONTACT_ID],
        won_at: NaiveDate::from_ymd_opt(2025, 2, 1),
        created_at: NaiveDate::from_ymd_opt(2025, 1, 15),
        owner_name: Some("Sanne Bakker".to_string()),
    }
}

pub fn counterparty() -> Counterparty {
    Counterparty {
        id: Some(COUNTERPARTY_ID),
        name: "Fam. de Vries".to_string(),
        street: Some("Kerkstraat 12".to_string()),
        zipcode: Some("8011 AB".to_string()),
        city: Some("Zwolle".to_string()),
        country: Some("NL".to_string()),
        email: Some("info@devries.nl".to_string()),
        phone: None,
    }
}

pub fn contact() -> Contact {
    Contact {
        id: CONTACT_ID,
        name: "Jan de Vries".to_string(),
        email: Some("jan@devries.nl".to_string()),
        phone: Some("06-12345678".to_string()),
    }
}

/// One pricing group per window, each with a main product and a sub-item.
pub fn window_blocks(count: usize) -> Vec<ContentBlock> {
    (0..count)
        .flat_map(|group| {
            [
                ContentBlock {
                    group_index: group,
                    group_title: Some(format!("Raam {}", group + 1)),
                    position: 0,
                    product_name: Some("Kunststof draaikiepraam".to_string()),
                    content: "<p><strong>Kunststof draaikiepraam 1200 x 1400 mm</strong></p>\
                              <ul><li>HR++ glas</li><li>Kleur: RAL 9016 wit</li></ul>"
                        .to_string(),
                    unit_price: Money::from_cents(95_000),
                    ..Default::default()
                },
                ContentBlock {
                    group_index: group,
                    position: 1,
                    product_name: Some("Hordeur plissé".to_string()),
                    content: "<p>Hordeur plissé</p>".to_string(),
                    unit_price: Money::from_cents(12_500),
                    ..Default::default()
                },
            ]
        })
        .collect()
}

/// A front door group with hardware, for door-only tables.
pub fn door_block(group_index: usize) -> ContentBlock {
    ContentBlock {
        group_index,
        group_title: Some("Voordeur".to_string()),
        position: 0,
        product_name: Some("Kunststof voordeur".to_string()),
        content: "<p><strong>Kunststof voordeur 1000 x 2300 mm</strong></p>\
                  <ul><li>Veiligheidsbeslag SKG**</li><li>Gelijksluitende cilinder</li></ul>"
            .to_string(),
        unit_price: Money::from_cents(245_000),
        ..Default::default()
    }
}
