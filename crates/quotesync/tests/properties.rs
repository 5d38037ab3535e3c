//! Property-based tests for the pure stages of the pipeline
//!
//! - Invoice splits always add up to the proposal total, to the cent
//! - The content parser never panics and always yields well-formed keys
//! - Element keys are stable across repeated parses of the same content

use chrono::NaiveDate;
use proptest::prelude::*;
use quotesync::transform::invoice_splits;
use quotesync::{ContentParser, EngineConfig};
use quotesync_api::{ContentBlock, Money};

fn parser() -> ContentParser {
    let config = EngineConfig::embedded().unwrap();
    ContentParser::from_config(&config.parser).unwrap()
}

fn arb_content() -> impl Strategy<Value = String> {
    prop_oneof![
        ".*",
        "(<p>|</p>|<li>|<ul>|<em>|&amp;|&#[0-9]{1,4};|D[0-9]\\. |[0-9]{3,4} ?x ?[0-9]{3,4} ?(mm|cm|m)|raam|deur|HR\\+\\+| ){0,20}",
    ]
}

fn arb_block() -> impl Strategy<Value = ContentBlock> {
    (
        0usize..4,
        0usize..5,
        proptest::option::of("[A-Za-z ]{0,12}"),
        arb_content(),
        -1_000_000i64..10_000_000,
        -2.0f64..20.0,
        any::<bool>(),
    )
        .prop_map(
            |(group_index, position, product_name, content, cents, quantity, optional)| {
                ContentBlock {
                    group_index,
                    position,
                    product_name,
                    content,
                    unit_price: Money::from_cents(cents),
                    quantity,
                    optional,
                    ..Default::default()
                }
            },
        )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn invoice_splits_sum_to_total(cents in 0i64..10_000_000_000) {
        let date = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        let total = Money::from_cents(cents);
        let splits = invoice_splits(total, date, date);

        prop_assert_eq!(splits.len(), 3);
        let sum: Money = splits.iter().map(|s| s.amount).sum();
        prop_assert_eq!(sum, total);
        prop_assert!(splits.iter().all(|s| s.amount.cents() >= 0));
    }

    #[test]
    fn parser_never_panics(blocks in proptest::collection::vec(arb_block(), 0..12)) {
        let outcome = parser().parse(&blocks, "Q-1");

        for (i, element) in outcome.elements.iter().enumerate() {
            prop_assert_eq!(&element.key, &format!("Q-1-E{}", i + 1));
            prop_assert!(element.total_excl_vat.cents() >= 0);
        }
    }

    #[test]
    fn parsing_is_deterministic(blocks in proptest::collection::vec(arb_block(), 0..8)) {
        let parser = parser();
        let first = parser.parse_elements(&blocks, "Q-1");
        let second = parser.parse_elements(&blocks, "Q-1");
        prop_assert_eq!(first, second);
    }
}

#[test]
fn empty_and_blank_content_yield_no_elements() {
    let parser = parser();
    assert!(parser.parse_elements(&[], "Q-1").is_empty());

    let blank = vec![ContentBlock {
        content: "   <p></p>  ".into(),
        ..Default::default()
    }];
    assert!(parser.parse_elements(&blank, "Q-1").is_empty());
}
