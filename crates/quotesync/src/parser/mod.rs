//! Content parser.
//!
//! Turns the pricing-table rows of one proposal into typed [`Element`]s.
//! Each pricing table is a candidate element group: one row is the main
//! product, the others become its sub-items. Descriptions are matched
//! against ordered keyword tables from configuration; nothing here ever
//! fails, irregular input only produces fewer elements and some warnings.

pub mod markup;
pub mod patterns;

use std::collections::BTreeMap;
use std::fmt;

use quotesync_api::{ContentBlock, Element, Money, SpecMatch, SubItem};
use regex::Regex;
use tracing::{debug, warn};

use crate::config::{ConfigError, MainProductRule, ParserConfig};
use markup::Markup;
use patterns::{
    brand_regex, find_dimensions, strip_dimensions, CouplingMatcher, Dimensions, PatternTable,
};

/// Non-fatal irregularity found while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// 1-based ordinal of the pricing group.
    pub group: usize,
    pub message: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group {}: {}", self.group, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub elements: Vec<Element>,
    pub warnings: Vec<ParseWarning>,
}

pub struct ContentParser {
    main_product: MainProductRule,
    element_types: PatternTable,
    default_element_type: String,
    spec_families: Vec<(String, PatternTable)>,
    sub_item_categories: PatternTable,
    coupling: CouplingMatcher,
    brand_header: Option<(String, Regex)>,
}

/// Text a spec family is matched against. `detail` holds the emphasized
/// fragments of the row the text came from.
struct SpecCandidate {
    text: String,
    detail: Option<String>,
}

/// Everything shared by the elements of one pricing group.
struct GroupContext<'a> {
    group_no: usize,
    main: &'a ContentBlock,
    title: String,
    element_type: String,
    dimensions: Option<Dimensions>,
    specs: BTreeMap<String, SpecMatch>,
    notes: Vec<String>,
    raw_text: String,
    group_discount: Money,
    brand: Option<String>,
}

impl ContentParser {
    pub fn from_config(config: &ParserConfig) -> Result<Self, ConfigError> {
        let coupling = CouplingMatcher::new(&config.coupling_labels).map_err(|source| {
            ConfigError::CouplingLabel {
                label: config.coupling_labels.join(","),
                source,
            }
        })?;
        let brand_label = config.brand_label.trim();
        let brand_header = if brand_label.is_empty() {
            None
        } else {
            let re = brand_regex(brand_label).map_err(|source| ConfigError::BrandLabel {
                label: brand_label.to_string(),
                source,
            })?;
            Some((brand_label.to_string(), re))
        };
        Ok(Self {
            main_product: config.main_product,
            element_types: PatternTable::new(&config.element_types),
            default_element_type: config.default_element_type.clone(),
            spec_families: config
                .spec_families
                .iter()
                .map(|f| {
                    let table = PatternTable::new(&f.patterns).gated(&f.requires, &f.excludes);
                    (f.name.clone(), table)
                })
                .collect(),
            sub_item_categories: PatternTable::new(&config.sub_item_categories),
            coupling,
            brand_header,
        })
    }

    pub fn parse_elements(&self, blocks: &[ContentBlock], proposal_number: &str) -> Vec<Element> {
        self.parse(blocks, proposal_number).elements
    }

    pub fn parse(&self, blocks: &[ContentBlock], proposal_number: &str) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();
        let mut brand = None;
        for (ordinal, group) in group_blocks(blocks).iter().enumerate() {
            self.parse_group(group, ordinal + 1, proposal_number, &mut brand, &mut outcome);
        }
        debug!(
            "[ContentParser] {} blocks → {} elements ({} warnings)",
            blocks.len(),
            outcome.elements.len(),
            outcome.warnings.len()
        );
        outcome
    }

    fn parse_group(
        &self,
        group: &[&ContentBlock],
        group_no: usize,
        proposal_number: &str,
        brand: &mut Option<String>,
        out: &mut ParseOutcome,
    ) {
        let parsed: Vec<Markup> = group.iter().map(|b| markup::extract(&b.content)).collect();
        let is_blank =
            |b: &ContentBlock, m: &Markup| m.is_empty() && non_blank(&b.product_name).is_none();
        if group.iter().zip(&parsed).all(|(b, m)| is_blank(*b, m)) {
            push_warning(out, group_no, "empty pricing group skipped");
            return;
        }

        let all_optional = group.iter().all(|b| b.optional);
        let main_index = match self.main_product {
            _ if all_optional => 0,
            MainProductRule::FirstBlock => 0,
            MainProductRule::FirstRequired => {
                group.iter().position(|b| !b.optional).unwrap_or(0)
            }
        };
        let (Some(&main), Some(main_markup)) = (group.get(main_index), parsed.get(main_index))
        else {
            return;
        };

        let mut notes = Vec::new();
        let mut sub_items = Vec::new();
        let mut sub_candidates = Vec::new();
        for (index, (block, m)) in group.iter().zip(&parsed).enumerate() {
            if index == main_index || is_blank(*block, m) {
                continue;
            }
            if all_optional {
                notes.push(format!("Optie: {}", block_title(block, m)));
                continue;
            }
            let item = self.sub_item(sub_items.len() + 1, block, m);
            let detail = (!m.emphasis.is_empty()).then(|| m.emphasis.join(", "));
            sub_candidates.extend(
                std::iter::once(item.name.clone())
                    .chain(item.description.clone())
                    .chain(m.emphasis.iter().cloned())
                    .map(|text| SpecCandidate {
                        text,
                        detail: detail.clone(),
                    }),
            );
            sub_items.push(item);
        }

        let title = match main_markup
            .title()
            .map(strip_dimensions)
            .filter(|t| !t.is_empty())
            .or_else(|| non_blank(&main.product_name))
            .or_else(|| non_blank(&main.group_title))
        {
            Some(title) => title,
            None => {
                let warning = push_warning(out, group_no, "pricing group has no title");
                notes.push(warning);
                format!("Element {group_no}")
            }
        };

        if let Some(header) = self.brand_of(&title) {
            debug!(group = group_no, brand = %header, "[ContentParser] brand header");
            *brand = Some(header);
            return;
        }

        let element_type = [
            Some(title.as_str()),
            main.group_title.as_deref(),
            main.product_name.as_deref(),
        ]
        .into_iter()
            .flatten()
            .find_map(|text| self.element_types.classify(text))
            .unwrap_or(self.default_element_type.as_str())
            .to_string();

        let main_text = main_markup.text();
        let dimensions = find_dimensions(&main_text)
            .or_else(|| main.product_name.as_deref().and_then(find_dimensions))
            .or_else(|| sub_candidates.iter().find_map(|c| find_dimensions(&c.text)));

        let main_candidates: Vec<SpecCandidate> = main_markup
            .bullets
            .iter()
            .chain(&main_markup.emphasis)
            .chain(main_markup.paragraphs.iter().skip(1))
            .map(|text| SpecCandidate {
                text: text.clone(),
                detail: None,
            })
            .collect();
        let specs = self.match_specs(&main_candidates, &sub_candidates);

        let unmatched = main_markup
            .bullets
            .iter()
            .filter(|b| !self.spec_families.iter().any(|(_, table)| table.matches(b)))
            .cloned();
        let mut all_notes: Vec<String> = unmatched.collect();
        all_notes.extend(notes);

        let ctx = GroupContext {
            group_no,
            main,
            title,
            element_type,
            dimensions,
            specs,
            notes: all_notes,
            raw_text: main_text,
            group_discount: group
                .iter()
                .find_map(|b| b.group_discount)
                .unwrap_or(Money::ZERO),
            brand: brand.clone(),
        };

        let markers = self.coupling.find(&ctx.raw_text);
        if markers.len() < 2 {
            let sequence = out.elements.len() + 1;
            let element = self.build_element(&ctx, sequence, proposal_number, sub_items, None);
            out.elements.push(element);
            return;
        }

        debug!(
            group = group_no,
            units = markers.len(),
            "[ContentParser] coupled group detected"
        );
        let group_id = format!("{proposal_number}-G{group_no}");
        let mut sub_items = Some(sub_items);
        for (i, marker) in markers.iter().enumerate() {
            let end = markers.get(i + 1).map_or(ctx.raw_text.len(), |next| next.start);
            let segment = ctx.raw_text.get(marker.end..end).unwrap_or_default().trim();
            let unit = CoupledUnit {
                group_id: group_id.clone(),
                tag: marker.tag.clone(),
                segment,
                raw: ctx.raw_text.get(marker.start..end).unwrap_or_default().trim(),
                lead: i == 0,
            };
            let element = self.build_element(
                &ctx,
                out.elements.len() + 1,
                proposal_number,
                sub_items.take().unwrap_or_default(),
                Some(unit),
            );
            out.elements.push(element);
        }
    }

    fn build_element(
        &self,
        ctx: &GroupContext<'_>,
        sequence: usize,
        proposal_number: &str,
        sub_items: Vec<SubItem>,
        unit: Option<CoupledUnit<'_>>,
    ) -> Element {
        let mut name = ctx.title.clone();
        let mut element_type = ctx.element_type.clone();
        let mut dimensions = ctx.dimensions;
        let mut raw_text = ctx.raw_text.clone();
        let mut lead = true;
        let (mut coupled, mut group_id, mut variant) = (false, None, None);

        if let Some(unit) = unit {
            let title_line = unit
                .segment
                .lines()
                .map(|line| (line, strip_dimensions(line)))
                .find(|(_, stripped)| !stripped.is_empty());
            match title_line {
                Some((line, title)) => {
                    if let Some(t) = self.element_types.classify(&title) {
                        element_type = t.to_string();
                    }
                    dimensions = find_dimensions(line).or(dimensions);
                    name = title;
                }
                None => name = format!("{} {}", ctx.title, unit.tag),
            }
            raw_text = unit.raw.to_string();
            lead = unit.lead;
            coupled = true;
            group_id = Some(unit.group_id);
            variant = Some(unit.tag);
        }

        let main = ctx.main;
        let main_total = main.unit_price.times(main.quantity);
        let sub_items_total: Money = sub_items.iter().map(|s| s.subtotal).sum();
        let mut discount = main.discount.unwrap_or(Money::ZERO);
        if lead {
            discount += ctx.group_discount;
        }

        Element {
            key: format!("{proposal_number}-E{sequence}"),
            sequence,
            group_index: main.group_index,
            name,
            element_type,
            width_mm: dimensions.map(|d| d.width_mm),
            height_mm: dimensions.map(|d| d.height_mm),
            specs: ctx.specs.clone(),
            coupled,
            group_id,
            variant,
            brand: ctx.brand.clone(),
            unit_price: main.unit_price,
            quantity: main.quantity,
            main_total,
            sub_items,
            sub_items_total,
            discount,
            total_excl_vat: (main_total + sub_items_total - discount).non_negative(),
            notes: ctx.notes.clone(),
            raw_text,
        }
    }

    fn match_specs(
        &self,
        main: &[SpecCandidate],
        subs: &[SpecCandidate],
    ) -> BTreeMap<String, SpecMatch> {
        let main_texts: Vec<&str> = main.iter().map(|c| c.text.as_str()).collect();
        let sub_texts: Vec<&str> = subs.iter().map(|c| c.text.as_str()).collect();
        self.spec_families
            .iter()
            .filter_map(|(family, table)| {
                let (label, candidate) = table
                    .first_match(&main_texts)
                    .map(|(label, i)| (label, &main[i]))
                    .or_else(|| table.first_match(&sub_texts).map(|(label, i)| (label, &subs[i])))?;
                let found = SpecMatch {
                    label: label.to_string(),
                    text: candidate.text.clone(),
                    value: candidate
                        .detail
                        .clone()
                        .unwrap_or_else(|| candidate.text.clone()),
                };
                Some((family.clone(), found))
            })
            .collect()
    }

    fn brand_of(&self, title: &str) -> Option<String> {
        let (label, re) = self.brand_header.as_ref()?;
        let number = re.captures(title)?.get(1)?;
        Some(format!("{} {}", label, number.as_str()))
    }

    fn sub_item(&self, position: usize, block: &ContentBlock, m: &Markup) -> SubItem {
        let (name, rest): (String, Vec<String>) = match m.lines.split_first() {
            Some((first, rest)) => (strip_dimensions(first), rest.to_vec()),
            None => (String::new(), Vec::new()),
        };
        let (name, description) = match non_blank(&block.product_name) {
            Some(product) if name.is_empty() => (product, None),
            Some(product) => (product, Some(m.lines.join("; "))),
            None => (name, (!rest.is_empty()).then(|| rest.join("; "))),
        };
        let name = if name.is_empty() {
            format!("Subproduct {position}")
        } else {
            name
        };
        let category = self
            .sub_item_categories
            .classify(&format!("{} {}", name, description.as_deref().unwrap_or_default()))
            .map(str::to_string);
        let discount = block.discount.unwrap_or(Money::ZERO);

        SubItem {
            position,
            name,
            description,
            unit_price: block.unit_price,
            quantity: block.quantity,
            subtotal: (block.unit_price.times(block.quantity) - discount).non_negative(),
            category,
            product_id: block.product_id.clone(),
            sku: block.sku.clone(),
        }
    }
}

struct CoupledUnit<'a> {
    group_id: String,
    tag: String,
    segment: &'a str,
    raw: &'a str,
    lead: bool,
}

/// Group rows by pricing table, in table then row order.
fn group_blocks(blocks: &[ContentBlock]) -> Vec<Vec<&ContentBlock>> {
    let mut sorted: Vec<&ContentBlock> = blocks.iter().collect();
    sorted.sort_by_key(|b| (b.group_index, b.position));

    let mut groups: Vec<Vec<&ContentBlock>> = Vec::new();
    for block in sorted {
        match groups.last_mut() {
            Some(group) if group.first().map(|b| b.group_index) == Some(block.group_index) => {
                group.push(block)
            }
            _ => groups.push(vec![block]),
        }
    }
    groups
}

fn block_title(block: &ContentBlock, m: &Markup) -> String {
    m.title()
        .map(strip_dimensions)
        .filter(|t| !t.is_empty())
        .or_else(|| non_blank(&block.product_name))
        .unwrap_or_else(|| format!("regel {}", block.position + 1))
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn push_warning(out: &mut ParseOutcome, group: usize, message: &str) -> String {
    let warning = ParseWarning {
        group,
        message: message.to_string(),
    };
    warn!("[ContentParser] {}", warning);
    let text = warning.to_string();
    out.warnings.push(warning);
    text
}
