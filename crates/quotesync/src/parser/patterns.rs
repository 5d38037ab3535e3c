use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::PatternRule;

/// `<w>x<h><unit>` with a unit of mm, cm or m.
static DIMENSIONS_WITH_UNIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*[x×]\s*(\d+(?:[.,]\d+)?)\s*(mm|cm|m)\b")
        .expect("Failed to compile dimension regex")
});

/// `(<w>x<h>)` without a unit; millimetres are assumed.
static DIMENSIONS_IN_PARENS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\(\s*(\d+)\s*[x×]\s*(\d+)\s*(?:mm)?\s*\)")
        .expect("Failed to compile parenthesized dimension regex")
});

static EMPTY_PARENS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*\)").expect("Failed to compile empty parens regex"));

/// Ordered `(pattern, label)` lookup with case-insensitive substring matching.
///
/// A table may be gated: with `requires`, text must also contain one of those
/// keywords; with `excludes`, text containing any of them never matches.
#[derive(Debug, Clone, Default)]
pub struct PatternTable {
    rules: Vec<(String, String)>,
    requires: Vec<String>,
    excludes: Vec<String>,
}

impl PatternTable {
    pub fn new(rules: &[PatternRule]) -> Self {
        Self {
            rules: rules
                .iter()
                .map(|r| (r.pattern.to_lowercase(), r.label.clone()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn gated(mut self, requires: &[String], excludes: &[String]) -> Self {
        self.requires = requires.iter().map(|k| k.to_lowercase()).collect();
        self.excludes = excludes.iter().map(|k| k.to_lowercase()).collect();
        self
    }

    fn admits(&self, lowered: &str) -> bool {
        (self.requires.is_empty() || self.requires.iter().any(|k| lowered.contains(k.as_str())))
            && !self.excludes.iter().any(|k| lowered.contains(k.as_str()))
    }

    /// Label of the first rule whose pattern occurs in `text`.
    pub fn classify(&self, text: &str) -> Option<&str> {
        let haystack = text.to_lowercase();
        if !self.admits(&haystack) {
            return None;
        }
        self.rules
            .iter()
            .find(|(pattern, _)| haystack.contains(pattern.as_str()))
            .map(|(_, label)| label.as_str())
    }

    pub fn matches(&self, text: &str) -> bool {
        self.classify(text).is_some()
    }

    /// Scan candidates rule by rule, so an earlier rule beats a later one
    /// even when the later one matches an earlier candidate. Returns the
    /// label and the index of the matching candidate.
    pub fn first_match<S: AsRef<str>>(&self, candidates: &[S]) -> Option<(&str, usize)> {
        let lowered: Vec<String> = candidates
            .iter()
            .map(|c| c.as_ref().to_lowercase())
            .collect();
        self.rules.iter().find_map(|(pattern, label)| {
            lowered
                .iter()
                .position(|c| c.contains(pattern.as_str()) && self.admits(c))
                .map(|i| (label.as_str(), i))
        })
    }
}

pub fn coupling_regex(label: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"\b{}(\d+)\.", regex::escape(label.trim())))
}

/// Matches a brand header line such as `Merk 2: Schüco` for `label` "Merk".
pub fn brand_regex(label: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"(?i)^\s*{}\s+(\d+)\b", regex::escape(label.trim())))
}

/// A coupling marker such as `D2.` found in an element description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub tag: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CouplingMatcher {
    patterns: Vec<(String, Regex)>,
}

impl CouplingMatcher {
    pub fn new(labels: &[String]) -> Result<Self, regex::Error> {
        let patterns = labels
            .iter()
            .map(|label| Ok((label.trim().to_string(), coupling_regex(label)?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { patterns })
    }

    /// Distinct markers of the first label that occurs at least twice, in
    /// text order. Fewer than two distinct markers means no coupling.
    pub fn find(&self, text: &str) -> Vec<Marker> {
        for (label, re) in &self.patterns {
            let mut markers: Vec<Marker> = Vec::new();
            for caps in re.captures_iter(text) {
                let (Some(whole), Some(index)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                let tag = format!("{label}{}", index.as_str());
                if markers.iter().any(|m| m.tag == tag) {
                    continue;
                }
                markers.push(Marker {
                    tag,
                    start: whole.start(),
                    end: whole.end(),
                });
            }
            if markers.len() >= 2 {
                return markers;
            }
        }
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width_mm: u32,
    pub height_mm: u32,
}

pub fn find_dimensions(text: &str) -> Option<Dimensions> {
    if let Some(caps) = DIMENSIONS_WITH_UNIT.captures(text) {
        let factor = match caps[3].to_lowercase().as_str() {
            "cm" => 10.0,
            "m" => 1000.0,
            _ => 1.0,
        };
        if let (Some(w), Some(h)) = (to_mm(&caps[1], factor), to_mm(&caps[2], factor)) {
            return Some(Dimensions {
                width_mm: w,
                height_mm: h,
            });
        }
    }
    let caps = DIMENSIONS_IN_PARENS.captures(text)?;
    Some(Dimensions {
        width_mm: to_mm(&caps[1], 1.0)?,
        height_mm: to_mm(&caps[2], 1.0)?,
    })
}

fn to_mm(raw: &str, factor: f64) -> Option<u32> {
    let value: f64 = raw.replace(',', ".").parse().ok()?;
    let mm = (value * factor).round();
    (mm > 0.0 && mm <= u32::MAX as f64).then_some(mm as u32)
}

/// Remove dimension patterns and the punctuation they leave behind.
pub fn strip_dimensions(text: &str) -> String {
    let without = DIMENSIONS_WITH_UNIT.replace_all(text, "");
    let without = DIMENSIONS_IN_PARENS.replace_all(&without, "");
    let without = EMPTY_PARENS.replace_all(&without, "");
    without
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(|c: char| matches!(c, ',' | '-' | ':' | ' '))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, label: &str) -> PatternRule {
        PatternRule {
            pattern: pattern.into(),
            label: label.into(),
        }
    }

    #[test]
    fn earlier_rule_wins_over_earlier_candidate() {
        let table = PatternTable::new(&[rule("hr+++", "HR+++"), rule("hr++", "HR++")]);
        let candidates = vec!["Glas HR++".to_string(), "Optie: HR+++ triple".to_string()];
        assert_eq!(table.first_match(&candidates), Some(("HR+++", 1)));
    }

    #[test]
    fn gated_table_needs_a_keyword() {
        let table = PatternTable::new(&[rule("links", "Links"), rule("rechts", "Rechts")])
            .gated(&["draairichting".to_string()], &[]);
        assert_eq!(table.classify("Raam links"), None);
        assert_eq!(table.classify("Draairichting: rechts"), Some("Rechts"));
        let candidates = ["Raam links", "Draairichting links naar binnen"];
        assert_eq!(table.first_match(&candidates), Some(("Links", 1)));
    }

    #[test]
    fn excluded_keywords_block_a_match() {
        let table = PatternTable::new(&[rule("kleur", "Kleur")])
            .gated(&[], &["binnen".to_string()]);
        assert!(table.matches("Kleur buitenzijde"));
        assert!(!table.matches("Kleur binnenzijde"));
    }

    #[test]
    fn brand_headers_are_recognized() {
        let re = brand_regex("Merk").unwrap();
        assert_eq!(&re.captures("Merk 2: Schüco").unwrap()[1], "2");
        assert!(re.captures("MERK 1").is_some());
        assert!(re.captures("Merkloze deur").is_none());
        assert!(re.captures("Kozijn merk 3").is_none());
    }

    #[test]
    fn classify_is_case_insensitive() {
        let table = PatternTable::new(&[rule("deur", "Deur")]);
        assert_eq!(table.classify("VOORDEUR"), Some("Deur"));
        assert_eq!(table.classify("Raam"), None);
    }

    #[test]
    fn dimensions_with_units_are_converted() {
        assert_eq!(
            find_dimensions("Voordeur 1000 x 2300 mm"),
            Some(Dimensions { width_mm: 1000, height_mm: 2300 })
        );
        assert_eq!(
            find_dimensions("Raam 120x80cm"),
            Some(Dimensions { width_mm: 1200, height_mm: 800 })
        );
        assert_eq!(
            find_dimensions("Pui 3,5x2,4m"),
            Some(Dimensions { width_mm: 3500, height_mm: 2400 })
        );
        assert_eq!(
            find_dimensions("Deur (980x2115)"),
            Some(Dimensions { width_mm: 980, height_mm: 2115 })
        );
        assert_eq!(find_dimensions("Model 2x3"), None);
    }

    #[test]
    fn coupling_needs_two_distinct_markers() {
        let matcher = CouplingMatcher::new(&["D".to_string()]).unwrap();
        assert!(matcher.find("D1. Voordeur").is_empty());
        assert!(matcher.find("D1. links en nogmaals D1. rechts").is_empty());
        let markers = matcher.find("D1. Voordeur D2. Zijlicht D3. Bovenlicht");
        let tags: Vec<&str> = markers.iter().map(|m| m.tag.as_str()).collect();
        assert_eq!(tags, vec!["D1", "D2", "D3"]);
    }

    #[test]
    fn title_loses_dimensions() {
        assert_eq!(strip_dimensions("Voordeur (1000x2300mm)"), "Voordeur");
        assert_eq!(strip_dimensions("Raam - 120x80cm"), "Raam");
    }
}
