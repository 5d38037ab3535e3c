//! Engine configuration.
//!
//! Everything that shapes a sync run lives here: rate-limit policies per API,
//! the retry schedule, batching, parser pattern tables and the destination
//! table mappings. A complete default is embedded in the binary; deployments
//! replace it with their own YAML file.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::parser::patterns::coupling_regex;
use crate::rate_limiter::{
    FixedIntervalLimiter, RateLimiter, RatePolicy, SlidingWindowLimiter, Unlimited,
};
use crate::retry::RetryPolicy;
use crate::transform::TransformName;

const DEFAULT_CONFIG: &str = include_str!("../config/default.yaml");

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid coupling label {label:?}: {source}")]
    CouplingLabel {
        label: String,
        #[source]
        source: regex::Error,
    },
    #[error("Invalid brand label {label:?}: {source}")]
    BrandLabel {
        label: String,
        #[source]
        source: regex::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// API name → request budget.
    #[serde(default)]
    pub rate_limits: BTreeMap<String, RateLimitConfig>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default = "default_include_content")]
    pub include_content: bool,
    /// Base alias → destination base identifier.
    #[serde(default)]
    pub bases: BTreeMap<String, String>,
    #[serde(default = "default_vat_rate")]
    pub vat_rate_percent: u32,
    pub parser: ParserConfig,
    pub tables: Vec<TableConfig>,
}

fn default_include_content() -> bool {
    true
}

fn default_vat_rate() -> u32 {
    21
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RateLimitConfig {
    SlidingWindow { max_requests: u32, window_secs: u64 },
    FixedInterval { interval_ms: u64 },
    Unlimited,
}

impl RateLimitConfig {
    pub fn build(&self) -> Arc<dyn RatePolicy> {
        match *self {
            RateLimitConfig::SlidingWindow {
                max_requests,
                window_secs,
            } => Arc::new(SlidingWindowLimiter::new(
                max_requests,
                Duration::from_secs(window_secs),
            )),
            RateLimitConfig::FixedInterval { interval_ms } => {
                Arc::new(FixedIntervalLimiter::new(Duration::from_millis(interval_ms)))
            }
            RateLimitConfig::Unlimited => Arc::new(Unlimited),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub batch_size: usize,
    pub batch_pause_ms: u64,
}

impl SyncSettings {
    /// The destination accepts at most this many records per write call.
    pub const MAX_BATCH_SIZE: usize = 10;

    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, Self::MAX_BATCH_SIZE)
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: Self::MAX_BATCH_SIZE,
            batch_pause_ms: 210,
        }
    }
}

/// One ordered `(pattern, label)` entry. Patterns match case-insensitively
/// as substrings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    pub pattern: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecFamilyConfig {
    pub name: String,
    pub patterns: Vec<PatternRule>,
    /// Only text containing one of these keywords is considered.
    #[serde(default)]
    pub requires: Vec<String>,
    /// Text containing any of these keywords is skipped.
    #[serde(default)]
    pub excludes: Vec<String>,
}

/// Which block of a pricing group is the main product.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MainProductRule {
    #[default]
    FirstBlock,
    /// First block not marked optional.
    FirstRequired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    #[serde(default)]
    pub main_product: MainProductRule,
    pub element_types: Vec<PatternRule>,
    #[serde(default = "default_element_type")]
    pub default_element_type: String,
    #[serde(default)]
    pub spec_families: Vec<SpecFamilyConfig>,
    #[serde(default)]
    pub sub_item_categories: Vec<PatternRule>,
    #[serde(default = "default_coupling_labels")]
    pub coupling_labels: Vec<String>,
    /// Groups titled `<brand_label> <n>` set the brand of the elements that
    /// follow and are not elements themselves. Empty disables brand headers.
    #[serde(default = "default_brand_label")]
    pub brand_label: String,
}

fn default_element_type() -> String {
    "Overig".to_string()
}

fn default_brand_label() -> String {
    "Merk".to_string()
}

fn default_coupling_labels() -> Vec<String> {
    vec!["D".to_string()]
}

/// How the records of a table are generated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Generator {
    /// One record per proposal.
    #[default]
    Proposal,
    /// One record per element; restricted to `allow_types` when non-empty.
    PerElement {
        #[serde(default)]
        allow_types: Vec<String>,
    },
    PerSubItem,
    /// Three records with the 30/65/5 payment schedule.
    InvoiceSplits,
    /// One planning record carrying the estimated installation time.
    SchedulingEstimate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Path(String),
    Literal(Value),
    Transform(TransformName),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub field: String,
    #[serde(flatten)]
    pub source: FieldSource,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Name used in reports and logs.
    pub name: String,
    /// Destination table name.
    pub table: String,
    /// Base alias or identifier.
    pub base: String,
    pub key_field: String,
    #[serde(default)]
    pub generator: Generator,
    #[serde(default)]
    pub fields: Vec<FieldMapping>,
    /// Allowed values of select-type destination fields.
    #[serde(default)]
    pub choices: BTreeMap<String, Vec<String>>,
}

impl EngineConfig {
    /// The configuration shipped with the engine.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_yaml_str(DEFAULT_CONFIG)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a YAML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e)
        })?;

        let config = Self::from_yaml_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to load config {}: {}", path.display(), e)
        })?;

        Ok(config)
    }

    /// Register the identifier behind a base alias.
    pub fn with_base(mut self, alias: impl Into<String>, base_id: impl Into<String>) -> Self {
        self.bases.insert(alias.into(), base_id.into());
        self
    }

    /// Build the process-wide limiter from `rate_limits`. Share the result
    /// between every orchestrator talking to the same APIs.
    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::from_config(&self.rate_limits)
    }

    /// Resolve a base alias; unknown aliases are taken as literal identifiers.
    pub fn resolve_base<'a>(&'a self, base: &'a str) -> &'a str {
        resolve_base(&self.bases, base)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (api, limit) in &self.rate_limits {
            match limit {
                RateLimitConfig::SlidingWindow {
                    max_requests,
                    window_secs,
                } if *max_requests == 0 || *window_secs == 0 => {
                    return Err(invalid(format!("rate limit for {api:?} must be non-zero")));
                }
                RateLimitConfig::FixedInterval { interval_ms: 0 } => {
                    return Err(invalid(format!("rate limit for {api:?} must be non-zero")));
                }
                _ => {}
            }
        }

        if self.sync.batch_size == 0 {
            return Err(invalid("sync.batch_size must be at least 1"));
        }

        self.validate_parser()?;

        let mut names = HashSet::new();
        for (index, table) in self.tables.iter().enumerate() {
            if table.name.trim().is_empty() {
                return Err(invalid(format!("table #{index} has an empty name")));
            }
            if !names.insert(table.name.as_str()) {
                return Err(invalid(format!("table {:?} is configured twice", table.name)));
            }
            if table.table.trim().is_empty() {
                return Err(invalid(format!("table {:?} has no destination table", table.name)));
            }
            if table.key_field.trim().is_empty() {
                return Err(invalid(format!("table {:?} has an empty key field", table.name)));
            }
            if let Some(mapping) = table.fields.iter().find(|m| m.field.trim().is_empty()) {
                return Err(invalid(format!(
                    "table {:?} maps {:?} to an empty field name",
                    table.name, mapping.source
                )));
            }
        }
        Ok(())
    }

    fn validate_parser(&self) -> Result<(), ConfigError> {
        let parser = &self.parser;
        let rule_sets = std::iter::once(("element_types", &parser.element_types))
            .chain(std::iter::once(("sub_item_categories", &parser.sub_item_categories)))
            .chain(
                parser
                    .spec_families
                    .iter()
                    .map(|family| (family.name.as_str(), &family.patterns)),
            );
        for (name, rules) in rule_sets {
            if rules
                .iter()
                .any(|r| r.pattern.trim().is_empty() || r.label.trim().is_empty())
            {
                return Err(invalid(format!("{name} contains an empty pattern or label")));
            }
        }
        for family in &parser.spec_families {
            if family.name.trim().is_empty() || family.patterns.is_empty() {
                return Err(invalid("every spec family needs a name and at least one pattern"));
            }
            if family
                .requires
                .iter()
                .chain(&family.excludes)
                .any(|k| k.trim().is_empty())
            {
                return Err(invalid(format!(
                    "spec family {:?} has an empty keyword",
                    family.name
                )));
            }
        }
        for label in &parser.coupling_labels {
            if label.trim().is_empty() {
                return Err(invalid("coupling labels must not be empty"));
            }
            coupling_regex(label).map_err(|source| ConfigError::CouplingLabel {
                label: label.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Look `base` up in an alias map, falling back to the alias itself.
pub(crate) fn resolve_base<'a>(bases: &'a BTreeMap<String, String>, base: &'a str) -> &'a str {
    bases.get(base).map(String::as_str).unwrap_or(base)
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}
