//! Salvage parser: recover an array of record objects from model output
//!
//! Strategies run in order and the first one that yields a value wins.
//! Salvage never fails; text with nothing recoverable gives an empty result.

use super::literal::parse_literal;
use super::repair::{
    outermost_span, passes_gate, repair_keys, repair_known_corruption, strip_code_fences,
};
use serde::Serialize;
use serde_json::Value;

/// Which strategy recovered the records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SalvageStrategy {
    /// Fence-stripped text parsed as JSON as-is
    Direct,
    /// Outermost bracket span parsed as JSON
    BracketSpan,
    /// JSON after comment, quote, comma and key repair
    KeyRepair,
    /// Python literal syntax
    Literal,
    /// Literal syntax after historical corruption patterns were undone
    CorruptionRepair,
}

impl SalvageStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::BracketSpan => "bracket_span",
            Self::KeyRepair => "key_repair",
            Self::Literal => "literal",
            Self::CorruptionRepair => "corruption_repair",
        }
    }
}

impl std::fmt::Display for SalvageStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of `salvage`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SalvageResult {
    /// Record objects; non-object items are dropped
    pub records: Vec<Value>,
    /// `None` when no strategy produced a value
    pub strategy: Option<SalvageStrategy>,
}

impl SalvageResult {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

type Strategy = fn(&str) -> Option<Value>;

const STRATEGIES: &[(SalvageStrategy, Strategy)] = &[
    (SalvageStrategy::Direct, direct),
    (SalvageStrategy::BracketSpan, bracket_span),
    (SalvageStrategy::KeyRepair, key_repair),
    (SalvageStrategy::Literal, literal),
    (SalvageStrategy::CorruptionRepair, corruption_repair),
];

/// Run the strategy chain over raw text.
pub fn salvage(text: &str) -> SalvageResult {
    let cleaned = strip_code_fences(text);
    if cleaned.is_empty() {
        return SalvageResult::default();
    }
    for (strategy, attempt) in STRATEGIES {
        if let Some(value) = attempt(cleaned) {
            return SalvageResult {
                records: into_records(value),
                strategy: Some(*strategy),
            };
        }
    }
    SalvageResult::default()
}

/// Keys under which a single object may wrap the record list.
const WRAPPER_KEYS: &[&str] = &["data_extract", "items"];

/// Normalize an already-parsed value into record objects.
///
/// An array keeps its object items. A single object becomes one record,
/// unless it wraps the records under `data_extract` or `items`. A string
/// is treated as doubly encoded and salvaged once more.
pub fn into_records(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.into_iter().filter(Value::is_object).collect(),
        Value::Object(mut obj) => {
            for key in WRAPPER_KEYS {
                match obj.remove(*key) {
                    Some(inner @ (Value::Array(_) | Value::String(_))) => return into_records(inner),
                    Some(other) => {
                        obj.insert(key.to_string(), other);
                    }
                    None => {}
                }
            }
            vec![Value::Object(obj)]
        }
        Value::String(s) => salvage_nested(&s),
        _ => Vec::new(),
    }
}

fn salvage_nested(text: &str) -> Vec<Value> {
    // Only one level of re-encoding is unwrapped
    let cleaned = strip_code_fences(text);
    for (_, attempt) in STRATEGIES {
        if let Some(value) = attempt(cleaned) {
            return match value {
                Value::String(_) => Vec::new(),
                other => into_records(other),
            };
        }
    }
    Vec::new()
}

fn parse_json(candidate: &str) -> Option<Value> {
    if !passes_gate(candidate) {
        return None;
    }
    serde_json::from_str(candidate).ok()
}

fn direct(text: &str) -> Option<Value> {
    parse_json(text)
}

fn bracket_span(text: &str) -> Option<Value> {
    outermost_span(text).and_then(parse_json)
}

fn key_repair(text: &str) -> Option<Value> {
    let span = outermost_span(text).unwrap_or(text);
    parse_json(&repair_keys(span))
}

fn literal(text: &str) -> Option<Value> {
    let span = outermost_span(text).unwrap_or(text);
    parse_literal(span).ok()
}

fn corruption_repair(text: &str) -> Option<Value> {
    let repaired = repair_known_corruption(text);
    let span = outermost_span(&repaired).unwrap_or(&repaired);
    parse_literal(span).ok()
}
