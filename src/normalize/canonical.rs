//! Name canonicalization against an alias table

use crate::model::AliasMapping;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Thai vowel and tone marks ignored by the tolerant signature match.
static THAI_MARKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\u{0E31}\u{0E47}-\u{0E4E}]").expect("valid thai mark regex"));

/// Length window (in characters) for the tolerant signature match.
const SIGNATURE_MIN_CHARS: usize = 4;
const SIGNATURE_MAX_CHARS: usize = 18;

/// Alias → canonical lookups for one scope (dishes, keywords or restaurants).
///
/// Exact lookups are case-insensitive. Alias keys are also bucketed by
/// signature so a misspelling that only moves or drops marks still resolves.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    exact: HashMap<String, String>,
    by_signature: HashMap<String, Vec<(String, String)>>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_mappings<'a>(mappings: impl IntoIterator<Item = &'a AliasMapping>) -> Self {
        let mut table = Self::new();
        for m in mappings {
            table.insert(&m.alias, &m.canonical);
        }
        table
    }

    /// Add one alias. Blank entries and self-mappings are ignored.
    pub fn insert(&mut self, alias: &str, canonical: &str) {
        let alias = clean_name(alias).to_lowercase();
        let canonical = clean_name(canonical);
        if alias.is_empty() || canonical.is_empty() || alias == canonical.to_lowercase() {
            return;
        }
        let bucket = self.by_signature.entry(signature(&alias)).or_default();
        bucket.retain(|(a, _)| *a != alias);
        bucket.push((alias.clone(), canonical.clone()));
        bucket.sort();
        self.exact.insert(alias, canonical);
    }

    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }

    /// Exact lookup of an already cleaned, lower-cased name
    fn exact(&self, lower: &str) -> Option<&str> {
        self.exact.get(lower).map(String::as_str)
    }

    /// Signature lookup. When several aliases share the signature the one
    /// with the smallest alias key wins.
    fn by_signature(&self, lower: &str) -> Option<&str> {
        self.by_signature
            .get(&signature(lower))
            .and_then(|bucket| bucket.first())
            .map(|(_, canonical)| canonical.as_str())
    }
}

/// NFC, drop repeated combining marks and collapse whitespace.
pub fn clean_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev: Option<char> = None;
    for c in raw.nfc() {
        if is_combining_mark(c) && prev == Some(c) {
            continue;
        }
        out.push(c);
        prev = Some(c);
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Sorted characters with Thai marks removed.
pub fn signature(s: &str) -> String {
    let stripped = THAI_MARKS.replace_all(s, "");
    let mut chars: Vec<char> = stripped.chars().collect();
    chars.sort_unstable();
    chars.into_iter().collect()
}

/// Resolve a raw name to its canonical form.
///
/// Exact alias hits win. Otherwise names of 4 to 18 characters without a
/// space may match an alias by signature. Anything else is returned cleaned.
pub fn canonical_name(raw: &str, aliases: &AliasTable) -> String {
    let cleaned = clean_name(raw);
    if cleaned.is_empty() {
        return cleaned;
    }
    let lower = cleaned.to_lowercase();
    if let Some(canonical) = aliases.exact(&lower) {
        return canonical.to_string();
    }
    let len = lower.chars().count();
    if (SIGNATURE_MIN_CHARS..=SIGNATURE_MAX_CHARS).contains(&len) && !lower.contains(' ') {
        if let Some(canonical) = aliases.by_signature(&lower) {
            return canonical.to_string();
        }
    }
    cleaned
}
