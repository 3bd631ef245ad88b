//! Fuzzy clustering of near-duplicate strings
//!
//! Two strings are connected when any of these hold for their canonical
//! forms: equal forms, trigram Jaccard at or above the threshold,
//! normalized Levenshtein ratio at or above the threshold, or (if enabled)
//! equal phonetic keys. Only forms whose lengths differ by at most
//! `max_length_delta` characters are compared. Clusters are the connected
//! components.

use super::form::{canonical_form, phonetic_key, FormOptions};
use super::similarity::{jaccard, levenshtein_ratio, trigrams};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Clustering thresholds and switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterOptions {
    pub jaccard_threshold: f64,
    pub levenshtein_threshold: f64,
    /// Largest difference in canonical-form length still compared
    pub max_length_delta: usize,
    /// Connect Thai strings with the same consonant sound-class key
    pub phonetic: bool,
    /// Split non-Thai text on Unicode word boundaries
    pub word_segmentation: bool,
    /// Compare token multisets instead of token sequences
    pub order_insensitive: bool,
    /// Strings seen fewer times than this are left out
    pub min_support: i64,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            jaccard_threshold: 0.75,
            levenshtein_threshold: 0.85,
            max_length_delta: 2,
            phonetic: true,
            word_segmentation: true,
            order_insensitive: true,
            min_support: 1,
        }
    }
}

impl ClusterOptions {
    pub fn form_options(&self) -> FormOptions {
        FormOptions {
            word_segmentation: self.word_segmentation,
            order_insensitive: self.order_insensitive,
        }
    }
}

/// A string with how often it was seen
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Supported {
    pub text: String,
    pub support: i64,
}

impl Supported {
    pub fn new(text: impl Into<String>, support: i64) -> Self {
        Self {
            text: text.into(),
            support,
        }
    }
}

/// One connected component with its chosen canonical member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub canonical: String,
    /// Members sorted by text; includes the canonical
    pub members: Vec<Supported>,
}

impl Cluster {
    pub fn support_of(&self, text: &str) -> Option<i64> {
        self.members.iter().find(|m| m.text == text).map(|m| m.support)
    }
}

/// Union-find with path compression (halving).
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            // Lower index stays root so components are stable
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child] = root;
        }
    }
}

struct Entry {
    text: String,
    support: i64,
    form: String,
    form_len: usize,
    grams: HashSet<String>,
    phonetic: Option<String>,
}

/// Highest support, then longest (in characters), then lexicographically
/// smallest.
pub fn choose_canonical(members: &[Supported]) -> Option<&Supported> {
    members.iter().min_by(|a, b| {
        b.support
            .cmp(&a.support)
            .then_with(|| b.text.chars().count().cmp(&a.text.chars().count()))
            .then_with(|| a.text.cmp(&b.text))
    })
}

/// Cluster strings. Duplicate texts keep their largest support; strings
/// with an empty canonical form are skipped. Output is sorted by canonical
/// and does not depend on input order.
pub fn build_clusters(input: &[Supported], options: &ClusterOptions) -> Vec<Cluster> {
    let mut dedup: BTreeMap<&str, i64> = BTreeMap::new();
    for s in input {
        let text = s.text.trim();
        if text.is_empty() || s.support < options.min_support {
            continue;
        }
        let entry = dedup.entry(text).or_insert(s.support);
        *entry = (*entry).max(s.support);
    }

    let form_opts = options.form_options();
    let entries: Vec<Entry> = dedup
        .into_iter()
        .filter_map(|(text, support)| {
            let form = canonical_form(text, form_opts);
            if form.is_empty() {
                return None;
            }
            Some(Entry {
                text: text.to_string(),
                support,
                form_len: form.chars().count(),
                grams: trigrams(&form),
                phonetic: options
                    .phonetic
                    .then(|| phonetic_key(text, form_opts))
                    .flatten(),
                form,
            })
        })
        .collect();

    let mut by_length: HashMap<usize, Vec<usize>> = HashMap::new();
    for (i, e) in entries.iter().enumerate() {
        by_length.entry(e.form_len).or_default().push(i);
    }

    let mut uf = UnionFind::new(entries.len());
    for (i, a) in entries.iter().enumerate() {
        let lo = a.form_len.saturating_sub(options.max_length_delta);
        let hi = a.form_len + options.max_length_delta;
        for len in lo..=hi {
            let Some(bucket) = by_length.get(&len) else {
                continue;
            };
            for &j in bucket {
                if j <= i || uf.find(i) == uf.find(j) {
                    continue;
                }
                if connected(a, &entries[j], options) {
                    uf.union(i, j);
                }
            }
        }
    }

    let mut components: BTreeMap<usize, Vec<Supported>> = BTreeMap::new();
    for (i, e) in entries.iter().enumerate() {
        let root = uf.find(i);
        components
            .entry(root)
            .or_default()
            .push(Supported::new(e.text.clone(), e.support));
    }

    let mut clusters: Vec<Cluster> = components
        .into_values()
        .filter_map(|members| {
            let canonical = choose_canonical(&members)?.text.clone();
            Some(Cluster { canonical, members })
        })
        .collect();
    clusters.sort_by(|a, b| a.canonical.cmp(&b.canonical));
    clusters
}

fn connected(a: &Entry, b: &Entry, options: &ClusterOptions) -> bool {
    if a.form == b.form {
        return true;
    }
    if let (Some(pa), Some(pb)) = (&a.phonetic, &b.phonetic) {
        if pa == pb {
            return true;
        }
    }
    jaccard(&a.grams, &b.grams) >= options.jaccard_threshold
        || levenshtein_ratio(&a.form, &b.form) >= options.levenshtein_threshold
}
