//! Alias proposal generation and curation
//!
//! Near-duplicate dish names, keywords and restaurant names are clustered
//! into proposals. A human reviews them, flags the ones to keep, and
//! `apply_accepted` merges those into the live alias tables that
//! canonicalization reads.

mod cluster;
mod form;
mod proposals;
mod similarity;

pub use cluster::{build_clusters, choose_canonical, Cluster, ClusterOptions, Supported};
pub use form::{canonical_form, normalize_text, phonetic_key, FormOptions};
pub use proposals::{
    apply_accepted, collect_corpus, generate, set_accept, split_location, ApplyOptions,
    ApplyReport, GenerateReport,
};
pub use similarity::{jaccard, levenshtein_ratio, trigrams};
