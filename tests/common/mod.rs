//! Shared helpers for integration tests
#![allow(dead_code)]

use dishdive::{DomainStore, ExtractRecord, OpenStore, SourceRef, SqliteStore};

pub fn store() -> SqliteStore {
    SqliteStore::open_in_memory().expect("in-memory store")
}

/// One model-style record with sentiment words.
pub fn record(restaurant: &str, dish: &str, positive: &[&str], negative: &[&str]) -> ExtractRecord {
    ExtractRecord::new(restaurant, dish)
        .with_positive(positive.iter().copied())
        .with_negative(negative.iter().copied())
}

/// Serialize records the way the ingest pipeline stores them.
pub fn extract_json(records: &[ExtractRecord]) -> String {
    serde_json::to_string(records).expect("records serialize")
}

/// Store one extract per review.
pub fn seed_reviews(store: &SqliteStore, reviews: &[(SourceRef, Vec<ExtractRecord>)]) {
    for (source, records) in reviews {
        store
            .insert_extract(source, &extract_json(records))
            .expect("insert extract");
    }
}
