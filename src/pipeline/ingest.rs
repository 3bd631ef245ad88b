//! Ingest: review text in, stored extraction out
//!
//! Each review goes through an optional prefilter, the response cache,
//! the model client, the salvage parser and record validation. When the
//! model output has no usable dish the rule-based detector is used
//! instead. Results with at least one record are stored as
//! `review_extracts` rows.

use super::{PipelineError, PipelineResult};
use crate::extract::{build_fallback_records, is_placeholder_dish, salvage, should_skip_review};
use crate::llm::ModelClient;
use crate::model::{normalize_attribute, ExtractRecord, RecordOutcome, SourceRef};
use crate::storage::DomainStore;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// One review to ingest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewInput {
    pub source: SourceRef,
    pub restaurant: String,
    pub review: String,
    /// Dish the review was written for, if known
    pub hint_dish: Option<String>,
    /// Attributes inherited by every record when known
    pub known_cuisine: Option<String>,
    pub known_restriction: Option<String>,
}

impl ReviewInput {
    pub fn new(source: SourceRef, restaurant: impl Into<String>, review: impl Into<String>) -> Self {
        Self {
            source,
            restaurant: restaurant.into(),
            review: review.into(),
            hint_dish: None,
            known_cuisine: None,
            known_restriction: None,
        }
    }

    pub fn with_hint_dish(mut self, dish: impl Into<String>) -> Self {
        self.hint_dish = Some(dish.into());
        self
    }

    pub fn with_known_cuisine(mut self, cuisine: impl Into<String>) -> Self {
        self.known_cuisine = Some(cuisine.into());
        self
    }

    pub fn with_known_restriction(mut self, restriction: impl Into<String>) -> Self {
        self.known_restriction = Some(restriction.into());
        self
    }

    /// Review text as sent to the model
    fn prompt_text(&self) -> String {
        match self.hint_dish.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(dish) => format!("(dish mentioned: {dish}) {}", self.review),
            None => self.review.clone(),
        }
    }
}

/// Ingest tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    /// Model calls in flight at once
    pub concurrency: usize,
    /// Skip short or service-only reviews without calling the model
    pub prefilter: bool,
    /// Seconds a cached response stays valid
    pub cache_ttl_secs: u64,
    /// Cached responses kept at most; 0 disables the cache
    pub cache_max_entries: usize,
    /// Cuisine given to rule-based records
    pub fallback_cuisine: Option<String>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            prefilter: true,
            cache_ttl_secs: 3600,
            cache_max_entries: 10_000,
            fallback_cuisine: Some("thai".to_string()),
        }
    }
}

/// What happened to one review
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored {
        extract_id: i64,
        records: usize,
        /// Records came from the rule-based detector
        fallback: bool,
    },
    /// The prefilter rejected the review
    Prefiltered,
    /// Neither the model nor the fallback found a dish
    NoRecords,
}

/// Totals for a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub reviews: usize,
    pub stored: usize,
    pub fallback: usize,
    pub prefiltered: usize,
    pub no_records: usize,
    pub failed: usize,
    pub cache_hits: usize,
}

#[derive(Debug, Clone)]
struct CachedResponse {
    text: String,
    inserted: Instant,
}

/// Model responses keyed by (restaurant, prompt), expiring after a TTL.
///
/// When full, the oldest entry is evicted.
#[derive(Debug)]
pub struct ResponseCache {
    entries: DashMap<String, CachedResponse>,
    ttl: Duration,
    max_entries: usize,
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries,
        }
    }

    fn key(restaurant: &str, prompt: &str) -> String {
        format!("{restaurant}\u{1f}{prompt}")
    }

    pub fn get(&self, restaurant: &str, prompt: &str) -> Option<String> {
        if self.max_entries == 0 {
            return None;
        }
        let key = Self::key(restaurant, prompt);
        let hit = self.entries.get(&key).map(|e| (e.text.clone(), e.inserted))?;
        if hit.1.elapsed() > self.ttl {
            self.entries.remove(&key);
            return None;
        }
        Some(hit.0)
    }

    pub fn insert(&self, restaurant: &str, prompt: &str, text: String) {
        if self.max_entries == 0 {
            return;
        }
        let key = Self::key(restaurant, prompt);
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.evict();
        }
        self.entries.insert(
            key,
            CachedResponse {
                text,
                inserted: Instant::now(),
            },
        );
    }

    fn evict(&self) {
        self.entries.retain(|_, e| e.inserted.elapsed() <= self.ttl);
        if self.entries.len() < self.max_entries {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().inserted)
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Concurrent review ingestion
#[derive(Clone)]
pub struct IngestPipeline {
    client: Arc<dyn ModelClient>,
    store: Arc<dyn DomainStore>,
    semaphore: Arc<Semaphore>,
    cache: Arc<ResponseCache>,
    options: IngestOptions,
}

impl IngestPipeline {
    pub fn new(client: Arc<dyn ModelClient>, store: Arc<dyn DomainStore>, options: IngestOptions) -> Self {
        Self {
            client,
            store,
            semaphore: Arc::new(Semaphore::new(options.concurrency.max(1))),
            cache: Arc::new(ResponseCache::new(
                Duration::from_secs(options.cache_ttl_secs),
                options.cache_max_entries,
            )),
            options,
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Model output for a review, from the cache when possible. The bool
    /// is true on a cache hit. Model failures come back as `None`.
    async fn model_text(&self, input: &ReviewInput) -> PipelineResult<(Option<String>, bool)> {
        let prompt = input.prompt_text();
        if let Some(text) = self.cache.get(&input.restaurant, &prompt) {
            return Ok((Some(text), true));
        }
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))?;
        match self.client.complete(&input.restaurant, &prompt).await {
            Ok(text) => {
                self.cache.insert(&input.restaurant, &prompt, text.clone());
                Ok((Some(text), false))
            }
            Err(e) => {
                warn!(source = %input.source, error = %e, "model call failed, using fallback");
                Ok((None, false))
            }
        }
    }

    /// Records from model text that name a real dish
    fn usable_records(input: &ReviewInput, text: &str) -> Vec<ExtractRecord> {
        let result = salvage(text);
        if let Some(strategy) = result.strategy {
            debug!(source = %input.source, %strategy, "salvaged model output");
        }
        result
            .records
            .iter()
            .filter_map(|value| match ExtractRecord::from_value(value, Some(&input.restaurant)) {
                RecordOutcome::Ok(record) if !is_placeholder_dish(&record.dish) => Some(record),
                _ => None,
            })
            .collect()
    }

    /// Ingest one review. Returns the outcome and whether the model
    /// response came from the cache.
    pub async fn process(&self, input: &ReviewInput) -> PipelineResult<(IngestOutcome, bool)> {
        if self.options.prefilter && should_skip_review(&input.review) {
            debug!(source = %input.source, "review prefiltered");
            return Ok((IngestOutcome::Prefiltered, false));
        }

        let (text, cache_hit) = self.model_text(input).await?;
        let mut records = text
            .as_deref()
            .map(|t| Self::usable_records(input, t))
            .unwrap_or_default();

        let fallback = records.is_empty();
        if fallback {
            let cuisine = input
                .known_cuisine
                .as_deref()
                .or(self.options.fallback_cuisine.as_deref());
            records = build_fallback_records(&input.restaurant, &input.review, cuisine);
            if let (Some(hint), Some(first)) = (input.hint_dish.as_deref(), records.first_mut()) {
                if !hint.trim().is_empty() {
                    first.dish = hint.trim().to_string();
                }
            }
        }

        if records.is_empty() {
            debug!(source = %input.source, "no dishes found");
            return Ok((IngestOutcome::NoRecords, cache_hit));
        }

        let known_cuisine = normalize_attribute(input.known_cuisine.clone());
        let known_restriction = normalize_attribute(input.known_restriction.clone());
        for record in &mut records {
            if record.cuisine.is_none() {
                record.cuisine = known_cuisine.clone();
            }
            if record.restriction.is_none() {
                record.restriction = known_restriction.clone();
            }
        }

        let payload = serde_json::to_string(&records).map_err(crate::storage::StorageError::from)?;
        let extract_id = self.store.insert_extract(&input.source, &payload)?;
        Ok((
            IngestOutcome::Stored {
                extract_id,
                records: records.len(),
                fallback,
            },
            cache_hit,
        ))
    }

    /// Ingest a batch concurrently. Per-review failures are logged and
    /// counted; the batch always completes.
    pub async fn run(&self, inputs: Vec<ReviewInput>) -> IngestReport {
        let mut report = IngestReport {
            reviews: inputs.len(),
            ..IngestReport::default()
        };
        let mut tasks = JoinSet::new();
        for input in inputs {
            let pipeline = self.clone();
            tasks.spawn(async move {
                let result = pipeline.process(&input).await;
                (input.source, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (source, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "ingest task panicked");
                    report.failed += 1;
                    continue;
                }
            };
            match result {
                Ok((outcome, cache_hit)) => {
                    if cache_hit {
                        report.cache_hits += 1;
                    }
                    match outcome {
                        IngestOutcome::Stored { fallback, .. } => {
                            report.stored += 1;
                            if fallback {
                                report.fallback += 1;
                            }
                        }
                        IngestOutcome::Prefiltered => report.prefiltered += 1,
                        IngestOutcome::NoRecords => report.no_records += 1,
                    }
                }
                Err(e) => {
                    warn!(%source, error = %e, "failed to ingest review");
                    report.failed += 1;
                }
            }
        }

        info!(
            reviews = report.reviews,
            stored = report.stored,
            fallback = report.fallback,
            prefiltered = report.prefiltered,
            no_records = report.no_records,
            failed = report.failed,
            cache_hits = report.cache_hits,
            "ingest complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockClient, ModelError};
    use crate::storage::{OpenStore, SqliteStore};

    fn pipeline(client: MockClient, options: IngestOptions) -> (IngestPipeline, Arc<SqliteStore>, Arc<MockClient>) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let client = Arc::new(client);
        let pipeline = IngestPipeline::new(client.clone(), store.clone(), options);
        (pipeline, store, client)
    }

    const REVIEW: &str = "ผัดไทยอร่อยมาก เส้นเหนียวนุ่ม";

    #[tokio::test]
    async fn model_output_is_stored() {
        let client = MockClient::available().with_response(
            REVIEW,
            r#"```json
[{"restaurant": "ร้านA", "dish": "ผัดไทย", "sentiment": {"positive": ["อร่อย"]}}]
```"#,
        );
        let (pipeline, store, _) = pipeline(client, IngestOptions::default());

        let (outcome, cache_hit) = pipeline
            .process(&ReviewInput::new(SourceRef::web(1), "ร้านA", REVIEW))
            .await
            .unwrap();
        assert!(!cache_hit);
        assert!(matches!(outcome, IngestOutcome::Stored { records: 1, fallback: false, .. }));

        let extract = store.latest_extract(&SourceRef::web(1)).unwrap().unwrap();
        let stored: Vec<ExtractRecord> = serde_json::from_str(&extract.data_extract).unwrap();
        assert_eq!(stored[0].dish, "ผัดไทย");
        assert_eq!(stored[0].sentiment.positive, vec!["อร่อย".to_string()]);
    }

    #[tokio::test]
    async fn placeholder_answer_falls_back() {
        let review = "ต้มยำกุ้งรสจัดจ้าน";
        let client = MockClient::available()
            .with_response(review, r#"[{"restaurant": "ร้านB", "dish": "เมนูรวม"}]"#);
        let (pipeline, store, _) = pipeline(client, IngestOptions::default());

        let (outcome, _) = pipeline
            .process(&ReviewInput::new(SourceRef::web(2), "ร้านB", review))
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Stored { fallback: true, .. }));
        let extract = store.latest_extract(&SourceRef::web(2)).unwrap().unwrap();
        let stored: Vec<ExtractRecord> = serde_json::from_str(&extract.data_extract).unwrap();
        assert_eq!(stored[0].dish, "ต้มยำกุ้ง");
        assert_eq!(stored[0].cuisine.as_deref(), Some("thai"));
    }

    #[tokio::test]
    async fn model_failure_falls_back_and_applies_hints() {
        let review = "ข้าวผัดจานใหญ่ดีมาก";
        let client = MockClient::available()
            .with_failure(review, ModelError::Timeout(30));
        let (pipeline, store, _) = pipeline(client, IngestOptions::default());

        let input = ReviewInput::new(SourceRef::user(3), "ร้านC", review)
            .with_hint_dish("ข้าวผัดปู")
            .with_known_restriction("Halal");
        let (outcome, _) = pipeline.process(&input).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Stored { fallback: true, .. }));
        let extract = store.latest_extract(&SourceRef::user(3)).unwrap().unwrap();
        let stored: Vec<ExtractRecord> = serde_json::from_str(&extract.data_extract).unwrap();
        assert_eq!(stored[0].dish, "ข้าวผัดปู");
        assert_eq!(stored[0].restriction.as_deref(), Some("halal"));
    }

    #[tokio::test]
    async fn known_attributes_fill_only_missing_values() {
        let review = "ราเมงน้ำซุปเข้มข้น";
        let client = MockClient::available().with_response(
            review,
            r#"[{"restaurant": "ร้านF", "dish": "ราเมง", "cuisine": "Japanese"},
                {"restaurant": "ร้านF", "dish": "เกี๊ยวซ่า"}]"#,
        );
        let (pipeline, store, _) = pipeline(client, IngestOptions::default());

        let input = ReviewInput::new(SourceRef::web(8), "ร้านF", review).with_known_cuisine("Thai");
        pipeline.process(&input).await.unwrap();
        let extract = store.latest_extract(&SourceRef::web(8)).unwrap().unwrap();
        let stored: Vec<ExtractRecord> = serde_json::from_str(&extract.data_extract).unwrap();
        assert_eq!(stored[0].cuisine.as_deref(), Some("japanese"));
        assert_eq!(stored[1].cuisine.as_deref(), Some("thai"));
    }

    #[tokio::test]
    async fn prefilter_skips_service_only_reviews() {
        let (pipeline, store, client) = pipeline(MockClient::available(), IngestOptions::default());
        let (outcome, _) = pipeline
            .process(&ReviewInput::new(SourceRef::web(4), "ร้านD", "บริการดีมาก พนักงานน่ารัก"))
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Prefiltered);
        assert_eq!(client.calls(), 0);
        assert_eq!(store.counts().unwrap().review_extracts, 0);
    }

    #[tokio::test]
    async fn nothing_found_stores_nothing() {
        let review = "วันนี้ฝนตกหนักมาก";
        let client = MockClient::available().with_response(review, "[]");
        let options = IngestOptions {
            prefilter: false,
            ..IngestOptions::default()
        };
        let (pipeline, store, _) = pipeline(client, options);
        let (outcome, _) = pipeline
            .process(&ReviewInput::new(SourceRef::web(5), "ร้านE", review))
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::NoRecords);
        assert_eq!(store.counts().unwrap().review_extracts, 0);
    }

    #[tokio::test]
    async fn repeated_review_hits_cache() {
        let client = MockClient::available()
            .with_default(r#"[{"restaurant": "ร้านA", "dish": "ผัดไทย"}]"#);
        let (pipeline, _, client) = pipeline(client, IngestOptions::default());

        pipeline
            .process(&ReviewInput::new(SourceRef::web(6), "ร้านA", REVIEW))
            .await
            .unwrap();
        let (_, cache_hit) = pipeline
            .process(&ReviewInput::new(SourceRef::web(7), "ร้านA", REVIEW))
            .await
            .unwrap();
        assert!(cache_hit);
        assert_eq!(client.calls(), 1);
        assert_eq!(pipeline.cache().len(), 1);
    }

    #[tokio::test]
    async fn batch_run_counts_outcomes() {
        let client = MockClient::available()
            .with_default(r#"[{"restaurant": "ร้านA", "dish": "ผัดไทย"}]"#);
        let options = IngestOptions {
            concurrency: 2,
            cache_max_entries: 0,
            ..IngestOptions::default()
        };
        let (pipeline, store, client) = pipeline(client, options);

        let mut inputs: Vec<ReviewInput> = (0..6)
            .map(|i| ReviewInput::new(SourceRef::web(i), "ร้านA", format!("{REVIEW} {i}")))
            .collect();
        inputs.push(ReviewInput::new(SourceRef::web(99), "ร้านA", "ok"));

        let report = pipeline.run(inputs).await;
        assert_eq!(report.reviews, 7);
        assert_eq!(report.stored, 6);
        assert_eq!(report.prefiltered, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(client.calls(), 6);
        assert_eq!(store.counts().unwrap().review_extracts, 6);
    }

    #[test]
    fn cache_expires_and_evicts_oldest() {
        let cache = ResponseCache::new(Duration::from_secs(60), 2);
        for (prompt, text) in [("a", "1"), ("b", "2"), ("c", "3")] {
            cache.insert("r", prompt, text.to_string());
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("r", "a"), None);
        assert_eq!(cache.get("r", "c").as_deref(), Some("3"));

        let expired = ResponseCache::new(Duration::ZERO, 2);
        expired.insert("r", "a", "1".to_string());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(expired.get("r", "a"), None);
        assert!(expired.is_empty());
    }
}
