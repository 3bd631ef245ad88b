//! Storage trait definitions

use crate::aggregate::{Aggregates, ScoreInputs};
use crate::model::{
    AliasCandidate, AliasKind, AliasMapping, Dish, DishId, KeywordCategory, KeywordId, Polarity,
    RestaurantId, ReviewDishId, ReviewExtract, SourceRef,
};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Invalid stored value in {column}: {value}")]
    InvalidValue { column: &'static str, value: String },

    #[error("Unresolved conflict: {0}")]
    Conflict(String),

    #[error("Connection lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Selection of `review_extracts` rows for a bulk pass
#[derive(Debug, Clone, Default)]
pub struct ExtractFilter {
    /// Only rows of this source type
    pub source_type: Option<String>,
    /// Rows to skip, in id order
    pub offset: usize,
    /// Maximum number of rows
    pub limit: Option<usize>,
}

impl ExtractFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = Some(source_type.into());
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Row counts per table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub review_extracts: i64,
    pub restaurants: i64,
    pub dishes: i64,
    pub keywords: i64,
    pub review_dishes: i64,
    pub review_dish_keywords: i64,
    pub dish_keywords: i64,
    pub alias_mappings: i64,
    pub alias_candidates: i64,
    pub restaurant_locations: i64,
}

/// Trait for domain storage backends
///
/// Implementations must be thread-safe (Send + Sync); concurrent
/// incremental runs share one store.
pub trait DomainStore: Send + Sync {
    // === Review Extracts ===

    /// Save the raw extraction text for one review
    fn insert_extract(&self, source: &SourceRef, data_extract: &str) -> StorageResult<i64>;

    /// Most recent extract for a review, if any
    fn latest_extract(&self, source: &SourceRef) -> StorageResult<Option<ReviewExtract>>;

    /// Extracts in id order, filtered
    fn list_extracts(&self, filter: &ExtractFilter) -> StorageResult<Vec<ReviewExtract>>;

    // === Restaurants ===

    fn find_restaurant(&self, name: &str) -> StorageResult<Option<RestaurantId>>;

    /// Insert a restaurant with menu_size 0
    fn insert_restaurant(&self, name: &str) -> StorageResult<RestaurantId>;

    /// Record a branch location; false if the pair already existed
    fn insert_restaurant_location(
        &self,
        restaurant_id: RestaurantId,
        location_name: &str,
    ) -> StorageResult<bool>;

    fn has_restaurant_location(
        &self,
        restaurant_id: RestaurantId,
        location_name: &str,
    ) -> StorageResult<bool>;

    /// Restaurants with no location row, as (id, name)
    fn restaurants_without_locations(&self) -> StorageResult<Vec<(RestaurantId, String)>>;

    // === Dishes ===

    fn find_dish(&self, restaurant_id: RestaurantId, name: &str) -> StorageResult<Option<Dish>>;

    /// Insert a dish with zero scores
    fn insert_dish(
        &self,
        restaurant_id: RestaurantId,
        name: &str,
        cuisine: Option<&str>,
        restriction: Option<&str>,
    ) -> StorageResult<DishId>;

    /// Fill null cuisine/restriction; known values are never overwritten
    fn backfill_dish(
        &self,
        dish_id: DishId,
        cuisine: Option<&str>,
        restriction: Option<&str>,
    ) -> StorageResult<()>;

    // === Keywords ===

    fn find_keyword(
        &self,
        text: &str,
        category: KeywordCategory,
        sentiment: Polarity,
    ) -> StorageResult<Option<KeywordId>>;

    fn insert_keyword(
        &self,
        text: &str,
        category: KeywordCategory,
        sentiment: Polarity,
    ) -> StorageResult<KeywordId>;

    // === Review Links ===

    fn find_review_dish(
        &self,
        source: &SourceRef,
        dish_id: DishId,
    ) -> StorageResult<Option<ReviewDishId>>;

    /// Insert a review-dish link; `None` when the (source, dish) pair
    /// already exists
    fn insert_review_dish(
        &self,
        dish_id: DishId,
        restaurant_id: RestaurantId,
        source: &SourceRef,
    ) -> StorageResult<Option<ReviewDishId>>;

    /// Whether any review-dish link exists for this review
    fn has_review_dishes(&self, source: &SourceRef) -> StorageResult<bool>;

    /// Link a keyword to an occurrence; false if already linked
    fn link_review_dish_keyword(
        &self,
        review_dish_id: ReviewDishId,
        keyword_id: KeywordId,
    ) -> StorageResult<bool>;

    /// Increment the (dish, keyword) frequency counter
    fn bump_dish_keyword(&self, dish_id: DishId, keyword_id: KeywordId) -> StorageResult<()>;

    // === Aggregates ===

    /// Everything the score aggregator reads
    fn load_score_inputs(&self) -> StorageResult<ScoreInputs>;

    /// Write all aggregates in one transaction
    fn write_aggregates(&self, aggregates: &Aggregates) -> StorageResult<()>;

    // === Aliases ===

    fn load_alias_mappings(&self, kind: AliasKind) -> StorageResult<Vec<AliasMapping>>;

    /// Insert or replace the canonical for an alias
    fn upsert_alias_mapping(&self, mapping: &AliasMapping) -> StorageResult<()>;

    /// Dish names with the number of review links, summed across restaurants
    fn dish_name_support(&self) -> StorageResult<Vec<(String, i64)>>;

    /// Keyword texts of one category with summed dish-keyword frequency
    fn keyword_support(&self, category: KeywordCategory) -> StorageResult<Vec<(String, i64)>>;

    /// Replace all proposals of one kind
    fn replace_alias_candidates(
        &self,
        kind: AliasKind,
        candidates: &[AliasCandidate],
    ) -> StorageResult<()>;

    fn list_alias_candidates(&self, kind: AliasKind) -> StorageResult<Vec<AliasCandidate>>;

    /// Set the accept flag on a whole cluster, or on one member of it.
    /// Returns the number of rows changed.
    fn set_candidate_accept(
        &self,
        kind: AliasKind,
        cluster_id: i64,
        member: Option<&str>,
        accept: bool,
    ) -> StorageResult<usize>;

    // === Administration ===

    /// Delete all dish-derived rows: review_dish_keywords, review_dishes,
    /// dish_keywords and dishes. Restaurants and extracts are kept.
    fn reset_dish_tables(&self) -> StorageResult<()>;

    fn counts(&self) -> StorageResult<StoreCounts>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: DomainStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
