//! Per-run normalization state and the row normalizer
//!
//! A `NormalizationContext` belongs to one run. It owns the alias tables
//! and the entity caches, so two runs never share state and nothing is
//! global. The caches assume no other writer mutates the same entities
//! during the run; store-level unique keys turn a lost race into a re-read.

use super::canonical::{canonical_name, AliasTable};
use super::keyword::categorize_keyword;
use crate::extract::{into_records, salvage};
use crate::model::{
    AliasKind, DishId, ExtractRecord, KeywordCategory, KeywordId, Polarity, RecordOutcome,
    RestaurantId, ReviewDishId, SkipReason, SourceRef,
};
use crate::storage::{DomainStore, StorageError, StorageResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// An id plus whether this call created the row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upserted<T> {
    pub id: T,
    pub created: bool,
}

impl<T> Upserted<T> {
    fn found(id: T) -> Self {
        Self { id, created: false }
    }

    fn created(id: T) -> Self {
        Self { id, created: true }
    }
}

/// Input of `normalize_extract_row`
#[derive(Debug, Clone)]
pub enum ExtractPayload<'a> {
    /// Stored text that still needs salvaging
    Text(&'a str),
    /// Already parsed JSON
    Parsed(Value),
    /// Records built by the caller, e.g. from the rule-based fallback
    Records(Vec<ExtractRecord>),
}

/// Counters for one or more normalized rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeStats {
    /// Records linked to a dish
    pub processed: usize,
    pub created_dishes: usize,
    pub created_keywords: usize,
    /// New review-dish-keyword links
    pub dish_kw_links: usize,
    /// New review-dish rows
    pub review_dishes: usize,
    /// Records rejected by validation
    pub skipped: usize,
}

impl NormalizeStats {
    pub fn merge(&mut self, other: &NormalizeStats) {
        self.processed += other.processed;
        self.created_dishes += other.created_dishes;
        self.created_keywords += other.created_keywords;
        self.dish_kw_links += other.dish_kw_links;
        self.review_dishes += other.review_dishes;
        self.skipped += other.skipped;
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedDish {
    id: DishId,
    has_cuisine: bool,
    has_restriction: bool,
}

type KeywordKey = (String, KeywordCategory, Polarity);

pub struct NormalizationContext<'s> {
    store: &'s dyn DomainStore,
    dish_aliases: AliasTable,
    keyword_aliases: AliasTable,
    restaurant_aliases: AliasTable,
    restaurants: HashMap<String, RestaurantId>,
    dishes: HashMap<(RestaurantId, String), CachedDish>,
    keywords: HashMap<KeywordKey, KeywordId>,
}

impl<'s> NormalizationContext<'s> {
    /// A context with empty alias tables
    pub fn new(store: &'s dyn DomainStore) -> Self {
        Self {
            store,
            dish_aliases: AliasTable::new(),
            keyword_aliases: AliasTable::new(),
            restaurant_aliases: AliasTable::new(),
            restaurants: HashMap::new(),
            dishes: HashMap::new(),
            keywords: HashMap::new(),
        }
    }

    /// A context with alias tables loaded from the store
    pub fn load(store: &'s dyn DomainStore) -> StorageResult<Self> {
        let mut ctx = Self::new(store);
        for kind in AliasKind::ALL {
            let mappings = store.load_alias_mappings(kind)?;
            ctx.set_aliases(kind, AliasTable::from_mappings(&mappings));
        }
        debug!(
            dish_aliases = ctx.dish_aliases.len(),
            keyword_aliases = ctx.keyword_aliases.len(),
            restaurant_aliases = ctx.restaurant_aliases.len(),
            "loaded alias tables"
        );
        Ok(ctx)
    }

    pub fn set_aliases(&mut self, kind: AliasKind, table: AliasTable) {
        match kind {
            AliasKind::Dish => self.dish_aliases = table,
            AliasKind::Keyword => self.keyword_aliases = table,
            AliasKind::Restaurant => self.restaurant_aliases = table,
        }
    }

    pub fn aliases(&self, kind: AliasKind) -> &AliasTable {
        match kind {
            AliasKind::Dish => &self.dish_aliases,
            AliasKind::Keyword => &self.keyword_aliases,
            AliasKind::Restaurant => &self.restaurant_aliases,
        }
    }

    // === Entity resolution ===

    pub fn get_or_create_restaurant(&mut self, name: &str) -> StorageResult<Upserted<RestaurantId>> {
        if let Some(id) = self.restaurants.get(name) {
            return Ok(Upserted::found(*id));
        }
        let result = match self.store.find_restaurant(name)? {
            Some(id) => Upserted::found(id),
            None => Upserted::created(self.store.insert_restaurant(name)?),
        };
        self.restaurants.insert(name.to_string(), result.id);
        Ok(result)
    }

    /// Look up a dish by (restaurant, name). An existing dish gets null
    /// cuisine/restriction filled in; known values are kept.
    pub fn get_or_create_dish(
        &mut self,
        restaurant_id: RestaurantId,
        name: &str,
        cuisine: Option<&str>,
        restriction: Option<&str>,
    ) -> StorageResult<Upserted<DishId>> {
        let key = (restaurant_id, name.to_string());
        if let Some(cached) = self.dishes.get(&key).copied() {
            let fill_cuisine = !cached.has_cuisine && cuisine.is_some();
            let fill_restriction = !cached.has_restriction && restriction.is_some();
            if fill_cuisine || fill_restriction {
                self.store.backfill_dish(cached.id, cuisine, restriction)?;
                self.dishes.insert(
                    key,
                    CachedDish {
                        id: cached.id,
                        has_cuisine: cached.has_cuisine || fill_cuisine,
                        has_restriction: cached.has_restriction || fill_restriction,
                    },
                );
            }
            return Ok(Upserted::found(cached.id));
        }

        let (result, cached) = match self.store.find_dish(restaurant_id, name)? {
            Some(dish) => {
                if (dish.cuisine.is_none() && cuisine.is_some())
                    || (dish.restriction.is_none() && restriction.is_some())
                {
                    self.store.backfill_dish(dish.id, cuisine, restriction)?;
                }
                let cached = CachedDish {
                    id: dish.id,
                    has_cuisine: dish.cuisine.is_some() || cuisine.is_some(),
                    has_restriction: dish.restriction.is_some() || restriction.is_some(),
                };
                (Upserted::found(dish.id), cached)
            }
            None => {
                let id = self.store.insert_dish(restaurant_id, name, cuisine, restriction)?;
                let cached = CachedDish {
                    id,
                    has_cuisine: cuisine.is_some(),
                    has_restriction: restriction.is_some(),
                };
                (Upserted::created(id), cached)
            }
        };
        self.dishes.insert(key, cached);
        Ok(result)
    }

    pub fn get_or_create_keyword(
        &mut self,
        text: &str,
        category: KeywordCategory,
        sentiment: Polarity,
    ) -> StorageResult<Upserted<KeywordId>> {
        let key = (text.to_string(), category, sentiment);
        if let Some(id) = self.keywords.get(&key) {
            return Ok(Upserted::found(*id));
        }
        let result = match self.store.find_keyword(text, category, sentiment)? {
            Some(id) => Upserted::found(id),
            None => Upserted::created(self.store.insert_keyword(text, category, sentiment)?),
        };
        self.keywords.insert(key, result.id);
        Ok(result)
    }

    /// Link a review to a dish at most once.
    ///
    /// Checks first, then inserts. If a concurrent writer wins the race the
    /// insert is ignored and the existing row is read back.
    pub fn insert_review_dish(
        &mut self,
        dish_id: DishId,
        restaurant_id: RestaurantId,
        source: &SourceRef,
    ) -> StorageResult<Upserted<ReviewDishId>> {
        if let Some(id) = self.store.find_review_dish(source, dish_id)? {
            return Ok(Upserted::found(id));
        }
        if let Some(id) = self.store.insert_review_dish(dish_id, restaurant_id, source)? {
            return Ok(Upserted::created(id));
        }
        match self.store.find_review_dish(source, dish_id)? {
            Some(id) => Ok(Upserted::found(id)),
            None => Err(StorageError::Conflict(format!(
                "review dish for {source} dish {dish_id} neither inserted nor found"
            ))),
        }
    }

    // === Row normalization ===

    /// Normalize one review's extraction into entities and links.
    ///
    /// Replaying the same payload for the same source creates nothing new.
    pub fn normalize_extract_row(
        &mut self,
        source: &SourceRef,
        payload: ExtractPayload<'_>,
        restaurant_hint: Option<&str>,
    ) -> StorageResult<NormalizeStats> {
        let mut stats = NormalizeStats::default();

        let raw = match payload {
            ExtractPayload::Records(records) => {
                for record in &records {
                    self.normalize_record(source, record, &mut stats)?;
                }
                return Ok(stats);
            }
            ExtractPayload::Parsed(value) => into_records(value),
            ExtractPayload::Text(text) => {
                let result = salvage(text);
                if let Some(strategy) = result.strategy {
                    debug!(%source, %strategy, records = result.records.len(), "salvaged extract");
                }
                result.records
            }
        };

        for value in &raw {
            match ExtractRecord::from_value(value, restaurant_hint) {
                RecordOutcome::Ok(record) => self.normalize_record(source, &record, &mut stats)?,
                RecordOutcome::Skip(reason) => {
                    debug!(%source, %reason, "skipped record");
                    stats.skipped += 1;
                }
            }
        }
        Ok(stats)
    }

    fn normalize_record(
        &mut self,
        source: &SourceRef,
        record: &ExtractRecord,
        stats: &mut NormalizeStats,
    ) -> StorageResult<()> {
        let restaurant = canonical_name(&record.restaurant, &self.restaurant_aliases);
        let dish = canonical_name(&record.dish, &self.dish_aliases);
        let reason = match (restaurant.is_empty(), dish.is_empty()) {
            (true, true) => Some(SkipReason::MissingRestaurantAndDish),
            (true, false) => Some(SkipReason::MissingRestaurant),
            (false, true) => Some(SkipReason::MissingDish),
            (false, false) => None,
        };
        if let Some(reason) = reason {
            debug!(%source, %reason, "skipped record");
            stats.skipped += 1;
            return Ok(());
        }

        let cuisine = record.cuisine.as_deref();
        let restriction = record.restriction.as_deref();

        let restaurant_id = self.get_or_create_restaurant(&restaurant)?.id;
        let dish = self.get_or_create_dish(restaurant_id, &dish, cuisine, restriction)?;
        if dish.created {
            stats.created_dishes += 1;
        }
        let review_dish = self.insert_review_dish(dish.id, restaurant_id, source)?;
        if review_dish.created {
            stats.review_dishes += 1;
        }

        for (text, category, sentiment) in self.occurrence_keywords(record) {
            let keyword = self.get_or_create_keyword(&text, category, sentiment)?;
            if keyword.created {
                stats.created_keywords += 1;
            }
            // Frequency only moves when the link is new, so replays are no-ops
            if self.store.link_review_dish_keyword(review_dish.id, keyword.id)? {
                self.store.bump_dish_keyword(dish.id, keyword.id)?;
                stats.dish_kw_links += 1;
            }
        }

        stats.processed += 1;
        Ok(())
    }

    /// Keywords attached to one occurrence, deduplicated by
    /// (text, category, sentiment), in a stable order.
    fn occurrence_keywords(&self, record: &ExtractRecord) -> Vec<KeywordKey> {
        let mut seen: HashSet<KeywordKey> = HashSet::new();
        let mut out = Vec::new();
        let mut push = |key: KeywordKey| {
            if seen.insert(key.clone()) {
                out.push(key);
            }
        };

        if let Some(cuisine) = &record.cuisine {
            push((cuisine.clone(), KeywordCategory::Cuisine, Polarity::Neutral));
        }
        if let Some(restriction) = &record.restriction {
            push((restriction.clone(), KeywordCategory::Restriction, Polarity::Neutral));
        }

        let tokens = record
            .sentiment
            .positive
            .iter()
            .map(|t| (t, Polarity::Positive))
            .chain(record.sentiment.negative.iter().map(|t| (t, Polarity::Negative)));
        for (token, hint) in tokens {
            let text = canonical_name(token, &self.keyword_aliases);
            if text.is_empty() {
                continue;
            }
            let (category, sentiment) = categorize_keyword(&text, Some(hint));
            push((text, category, sentiment));
        }
        out
    }
}
