//! Incremental normalization of a single review

use super::{PipelineError, PipelineResult};
use crate::aggregate::recompute;
use crate::extract::{build_fallback_records, salvage};
use crate::model::{ExtractRecord, SourceRef};
use crate::normalize::{ExtractPayload, NormalizationContext, NormalizeStats};
use crate::storage::DomainStore;
use tracing::{debug, info};

/// What the caller already knows about the review
#[derive(Debug, Clone, Copy, Default)]
pub struct Hints<'a> {
    /// Fills records without a restaurant; required for synthesis
    pub restaurant: Option<&'a str>,
    /// The dish the review was written for
    pub dish: Option<&'a str>,
    /// Review text for the rule-based detector
    pub review_text: Option<&'a str>,
}

/// Result of `normalize_single`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SingleOutcome {
    /// The review already has dish links; nothing was done
    AlreadyNormalized,
    /// Records were normalized. `synthesized` is set when they came from
    /// the hints instead of the stored extract.
    Normalized {
        stats: NormalizeStats,
        synthesized: bool,
    },
    /// Neither the extract nor the hints produced a usable record
    Empty,
}

fn synthesize(hints: &Hints<'_>, fallback_cuisine: Option<&str>) -> Vec<ExtractRecord> {
    let Some(restaurant) = hints.restaurant.map(str::trim).filter(|r| !r.is_empty()) else {
        return Vec::new();
    };
    if let Some(dish) = hints.dish.map(str::trim).filter(|d| !d.is_empty()) {
        let record = ExtractRecord::new(restaurant, dish);
        return vec![match fallback_cuisine {
            Some(cuisine) => record.with_cuisine(cuisine),
            None => record,
        }];
    }
    match hints.review_text {
        Some(text) => build_fallback_records(restaurant, text, fallback_cuisine),
        None => Vec::new(),
    }
}

/// Normalize the latest extract of one review and refresh aggregates.
///
/// A review that already has dish links is left alone. When the extract
/// is missing or holds no records, records are synthesized from the hints.
/// Aggregates are recomputed only if at least one record was processed.
pub fn normalize_single(
    store: &dyn DomainStore,
    source: &SourceRef,
    hints: Hints<'_>,
    fallback_cuisine: Option<&str>,
) -> PipelineResult<SingleOutcome> {
    if store.has_review_dishes(source)? {
        debug!(%source, "review already normalized");
        return Ok(SingleOutcome::AlreadyNormalized);
    }

    let extract = store.latest_extract(source)?;
    let mut ctx = NormalizationContext::load(store)?;
    let mut stats = NormalizeStats::default();
    let mut has_records = false;

    if let Some(extract) = &extract {
        let records = salvage(&extract.data_extract).records;
        has_records = !records.is_empty();
        if has_records {
            stats = ctx.normalize_extract_row(
                source,
                ExtractPayload::Parsed(serde_json::Value::Array(records)),
                hints.restaurant,
            )?;
        }
    }

    let mut synthesized = false;
    if stats.processed == 0 && !has_records {
        let records = synthesize(&hints, fallback_cuisine);
        if records.is_empty() && extract.is_none() {
            return Err(PipelineError::ExtractNotFound(source.to_string()));
        }
        if !records.is_empty() {
            debug!(%source, records = records.len(), "synthesized records from hints");
            stats = ctx.normalize_extract_row(source, ExtractPayload::Records(records), None)?;
            synthesized = true;
        }
    }

    if stats.processed == 0 {
        info!(%source, skipped = stats.skipped, "review produced no dishes");
        return Ok(SingleOutcome::Empty);
    }

    recompute(store)?;
    info!(
        %source,
        processed = stats.processed,
        created_dishes = stats.created_dishes,
        dish_kw_links = stats.dish_kw_links,
        synthesized,
        "normalized review"
    );
    Ok(SingleOutcome::Normalized { stats, synthesized })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{OpenStore, SqliteStore};

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn normalizes_then_skips_second_call() {
        let store = store();
        let source = SourceRef::user(5);
        store
            .insert_extract(
                &source,
                r#"[{"dish": "ส้มตำ", "sentiment": {"positive": ["แซ่บ"]}}]"#,
            )
            .unwrap();
        let hints = Hints {
            restaurant: Some("ร้านส้มตำ"),
            ..Hints::default()
        };

        let outcome = normalize_single(&store, &source, hints, None).unwrap();
        let SingleOutcome::Normalized { stats, synthesized } = outcome else {
            panic!("expected normalized outcome, got {outcome:?}");
        };
        assert_eq!(stats.processed, 1);
        assert!(!synthesized);

        let restaurant = store.find_restaurant("ร้านส้มตำ").unwrap().unwrap();
        let dish = store.find_dish(restaurant, "ส้มตำ").unwrap().unwrap();
        assert_eq!(dish.positive_score, 1);

        let again = normalize_single(&store, &source, hints, None).unwrap();
        assert_eq!(again, SingleOutcome::AlreadyNormalized);
    }

    #[test]
    fn empty_extract_uses_dish_hint() {
        let store = store();
        let source = SourceRef::user(6);
        store.insert_extract(&source, "[]").unwrap();
        let hints = Hints {
            restaurant: Some("ร้านA"),
            dish: Some("ข้าวมันไก่"),
            review_text: Some("อร่อยมาก"),
        };

        let outcome = normalize_single(&store, &source, hints, Some("thai")).unwrap();
        assert!(matches!(outcome, SingleOutcome::Normalized { synthesized: true, .. }));
        let restaurant = store.find_restaurant("ร้านA").unwrap().unwrap();
        let dish = store.find_dish(restaurant, "ข้าวมันไก่").unwrap().unwrap();
        assert_eq!(dish.cuisine.as_deref(), Some("thai"));
    }

    #[test]
    fn missing_extract_falls_back_to_review_text() {
        let store = store();
        let source = SourceRef::user(7);
        let hints = Hints {
            restaurant: Some("ร้านB"),
            dish: None,
            review_text: Some("ต้มยำกุ้งน้ำข้นเด็ดมาก"),
        };
        let outcome = normalize_single(&store, &source, hints, None).unwrap();
        assert!(matches!(outcome, SingleOutcome::Normalized { synthesized: true, .. }));
        let restaurant = store.find_restaurant("ร้านB").unwrap().unwrap();
        assert!(store.find_dish(restaurant, "ต้มยำกุ้ง").unwrap().is_some());
        assert!(store.find_dish(restaurant, "ต้มยำ").unwrap().is_none());
    }

    #[test]
    fn missing_extract_without_hints_is_an_error() {
        let store = store();
        let err = normalize_single(&store, &SourceRef::user(8), Hints::default(), None).unwrap_err();
        assert!(matches!(err, PipelineError::ExtractNotFound(_)));
    }

    #[test]
    fn generic_review_stays_empty() {
        let store = store();
        let source = SourceRef::user(9);
        store.insert_extract(&source, "").unwrap();
        let hints = Hints {
            restaurant: Some("ร้านC"),
            dish: None,
            review_text: Some("อาหารดี บริการเยี่ยม"),
        };
        assert_eq!(normalize_single(&store, &source, hints, None).unwrap(), SingleOutcome::Empty);
        assert_eq!(store.counts().unwrap().dishes, 0);
    }
}
