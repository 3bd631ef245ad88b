//! Bulk normalization over stored extracts

use super::PipelineResult;
use crate::aggregate::recompute;
use crate::normalize::{ExtractPayload, NormalizationContext, NormalizeStats};
use crate::storage::{DomainStore, ExtractFilter};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Which extracts to normalize and how
#[derive(Debug, Clone)]
pub struct BulkOptions {
    pub filter: ExtractFilter,
    /// Delete dish-derived tables first
    pub reset: bool,
    /// Log progress every this many rows; 0 disables progress logging
    pub progress_every: usize,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            filter: ExtractFilter::default(),
            reset: false,
            progress_every: 250,
        }
    }
}

/// Outcome of a bulk pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkReport {
    /// Extract rows read
    pub rows: usize,
    /// Rows that linked at least one dish
    pub rows_with_dishes: usize,
    /// Rows abandoned after a storage error
    pub failed_rows: usize,
    pub stats: NormalizeStats,
    pub scored_dishes: usize,
    pub scored_restaurants: usize,
    pub elapsed_secs: f64,
}

/// Progress interval for a slice of `total` rows. Slices no larger than
/// the requested interval report about every 5%.
pub fn progress_interval(total: usize, requested: usize) -> usize {
    if requested == 0 {
        0
    } else if total <= requested {
        (total / 20).max(1)
    } else {
        requested
    }
}

/// Normalize every extract selected by the filter, then recompute all
/// aggregates.
///
/// A row that fails with a storage error is logged and counted as zero
/// rows affected; the pass continues with the next row.
pub fn normalize_all(store: &dyn DomainStore, options: &BulkOptions) -> PipelineResult<BulkReport> {
    let started = Instant::now();
    if options.reset {
        info!("resetting dish tables");
        store.reset_dish_tables()?;
    }

    let extracts = store.list_extracts(&options.filter)?;
    let total = extracts.len();
    let every = progress_interval(total, options.progress_every);
    info!(
        rows = total,
        offset = options.filter.offset,
        source_type = options.filter.source_type.as_deref().unwrap_or("*"),
        progress_every = every,
        "starting normalization"
    );

    let mut ctx = NormalizationContext::load(store)?;
    let mut report = BulkReport {
        rows: total,
        ..BulkReport::default()
    };

    for (i, extract) in extracts.iter().enumerate() {
        match ctx.normalize_extract_row(
            &extract.source,
            ExtractPayload::Text(&extract.data_extract),
            None,
        ) {
            Ok(stats) => {
                if stats.processed > 0 {
                    report.rows_with_dishes += 1;
                } else {
                    debug!(source = %extract.source, id = extract.id, "extract produced no dishes");
                }
                report.stats.merge(&stats);
            }
            Err(e) => {
                warn!(source = %extract.source, id = extract.id, error = %e, "failed to normalize extract");
                report.failed_rows += 1;
            }
        }

        let done = i + 1;
        if every > 0 && (done == 1 || done % every == 0 || done == total) {
            let elapsed = started.elapsed().as_secs_f64();
            let eta = elapsed / done as f64 * (total - done) as f64;
            info!(
                done,
                total,
                pct = format!("{:.1}", done as f64 * 100.0 / total as f64),
                created_dishes = report.stats.created_dishes,
                review_dishes = report.stats.review_dishes,
                created_keywords = report.stats.created_keywords,
                dish_kw_links = report.stats.dish_kw_links,
                elapsed_secs = format!("{elapsed:.1}"),
                eta_secs = format!("{eta:.1}"),
                "normalization progress"
            );
        }
    }

    let aggregates = recompute(store)?;
    report.scored_dishes = aggregates.dishes.len();
    report.scored_restaurants = aggregates.restaurants.len();
    report.elapsed_secs = started.elapsed().as_secs_f64();

    info!(
        rows = report.rows,
        rows_with_dishes = report.rows_with_dishes,
        failed_rows = report.failed_rows,
        created_dishes = report.stats.created_dishes,
        created_keywords = report.stats.created_keywords,
        dish_kw_links = report.stats.dish_kw_links,
        skipped_records = report.stats.skipped,
        elapsed_secs = format!("{:.2}", report.elapsed_secs),
        "normalization complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceRef;
    use crate::storage::{OpenStore, SqliteStore};

    fn seeded_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_extract(
                &SourceRef::web(1),
                r#"[{"restaurant": "ร้านA", "dish": "ผัดไทย", "cuisine": "Thai",
                     "sentiment": {"positive": ["อร่อย"], "negative": []}}]"#,
            )
            .unwrap();
        store
            .insert_extract(
                &SourceRef::web(2),
                "[{'restaurant': 'ร้านA', 'dish': 'ต้มยำกุ้ง', 'sentiment': {'negative': ['เค็ม']}}]",
            )
            .unwrap();
        store.insert_extract(&SourceRef::user(1), "not an extract").unwrap();
        store
    }

    #[test]
    fn progress_interval_adapts_to_small_slices() {
        assert_eq!(progress_interval(1000, 250), 250);
        assert_eq!(progress_interval(100, 250), 5);
        assert_eq!(progress_interval(7, 250), 1);
        assert_eq!(progress_interval(1000, 0), 0);
    }

    #[test]
    fn bulk_pass_normalizes_and_scores() {
        let store = seeded_store();
        let report = normalize_all(&store, &BulkOptions::default()).unwrap();
        assert_eq!(report.rows, 3);
        assert_eq!(report.rows_with_dishes, 2);
        assert_eq!(report.failed_rows, 0);
        assert_eq!(report.stats.created_dishes, 2);
        assert_eq!(report.scored_dishes, 2);

        let restaurant = store.find_restaurant("ร้านA").unwrap().unwrap();
        let pad_thai = store.find_dish(restaurant, "ผัดไทย").unwrap().unwrap();
        assert_eq!(pad_thai.positive_score, 1);
        assert_eq!(pad_thai.cuisine.as_deref(), Some("thai"));
    }

    #[test]
    fn rerun_is_idempotent() {
        let store = seeded_store();
        normalize_all(&store, &BulkOptions::default()).unwrap();
        let before = store.counts().unwrap();

        let report = normalize_all(&store, &BulkOptions::default()).unwrap();
        assert_eq!(report.stats.review_dishes, 0);
        assert_eq!(report.stats.dish_kw_links, 0);
        assert_eq!(store.counts().unwrap(), before);
    }

    #[test]
    fn filter_and_reset() {
        let store = seeded_store();
        normalize_all(&store, &BulkOptions::default()).unwrap();

        let options = BulkOptions {
            filter: ExtractFilter::new().with_source_type("web").with_limit(1),
            reset: true,
            progress_every: 0,
        };
        let report = normalize_all(&store, &options).unwrap();
        assert_eq!(report.rows, 1);
        let counts = store.counts().unwrap();
        assert_eq!(counts.dishes, 1);
        assert_eq!(counts.review_dishes, 1);
        assert_eq!(counts.review_extracts, 3);
    }
}
