//! Score aggregation
//!
//! Dish scores and restaurant summaries are a pure function of stored
//! links. `compute_aggregates` does the reduction in memory; `recompute`
//! loads the inputs from a store and writes the result back in one
//! transaction. Running it any number of times gives the same numbers.
//!
//! Per review-dish occurrence, any positive keyword counts once and any
//! negative keyword counts once, so a review listing five compliments
//! for one dish moves its positive score by one.

use crate::model::{DishId, Polarity, RestaurantId, ReviewDishId};
use crate::storage::{DomainStore, StorageResult};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// One keyword link of one occurrence, with the keyword's polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccurrenceSentiment {
    pub dish_id: DishId,
    pub review_dish_id: ReviewDishId,
    pub sentiment: Polarity,
}

/// The per-dish fields restaurant summaries are derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DishAttributes {
    pub dish_id: DishId,
    pub restaurant_id: RestaurantId,
    pub cuisine: Option<String>,
    pub restriction: Option<String>,
}

/// Everything aggregation reads
#[derive(Debug, Clone, Default)]
pub struct ScoreInputs {
    pub restaurants: Vec<RestaurantId>,
    pub dishes: Vec<DishAttributes>,
    pub links: Vec<OccurrenceSentiment>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DishScore {
    pub positive_score: i64,
    pub negative_score: i64,
    pub total_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RestaurantSummary {
    pub menu_size: i64,
    pub cuisine: Option<String>,
    pub restriction: Option<String>,
}

/// Derived values for every dish and restaurant
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Aggregates {
    pub dishes: BTreeMap<DishId, DishScore>,
    pub restaurants: BTreeMap<RestaurantId, RestaurantSummary>,
}

/// Share of tagged dishes the most common value needs, as `NUM / DEN`.
const MAJORITY_NUM: usize = 4;
const MAJORITY_DEN: usize = 5;

/// Reduce stored rows to aggregates. Independent of input order.
pub fn compute_aggregates(inputs: &ScoreInputs) -> Aggregates {
    let mut flags: BTreeMap<(DishId, ReviewDishId), (bool, bool)> = BTreeMap::new();
    for link in &inputs.links {
        let entry = flags.entry((link.dish_id, link.review_dish_id)).or_default();
        match link.sentiment {
            Polarity::Positive => entry.0 = true,
            Polarity::Negative => entry.1 = true,
            Polarity::Neutral => {}
        }
    }

    let mut dishes: BTreeMap<DishId, DishScore> = inputs
        .dishes
        .iter()
        .map(|d| (d.dish_id, DishScore::default()))
        .collect();
    for ((dish_id, _), (has_pos, has_neg)) in flags {
        if let Some(score) = dishes.get_mut(&dish_id) {
            score.positive_score += i64::from(has_pos);
            score.negative_score += i64::from(has_neg);
        }
    }
    for score in dishes.values_mut() {
        score.total_score = (score.positive_score + score.negative_score) as f64;
    }

    let mut by_restaurant: BTreeMap<RestaurantId, Vec<&DishAttributes>> = inputs
        .restaurants
        .iter()
        .map(|id| (*id, Vec::new()))
        .collect();
    for dish in &inputs.dishes {
        by_restaurant.entry(dish.restaurant_id).or_default().push(dish);
    }

    let restaurants = by_restaurant
        .into_iter()
        .map(|(id, owned)| {
            let summary = RestaurantSummary {
                menu_size: owned.len() as i64,
                cuisine: majority_value(owned.iter().filter_map(|d| d.cuisine.as_deref())),
                restriction: majority_value(owned.iter().filter_map(|d| d.restriction.as_deref())),
            };
            (id, summary)
        })
        .collect();

    Aggregates {
        dishes,
        restaurants,
    }
}

/// The most frequent value if it holds at least 80% of the values given,
/// else `None`. Ties go to the lexicographically smallest value.
pub fn majority_value<'a>(values: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut total = 0usize;
    for v in values {
        *counts.entry(v).or_default() += 1;
        total += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    let (value, count) = best?;
    (count * MAJORITY_DEN >= total * MAJORITY_NUM).then(|| value.to_string())
}

/// Recompute every dish score and restaurant summary in the store.
pub fn recompute(store: &dyn DomainStore) -> StorageResult<Aggregates> {
    let inputs = store.load_score_inputs()?;
    let aggregates = compute_aggregates(&inputs);
    store.write_aggregates(&aggregates)?;
    info!(
        dishes = aggregates.dishes.len(),
        restaurants = aggregates.restaurants.len(),
        "recomputed aggregates"
    );
    Ok(aggregates)
}
