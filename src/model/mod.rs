//! Domain model: persisted entities and validated extraction records

mod entities;
mod record;

pub use entities::{
    AliasCandidate, AliasKind, AliasMapping, Dish, DishId, Keyword, KeywordCategory, KeywordId,
    Polarity, Restaurant, RestaurantId, ReviewDishId, ReviewExtract, SourceRef,
};
pub use record::{normalize_attribute, ExtractRecord, RecordOutcome, Sentiment, SkipReason};
