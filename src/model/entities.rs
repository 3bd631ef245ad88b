//! Persisted domain entities: restaurants, dishes, keywords and their links

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Row id of a restaurant
    RestaurantId
);
row_id!(
    /// Row id of a dish
    DishId
);
row_id!(
    /// Row id of a keyword
    KeywordId
);
row_id!(
    /// Row id of one review-dish occurrence
    ReviewDishId
);

/// Identity of the review a piece of extracted data came from.
///
/// `source_type` separates id spaces ("web" for scraped reviews, "user"
/// for reviews submitted through the app).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_type: String,
    pub source_id: i64,
}

impl SourceRef {
    pub fn new(source_type: impl Into<String>, source_id: i64) -> Self {
        Self {
            source_type: source_type.into(),
            source_id,
        }
    }

    pub fn web(source_id: i64) -> Self {
        Self::new("web", source_id)
    }

    pub fn user(source_id: i64) -> Self {
        Self::new("user", source_id)
    }
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source_type, self.source_id)
    }
}

/// Keyword category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordCategory {
    Cost,
    Flavor,
    Cuisine,
    Restriction,
    Others,
}

impl KeywordCategory {
    pub const ALL: [KeywordCategory; 5] = [
        Self::Cost,
        Self::Flavor,
        Self::Cuisine,
        Self::Restriction,
        Self::Others,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cost => "cost",
            Self::Flavor => "flavor",
            Self::Cuisine => "cuisine",
            Self::Restriction => "restriction",
            Self::Others => "others",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "cost" => Some(Self::Cost),
            "flavor" | "flavour" => Some(Self::Flavor),
            "cuisine" => Some(Self::Cuisine),
            "restriction" => Some(Self::Restriction),
            "others" | "other" => Some(Self::Others),
            _ => None,
        }
    }
}

impl std::fmt::Display for KeywordCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sentiment polarity of a keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
    Neutral,
}

impl Polarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "positive" | "pos" => Some(Self::Positive),
            "negative" | "neg" => Some(Self::Negative),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }
}

impl std::fmt::Display for Polarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A restaurant and its derived attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: RestaurantId,
    pub name: String,
    /// Cuisine shared by at least 80% of the restaurant's tagged dishes
    pub cuisine: Option<String>,
    /// Restriction shared by at least 80% of the restaurant's tagged dishes
    pub restriction: Option<String>,
    pub menu_size: i64,
}

/// A dish on one restaurant's menu
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dish {
    pub id: DishId,
    pub restaurant_id: RestaurantId,
    pub name: String,
    pub cuisine: Option<String>,
    pub restriction: Option<String>,
    pub positive_score: i64,
    pub negative_score: i64,
    pub total_score: f64,
}

/// A sentiment or attribute keyword
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Keyword {
    pub id: KeywordId,
    pub text: String,
    pub category: KeywordCategory,
    pub sentiment: Polarity,
}

/// A raw extraction blob waiting to be normalized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewExtract {
    pub id: i64,
    pub source: SourceRef,
    pub data_extract: String,
    pub created_at: DateTime<Utc>,
}

/// Which alias table a mapping or proposal belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasKind {
    Dish,
    Keyword,
    Restaurant,
}

impl AliasKind {
    pub const ALL: [AliasKind; 3] = [Self::Dish, Self::Keyword, Self::Restaurant];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dish => "dish",
            Self::Keyword => "keyword",
            Self::Restaurant => "restaurant",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "dish" | "dishes" => Some(Self::Dish),
            "keyword" | "keywords" => Some(Self::Keyword),
            "restaurant" | "restaurants" | "location" => Some(Self::Restaurant),
            _ => None,
        }
    }
}

impl std::fmt::Display for AliasKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live alias: `alias` is rewritten to `canonical` during canonicalization
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AliasMapping {
    pub kind: AliasKind,
    pub alias: String,
    pub canonical: String,
}

impl AliasMapping {
    pub fn new(kind: AliasKind, alias: impl Into<String>, canonical: impl Into<String>) -> Self {
        Self {
            kind,
            alias: alias.into(),
            canonical: canonical.into(),
        }
    }
}

/// One row of a merge proposal awaiting human review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasCandidate {
    pub kind: AliasKind,
    pub cluster_id: i64,
    /// Keyword category the cluster was built in (keyword proposals only)
    pub category: Option<KeywordCategory>,
    pub canonical: String,
    pub member: String,
    pub support: i64,
    /// Branch suffix split off a restaurant name (restaurant proposals only)
    pub location_name: Option<String>,
    pub proposed: bool,
    pub accept: bool,
}

impl AliasCandidate {
    /// True for the row that proposes the canonical string itself
    pub fn is_identity(&self) -> bool {
        self.canonical == self.member
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_category_round_trips_through_str() {
        for cat in KeywordCategory::ALL {
            assert_eq!(KeywordCategory::from_str(cat.as_str()), Some(cat));
        }
        assert_eq!(KeywordCategory::from_str("Flavour"), Some(KeywordCategory::Flavor));
        assert_eq!(KeywordCategory::from_str("texture"), None);
    }

    #[test]
    fn polarity_accepts_short_forms() {
        assert_eq!(Polarity::from_str("POS"), Some(Polarity::Positive));
        assert_eq!(Polarity::from_str(" negative "), Some(Polarity::Negative));
        assert_eq!(Polarity::from_str("mixed"), None);
    }

    #[test]
    fn source_ref_display() {
        assert_eq!(SourceRef::web(42).to_string(), "web:42");
        assert_eq!(SourceRef::user(7).to_string(), "user:7");
    }

    #[test]
    fn alias_kind_parses_plural_and_location() {
        assert_eq!(AliasKind::from_str("dishes"), Some(AliasKind::Dish));
        assert_eq!(AliasKind::from_str("location"), Some(AliasKind::Restaurant));
    }
}
