//! Extraction records: the validated form of one dish mention
//!
//! Model output arrives as loosely shaped JSON objects. `ExtractRecord::from_value`
//! turns one object into either a validated record or a `SkipReason`, so
//! malformed input is reported as data instead of being silently coalesced.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys that may carry the dish name. Thai keys appear when the model
/// answers in the review's language.
const DISH_KEYS: &[&str] = &["dish", "เมนู", "ชื่อเมนู"];

/// Verbatim sentiment words the model attached to a dish mention
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentiment {
    #[serde(default)]
    pub positive: Vec<String>,
    #[serde(default)]
    pub negative: Vec<String>,
}

impl Sentiment {
    pub fn is_empty(&self) -> bool {
        self.positive.is_empty() && self.negative.is_empty()
    }
}

/// A validated extraction record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractRecord {
    pub restaurant: String,
    pub dish: String,
    pub cuisine: Option<String>,
    pub restriction: Option<String>,
    #[serde(default)]
    pub sentiment: Sentiment,
}

/// Why a raw record was not turned into an `ExtractRecord`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotAnObject,
    MissingRestaurant,
    MissingDish,
    MissingRestaurantAndDish,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "not an object"),
            Self::MissingRestaurant => write!(f, "missing restaurant"),
            Self::MissingDish => write!(f, "missing dish"),
            Self::MissingRestaurantAndDish => write!(f, "missing restaurant and dish"),
        }
    }
}

/// Result of validating one raw record
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Ok(ExtractRecord),
    Skip(SkipReason),
}

impl ExtractRecord {
    pub fn new(restaurant: impl Into<String>, dish: impl Into<String>) -> Self {
        Self {
            restaurant: restaurant.into(),
            dish: dish.into(),
            cuisine: None,
            restriction: None,
            sentiment: Sentiment::default(),
        }
    }

    pub fn with_cuisine(mut self, cuisine: impl Into<String>) -> Self {
        self.cuisine = normalize_attribute(Some(cuisine.into()));
        self
    }

    pub fn with_restriction(mut self, restriction: impl Into<String>) -> Self {
        self.restriction = normalize_attribute(Some(restriction.into()));
        self
    }

    pub fn with_positive<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sentiment.positive.extend(words.into_iter().map(Into::into));
        self
    }

    pub fn with_negative<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sentiment.negative.extend(words.into_iter().map(Into::into));
        self
    }

    /// Validate a raw JSON record.
    ///
    /// Key names are compacted (legacy rows carry keys like `"cui  sine"`),
    /// cuisine/restriction are lower-cased with blanks mapped to `None`, and
    /// a missing restaurant is filled from `restaurant_hint` when given.
    pub fn from_value(value: &Value, restaurant_hint: Option<&str>) -> RecordOutcome {
        let Some(obj) = value.as_object() else {
            return RecordOutcome::Skip(SkipReason::NotAnObject);
        };
        let fields = compact_keys(obj);

        let mut restaurant = fields
            .get("restaurant")
            .and_then(scalar_to_string)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if restaurant.is_empty() {
            if let Some(hint) = restaurant_hint {
                restaurant = hint.trim().to_string();
            }
        }

        let dish = DISH_KEYS
            .iter()
            .filter_map(|k| fields.get(*k).and_then(scalar_to_string))
            .map(|s| s.trim().to_string())
            .find(|s| !s.is_empty())
            .unwrap_or_default();

        match (restaurant.is_empty(), dish.is_empty()) {
            (true, true) => return RecordOutcome::Skip(SkipReason::MissingRestaurantAndDish),
            (true, false) => return RecordOutcome::Skip(SkipReason::MissingRestaurant),
            (false, true) => return RecordOutcome::Skip(SkipReason::MissingDish),
            (false, false) => {}
        }

        RecordOutcome::Ok(ExtractRecord {
            restaurant,
            dish,
            cuisine: normalize_attribute(fields.get("cuisine").and_then(scalar_to_string)),
            restriction: normalize_attribute(fields.get("restriction").and_then(scalar_to_string)),
            sentiment: fields.get("sentiment").map(parse_sentiment).unwrap_or_default(),
        })
    }
}

/// Lower-case and trim an attribute; blank and null-like strings become `None`.
pub fn normalize_attribute(value: Option<String>) -> Option<String> {
    let v = value?.trim().to_lowercase();
    match v.as_str() {
        "" | "null" | "none" | "n/a" => None,
        _ => Some(v),
    }
}

fn compact_keys(obj: &Map<String, Value>) -> Map<String, Value> {
    obj.iter()
        .map(|(k, v)| (compact(k), v.clone()))
        .collect()
}

fn compact(key: &str) -> String {
    key.chars().filter(|c| !c.is_whitespace()).collect()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn tokens(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(scalar_to_string)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        other => scalar_to_string(other)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .into_iter()
            .collect(),
    }
}

/// Read the sentiment object, recovering corrupted key names such as
/// `"p   positive"` by matching on the compacted key.
fn parse_sentiment(value: &Value) -> Sentiment {
    let Some(obj) = value.as_object() else {
        return Sentiment::default();
    };
    let mut sentiment = Sentiment::default();
    for (key, v) in obj {
        let key = compact(key).to_lowercase();
        if key == "positive" || (key.contains("pos") && sentiment.positive.is_empty()) {
            sentiment.positive = tokens(v);
        } else if key == "negative" || (key.contains("neg") && sentiment.negative.is_empty()) {
            sentiment.negative = tokens(v);
        }
    }
    sentiment
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok(outcome: RecordOutcome) -> ExtractRecord {
        match outcome {
            RecordOutcome::Ok(r) => r,
            RecordOutcome::Skip(reason) => panic!("unexpected skip: {reason}"),
        }
    }

    #[test]
    fn well_formed_record_validates() {
        let rec = ok(ExtractRecord::from_value(
            &json!({
                "restaurant": " ร้านป้าแดง ",
                "dish": "ต้มยำกุ้ง",
                "cuisine": "Thai",
                "restriction": null,
                "sentiment": {"positive": ["อร่อย", " "], "negative": []}
            }),
            None,
        ));
        assert_eq!(rec.restaurant, "ร้านป้าแดง");
        assert_eq!(rec.dish, "ต้มยำกุ้ง");
        assert_eq!(rec.cuisine.as_deref(), Some("thai"));
        assert_eq!(rec.restriction, None);
        assert_eq!(rec.sentiment.positive, vec!["อร่อย"]);
    }

    #[test]
    fn corrupted_keys_are_compacted() {
        let rec = ok(ExtractRecord::from_value(
            &json!({
                "rest aurant": "A",
                "di sh": "ข้าวผัด",
                "cui  sine": "thai",
                "sentiment": {"p   positive": ["หอม"], "n egative": ["เค็ม"]}
            }),
            None,
        ));
        assert_eq!(rec.dish, "ข้าวผัด");
        assert_eq!(rec.cuisine.as_deref(), Some("thai"));
        assert_eq!(rec.sentiment.positive, vec!["หอม"]);
        assert_eq!(rec.sentiment.negative, vec!["เค็ม"]);
    }

    #[test]
    fn thai_dish_key_is_accepted() {
        let rec = ok(ExtractRecord::from_value(
            &json!({"restaurant": "A", "เมนู": "ส้มตำ"}),
            None,
        ));
        assert_eq!(rec.dish, "ส้มตำ");
    }

    #[test]
    fn skip_reasons() {
        assert_eq!(
            ExtractRecord::from_value(&json!("dish"), None),
            RecordOutcome::Skip(SkipReason::NotAnObject)
        );
        assert_eq!(
            ExtractRecord::from_value(&json!({"restaurant": " ", "dish": ""}), None),
            RecordOutcome::Skip(SkipReason::MissingRestaurantAndDish)
        );
        assert_eq!(
            ExtractRecord::from_value(&json!({"dish": "ลาบหมู"}), None),
            RecordOutcome::Skip(SkipReason::MissingRestaurant)
        );
        assert_eq!(
            ExtractRecord::from_value(&json!({"restaurant": "A"}), None),
            RecordOutcome::Skip(SkipReason::MissingDish)
        );
    }

    #[test]
    fn restaurant_hint_fills_missing_restaurant() {
        let rec = ok(ExtractRecord::from_value(&json!({"dish": "ลาบหมู"}), Some("ร้านลาบ")));
        assert_eq!(rec.restaurant, "ร้านลาบ");
    }

    #[test]
    fn null_like_attributes_become_none() {
        assert_eq!(normalize_attribute(Some("  ".into())), None);
        assert_eq!(normalize_attribute(Some("None".into())), None);
        assert_eq!(normalize_attribute(Some(" Halal ".into())).as_deref(), Some("halal"));
    }

    #[test]
    fn single_string_sentiment_becomes_one_token() {
        let rec = ok(ExtractRecord::from_value(
            &json!({"restaurant": "A", "dish": "B", "sentiment": {"positive": "กรอบ"}}),
            None,
        ));
        assert_eq!(rec.sentiment.positive, vec!["กรอบ"]);
    }
}
