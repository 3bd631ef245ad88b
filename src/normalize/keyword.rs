//! Keyword categorization from curated vocabularies

use crate::model::{KeywordCategory, Polarity};

const COST_POSITIVE: &[&str] = &[
    "ถูก",
    "ไม่แพง",
    "คุ้ม",
    "คุ้มค่า",
    "คุ้มราคา",
    "ราคาดี",
    "ราคาถูก",
    "ราคาคุ้มค่า",
    "คุ้มจริง",
    "คุ้มมาก",
    "ราคาสมเหตุสมผล",
    "สมราคา",
];

const COST_NEGATIVE: &[&str] = &[
    "แพง",
    "ราคาแพง",
    "ไม่คุ้ม",
    "ไม่คุ้มค่า",
    "เกินราคา",
    "ราคาแรง",
    "แพงไป",
    "แพงมาก",
];

const FLAVOR_POSITIVE: &[&str] = &[
    "อร่อย",
    "ดี",
    "ดีมาก",
    "เด็ด",
    "แซ่บ",
    "กรอบ",
    "นุ่ม",
    "หอม",
    "เข้มข้น",
    "สด",
    "หวาน",
    "กลมกล่อม",
    "เด้ง",
    "ฉ่ำ",
    "ละมุน",
    "หอมนุ่ม",
];

const FLAVOR_NEGATIVE: &[&str] = &[
    "เค็ม",
    "จืด",
    "คาว",
    "เหนียว",
    "หวานไป",
    "เผ็ดไป",
    "ไม่อร่อย",
    "มันไป",
    "เลี่ยน",
    "ไหม้",
    "ดิบ",
    "แฉะ",
];

/// Substrings that mark a token as being about price.
const PRICE_CUES: &[&str] = &["ราคา", "คุ้ม", "แพง", "ถูก"];

/// Category and polarity for a sentiment token.
///
/// Curated words carry their own polarity. Anything else takes the polarity
/// of the list it came from, or neutral when there is no hint.
pub fn categorize_keyword(token: &str, hint: Option<Polarity>) -> (KeywordCategory, Polarity) {
    let t = token.trim().to_lowercase();
    let fallback = hint.unwrap_or(Polarity::Neutral);
    if t.is_empty() {
        return (KeywordCategory::Others, fallback);
    }
    let t = t.as_str();

    if COST_POSITIVE.contains(&t) {
        return (KeywordCategory::Cost, Polarity::Positive);
    }
    if COST_NEGATIVE.contains(&t) {
        return (KeywordCategory::Cost, Polarity::Negative);
    }
    if FLAVOR_POSITIVE.contains(&t) {
        return (KeywordCategory::Flavor, Polarity::Positive);
    }
    if FLAVOR_NEGATIVE.contains(&t) {
        return (KeywordCategory::Flavor, Polarity::Negative);
    }
    if PRICE_CUES.iter().any(|cue| t.contains(cue)) {
        return (KeywordCategory::Cost, fallback);
    }
    (KeywordCategory::Others, fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curated_words_override_hint() {
        assert_eq!(
            categorize_keyword("แพง", Some(Polarity::Positive)),
            (KeywordCategory::Cost, Polarity::Negative)
        );
        assert_eq!(
            categorize_keyword(" อร่อย ", Some(Polarity::Negative)),
            (KeywordCategory::Flavor, Polarity::Positive)
        );
        assert_eq!(
            categorize_keyword("เค็ม", None),
            (KeywordCategory::Flavor, Polarity::Negative)
        );
    }

    #[test]
    fn price_substring_becomes_cost_with_hint() {
        assert_eq!(
            categorize_keyword("ราคาเป็นมิตร", Some(Polarity::Positive)),
            (KeywordCategory::Cost, Polarity::Positive)
        );
        assert_eq!(
            categorize_keyword("ราคากลางๆ", None),
            (KeywordCategory::Cost, Polarity::Neutral)
        );
    }

    #[test]
    fn everything_else_is_others() {
        assert_eq!(
            categorize_keyword("จานใหญ่", Some(Polarity::Positive)),
            (KeywordCategory::Others, Polarity::Positive)
        );
        assert_eq!(
            categorize_keyword("", None),
            (KeywordCategory::Others, Polarity::Neutral)
        );
    }
}
