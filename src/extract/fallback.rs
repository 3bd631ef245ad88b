//! Rule-based dish detection for reviews the model could not handle
//!
//! Matching is literal substring search over a curated vocabulary, longest
//! names first. A shorter name found only inside text already claimed by a
//! longer match is not reported, so "ต้มยำกุ้ง" does not also yield "ต้มยำ".

use crate::model::ExtractRecord;
use std::ops::Range;
use std::sync::LazyLock;

/// Curated dish names and dish roots, Thai and English.
const CURATED_DISHES: &[&str] = &[
    "ต้มแซ่บกระดูกอ่อน",
    "ก้อยเนื้อย่าง",
    "ยำหอยนางรม",
    "ปากเป็ดทอด",
    "ต้มยำกุ้ง",
    "ลาบหมู",
    "ลาบเป็ด",
    "ปีกไก่ทอด",
    "ข้าวผัด",
    "คอหมูย่าง",
    "ก้อยเนื้อ",
    "ก้อยขม",
    "ต้มขม",
    "ต้มแซ่บ",
    "ส้มตำ",
    "ต้มยำ",
    "ผัดไทย",
    "ข้าวมันไก่",
    "ก๋วยเตี๋ยว",
    "แกงเขียวหวาน",
    "pad thai",
    "tom yum",
    "fried rice",
    "green curry",
    "papaya salad",
    "som tam",
    "ramen",
    "sushi",
    "pizza",
    "burger",
    "steak",
];

/// Generic quality, ambience and price words. Never reported as dishes.
const GENERIC_WORDS: &[&str] = &[
    "อาหาร",
    "อร่อย",
    "บริการ",
    "พนักงาน",
    "ราคา",
    "บรรยากาศ",
    "สะอาด",
    "คิว",
    "ที่จอด",
    "เพลง",
    "รอ",
    "รวดเร็ว",
    "food",
    "service",
    "staff",
    "price",
    "ambience",
    "parking",
    "clean",
    "queue",
];

/// Service, price and ambience words. A review that has some of these and
/// no dish cue is not worth a model call. Food praise is not listed here.
const PREFILTER_GENERIC: &[&str] = &[
    "บริการ",
    "พนักงาน",
    "ราคา",
    "บรรยากาศ",
    "สะอาด",
    "คิว",
    "ที่จอด",
    "เพลง",
    "รอ",
    "รวดเร็ว",
    "service",
    "staff",
    "price",
    "ambience",
    "parking",
    "clean",
    "queue",
];

/// Dish names that only say "food" or "assorted". A model answer made of
/// nothing else is treated as no answer.
const PLACEHOLDER_DISHES: &[&str] = &["เมนูรวม", "เมนูต่างๆ", "อาหารรวม", "อาหาร", "เมนู", "assorted", "food"];

/// Words that suggest a review talks about food.
const DISH_CUES: &[&str] = &[
    "ต้ม", "ผัด", "ทอด", "แกง", "ยำ", "ตำ", "ก๋วยเตี๋ยว", "ข้าว", "ซุป", "ซูชิ", "ราเมง",
    "พิซซ่า", "สเต๊ก", "ส้มตำ", "ต้มยำ", "ไก่", "หมู", "กุ้ง", "ปลา", "พาสต้า", "เบอร์เกอร์",
    "pizza", "sushi", "ramen", "steak", "tom yum", "noodle", "fried", "soup", "pasta", "burger",
];

/// Reviews shorter than this (in characters, after trimming) are skipped.
const MIN_REVIEW_CHARS: usize = 6;

static BY_LENGTH: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    let mut names: Vec<&'static str> = CURATED_DISHES
        .iter()
        .copied()
        .filter(|name| !is_generic(name))
        .collect();
    names.sort_by(|a, b| {
        b.chars()
            .count()
            .cmp(&a.chars().count())
            .then_with(|| a.cmp(b))
    });
    names.dedup();
    names
});

fn is_generic(word: &str) -> bool {
    GENERIC_WORDS.contains(&word)
}

fn overlaps(claimed: &[Range<usize>], span: &Range<usize>) -> bool {
    claimed
        .iter()
        .any(|c| c.start < span.end && span.start < c.end)
}

/// Detect dish names in free text. Order is longest-first; no duplicates.
pub fn extract_dishes_rule_based(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let haystack = text.to_lowercase();
    let mut claimed: Vec<Range<usize>> = Vec::new();
    let mut found = Vec::new();

    for name in BY_LENGTH.iter() {
        let mut hit = false;
        for (start, matched) in haystack.match_indices(name) {
            let span = start..start + matched.len();
            if !overlaps(&claimed, &span) {
                claimed.push(span);
                hit = true;
            }
        }
        if hit {
            found.push(name.to_string());
        }
    }
    found
}

pub fn is_placeholder_dish(dish: &str) -> bool {
    let dish = dish.trim().to_lowercase();
    PLACEHOLDER_DISHES.contains(&dish.as_str())
}

/// Cheap prefilter: skip reviews that are too short, or that only talk
/// about service and ambience without any dish cue.
pub fn should_skip_review(review: &str) -> bool {
    let text = review.trim();
    if text.chars().count() < MIN_REVIEW_CHARS {
        return true;
    }
    let lower = text.to_lowercase();
    if DISH_CUES.iter().any(|cue| lower.contains(cue)) {
        return false;
    }
    PREFILTER_GENERIC.iter().any(|g| lower.contains(g))
}

/// Records for every dish the rule-based detector finds. Sentiment is left
/// empty; an empty vector means nothing qualified.
pub fn build_fallback_records(restaurant: &str, review: &str, cuisine: Option<&str>) -> Vec<ExtractRecord> {
    let restaurant = restaurant.trim();
    if restaurant.is_empty() {
        return Vec::new();
    }
    extract_dishes_rule_based(review)
        .into_iter()
        .map(|dish| {
            let record = ExtractRecord::new(restaurant, dish);
            match cuisine {
                Some(c) => record.with_cuisine(c),
                None => record,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_dishes() {
        assert!(is_placeholder_dish(" เมนูรวม "));
        assert!(is_placeholder_dish("Assorted"));
        assert!(!is_placeholder_dish("ผัดไทย"));
    }

    #[test]
    fn generic_praise_yields_nothing() {
        assert!(extract_dishes_rule_based("อาหารดี บริการเยี่ยม").is_empty());
        assert!(build_fallback_records("ร้านA", "อาหารดี บริการเยี่ยม", Some("thai")).is_empty());
    }

    #[test]
    fn longer_match_claims_its_span() {
        let dishes = extract_dishes_rule_based("ต้มยำกุ้งน้ำข้นอร่อยมาก");
        assert_eq!(dishes, vec!["ต้มยำกุ้ง"]);
    }

    #[test]
    fn separate_occurrence_of_shorter_name_is_kept() {
        let dishes = extract_dishes_rule_based("ต้มยำกุ้งดี แต่ต้มยำไก่ก็ดี");
        assert_eq!(dishes, vec!["ต้มยำกุ้ง", "ต้มยำ"]);
    }

    #[test]
    fn english_roots_are_case_insensitive() {
        let dishes = extract_dishes_rule_based("The Pad Thai and fried rice were great");
        assert_eq!(dishes, vec!["fried rice", "pad thai"]);
    }

    #[test]
    fn each_name_reported_once() {
        let dishes = extract_dishes_rule_based("ส้มตำ ส้มตำ ส้มตำ");
        assert_eq!(dishes, vec!["ส้มตำ"]);
    }

    #[test]
    fn fallback_records_carry_cuisine_and_empty_sentiment() {
        let records = build_fallback_records(" ร้านลาบ ", "ลาบหมูเด็ดมาก", Some("Thai"));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].restaurant, "ร้านลาบ");
        assert_eq!(records[0].dish, "ลาบหมู");
        assert_eq!(records[0].cuisine.as_deref(), Some("thai"));
        assert!(records[0].sentiment.is_empty());
    }

    #[test]
    fn prefilter() {
        assert!(should_skip_review("ดีมาก"));
        assert!(should_skip_review("พนักงานบริการดีมากครับ"));
        assert!(!should_skip_review("ผัดไทยอร่อย บริการดี"));
        assert!(!should_skip_review("ร้านนี้มาบ่อยมากครับ"));
    }

    #[test]
    fn food_praise_without_dish_cue_reaches_the_model() {
        assert!(!should_skip_review("เกี๊ยวซ่าอร่อยมาก"));
        assert!(!should_skip_review("ชาบูอร่อยมากค่ะ"));
        assert!(should_skip_review("บรรยากาศดี ที่จอดรถเยอะ"));
    }
}
