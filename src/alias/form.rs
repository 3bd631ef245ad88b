//! Comparison forms for alias clustering
//!
//! Clustering never compares raw strings. Each string is reduced to a
//! canonical form (lower-cased, combining marks stripped, known Thai
//! spelling variants folded, punctuation removed) and optionally a
//! phonetic key built from Thai consonant sound classes.

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::char::canonical_combining_class;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

/// Spelling variants of กะเพรา (holy basil), the most common mismatch.
static VARIANTS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new("ผัด?ก[ะ]?ร?ะ?เพร[า]").expect("valid variant regex"),
            "ผัดกะเพรา",
        ),
        (
            Regex::new("ก[ะ]?ร?ะ?เพร[า]").expect("valid variant regex"),
            "กะเพรา",
        ),
    ]
});

static PUNCTUATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r##"[!"#$%&'()*+,./:;<=>?@\[\]^`{|}~\\_-]"##).expect("valid punctuation regex")
});

/// How strings are reduced before comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormOptions {
    /// Split non-Thai text on Unicode word boundaries instead of spaces
    pub word_segmentation: bool,
    /// Sort tokens so word order does not matter
    pub order_insensitive: bool,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            word_segmentation: true,
            order_insensitive: true,
        }
    }
}

pub fn contains_thai(s: &str) -> bool {
    s.chars().any(|c| ('\u{0E00}'..='\u{0E7F}').contains(&c))
}

/// Remove characters with a non-zero canonical combining class after NFKD.
pub fn strip_combining(s: &str) -> String {
    s.nfkd().filter(|c| canonical_combining_class(*c) == 0).collect()
}

/// Lower-case, strip marks, fold variants, drop punctuation, collapse spaces.
pub fn normalize_text(s: &str) -> String {
    let mut t = strip_combining(&s.trim().to_lowercase());
    for (pattern, replacement) in VARIANTS.iter() {
        t = pattern.replace_all(&t, *replacement).into_owned();
    }
    let t = PUNCTUATION.replace_all(&t, " ");
    t.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Tokens of a normalized string, in order.
pub fn tokens(normalized: &str, options: FormOptions) -> Vec<String> {
    // Unicode word boundaries do not split Thai words, so Thai text keeps
    // its explicit spaces as the only token boundary
    if options.word_segmentation && !contains_thai(normalized) {
        normalized.unicode_words().map(str::to_string).collect()
    } else {
        normalized.split_whitespace().map(str::to_string).collect()
    }
}

/// The form two strings must share to be exact duplicates.
pub fn canonical_form(s: &str, options: FormOptions) -> String {
    let mut toks = tokens(&normalize_text(s), options);
    if options.order_insensitive {
        toks.sort();
    }
    toks.join(" ")
}

fn sound_class(c: char) -> Option<char> {
    let class = match c {
        'ก' | 'ข' | 'ฃ' | 'ค' | 'ฅ' | 'ฆ' => 'k',
        'ง' => 'g',
        'จ' | 'ฉ' | 'ช' | 'ฌ' => 'c',
        'ซ' | 'ศ' | 'ษ' | 'ส' => 's',
        'ญ' | 'ย' => 'y',
        'ด' | 'ฎ' | 'ต' | 'ฏ' => 'd',
        'ถ' | 'ท' | 'ธ' | 'ฐ' | 'ฑ' | 'ฒ' => 't',
        'น' | 'ณ' => 'n',
        'บ' => 'b',
        'ป' => 'p',
        'ผ' | 'พ' | 'ภ' => 'q',
        'ฝ' | 'ฟ' => 'f',
        'ม' => 'm',
        'ร' | 'ล' | 'ฬ' => 'r',
        'ว' => 'w',
        'ห' | 'ฮ' => 'h',
        _ => return None,
    };
    Some(class)
}

fn is_thai_consonant(c: char) -> bool {
    ('\u{0E01}'..='\u{0E2E}').contains(&c)
}

/// Key for one token: the first consonant as written, then the sound
/// classes of the rest with repeats collapsed.
fn token_code(tok: &str) -> String {
    let mut chars = tok.chars().skip_while(|c| !is_thai_consonant(*c));
    let Some(first) = chars.next() else {
        return String::new();
    };
    let mut code = String::from(first);
    let mut last = sound_class(first);
    for class in chars.filter_map(sound_class) {
        if last != Some(class) {
            code.push(class);
            last = Some(class);
        }
    }
    code
}

/// Consonant sound-class key for Thai strings; `None` for other scripts.
///
/// Each token keeps its initial consonant literally and maps the
/// following consonants to sound classes; vowels, marks and the silent
/// carrier อ are ignored after the initial. Token keys are sorted so word
/// order does not matter.
pub fn phonetic_key(s: &str, options: FormOptions) -> Option<String> {
    let normalized = normalize_text(s);
    if !contains_thai(&normalized) {
        return None;
    }
    let mut codes: Vec<String> = tokens(&normalized, options)
        .iter()
        .map(|tok| token_code(tok))
        .filter(|code| !code.is_empty())
        .collect();
    if codes.is_empty() {
        return None;
    }
    codes.sort();
    Some(codes.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_marks_are_stripped() {
        assert_eq!(normalize_text("ข้าวผัด"), normalize_text("ขาวผัด"));
        assert_eq!(normalize_text("ไก่ทอด"), "ไกทอด");
    }

    #[test]
    fn basil_variants_fold_together() {
        assert_eq!(normalize_text("ผัดกระเพรา"), "ผัดกะเพรา");
        assert_eq!(normalize_text("ผัดกะเพรา"), "ผัดกะเพรา");
        assert_eq!(normalize_text("ข้าวกระเพราไก่"), normalize_text("ข้าวกะเพราไก่"));
    }

    #[test]
    fn punctuation_and_case() {
        assert_eq!(normalize_text("  Pad-Thai!!  (Large) "), "pad thai large");
    }

    #[test]
    fn canonical_form_ignores_word_order() {
        let opts = FormOptions::default();
        assert_eq!(canonical_form("Thai Pad", opts), canonical_form("pad thai", opts));
        let ordered = FormOptions {
            order_insensitive: false,
            ..opts
        };
        assert_ne!(canonical_form("Thai Pad", ordered), canonical_form("pad thai", ordered));
    }

    #[test]
    fn phonetic_key_groups_same_sounding_consonants() {
        let opts = FormOptions::default();
        // ผ and พ share a sound class after the initial
        assert_eq!(phonetic_key("ข้าวผัด", opts), phonetic_key("ข้าวพัด", opts));
        assert_eq!(phonetic_key("burger", opts), None);
        assert_ne!(phonetic_key("ลาบ", opts), phonetic_key("ส้มตำ", opts));
    }

    #[test]
    fn initial_consonant_is_kept_literally() {
        let opts = FormOptions::default();
        for (a, b) in [("ไก่", "ไข่"), ("เค็ม", "ขม"), ("ไก่ทอด", "ไข่ทอด")] {
            assert_ne!(phonetic_key(a, opts), phonetic_key(b, opts), "{a} / {b}");
        }
        assert_eq!(phonetic_key("ไก่", opts).as_deref(), Some("ก"));
    }
}
