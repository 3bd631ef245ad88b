//! String similarity measures over canonical forms

use std::collections::HashSet;

/// Character trigrams. Strings shorter than three characters are their own
/// single gram.
pub fn trigrams(s: &str) -> HashSet<String> {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < 3 {
        return HashSet::from([s.to_string()]);
    }
    chars.windows(3).map(|w| w.iter().collect()).collect()
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let inter = a.intersection(b).count();
    if inter == 0 {
        return 0.0;
    }
    inter as f64 / a.union(b).count() as f64
}

/// 1 - edit distance / longer length, over characters
pub fn levenshtein_ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigram_sets() {
        assert_eq!(trigrams("ab"), HashSet::from(["ab".to_string()]));
        assert_eq!(trigrams("abcd").len(), 2);
        assert_eq!(trigrams("ส้มตำ").len(), 3);
    }

    #[test]
    fn jaccard_bounds() {
        let a = trigrams("abcdef");
        assert_eq!(jaccard(&a, &a), 1.0);
        assert_eq!(jaccard(&a, &trigrams("xyz")), 0.0);
        let half = jaccard(&trigrams("abcd"), &trigrams("bcde"));
        assert!((half - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn levenshtein_ratio_matches_definition() {
        assert_eq!(levenshtein_ratio("abc", "abc"), 1.0);
        assert!((levenshtein_ratio("abcd", "abce") - 0.75).abs() < 1e-9);
        assert_eq!(levenshtein_ratio("", "abc"), 0.0);
    }
}
