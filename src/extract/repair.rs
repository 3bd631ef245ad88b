//! Text-level cleanup used by the salvage strategies
//!
//! The balance and quote checks are character counters, not a tokenizer:
//! brackets inside string values count toward the balance. They gate parse
//! attempts; a false rejection only means a later strategy gets the text.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static ARRAY_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[.*\]").expect("valid array span regex"));
static OBJECT_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid object span regex"));
static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(^|[\s,\[{])//[^\n]*$").expect("valid comment regex"));
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("valid trailing comma regex"));
static BARE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([{,]\s*)([^\s"':,{}\[\]]+)\s*:"#).expect("valid bare key regex")
});
static SPLIT_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'\s+'([^'\s]+)'").expect("valid split value regex"));
static CUISINE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'cui\s+i?sine'").expect("valid cuisine key regex"));
static SPACED_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(['"])([A-Za-z_]+(?:\s+[A-Za-z_]+)+)(['"])(\s*:)"#)
        .expect("valid spaced key regex")
});

/// Remove a surrounding Markdown code fence (```` ```json ```` or ```` ``` ````).
pub fn strip_code_fences(text: &str) -> &str {
    let mut t = text.trim();
    if let Some(rest) = t.strip_prefix("```") {
        // Drop the info string on the opening fence line
        t = match rest.find('\n') {
            Some(nl) if rest[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
                &rest[nl + 1..]
            }
            _ => rest.strip_prefix("json").unwrap_or(rest),
        };
    }
    if let Some(rest) = t.trim_end().strip_suffix("```") {
        t = rest;
    }
    t.trim()
}

/// The outermost `[...]` span, or failing that the outermost `{...}` span.
pub fn outermost_span(text: &str) -> Option<&str> {
    ARRAY_SPAN
        .find(text)
        .or_else(|| OBJECT_SPAN.find(text))
        .map(|m| m.as_str())
}

/// Bracket balance check over `{}` and `[]`.
pub fn is_balanced(text: &str) -> bool {
    let mut stack = Vec::new();
    for c in text.chars() {
        match c {
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return false;
                }
            }
            _ => {}
        }
    }
    stack.is_empty()
}

/// Odd number of unescaped double quotes.
pub fn has_unterminated_string(text: &str) -> bool {
    let mut count = 0usize;
    let mut escaped = false;
    for c in text.chars() {
        match c {
            '\\' if !escaped => escaped = true,
            '"' if !escaped => count += 1,
            _ => escaped = false,
        }
    }
    count % 2 != 0
}

/// Both gates that run before any JSON parse attempt.
pub fn passes_gate(candidate: &str) -> bool {
    is_balanced(candidate) && !has_unterminated_string(candidate)
}

/// Make near-JSON parseable: strip `//` comments, drop trailing commas,
/// convert single quotes to double quotes and quote bare keys.
pub fn repair_keys(text: &str) -> String {
    let s = LINE_COMMENT.replace_all(text, "$1");
    let s = TRAILING_COMMA.replace_all(&s, "$1");
    let s = s.replace('\'', "\"");
    let s = BARE_KEY.replace_all(&s, "$1\"$2\":");
    TRAILING_COMMA.replace_all(&s, "$1").into_owned()
}

/// Undo corruption seen in historically stored rows: whitespace injected
/// inside key names, a value split into `' 'thai'`, and arrays cut off
/// mid-record.
pub fn repair_known_corruption(text: &str) -> String {
    let s = SPLIT_VALUE.replace_all(text, "'$1'");
    let s = CUISINE_KEY.replace_all(&s, "'cuisine'");
    let s = SPACED_KEY.replace_all(&s, |caps: &Captures| {
        let key: String = caps[2].chars().filter(|c| !c.is_whitespace()).collect();
        format!("{}{}{}{}", &caps[1], key, &caps[3], &caps[4])
    });
    close_truncated_array(&s)
}

/// For text that opens an array but never closes it, keep everything up to
/// the last complete top-level object and close the array.
fn close_truncated_array(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with('[') || is_balanced(trimmed) {
        return trimmed.to_string();
    }
    let mut depth = 0i32;
    let mut last_complete = None;
    for (i, c) in trimmed.char_indices() {
        match c {
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth -= 1;
                if c == '}' && depth == 1 {
                    last_complete = Some(i);
                }
            }
            _ => {}
        }
    }
    match last_complete {
        Some(end) => format!("{}]", &trimmed[..=end]),
        None => trimmed.to_string(),
    }
}
