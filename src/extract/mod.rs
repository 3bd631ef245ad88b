//! Turning model output into records
//!
//! - `salvage`: ordered recovery strategies for malformed JSON-like text
//! - `literal`: reader for Python literal syntax found in older rows
//! - `fallback`: rule-based dish detection when the model output is unusable

mod fallback;
mod literal;
mod repair;
mod salvage;

pub use fallback::{
    build_fallback_records, extract_dishes_rule_based, is_placeholder_dish, should_skip_review,
};
pub use literal::{parse_literal, LiteralError};
pub use repair::{has_unterminated_string, is_balanced, strip_code_fences};
pub use salvage::{into_records, salvage, SalvageResult, SalvageStrategy};
