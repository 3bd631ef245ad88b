//! Canonicalization and idempotent upsert of domain entities

mod canonical;
mod context;
mod keyword;

pub use canonical::{canonical_name, clean_name, signature, AliasTable};
pub use context::{ExtractPayload, NormalizationContext, NormalizeStats, Upserted};
pub use keyword::categorize_keyword;
