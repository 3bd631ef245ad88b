//! DishDive: normalization engine for model-extracted review data
//!
//! Reviews are run through a language model that answers with loosely
//! structured JSON: which dishes a review mentions, at which restaurant,
//! and with which sentiment words. This crate turns that output into a
//! clean relational dataset.
//!
//! # Stages
//!
//! - **Extract**: salvage malformed model output; fall back to rule-based
//!   dish detection when nothing usable remains
//! - **Normalize**: canonicalize names through alias tables and upsert
//!   restaurants, dishes, keywords and their links idempotently
//! - **Aggregate**: recompute dish scores and restaurant summaries
//! - **Alias**: cluster near-duplicate strings into proposals for human
//!   curation, then apply the accepted ones
//!
//! # Example
//!
//! ```
//! use dishdive::{normalize_single, Hints, OpenStore, SingleOutcome, SourceRef, SqliteStore};
//! use dishdive::DomainStore;
//!
//! let store = SqliteStore::open_in_memory().unwrap();
//! let source = SourceRef::web(1);
//! store
//!     .insert_extract(&source, r#"[{"restaurant": "ร้านA", "dish": "ผัดไทย"}]"#)
//!     .unwrap();
//! let outcome = normalize_single(&store, &source, Hints::default(), None).unwrap();
//! assert!(matches!(outcome, SingleOutcome::Normalized { .. }));
//! ```

pub mod aggregate;
pub mod alias;
pub mod config;
pub mod extract;
pub mod llm;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod storage;

pub use aggregate::{compute_aggregates, recompute, Aggregates, DishScore, RestaurantSummary};
pub use alias::{apply_accepted, generate, ApplyOptions, ApplyReport, ClusterOptions, GenerateReport};
pub use config::{Config, ConfigError};
pub use extract::{build_fallback_records, salvage, SalvageResult, SalvageStrategy};
pub use llm::{MockClient, ModelClient, ModelError};
pub use model::{
    AliasCandidate, AliasKind, AliasMapping, ExtractRecord, KeywordCategory, Polarity, SourceRef,
};
pub use normalize::{NormalizationContext, NormalizeStats};
pub use pipeline::{
    normalize_all, normalize_single, BulkOptions, BulkReport, Hints, IngestOptions, IngestPipeline,
    PipelineError, PipelineResult, ReviewInput, SingleOutcome,
};
pub use storage::{DomainStore, ExtractFilter, OpenStore, SqliteStore, StorageError, StorageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
