//! Orchestration: bulk and incremental normalization, and ingest
//!
//! - `bulk`: normalize a slice of stored extracts, then recompute aggregates
//! - `incremental`: normalize one review as soon as its extract lands
//! - `ingest`: run reviews through the model client and store the extracts

mod bulk;
mod incremental;
mod ingest;

pub use bulk::{normalize_all, BulkOptions, BulkReport};
pub use incremental::{normalize_single, Hints, SingleOutcome};
pub use ingest::{
    IngestOptions, IngestOutcome, IngestPipeline, IngestReport, ResponseCache, ReviewInput,
};

use crate::llm::ModelError;
use crate::storage::StorageError;
use thiserror::Error;

/// Errors from the orchestration layer
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("no extract stored for {0}")]
    ExtractNotFound(String),

    #[error("ingest task failed: {0}")]
    Task(String),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
