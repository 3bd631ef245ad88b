//! Model client: the boundary to whatever produces extraction text
//!
//! The ingest pipeline only needs "give me extraction text for this review".
//! How the model is reached (HTTP, local server, retries, rate limits,
//! timeouts) belongs to the implementation of `ModelClient`.
//! `MockClient` returns preconfigured responses for tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Errors from model client operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("model not available: {0}")]
    Unavailable(String),
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("completion failed: {0}")]
    CompletionFailed(String),
}

/// Produces raw extraction text for one review.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Ask the model to extract dish mentions from `review`.
    ///
    /// The returned text is expected to be a JSON array of records but is
    /// not trusted; callers run it through the salvage parser.
    async fn complete(&self, restaurant: &str, review: &str) -> Result<String, ModelError>;
}

/// Mock client for testing.
pub struct MockClient {
    available: bool,
    responses: HashMap<String, Result<String, ModelError>>,
    default_response: Option<String>,
    calls: AtomicUsize,
}

impl MockClient {
    /// A mock that answers every review it has a response for.
    pub fn available() -> Self {
        Self {
            available: true,
            responses: HashMap::new(),
            default_response: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A mock that fails every call.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::available()
        }
    }

    /// Register the response for one review text.
    pub fn with_response(mut self, review: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses.insert(review.into(), Ok(response.into()));
        self
    }

    /// Register a failure for one review text.
    pub fn with_failure(mut self, review: impl Into<String>, error: ModelError) -> Self {
        self.responses.insert(review.into(), Err(error));
        self
    }

    /// Response for reviews without a registered one.
    pub fn with_default(mut self, response: impl Into<String>) -> Self {
        self.default_response = Some(response.into());
        self
    }

    /// Number of `complete` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for MockClient {
    async fn complete(&self, _restaurant: &str, review: &str) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.available {
            return Err(ModelError::Unavailable(
                "mock client configured as unavailable".to_string(),
            ));
        }
        match self.responses.get(review) {
            Some(response) => response.clone(),
            None => self.default_response.clone().ok_or_else(|| {
                ModelError::CompletionFailed(format!("no mock response for review {review:?}"))
            }),
        }
    }
}
