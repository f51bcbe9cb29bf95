//! Embedding generation for semantic search.
//!
//! Providers do a single attempt; [`Embedder`] wraps one with the shared
//! backoff policy so that a chunk either gets a vector or a plain `Err`.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::retry::{with_backoff, RetryPolicy};
use crate::error::{AppError, Result};

/// What the text being embedded is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskHint {
    /// A stored document chunk
    Document,
    /// A live search query
    Query,
}

/// Failure of a single provider call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Unavailable, deadline exceeded, or rate limited
    #[error("transient: {0}")]
    Transient(String),
    /// Anything a retry will not fix
    #[error("{0}")]
    Fatal(String),
}

impl ProviderError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier of the model producing the vectors
    fn model_id(&self) -> &str;

    /// Embed one text with a single attempt
    async fn embed(&self, text: &str, hint: TaskHint) -> std::result::Result<Vec<f32>, ProviderError>;
}

/// Embedding client with retry and exponential backoff
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    policy: RetryPolicy,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    /// Embed `text`, retrying transient provider failures.
    ///
    /// Exhausted retries and non-transient failures both come back as
    /// [`AppError::Embedding`].
    pub async fn embed(&self, text: &str, hint: TaskHint) -> Result<Vec<f32>> {
        let vector = with_backoff(
            &self.policy,
            "embedding request",
            ProviderError::is_transient,
            || self.provider.embed(text, hint),
        )
        .await
        .map_err(|e| AppError::Embedding(e.to_string()))?;

        if vector.is_empty() {
            return Err(AppError::Embedding("provider returned an empty vector".into()));
        }
        debug!("Embedded {} chars into {} dims", text.len(), vector.len());
        Ok(vector)
    }

    /// Embed a search query
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed(query, TaskHint::Query).await
    }
}
