use std::sync::Arc;

use super::embedder::Embedder;
use super::search_index::{SearchHit, SearchIndex};
use crate::error::{AppError, Result};

/// Query engine over a published search index
#[derive(Clone)]
pub struct Searcher {
    embedder: Arc<Embedder>,
}

impl Searcher {
    pub fn new(embedder: Arc<Embedder>) -> Self {
        Self { embedder }
    }

    /// Embed `query` and return the `k` nearest chunks.
    ///
    /// A missing index is reported as [`AppError::IndexNotReady`] before the
    /// query is embedded, so callers can tell "no index yet" from "no
    /// matches". An index built by another embedding model is refused with
    /// [`AppError::EmbeddingModelChanged`].
    pub async fn search(
        &self,
        index: Option<Arc<SearchIndex>>,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchHit>> {
        let index = index
            .filter(|index| !index.is_empty())
            .ok_or(AppError::IndexNotReady)?;
        if let Some(stored) = index.embedding_model() {
            if stored != self.embedder.model_id() {
                return Err(AppError::EmbeddingModelChanged {
                    stored: stored.to_string(),
                    configured: self.embedder.model_id().to_string(),
                });
            }
        }

        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidQuery("query is empty".into()));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed_query(query).await?;
        index.search(&vector, k)
    }
}
