// Retriever module
// Similarity search over indexed chunks for a natural-language query


use std::sync::Arc;

use tracing::debug;

use crate::database::{ChunkStore, SearchResult};
use crate::embeddings::EmbeddingProvider;
use crate::{RagError, Result};

pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn ChunkStore>,
}

impl Retriever {
    #[inline]
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn ChunkStore>) -> Self {
        Self { embedder, store }
    }

    /// Up to `top_k` stored chunks most similar to `query`, best first
    ///
    /// Dependency failures are returned as-is; nothing is retried here.
    #[inline]
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        let query_vector = self
            .embedder
            .embed(vec![query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                RagError::EmbeddingUnavailable("no embedding returned for the query".to_string())
            })?;

        let results = self
            .store
            .search(&query_vector, top_k, self.store.metric())
            .await?;

        debug!("Retrieved {} chunks for query", results.len());
        Ok(results)
    }
}
