// Embeddings module
// Text chunking and the embedding gateway used by indexing and retrieval

pub mod chunking;
pub mod ollama;

use async_trait::async_trait;

use crate::Result;

pub use chunking::{ChunkingConfig, chunk_spans, split_into_chunks};
pub use ollama::OllamaClient;

/// Maps texts to fixed-length vectors
///
/// One vector per input, in input order. Implementations report an
/// unreachable or failing model as [`crate::RagError::EmbeddingUnavailable`].
/// Callers should pass every chunk of a document in a single call.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Length of every vector this provider produces
    fn dimension(&self) -> usize;
}
