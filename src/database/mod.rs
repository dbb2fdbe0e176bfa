// Database module
// Record schema and the vector store seam; LanceDB is the backing engine

pub mod lancedb;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{RagError, Result};

pub use self::lancedb::VectorStore;

/// Storage limit of the `id` column
pub const MAX_ID_CHARS: usize = 64;
/// Storage limit of the `filename` column
pub const MAX_FILENAME_CHARS: usize = 200;
/// Storage limit of the `chunk` column
pub const MAX_CHUNK_CHARS: usize = 1000;

/// One stored chunk of a document
///
/// A document is the set of records sharing a `filename`. Records are never
/// updated in place: re-indexing deletes them all and inserts new ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Random identifier generated at insert time, never derived from content
    pub id: String,
    pub filename: String,
    pub chunk: String,
    pub embedding: Vec<f32>,
}

impl VectorRecord {
    /// Build a record with a fresh v4 UUID
    #[inline]
    pub fn new(filename: impl Into<String>, chunk: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            filename: filename.into(),
            chunk: chunk.into(),
            embedding,
        }
    }

    /// Check the record against the storage schema
    #[inline]
    pub fn validate(&self, dimension: usize) -> Result<()> {
        if self.embedding.len() != dimension {
            return Err(RagError::StoreSchemaViolation(format!(
                "embedding for a chunk of '{}' has {} dimensions, expected {}",
                self.filename,
                self.embedding.len(),
                dimension
            )));
        }
        if self.id.is_empty() || self.id.chars().count() > MAX_ID_CHARS {
            return Err(RagError::StoreSchemaViolation(format!(
                "id '{}' must be between 1 and {MAX_ID_CHARS} characters",
                self.id
            )));
        }
        validate_filename(&self.filename)?;
        let chunk_chars = self.chunk.chars().count();
        if chunk_chars > MAX_CHUNK_CHARS {
            return Err(RagError::StoreSchemaViolation(format!(
                "chunk of '{}' has {chunk_chars} characters, limit is {MAX_CHUNK_CHARS}",
                self.filename
            )));
        }
        Ok(())
    }
}

/// Reject filenames the `filename` column cannot hold
#[inline]
pub fn validate_filename(filename: &str) -> Result<()> {
    let filename_chars = filename.chars().count();
    if filename_chars > MAX_FILENAME_CHARS {
        return Err(RagError::StoreSchemaViolation(format!(
            "filename has {filename_chars} characters, limit is {MAX_FILENAME_CHARS}"
        )));
    }
    Ok(())
}

/// A ranked match from a similarity search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// Larger is more similar; the range depends on the metric
    pub score: f32,
    pub chunk: String,
    pub filename: String,
}

/// Similarity metric shared by index creation and search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Dot product, unbounded and not normalized
    #[default]
    InnerProduct,
    Cosine,
    L2,
}

impl std::fmt::Display for SimilarityMetric {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::InnerProduct => "inner_product",
            Self::Cosine => "cosine",
            Self::L2 => "l2",
        };
        f.write_str(name)
    }
}

/// Operations the indexer and retriever need from a vector store
///
/// After `insert` or `delete_by_filename` returns, the change is visible to
/// every later `search` and `scan_all` call.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Store a batch of records; any schema violation rejects the whole batch
    async fn insert(&self, records: Vec<VectorRecord>) -> Result<()>;

    /// Remove every record whose filename equals `filename` exactly
    ///
    /// Matching nothing is not an error.
    async fn delete_by_filename(&self, filename: &str) -> Result<()>;

    /// Up to `top_k` records ordered by descending score
    ///
    /// `metric` must be the metric the store was configured with.
    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        metric: SimilarityMetric,
    ) -> Result<Vec<SearchResult>>;

    /// Unranked read of up to `limit` chunk texts across all documents
    async fn scan_all(&self, limit: usize) -> Result<Vec<String>>;

    fn metric(&self) -> SimilarityMetric;
}
