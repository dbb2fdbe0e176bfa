// In-memory stand-ins for the embedding, store and completion seams

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::completion::CompletionProvider;
use crate::database::{ChunkStore, SearchResult, SimilarityMetric, VectorRecord};
use crate::embeddings::EmbeddingProvider;
use crate::{RagError, Result};

/// Deterministic embedder: each text maps to byte-frequency buckets
pub struct FakeEmbedder {
    pub dimension: usize,
    pub fail: bool,
    /// Produce vectors of this length instead of `dimension`
    pub wrong_dimension: Option<usize>,
    pub calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail: false,
            wrong_dimension: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(dimension: usize) -> Self {
        Self {
            fail: true,
            ..Self::new(dimension)
        }
    }

    pub fn vector_for(text: &str, dimension: usize) -> Vec<f32> {
        let mut vector = vec![0.0; dimension];
        for byte in text.bytes() {
            vector[byte as usize % dimension] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RagError::EmbeddingUnavailable("model offline".to_string()));
        }
        let length = self.wrong_dimension.unwrap_or(self.dimension);
        Ok(texts
            .iter()
            .map(|text| Self::vector_for(text, length))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Store holding records in a vector, ranked by dot product
pub struct MemoryStore {
    pub dimension: usize,
    pub records: Mutex<Vec<VectorRecord>>,
    pub fail_inserts: bool,
    /// Every operation in call order, e.g. `delete:a.txt`
    pub operations: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: Mutex::new(Vec::new()),
            fail_inserts: false,
            operations: Mutex::new(Vec::new()),
        }
    }

    pub fn chunks_for(&self, filename: &str) -> Vec<String> {
        self.records
            .lock()
            .expect("store lock")
            .iter()
            .filter(|r| r.filename == filename)
            .map(|r| r.chunk.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("store lock").len()
    }

    pub fn operations(&self) -> Vec<String> {
        self.operations.lock().expect("ops lock").clone()
    }

    fn log(&self, operation: String) {
        self.operations.lock().expect("ops lock").push(operation);
    }
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn insert(&self, records: Vec<VectorRecord>) -> Result<()> {
        self.log(format!("insert:{}", records.len()));
        if self.fail_inserts {
            return Err(RagError::StoreUnavailable("connection lost".to_string()));
        }
        for record in &records {
            record.validate(self.dimension)?;
        }
        self.records.lock().expect("store lock").extend(records);
        Ok(())
    }

    async fn delete_by_filename(&self, filename: &str) -> Result<()> {
        self.log(format!("delete:{filename}"));
        self.records
            .lock()
            .expect("store lock")
            .retain(|r| r.filename != filename);
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        metric: SimilarityMetric,
    ) -> Result<Vec<SearchResult>> {
        self.log(format!("search:{top_k}"));
        if metric != SimilarityMetric::InnerProduct {
            return Err(RagError::StoreSchemaViolation(format!("metric {metric}")));
        }
        let mut results: Vec<SearchResult> = self
            .records
            .lock()
            .expect("store lock")
            .iter()
            .map(|r| SearchResult {
                score: r.embedding.iter().zip(query_vector).map(|(a, b)| a * b).sum(),
                chunk: r.chunk.clone(),
                filename: r.filename.clone(),
            })
            .collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);
        Ok(results)
    }

    async fn scan_all(&self, limit: usize) -> Result<Vec<String>> {
        self.log(format!("scan:{limit}"));
        Ok(self
            .records
            .lock()
            .expect("store lock")
            .iter()
            .take(limit)
            .map(|r| r.chunk.clone())
            .collect())
    }

    fn metric(&self) -> SimilarityMetric {
        SimilarityMetric::InnerProduct
    }
}

/// Completion provider replying from a script and recording every call
pub struct ScriptedCompleter {
    /// Reply to the strategy classification request
    pub classification: String,
    pub answer: String,
    pub fail: bool,
    /// `(system, prompt)` pairs in call order
    pub calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedCompleter {
    pub fn new(classification: &str, answer: &str) -> Self {
        Self {
            classification: classification.to_string(),
            answer: answer.to_string(),
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompleter {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((system.to_string(), prompt.to_string()));
        if self.fail {
            return Err(RagError::CompletionUnavailable("HTTP 503".to_string()));
        }
        if prompt.contains("Respond only with") {
            Ok(self.classification.clone())
        } else {
            Ok(self.answer.clone())
        }
    }
}
