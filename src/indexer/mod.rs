// Indexer module
// Turns (filename, text) pairs into stored chunk embeddings


use std::path::{Path, PathBuf};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::database::{ChunkStore, VectorRecord, validate_filename};
use crate::embeddings::EmbeddingProvider;
use crate::embeddings::chunking::{ChunkingConfig, split_into_chunks};
use crate::{RagError, Result};

/// Extension of the files picked up by directory ingestion
const TEXT_EXTENSION: &str = "txt";

/// Re-indexes documents with delete-before-insert consistency
///
/// The indexer holds no per-document state. Callers must not run two
/// `reindex` calls for the same filename at once; different filenames may be
/// indexed in parallel.
pub struct Indexer {
    chunking: ChunkingConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn ChunkStore>,
}

/// Outcome of ingesting a directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexingStats {
    pub files_indexed: usize,
    pub files_failed: usize,
    pub chunks_stored: usize,
}

impl Indexer {
    #[inline]
    pub fn new(
        chunking: ChunkingConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn ChunkStore>,
    ) -> Self {
        Self {
            chunking,
            embedder,
            store,
        }
    }

    /// Replace everything stored for `filename` with the chunks of `raw_text`
    ///
    /// Existing records are deleted first. If embedding or inserting fails
    /// afterwards the document is left with no records, never a mix of old and
    /// new chunks. Empty text leaves the document deleted and returns 0.
    #[inline]
    pub async fn reindex(&self, filename: &str, raw_text: &str) -> Result<usize> {
        validate_filename(filename)?;
        // Checked before the delete so a bad config cannot wipe a document
        self.chunking.validate()?;

        self.store.delete_by_filename(filename).await?;
        debug!("Cleared previous records for {}", filename);

        let chunks = split_into_chunks(raw_text, &self.chunking)?;
        if chunks.is_empty() {
            info!("{} has no content, nothing stored", filename);
            return Ok(0);
        }

        let embeddings = self.embedder.embed(chunks.clone()).await?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::EmbeddingUnavailable(format!(
                "requested {} embeddings, received {}",
                chunks.len(),
                embeddings.len()
            )));
        }

        let records: Vec<VectorRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| VectorRecord::new(filename, chunk, embedding))
            .collect();
        let count = records.len();

        self.store.insert(records).await?;

        info!("Indexed {} chunks for {}", count, filename);
        Ok(count)
    }

    /// Remove a document from the store
    #[inline]
    pub async fn delete_document(&self, filename: &str) -> Result<()> {
        self.store.delete_by_filename(filename).await?;
        info!("Deleted document {}", filename);
        Ok(())
    }

    /// Read a UTF-8 text file and index it under its base name
    #[inline]
    pub async fn index_file(&self, path: &Path) -> Result<usize> {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| RagError::Config(format!("{} has no file name", path.display())))?;

        let text = fs::read_to_string(path).await?;
        self.reindex(&filename, &text).await
    }

    /// Index every `.txt` file directly inside `dir`, one at a time
    ///
    /// A file that fails is logged and counted; the remaining files are still
    /// processed.
    #[inline]
    pub async fn index_directory(&self, dir: &Path) -> Result<IndexingStats> {
        let files = text_files_in(dir).await?;
        info!("Indexing {} text files from {}", files.len(), dir.display());

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(files.len() as u64).with_style(
                ProgressStyle::with_template("{bar:30} [{pos}/{len}] Indexing {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut stats = IndexingStats::default();
        for path in &files {
            bar.set_message(path.display().to_string());

            match self.index_file(path).await {
                Ok(count) => {
                    stats.files_indexed += 1;
                    stats.chunks_stored += count;
                }
                Err(e) => {
                    error!("Failed to index {}: {}", path.display(), e);
                    stats.files_failed += 1;
                }
            }

            bar.inc(1);
        }
        bar.finish_and_clear();

        if stats.files_failed > 0 {
            warn!(
                "{} of {} files failed to index",
                stats.files_failed,
                files.len()
            );
        }
        Ok(stats)
    }
}

/// Regular `.txt` files directly inside `dir`, sorted by path
async fn text_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_text = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(TEXT_EXTENSION));
        if is_text && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}
