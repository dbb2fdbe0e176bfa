
use crate::database::{ChunkStore, SearchResult, SimilarityMetric, VectorRecord};
use crate::{RagError, Result, config::Config};
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    index::{Index, vector::IvfPqIndexBuilder},
    query::{ExecutableQuery, QueryBase, Select},
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// IVF-PQ training needs at least this many rows
const MIN_INDEX_ROWS: usize = 256;
/// Partitions probed per query once an IVF index exists
const DEFAULT_NPROBES: usize = 32;

/// Vector database store using LanceDB for similarity search
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    dimension: usize,
    metric: SimilarityMetric,
}

impl VectorStore {
    /// Open the store described by `config`, creating the table if needed
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        Self::open(
            &config.vector_database_path(),
            &config.store.table_name,
            config.ollama.embedding_dimension as usize,
            config.store.metric,
        )
        .await
    }

    /// Open a store at `db_path` holding vectors of exactly `dimension` values
    ///
    /// An existing table with a different vector length is a schema
    /// violation; it is never dropped or recreated.
    #[inline]
    pub async fn open(
        db_path: &Path,
        table_name: &str,
        dimension: usize,
        metric: SimilarityMetric,
    ) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path).map_err(|e| {
            RagError::StoreUnavailable(format!(
                "Failed to create vector database directory: {}",
                e
            ))
        })?;

        let uri = db_path.to_string_lossy().into_owned();
        let connection = lancedb::connect(&uri).execute().await.map_err(|e| {
            RagError::StoreUnavailable(format!("Failed to connect to LanceDB: {}", e))
        })?;

        let store = Self {
            connection,
            table_name: table_name.to_string(),
            dimension,
            metric,
        };

        store.initialize_table().await?;

        info!(
            "Vector store ready: table '{}', {} dimensions, {} metric",
            store.table_name, store.dimension, store.metric
        );
        Ok(store)
    }

    /// Vector length accepted by this store
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Create the table, or check an existing one against the configured dimension
    async fn initialize_table(&self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to list tables: {}", e)))?;

        if table_names.contains(&self.table_name) {
            let existing = self.detect_existing_vector_dimension().await?;
            if existing != self.dimension {
                return Err(RagError::StoreSchemaViolation(format!(
                    "table '{}' stores {}-dimensional embeddings but {} were configured",
                    self.table_name, existing, self.dimension
                )));
            }
            debug!("Table {} already exists", self.table_name);
            return Ok(());
        }

        info!(
            "Creating table {} with {} dimensions",
            self.table_name, self.dimension
        );

        self.connection
            .create_empty_table(&self.table_name, self.create_schema())
            .execute()
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to create table: {}", e)))?;

        Ok(())
    }

    /// Detect vector dimension from existing table schema
    async fn detect_existing_vector_dimension(&self) -> Result<usize> {
        let table = self.open_table().await?;

        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "embedding" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(RagError::StoreSchemaViolation(format!(
            "table '{}' has no fixed-size embedding column",
            self.table_name
        )))
    }

    fn create_schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("filename", DataType::Utf8, false),
            Field::new("chunk", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                false,
            ),
        ]))
    }

    /// Open the table at its latest version
    async fn open_table(&self) -> Result<Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to open table: {}", e)))
    }

    fn distance_type(&self) -> DistanceType {
        match self.metric {
            SimilarityMetric::InnerProduct => DistanceType::Dot,
            SimilarityMetric::Cosine => DistanceType::Cosine,
            SimilarityMetric::L2 => DistanceType::L2,
        }
    }

    /// Convert a LanceDB distance into a score where larger is more similar
    fn score_from_distance(&self, distance: f32) -> f32 {
        match self.metric {
            SimilarityMetric::InnerProduct | SimilarityMetric::Cosine => 1.0 - distance,
            SimilarityMetric::L2 => -distance,
        }
    }

    /// Create a RecordBatch from vector records
    fn create_record_batch(&self, records: &[VectorRecord]) -> Result<RecordBatch> {
        let len = records.len();

        let mut ids = Vec::with_capacity(len);
        let mut filenames = Vec::with_capacity(len);
        let mut chunks = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * self.dimension);

        for record in records {
            ids.push(record.id.as_str());
            filenames.push(record.filename.as_str());
            chunks.push(record.chunk.as_str());
            flat_values.extend_from_slice(&record.embedding);
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(values_array),
            None,
        )
        .map_err(|e| {
            RagError::StoreSchemaViolation(format!("Failed to create vector array: {}", e))
        })?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(filenames)),
            Arc::new(StringArray::from(chunks)),
            Arc::new(vector_array),
        ];

        RecordBatch::try_new(self.create_schema(), arrays).map_err(|e| {
            RagError::StoreSchemaViolation(format!("Failed to create record batch: {}", e))
        })
    }

    /// Total number of stored chunks
    #[inline]
    pub async fn count_records(&self) -> Result<usize> {
        let table = self.open_table().await?;

        table
            .count_rows(None)
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to count rows: {}", e)))
    }

    /// Number of chunks stored for one document
    #[inline]
    pub async fn count_for_filename(&self, filename: &str) -> Result<usize> {
        let table = self.open_table().await?;

        table
            .count_rows(Some(filename_predicate(filename)))
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to count rows: {}", e)))
    }

    /// Every indexed document with its chunk count, sorted by filename
    #[inline]
    pub async fn list_filenames(&self) -> Result<Vec<(String, usize)>> {
        let table = self.open_table().await?;

        let mut stream = table
            .query()
            .select(Select::columns(&["filename"]))
            .execute()
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to scan filenames: {}", e)))?;

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to read result stream: {}", e)))?
        {
            let filenames = string_column(&batch, "filename")?;
            for row in 0..batch.num_rows() {
                *counts.entry(filenames.value(row).to_string()).or_default() += 1;
            }
        }

        Ok(counts.into_iter().collect())
    }

    /// Parse search results from a LanceDB stream
    async fn parse_search_results_stream(
        &self,
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<SearchResult>> {
        let mut search_results = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to read result stream: {}", e)))?
        {
            let filenames = string_column(&batch, "filename")?;
            let chunks = string_column(&batch, "chunk")?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

            for row in 0..batch.num_rows() {
                let distance = distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

                search_results.push(SearchResult {
                    score: self.score_from_distance(distance),
                    chunk: chunks.value(row).to_string(),
                    filename: filenames.value(row).to_string(),
                });
            }
        }

        search_results.sort_by(|a, b| b.score.total_cmp(&a.score));

        debug!("Parsed {} search results from stream", search_results.len());
        Ok(search_results)
    }

    /// Optimize the vector database by compacting and reorganizing data
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        debug!("Optimizing vector database");

        let table = self.open_table().await?;

        table
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to optimize table: {}", e)))?;

        info!("Vector database optimization completed");
        Ok(())
    }

    /// Build an IVF-PQ index over the embeddings with the configured metric
    ///
    /// Returns `false` without building anything when the table is too small
    /// to train the index.
    #[inline]
    pub async fn create_vector_index(&self) -> Result<bool> {
        let table = self.open_table().await?;

        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to count rows: {}", e)))?;

        if rows < MIN_INDEX_ROWS {
            info!(
                "Skipping vector index: {} rows stored, {} needed",
                rows, MIN_INDEX_ROWS
            );
            return Ok(false);
        }

        let builder = IvfPqIndexBuilder::default().distance_type(self.distance_type());
        table
            .create_index(&["embedding"], Index::IvfPq(builder))
            .execute()
            .await
            .map_err(|e| {
                RagError::StoreUnavailable(format!("Failed to create vector index: {}", e))
            })?;

        info!("Vector index created with {} metric", self.metric);
        Ok(true)
    }
}

#[async_trait]
impl ChunkStore for VectorStore {
    #[inline]
    async fn insert(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            debug!("No records to store");
            return Ok(());
        }

        for record in &records {
            record.validate(self.dimension)?;
        }

        let record_batch = self.create_record_batch(&records)?;
        let table = self.open_table().await?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        // The add is committed before it returns, so no separate flush is needed
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to insert records: {}", e)))?;

        info!("Stored {} records", records.len());
        Ok(())
    }

    #[inline]
    async fn delete_by_filename(&self, filename: &str) -> Result<()> {
        debug!("Deleting records for file: {}", filename);

        let table = self.open_table().await?;

        table
            .delete(&filename_predicate(filename))
            .await
            .map_err(|e| {
                RagError::StoreUnavailable(format!("Failed to delete records of {}: {}", filename, e))
            })?;

        info!("Deleted records for file: {}", filename);
        Ok(())
    }

    #[inline]
    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        metric: SimilarityMetric,
    ) -> Result<Vec<SearchResult>> {
        if metric != self.metric {
            return Err(RagError::StoreSchemaViolation(format!(
                "search requested {} but the store is configured for {}",
                metric, self.metric
            )));
        }
        if query_vector.len() != self.dimension {
            return Err(RagError::StoreSchemaViolation(format!(
                "query vector has {} dimensions, expected {}",
                query_vector.len(),
                self.dimension
            )));
        }

        debug!("Searching for similar vectors with limit: {}", top_k);

        let table = self.open_table().await?;

        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to count rows: {}", e)))?;
        if rows == 0 || top_k == 0 {
            return Ok(Vec::new());
        }

        let results = table
            .vector_search(query_vector)
            .map_err(|e| {
                RagError::StoreUnavailable(format!("Failed to create vector search: {}", e))
            })?
            .column("embedding")
            .distance_type(self.distance_type())
            .nprobes(DEFAULT_NPROBES)
            .select(Select::columns(&["filename", "chunk"]))
            .limit(top_k)
            .execute()
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to execute search: {}", e)))?;

        self.parse_search_results_stream(results).await
    }

    #[inline]
    async fn scan_all(&self, limit: usize) -> Result<Vec<String>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let table = self.open_table().await?;

        let mut stream = table
            .query()
            .select(Select::columns(&["chunk"]))
            .limit(limit)
            .execute()
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to scan chunks: {}", e)))?;

        let mut chunks = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| RagError::StoreUnavailable(format!("Failed to read result stream: {}", e)))?
        {
            let column = string_column(&batch, "chunk")?;
            chunks.extend((0..batch.num_rows()).map(|row| column.value(row).to_string()));
        }
        chunks.truncate(limit);

        debug!("Scanned {} chunks", chunks.len());
        Ok(chunks)
    }

    #[inline]
    fn metric(&self) -> SimilarityMetric {
        self.metric
    }
}

/// Exact-match filter on the filename column
fn filename_predicate(filename: &str) -> String {
    format!("filename = '{}'", filename.replace('\'', "''"))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| RagError::StoreSchemaViolation(format!("Missing {} column", name)))?;

    column
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::StoreSchemaViolation(format!("Invalid {} column type", name)))
}
