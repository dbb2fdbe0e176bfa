use anyhow::{Context, Result, bail};
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::RagError;
use crate::completion::CompletionClient;
use crate::config::{Config, get_config_dir};
use crate::database::VectorStore;
use crate::embeddings::EmbeddingProvider;
use crate::embeddings::ollama::OllamaClient;
use crate::indexer::Indexer;
use crate::retriever::Retriever;
use crate::router::{QueryRouter, QueryStrategy};

/// Long-lived handles shared by every command
struct Services {
    config: Config,
    embedder: Arc<OllamaClient>,
    store: Arc<VectorStore>,
}

impl Services {
    async fn connect() -> Result<Self> {
        let config = Config::load_default().context("Failed to load configuration")?;

        let embedder =
            Arc::new(OllamaClient::new(&config.ollama).context("Failed to initialize Ollama client")?);
        let store = Arc::new(
            VectorStore::new(&config)
                .await
                .context("Failed to initialize LanceDB vector store")?,
        );
        check_dimensions(embedder.as_ref(), store.dimension())?;

        Ok(Self {
            config,
            embedder,
            store,
        })
    }

    fn indexer(&self) -> Indexer {
        Indexer::new(
            self.config.chunking,
            self.embedder.clone(),
            self.store.clone(),
        )
    }

    fn retriever(&self) -> Retriever {
        Retriever::new(self.embedder.clone(), self.store.clone())
    }

    fn router(&self) -> Result<QueryRouter> {
        let completer = CompletionClient::new(&self.config.completion)
            .context("Failed to initialize completion client")?;

        Ok(QueryRouter::new(
            self.retriever(),
            self.store.clone(),
            Arc::new(completer),
            &self.config.retrieval,
        ))
    }
}

/// Refuse to pair an embedder with a store holding vectors of another length
fn check_dimensions(embedder: &dyn EmbeddingProvider, store_dimension: usize) -> crate::Result<()> {
    if embedder.dimension() != store_dimension {
        return Err(RagError::StoreSchemaViolation(format!(
            "embedder produces {}-dimensional vectors but the store holds {}",
            embedder.dimension(),
            store_dimension
        )));
    }
    Ok(())
}

/// Print the effective configuration
#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    eprintln!("  Host: {}", style(&config.ollama.host).cyan());
    eprintln!("  Port: {}", style(config.ollama.port).cyan());
    eprintln!("  Model: {}", style(&config.ollama.model).cyan());
    eprintln!("  Batch Size: {}", style(config.ollama.batch_size).cyan());
    eprintln!(
        "  Embedding Dimension: {}",
        style(config.ollama.embedding_dimension).cyan()
    );
    match config.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Completion Settings:").bold().yellow());
    eprintln!("  URL: {}", style(&config.completion.api_url).cyan());
    eprintln!("  Model: {}", style(&config.completion.model).cyan());
    let key_state = if config.completion.api_key.is_empty() {
        "not set"
    } else {
        "set"
    };
    eprintln!("  API Key: {}", style(key_state).cyan());

    eprintln!();
    eprintln!("{}", style("Indexing & Retrieval:").bold().yellow());
    eprintln!(
        "  Chunk Size: {} (overlap {})",
        style(config.chunking.chunk_size).cyan(),
        style(config.chunking.overlap).cyan()
    );
    eprintln!("  Targeted top_k: {}", style(config.retrieval.top_k).cyan());
    eprintln!(
        "  Full-context limit: {}",
        style(config.retrieval.full_context_limit).cyan()
    );
    eprintln!(
        "  Table: {} ({})",
        style(&config.store.table_name).cyan(),
        style(config.store.metric).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

/// Write the effective configuration to `config.toml`, creating it if needed
#[inline]
pub fn write_config() -> Result<()> {
    let config_dir = get_config_dir().context("Failed to resolve config directory")?;
    let config = Config::load(&config_dir).context("Failed to load configuration")?;

    config.save().context("Failed to save configuration")?;

    eprintln!(
        "{} {}",
        style("✓ Configuration written to").green(),
        config.config_file_path().display()
    );
    eprintln!("Edit the file to change settings, then run 'docs-rag config --show'.");
    Ok(())
}

/// Index individual text files, continuing past failures
#[inline]
pub async fn index_files(paths: &[PathBuf]) -> Result<()> {
    let services = Services::connect().await?;
    let indexer = services.indexer();

    let mut failed = 0;
    for path in paths {
        match indexer.index_file(path).await {
            Ok(count) => println!("✓ {}: {} chunks", path.display(), count),
            Err(e) => {
                error!("Failed to index {}: {}", path.display(), e);
                println!("✗ {}: {}", path.display(), e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} files failed to index", failed, paths.len());
    }
    Ok(())
}

/// Index every `.txt` file in a directory
#[inline]
pub async fn index_dir(dir: &Path) -> Result<()> {
    let services = Services::connect().await?;

    let stats = services
        .indexer()
        .index_directory(dir)
        .await
        .with_context(|| format!("Failed to index directory {}", dir.display()))?;

    println!("Indexing completed!");
    println!("  Files indexed: {}", stats.files_indexed);
    println!("  Files failed: {}", stats.files_failed);
    println!("  Chunks stored: {}", stats.chunks_stored);
    Ok(())
}

/// Remove a document and all its chunks
#[inline]
pub async fn delete_document(filename: &str) -> Result<()> {
    let services = Services::connect().await?;

    let existing = services.store.count_for_filename(filename).await?;
    services.indexer().delete_document(filename).await?;

    if existing == 0 {
        println!("No indexed chunks found for {}", filename);
    } else {
        println!("✓ Deleted {} ({} chunks)", filename, existing);
    }
    Ok(())
}

/// Print the chunks most similar to `query`
#[inline]
pub async fn search(query: &str, top_k: usize) -> Result<()> {
    if query.trim().is_empty() {
        bail!("Query must not be empty");
    }

    let services = Services::connect().await?;
    let results = services.retriever().retrieve(query, top_k).await?;

    if results.is_empty() {
        println!("No matching chunks. Index documents with 'docs-rag index' first.");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.4}] {}",
            rank + 1,
            result.score,
            style(&result.filename).bold()
        );
        println!("   {}", result.chunk.replace('\n', " "));
    }
    Ok(())
}

/// Answer a question, classifying it unless a strategy is forced
#[inline]
pub async fn ask(query: &str, strategy: Option<QueryStrategy>) -> Result<()> {
    if query.trim().is_empty() {
        bail!("Query must not be empty");
    }

    let services = Services::connect().await?;
    let router = services.router()?;

    let answer = match strategy {
        Some(strategy) => {
            info!("Answering with forced {} strategy", strategy);
            router.answer_with(strategy, query).await?
        }
        None => router.answer(query).await?,
    };

    println!("{}", answer);
    Ok(())
}

/// Report on the embedding server and the indexed documents
#[inline]
pub async fn show_status() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    println!("📊 Docs-RAG Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Model: {}", config.ollama.model);
                println!("   🔢 Batch Size: {}", config.ollama.batch_size);
            }
            Err(e) => {
                println!("   ⚠️  Ollama: Unhealthy - {:#}", e);
            }
        },
        Err(e) => {
            println!("   ❌ Ollama: Failed to connect - {}", e);
        }
    }

    println!();
    println!("🔍 Vector Database Status:");
    let store = match VectorStore::new(&config).await {
        Ok(store) => {
            println!(
                "   ✅ LanceDB: Connected ({})",
                config.vector_database_path().display()
            );
            store
        }
        Err(e) => {
            println!("   ❌ LanceDB: Failed to open - {}", e);
            return Ok(());
        }
    };

    let total = store.count_records().await?;
    let documents = store.list_filenames().await?;
    println!("   📄 Documents: {}", documents.len());
    println!("   🧩 Chunks: {}", total);

    if !documents.is_empty() {
        println!();
        for (filename, chunks) in &documents {
            println!("   {} ({} chunks)", filename, chunks);
        }
    }

    Ok(())
}

/// Compact the vector table and build the vector index when large enough
#[inline]
pub async fn optimize() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let store = VectorStore::new(&config)
        .await
        .context("Failed to initialize LanceDB vector store")?;

    store.optimize().await?;
    println!("✓ Vector table compacted");

    if store.create_vector_index().await? {
        println!("✓ Vector index built ({} metric)", config.store.metric);
    } else {
        println!("Vector index skipped: not enough chunks stored yet");
    }
    Ok(())
}
