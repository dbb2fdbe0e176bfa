// Router module
// Picks how much indexed material to hand the language model for a question


use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::Result;
use crate::completion::CompletionProvider;
use crate::config::RetrievalConfig;
use crate::database::ChunkStore;
use crate::retriever::Retriever;

const CLASSIFIER_SYSTEM: &str =
    "You decide which strategy should be used to answer a user's question about their documents.";

const TARGETED_SYSTEM: &str =
    "You are a helpful assistant. You must only use the provided document content to answer.";

const FULL_CONTEXT_SYSTEM: &str = "You are a curious, creative AI assistant. The context is a \
    collection of excerpts from various documents. Based on the question, extract and explain \
    something surprisingly interesting, insightful, or fun. Be creative, vary your structure, \
    and keep a friendly, engaging tone.";

/// How a question is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStrategy {
    /// Only the chunks most similar to the question
    Targeted,
    /// An unranked read of the whole corpus, up to a large limit
    FullContext,
}

impl QueryStrategy {
    /// Interpret the classifier's reply
    ///
    /// Any reply mentioning "full" selects [`QueryStrategy::FullContext`];
    /// everything else, including unexpected replies, falls back to
    /// [`QueryStrategy::Targeted`].
    #[inline]
    pub fn from_classifier_reply(reply: &str) -> Self {
        let normalized = reply.trim().to_lowercase();

        if normalized.contains("full") {
            return Self::FullContext;
        }
        if normalized != "search" {
            warn!(
                "Unexpected classifier reply {:?}, using targeted strategy",
                reply
            );
        }
        Self::Targeted
    }
}

impl fmt::Display for QueryStrategy {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Targeted => f.write_str("targeted"),
            Self::FullContext => f.write_str("full-context"),
        }
    }
}

/// Answers questions by classifying them, gathering context, and asking the model
///
/// Holds no state between queries.
pub struct QueryRouter {
    retriever: Retriever,
    store: Arc<dyn ChunkStore>,
    completer: Arc<dyn CompletionProvider>,
    top_k: usize,
    full_context_limit: usize,
}

impl QueryRouter {
    #[inline]
    pub fn new(
        retriever: Retriever,
        store: Arc<dyn ChunkStore>,
        completer: Arc<dyn CompletionProvider>,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            retriever,
            store,
            completer,
            top_k: retrieval.top_k,
            full_context_limit: retrieval.full_context_limit,
        }
    }

    /// Ask the model which strategy suits `query`
    #[inline]
    pub async fn classify(&self, query: &str) -> Result<QueryStrategy> {
        debug!("Query phase: classifying");

        let reply = self
            .completer
            .complete(CLASSIFIER_SYSTEM, &classification_prompt(query))
            .await?;

        let strategy = QueryStrategy::from_classifier_reply(&reply);
        debug!("Classifier replied {:?}, strategy {}", reply.trim(), strategy);
        Ok(strategy)
    }

    /// Classify `query`, then answer it with the chosen strategy
    ///
    /// The completion text is returned verbatim.
    #[inline]
    pub async fn answer(&self, query: &str) -> Result<String> {
        let strategy = self.classify(query).await.inspect_err(|e| {
            debug!("Query phase: failed ({})", e);
        })?;
        self.answer_with(strategy, query).await
    }

    /// Answer `query` with a caller-chosen strategy, skipping classification
    #[inline]
    pub async fn answer_with(&self, strategy: QueryStrategy, query: &str) -> Result<String> {
        let result = self.run_strategy(strategy, query).await;

        match &result {
            Ok(_) => debug!("Query phase: answered"),
            Err(e) => debug!("Query phase: failed ({})", e),
        }
        result
    }

    async fn run_strategy(&self, strategy: QueryStrategy, query: &str) -> Result<String> {
        let (system, chunks) = match strategy {
            QueryStrategy::Targeted => {
                debug!("Query phase: targeted-retrieving (top_k {})", self.top_k);
                let results = self.retriever.retrieve(query, self.top_k).await?;
                let chunks: Vec<String> = results.into_iter().map(|r| r.chunk).collect();
                (TARGETED_SYSTEM, chunks)
            }
            QueryStrategy::FullContext => {
                debug!(
                    "Query phase: fullcontext-scanning (limit {})",
                    self.full_context_limit
                );
                let chunks = self.store.scan_all(self.full_context_limit).await?;
                (FULL_CONTEXT_SYSTEM, chunks)
            }
        };

        debug!("Query phase: completing with {} chunks", chunks.len());
        self.completer
            .complete(system, &answer_prompt(&chunks, query))
            .await
    }
}

fn classification_prompt(query: &str) -> String {
    format!(
        "Decide the best strategy to answer the user's question.\n\n\
         You have two tools:\n\n\
         1. search: for specific, factual questions (e.g. \"What is the privacy clause?\")\n\
         2. fullcontext: for vague, open-ended, or creative questions (e.g. \"Tell me something cool\")\n\n\
         Respond only with: \"search\" or \"fullcontext\"\n\n\
         Question: \"{query}\""
    )
}

/// `CONTEXT:\n<chunks joined by newlines>\n\nQUESTION:\n<query>`
fn answer_prompt(chunks: &[String], query: &str) -> String {
    format!("CONTEXT:\n{}\n\nQUESTION:\n{}", chunks.join("\n"), query)
}
