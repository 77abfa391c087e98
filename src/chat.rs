//! The chat assistant: ingest and conversation entry points.
//!
//! [`Assistant`] wires the pipeline together. `ingest` extracts a PDF,
//! replaces the corpus and opens the session's upload gate. `converse`
//! answers one message and never fails: greetings get a canned reply, a
//! closed gate gets an upload prompt, and retrieval or provider failures
//! become an apology that leaves the session history untouched.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::error::Result;
use crate::extract::Extractor;
use crate::generation::{
    create_generator, generate_with_timeout, GenerationOutcome, GenerativeModel,
};
use crate::greeting::{
    GreetingVocabulary, MessageClassifier, GREETING_AFTER_UPLOAD, GREETING_BEFORE_UPLOAD,
    UPLOAD_FIRST,
};
use crate::ingest::CorpusIndexer;
use crate::models::{
    ChatResponse, ConversationTurn, CorpusInfo, IngestSummary, RetrievalResult, SourceRef,
};
use crate::prompt::{ellipsize, PromptComposer};
use crate::render::create_renderer;
use crate::search::Retriever;
use crate::session::{InMemorySessionStore, SessionStore};
use crate::store::{SqliteIndex, VectorIndex};

/// Session id used when a caller does not name one.
pub const DEFAULT_SESSION: &str = "default";

pub struct Assistant {
    extractor: Extractor,
    indexer: CorpusIndexer,
    retriever: Retriever,
    index: Arc<dyn VectorIndex>,
    sessions: Arc<dyn SessionStore>,
    classifier: Arc<dyn MessageClassifier>,
    generator: Arc<dyn GenerativeModel>,
    composer: PromptComposer,
    top_k: usize,
    source_chars: usize,
    generation_timeout: Duration,
}

impl Assistant {
    /// Assemble an assistant from explicit components.
    ///
    /// Sessions default to an in-memory store and greetings to the
    /// built-in vocabulary; see [`with_session_store`](Self::with_session_store)
    /// and [`with_classifier`](Self::with_classifier).
    pub fn new(
        extractor: Extractor,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn GenerativeModel>,
        config: &Config,
    ) -> Self {
        Self {
            extractor,
            indexer: CorpusIndexer::new(index.clone(), embedder.clone()),
            retriever: Retriever::new(index.clone(), embedder),
            index,
            sessions: Arc::new(InMemorySessionStore::new(
                config.retrieval.history_capacity,
            )),
            classifier: Arc::new(GreetingVocabulary::default()),
            generator,
            composer: PromptComposer::new(&config.retrieval),
            top_k: config.retrieval.top_k,
            source_chars: config.retrieval.source_chars,
            generation_timeout: Duration::from_secs(config.generation.timeout_secs),
        }
    }

    /// Build the production assistant: SQLite index at `db.path` plus the
    /// configured embedding, generation and rendering backends.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let index = SqliteIndex::open(&config.db.path).await?;
        let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&config.embedding)?);
        let generator: Arc<dyn GenerativeModel> =
            Arc::from(create_generator(&config.generation)?);
        let extractor = Extractor::new(create_renderer(&config.extraction));

        tracing::info!(
            index = %config.db.path.display(),
            embedding = embedder.model_name(),
            generation = generator.model_name(),
            "assistant ready"
        );
        Ok(Self::new(
            extractor,
            Arc::new(index),
            embedder,
            generator,
            config,
        ))
    }

    pub fn with_session_store(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn MessageClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Stamp of the committed corpus, if any.
    pub async fn corpus_info(&self) -> anyhow::Result<Option<CorpusInfo>> {
        self.index.info().await
    }

    /// Extract `pdf`, make it the corpus, and open `session_id`'s gate.
    ///
    /// The gate is only set after the index commit succeeds.
    pub async fn ingest(&self, pdf: &[u8], session_id: &str) -> Result<IngestSummary> {
        let extraction = self.extractor.extract(pdf).await?;
        let info = self.indexer.replace_corpus(&extraction, pdf).await?;
        self.sessions.mark_uploaded(session_id).await;

        Ok(IngestSummary {
            pages: extraction.page_count,
            tables: extraction.tables.len(),
            images: extraction.images.len(),
            documents: info.document_count,
            generation: info.generation,
        })
    }

    /// Answer one message in `session_id`.
    pub async fn converse(&self, message: &str, session_id: &str) -> ChatResponse {
        let session = self.sessions.snapshot(session_id).await;

        if self.classifier.is_general(message) {
            let greeting = if session.uploaded {
                GREETING_AFTER_UPLOAD
            } else {
                GREETING_BEFORE_UPLOAD
            };
            return reply(greeting.to_string(), Vec::new(), session_id);
        }

        if !session.uploaded {
            return reply(UPLOAD_FIRST.to_string(), Vec::new(), session_id);
        }

        let results = match self.retriever.search(message, self.top_k).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "retrieval failed");
                return apology(&format!("{:#}", e), session_id);
            }
        };

        let prompt = self.composer.compose(message, &results, &session.history);
        match generate_with_timeout(self.generator.as_ref(), &prompt, self.generation_timeout)
            .await
        {
            GenerationOutcome::Answered(answer) => {
                self.sessions
                    .append_turn(
                        session_id,
                        ConversationTurn {
                            user: message.to_string(),
                            assistant: answer.clone(),
                        },
                    )
                    .await;
                let sources = self.sources(&results);
                reply(answer, sources, session_id)
            }
            GenerationOutcome::Failed(e) => apology(&e.to_string(), session_id),
        }
    }

    fn sources(&self, results: &[RetrievalResult]) -> Vec<SourceRef> {
        results
            .iter()
            .map(|r| SourceRef {
                kind: r.metadata.source,
                page: r.metadata.page,
                content: ellipsize(&r.content, self.source_chars),
                relevance: 1.0 - r.distance,
            })
            .collect()
    }
}

fn reply(response: String, sources: Vec<SourceRef>, session_id: &str) -> ChatResponse {
    ChatResponse {
        response,
        sources,
        session_id: session_id.to_string(),
    }
}

fn apology(detail: &str, session_id: &str) -> ChatResponse {
    reply(
        format!("I apologize, but I encountered an error: {}", detail),
        Vec::new(),
        session_id,
    )
}

/// CLI entry point for `pdfchat ask`.
///
/// The session counts as uploaded whenever a corpus has been committed,
/// so questions go straight to retrieval against the persisted index.
pub async fn run_ask(config: &Config, message: &str, session_id: &str) -> anyhow::Result<()> {
    let assistant = Assistant::from_config(config).await?;
    if assistant.corpus_info().await?.is_some() {
        assistant.sessions().mark_uploaded(session_id).await;
    }

    let response = assistant.converse(message, session_id).await;
    println!("{}", response.response);
    if !response.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &response.sources {
            println!(
                "  [{} - Page {}] relevance={:.3}",
                source.kind.as_str().to_uppercase(),
                source.page,
                source.relevance
            );
        }
    }
    Ok(())
}

/// CLI entry point for `pdfchat status`.
pub async fn run_status(config: &Config) -> anyhow::Result<()> {
    let assistant = Assistant::from_config(config).await?;
    match assistant.corpus_info().await? {
        Some(info) => {
            println!("index:       {}", config.db.path.display());
            println!("generation:  {}", info.generation);
            println!("documents:   {}", info.document_count);
            println!("fingerprint: {}", info.fingerprint);
            println!("indexed_at:  {}", info.indexed_at.to_rfc3339());
            println!("space:       {}", info.space);
            println!("embedding:   {} ({} dims)", info.embedding_model, info.dims);
        }
        None => println!("No corpus indexed yet. Run `pdfchat ingest <file.pdf>`."),
    }
    Ok(())
}
