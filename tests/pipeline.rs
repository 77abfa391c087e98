//! End-to-end pipeline tests: ingest, retrieval, gating and generation
//! against in-memory and SQLite indexes with deterministic providers.

mod common;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use common::{
    assistant, hash_vector, pdf_with_cells, pdf_with_pages, FailingEmbedder, FailingGenerator,
    HashingEmbedder, ScriptedGenerator,
};
use pdfchat::chat::Assistant;
use pdfchat::config::Config;
use pdfchat::embedding::Embedder;
use pdfchat::error::PipelineError;
use pdfchat::extract::Extractor;
use pdfchat::greeting::{
    MessageClassifier, GREETING_AFTER_UPLOAD, GREETING_BEFORE_UPLOAD, UPLOAD_FIRST,
};
use pdfchat::ingest::to_documents;
use pdfchat::models::{
    Channel, CorpusInfo, DocumentMetadata, IndexedDocument, Payload, RetrievalResult,
};
use pdfchat::render::{PageRenderer, PdftoppmRenderer, RenderedPage};
use pdfchat::session::{InMemorySessionStore, SessionStore};
use pdfchat::store::{CorpusStamp, InMemoryIndex, SqliteIndex, VectorIndex};

fn manual_pdf() -> Vec<u8> {
    pdf_with_pages(&[
        &["Alpha turbine maintenance guide", "Inspect the alpha turbine blades monthly."],
        &["Lubrication schedule for the alpha turbine bearings."],
    ])
}

fn brochure_pdf() -> Vec<u8> {
    pdf_with_pages(&[&["Beta compressor product brochure", "The beta compressor ships in May."]])
}

#[tokio::test]
async fn multi_page_text_keeps_page_numbers() {
    let result = Extractor::text_only().extract(&manual_pdf()).await.unwrap();

    assert_eq!(result.page_count, 2);
    assert_eq!(result.texts.len(), 2);
    assert_eq!(result.texts[0].page, 1);
    assert_eq!(result.texts[1].page, 2);
    assert!(result.texts[0].content.contains("Inspect the alpha turbine"));
    assert!(result.texts[1].content.contains("Lubrication schedule"));
    assert!(result.images.is_empty());
}

#[tokio::test]
async fn renderer_failure_does_not_fail_extraction() {
    let extractor = Extractor::new(Arc::new(PdftoppmRenderer::new(
        "pdfchat-test-missing-renderer",
        72,
    )));
    let result = extractor.extract(&manual_pdf()).await.unwrap();
    assert_eq!(result.texts.len(), 2);
    assert!(result.images.is_empty());
}

#[tokio::test]
async fn ingest_then_converse_answers_with_sources() {
    let embedder = Arc::new(HashingEmbedder::default());
    let generator = Arc::new(ScriptedGenerator::new("Inspect the blades **monthly** (page 1)."));
    let bot = assistant(Arc::new(InMemoryIndex::new()), embedder.clone(), generator.clone());

    let summary = bot.ingest(&manual_pdf(), "s1").await.unwrap();
    assert_eq!(summary.pages, 2);
    assert_eq!(summary.documents, 2);
    assert_eq!(summary.generation, 1);

    let reply = bot
        .converse("How often should the alpha turbine blades be inspected?", "s1")
        .await;
    assert_eq!(reply.response, "Inspect the blades **monthly** (page 1).");
    assert_eq!(reply.session_id, "s1");
    assert_eq!(reply.sources.len(), 2);
    assert_eq!(reply.sources[0].kind, Channel::Text);
    assert_eq!(reply.sources[0].page, 1);
    assert!(reply.sources[0].relevance >= reply.sources[1].relevance);

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("[TEXT - Page 1]: "));
    assert!(prompts[0].contains("Current Question: How often should the alpha turbine"));

    let history = bot.sessions().snapshot("s1").await.history;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].assistant, reply.response);
}

#[tokio::test]
async fn second_ingest_replaces_the_corpus_wholesale() {
    let tmp = TempDir::new().unwrap();
    let index: Arc<dyn VectorIndex> = Arc::new(
        SqliteIndex::open(&tmp.path().join("index.sqlite"))
            .await
            .unwrap(),
    );
    let bot = assistant(
        index.clone(),
        Arc::new(HashingEmbedder::default()),
        Arc::new(ScriptedGenerator::new("ok")),
    );

    bot.ingest(&manual_pdf(), "a").await.unwrap();
    let summary = bot.ingest(&brochure_pdf(), "b").await.unwrap();

    assert_eq!(summary.generation, 2);
    assert_eq!(index.count().await.unwrap(), 1);

    let results = bot.retriever().search("alpha turbine blades", 5).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].content.contains("Beta compressor"));

    // The corpus is global: session "a" keeps its gate but sees the new corpus.
    assert!(bot.sessions().snapshot("a").await.uploaded);
    let info = bot.corpus_info().await.unwrap().unwrap();
    assert_eq!(info.document_count, 1);
    assert_eq!(info.fingerprint, pdfchat::ingest::fingerprint(&brochure_pdf()));
}

#[tokio::test]
async fn empty_corpus_never_calls_the_embedder() {
    let embedder = Arc::new(HashingEmbedder::default());
    let generator = Arc::new(ScriptedGenerator::new("The document has nothing on that."));
    let bot = assistant(Arc::new(InMemoryIndex::new()), embedder.clone(), generator.clone());
    bot.sessions().mark_uploaded("s").await;

    let reply = bot.converse("What is the warranty period?", "s").await;

    assert_eq!(embedder.calls(), 0);
    assert!(reply.sources.is_empty());
    assert_eq!(reply.response, "The document has nothing on that.");
    let prompts = generator.prompts();
    assert!(prompts[0].contains("does not contain information relevant"));
}

#[tokio::test]
async fn questions_before_upload_are_gated() {
    let embedder = Arc::new(HashingEmbedder::default());
    let generator = Arc::new(ScriptedGenerator::new("unused"));
    let bot = assistant(Arc::new(InMemoryIndex::new()), embedder.clone(), generator.clone());

    // Another session's upload does not open this one's gate.
    bot.ingest(&manual_pdf(), "uploader").await.unwrap();
    let calls_after_ingest = embedder.calls();

    let reply = bot.converse("What does page 2 say?", "newcomer").await;
    assert_eq!(reply.response, UPLOAD_FIRST);
    assert!(reply.sources.is_empty());
    assert_eq!(embedder.calls(), calls_after_ingest);
    assert!(generator.prompts().is_empty());
    assert!(bot.sessions().snapshot("newcomer").await.history.is_empty());
}

#[tokio::test]
async fn greetings_bypass_retrieval_and_history() {
    let embedder = Arc::new(HashingEmbedder::default());
    let generator = Arc::new(ScriptedGenerator::new("unused"));
    let bot = assistant(Arc::new(InMemoryIndex::new()), embedder.clone(), generator.clone());

    assert_eq!(bot.converse("Hello", "s").await.response, GREETING_BEFORE_UPLOAD);

    bot.ingest(&manual_pdf(), "s").await.unwrap();
    let calls_after_ingest = embedder.calls();

    let reply = bot.converse("  thank you ", "s").await;
    assert_eq!(reply.response, GREETING_AFTER_UPLOAD);
    assert!(reply.sources.is_empty());
    assert_eq!(embedder.calls(), calls_after_ingest);
    assert!(generator.prompts().is_empty());
    assert!(bot.sessions().snapshot("s").await.history.is_empty());
}

#[tokio::test]
async fn generation_failure_is_an_apology_without_history() {
    let bot = assistant(
        Arc::new(InMemoryIndex::new()),
        Arc::new(HashingEmbedder::default()),
        Arc::new(FailingGenerator),
    );
    bot.ingest(&manual_pdf(), "s").await.unwrap();

    let reply = bot.converse("Summarize the lubrication schedule", "s").await;

    assert_eq!(
        reply.response,
        "I apologize, but I encountered an error: quota exceeded"
    );
    assert!(reply.sources.is_empty());
    assert_eq!(reply.session_id, "s");
    assert!(bot.sessions().snapshot("s").await.history.is_empty());
}

#[tokio::test]
async fn history_is_capped_at_ten_turns() {
    let bot = assistant(
        Arc::new(InMemoryIndex::new()),
        Arc::new(HashingEmbedder::default()),
        Arc::new(ScriptedGenerator::new("answer")),
    );
    bot.ingest(&manual_pdf(), "s").await.unwrap();

    for i in 0..11 {
        bot.converse(&format!("question number {}", i), "s").await;
    }

    let history = bot.sessions().snapshot("s").await.history;
    assert_eq!(history.len(), 10);
    assert_eq!(history[0].user, "question number 1");
    assert_eq!(history[9].user, "question number 10");
}

#[tokio::test]
async fn embedding_failure_keeps_previous_corpus_and_gate() {
    let index: Arc<dyn VectorIndex> = Arc::new(InMemoryIndex::new());
    let healthy = assistant(
        index.clone(),
        Arc::new(HashingEmbedder::default()),
        Arc::new(ScriptedGenerator::new("ok")),
    );
    healthy.ingest(&manual_pdf(), "first").await.unwrap();

    let broken = assistant(
        index.clone(),
        Arc::new(FailingEmbedder),
        Arc::new(ScriptedGenerator::new("ok")),
    );
    let err = broken.ingest(&brochure_pdf(), "second").await.unwrap_err();

    assert!(matches!(err, PipelineError::Indexing(_)));
    assert_eq!(index.count().await.unwrap(), 2);
    assert_eq!(index.info().await.unwrap().unwrap().generation, 1);
    assert!(!broken.sessions().snapshot("second").await.uploaded);
}

#[tokio::test]
async fn unreadable_pdf_is_an_extraction_error() {
    let bot = assistant(
        Arc::new(InMemoryIndex::new()),
        Arc::new(HashingEmbedder::default()),
        Arc::new(ScriptedGenerator::new("ok")),
    );
    let err = bot.ingest(b"%PDF-1.4 truncated", "s").await.unwrap_err();
    assert!(matches!(err, PipelineError::Extraction(_)));
    assert!(!bot.sessions().snapshot("s").await.uploaded);
}

/// Index with one fixed hit, for checking response formatting.
struct FixedIndex {
    hit: RetrievalResult,
}

#[async_trait]
impl VectorIndex for FixedIndex {
    async fn replace(
        &self,
        _documents: &[IndexedDocument],
        _vectors: &[Vec<f32>],
        _stamp: &CorpusStamp,
    ) -> Result<CorpusInfo> {
        anyhow::bail!("read-only")
    }
    async fn count(&self) -> Result<usize> {
        Ok(1)
    }
    async fn query(&self, _vector: &[f32], _k: usize) -> Result<Vec<RetrievalResult>> {
        Ok(vec![self.hit.clone()])
    }
    async fn info(&self) -> Result<Option<CorpusInfo>> {
        Ok(None)
    }
}

#[tokio::test]
async fn sources_carry_relevance_and_truncated_content() {
    let hit = RetrievalResult {
        content: "x".repeat(250),
        metadata: DocumentMetadata {
            kind: Channel::Table,
            page: 7,
            source: Channel::Table,
            local_id: Some("table_6_0".to_string()),
        },
        distance: 0.3,
    };
    let generator = Arc::new(ScriptedGenerator::new("See the table on page 7."));
    let bot = assistant(
        Arc::new(FixedIndex { hit }),
        Arc::new(HashingEmbedder::default()),
        generator.clone(),
    );
    bot.sessions().mark_uploaded("s").await;

    let reply = bot.converse("Which row lists M8?", "s").await;

    assert_eq!(reply.sources.len(), 1);
    let source = &reply.sources[0];
    assert_eq!(source.kind, Channel::Table);
    assert_eq!(source.page, 7);
    assert!((source.relevance - 0.7).abs() < 1e-9);
    assert_eq!(source.content, format!("{}...", "x".repeat(200)));

    // The prompt gets the full 250 chars plus the ellipsis.
    let expected = format!("[TABLE - Page 7]: {}...", "x".repeat(250));
    assert!(generator.prompts()[0].contains(&expected));
}

/// A parts list laid out the way table generators do it: each cell placed
/// with its own text matrix, columns 228pt apart.
fn parts_list_pdf() -> Vec<u8> {
    pdf_with_cells(&[
        (72.0, 740.0, "Parts list for the alpha turbine"),
        (72.0, 700.0, "Item"),
        (300.0, 700.0, "Count"),
        (72.0, 684.0, "bolt"),
        (300.0, 684.0, "12"),
        (72.0, 668.0, "washer"),
        (300.0, 668.0, "40"),
    ])
}

#[tokio::test]
async fn positioned_cells_are_detected_as_a_table() {
    let result = Extractor::text_only().extract(&parts_list_pdf()).await.unwrap();

    assert_eq!(result.page_count, 1);
    assert_eq!(result.texts.len(), 1);
    assert_eq!(result.tables.len(), 1);

    let table = &result.tables[0];
    assert_eq!(table.channel, Channel::Table);
    assert_eq!(table.page, 1);
    assert_eq!(table.local_id.as_deref(), Some("table_0_0"));
    assert!(table.content.contains("washer"));
    match &table.payload {
        Some(Payload::Table { headers, rows }) => {
            assert_eq!(headers, &vec!["Item".to_string(), "Count".to_string()]);
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0].get("Item").map(String::as_str), Some("bolt"));
            assert_eq!(rows[0].get("Count").map(String::as_str), Some("12"));
            assert_eq!(rows[1].get("Item").map(String::as_str), Some("washer"));
            assert_eq!(rows[1].get("Count").map(String::as_str), Some("40"));
        }
        other => panic!("unexpected payload: {:?}", other),
    }

    let bot = assistant(
        Arc::new(InMemoryIndex::new()),
        Arc::new(HashingEmbedder::default()),
        Arc::new(ScriptedGenerator::new("ok")),
    );
    let summary = bot.ingest(&parts_list_pdf(), "s").await.unwrap();
    assert_eq!(summary.tables, 1);
    assert_eq!(summary.documents, 2);
}

#[tokio::test]
async fn running_prose_is_not_a_table() {
    let result = Extractor::text_only().extract(&manual_pdf()).await.unwrap();
    assert!(result.tables.is_empty());
}

/// Renderer that returns canned PNG bytes for the first two pages.
struct CannedRenderer;

#[async_trait]
impl PageRenderer for CannedRenderer {
    async fn render(&self, _pdf: &[u8]) -> Result<Vec<RenderedPage>> {
        Ok(vec![
            RenderedPage {
                page: 1,
                png: b"png-1".to_vec(),
            },
            RenderedPage {
                page: 2,
                png: b"png-2".to_vec(),
            },
        ])
    }
}

#[tokio::test]
async fn rendered_pages_become_image_records() {
    let extractor = Extractor::new(Arc::new(CannedRenderer));
    let result = extractor.extract(&manual_pdf()).await.unwrap();

    assert_eq!(result.images.len(), 2);
    let pages: Vec<u32> = result.images.iter().map(|r| r.page).collect();
    assert_eq!(pages, vec![1, 2]);

    let second = &result.images[1];
    assert_eq!(second.channel, Channel::Image);
    assert_eq!(second.content, "Image from page 2");
    assert_eq!(second.local_id.as_deref(), Some("image_1"));
    assert_eq!(
        second.payload,
        Some(Payload::Image {
            png_base64: "cG5nLTI=".to_string()
        })
    );
    assert_eq!(result.images[0].local_id.as_deref(), Some("image_0"));

    let ids: Vec<String> = to_documents(&result).into_iter().map(|d| d.id).collect();
    assert_eq!(ids, vec!["text_0", "text_1", "image_0", "image_1"]);

    let bot = Assistant::new(
        Extractor::new(Arc::new(CannedRenderer)),
        Arc::new(InMemoryIndex::new()),
        Arc::new(HashingEmbedder::default()),
        Arc::new(ScriptedGenerator::new("ok")),
        &Config::default(),
    );
    let summary = bot.ingest(&manual_pdf(), "s").await.unwrap();
    assert_eq!(summary.pages, 2);
    assert_eq!(summary.images, 2);
    assert_eq!(summary.documents, 4);

    let reply = bot.converse("Image from page 2", "s").await;
    assert!(reply
        .sources
        .iter()
        .any(|s| s.kind == Channel::Image && s.page == 2));
}

/// Treats only `ping` as small talk.
struct PingOnly;

impl MessageClassifier for PingOnly {
    fn is_general(&self, message: &str) -> bool {
        message.trim().eq_ignore_ascii_case("ping")
    }
}

#[tokio::test]
async fn custom_classifier_and_session_store_are_honoured() {
    let sessions = Arc::new(InMemorySessionStore::new(2));
    let generator = Arc::new(ScriptedGenerator::new("answer"));
    let bot = assistant(
        Arc::new(InMemoryIndex::new()),
        Arc::new(HashingEmbedder::default()),
        generator.clone(),
    )
    .with_classifier(Arc::new(PingOnly))
    .with_session_store(sessions.clone());

    assert_eq!(bot.converse("ping", "s").await.response, GREETING_BEFORE_UPLOAD);
    // "Hello" is small talk for the built-in vocabulary, not for this one.
    assert_eq!(bot.converse("Hello", "s").await.response, UPLOAD_FIRST);

    bot.ingest(&manual_pdf(), "s").await.unwrap();
    assert!(sessions.snapshot("s").await.uploaded);
    assert_eq!(bot.converse("ping", "s").await.response, GREETING_AFTER_UPLOAD);

    for i in 0..3 {
        bot.converse(&format!("question {}", i), "s").await;
    }
    let history = sessions.snapshot("s").await.history;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].user, "question 1");
    assert_eq!(generator.prompts().len(), 3);
}

/// Same vectors as [`HashingEmbedder`] under another model name.
struct RenamedEmbedder;

#[async_trait]
impl Embedder for RenamedEmbedder {
    fn model_name(&self) -> &str {
        "bge-base-test"
    }
    fn dims(&self) -> usize {
        64
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_vector(t)).collect())
    }
}

#[tokio::test]
async fn changed_embedding_model_is_reported_instead_of_scored() {
    let tmp = TempDir::new().unwrap();
    let index: Arc<dyn VectorIndex> = Arc::new(
        SqliteIndex::open(&tmp.path().join("index.sqlite"))
            .await
            .unwrap(),
    );
    let original = assistant(
        index.clone(),
        Arc::new(HashingEmbedder::default()),
        Arc::new(ScriptedGenerator::new("ok")),
    );
    original.ingest(&manual_pdf(), "s").await.unwrap();

    let info = index.info().await.unwrap().unwrap();
    assert_eq!(info.embedding_model, "hashing-test");
    assert_eq!(info.dims, 64);

    let generator = Arc::new(ScriptedGenerator::new("unused"));
    let reconfigured = assistant(index.clone(), Arc::new(RenamedEmbedder), generator.clone());
    reconfigured.sessions().mark_uploaded("s").await;

    let reply = reconfigured.converse("How often are blades inspected?", "s").await;
    assert!(reply
        .response
        .starts_with("I apologize, but I encountered an error: "));
    assert!(reply.response.contains("hashing-test"));
    assert!(reply.sources.is_empty());
    assert!(generator.prompts().is_empty());
    assert!(reconfigured.sessions().snapshot("s").await.history.is_empty());
}
