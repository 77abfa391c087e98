//! Corpus replacement.
//!
//! Turns an [`ExtractionResult`] into [`IndexedDocument`]s, embeds them,
//! and commits them to the [`VectorIndex`] as the new and only corpus.
//!
//! Replacements are serialized: a second upload waits for the first to
//! commit instead of interleaving with it. All embeddings are computed
//! before the index is touched, so a provider failure leaves the previous
//! corpus in place.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::chat::{Assistant, DEFAULT_SESSION};
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::{PipelineError, Result};
use crate::models::{CorpusInfo, DocumentMetadata, ExtractionResult, IndexedDocument};
use crate::store::{CorpusStamp, VectorIndex};

pub struct CorpusIndexer {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    write_lock: Mutex<()>,
}

impl CorpusIndexer {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            index,
            embedder,
            write_lock: Mutex::new(()),
        }
    }

    /// Replace the corpus with the records of `extraction`.
    ///
    /// `source_bytes` is the uploaded PDF; only its SHA-256 is kept.
    pub async fn replace_corpus(
        &self,
        extraction: &ExtractionResult,
        source_bytes: &[u8],
    ) -> Result<CorpusInfo> {
        let _guard = self.write_lock.lock().await;

        let documents = to_documents(extraction);
        let vectors = if documents.is_empty() {
            Vec::new()
        } else {
            let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
            let vectors = self
                .embedder
                .embed(&texts)
                .await
                .map_err(PipelineError::Indexing)?;
            if vectors.len() != documents.len() {
                return Err(PipelineError::Indexing(anyhow::anyhow!(
                    "embedding provider returned {} vectors for {} documents",
                    vectors.len(),
                    documents.len()
                )));
            }
            vectors
        };

        let stamp = CorpusStamp {
            fingerprint: fingerprint(source_bytes),
            indexed_at: Utc::now(),
            model: self.embedder.model_name().to_string(),
            dims: vectors.first().map_or(self.embedder.dims(), Vec::len),
        };
        let info = self
            .index
            .replace(&documents, &vectors, &stamp)
            .await
            .map_err(PipelineError::Indexing)?;

        tracing::info!(
            generation = info.generation,
            documents = info.document_count,
            model = self.embedder.model_name(),
            "corpus replaced"
        );
        Ok(info)
    }
}

/// CLI entry point for `pdfchat ingest`.
pub async fn run_ingest(config: &Config, pdf_path: &Path) -> anyhow::Result<()> {
    let bytes = std::fs::read(pdf_path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", pdf_path.display(), e))?;
    let assistant = Assistant::from_config(config).await?;
    let summary = assistant.ingest(&bytes, DEFAULT_SESSION).await?;

    println!("Ingested {}", pdf_path.display());
    println!("  pages:      {}", summary.pages);
    println!("  tables:     {}", summary.tables);
    println!("  images:     {}", summary.images);
    println!("  documents:  {}", summary.documents);
    println!("  generation: {}", summary.generation);
    Ok(())
}

/// Normalize extracted records into indexable documents.
///
/// Ids are `{channel}_{position}` where position counts within the
/// channel, so they are stable for a given extraction.
pub fn to_documents(extraction: &ExtractionResult) -> Vec<IndexedDocument> {
    extraction
        .channels()
        .into_iter()
        .flat_map(|(channel, records)| {
            records
                .iter()
                .enumerate()
                .map(move |(position, record)| IndexedDocument {
                    id: format!("{}_{}", channel, position),
                    content: record.content.clone(),
                    metadata: DocumentMetadata {
                        kind: channel,
                        page: record.page,
                        source: channel,
                        local_id: record.local_id.clone(),
                    },
                })
        })
        .collect()
}

/// Hex SHA-256 of the uploaded bytes.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
