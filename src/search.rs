//! Semantic retrieval against the current corpus.

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::chat::Assistant;
use crate::config::Config;
use crate::embedding::{embed_query, Embedder};
use crate::models::RetrievalResult;
use crate::store::VectorIndex;

pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }

    /// Up to `k` closest documents to `query`, closest first.
    ///
    /// An empty corpus returns an empty list without embedding the query
    /// or querying the index. A corpus embedded by a different model is an
    /// error; its vectors are not comparable with the query's.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        if self.index.count().await? == 0 {
            tracing::debug!("corpus is empty, skipping retrieval");
            return Ok(Vec::new());
        }

        let model = self.embedder.model_name();
        if let Some(info) = self.index.info().await? {
            if info.embedding_model != model {
                bail!(
                    "corpus was indexed with '{}' but the embedder is '{}'; re-upload the PDF",
                    info.embedding_model,
                    model
                );
            }
        }

        let vector = embed_query(self.embedder.as_ref(), query).await?;
        let results = self.index.query(&vector, k).await?;
        tracing::debug!(hits = results.len(), k, "retrieved context");
        Ok(results)
    }
}

/// CLI entry point for `pdfchat search`.
pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    let assistant = Assistant::from_config(config).await?;
    let k = limit.unwrap_or(config.retrieval.top_k);
    let results = assistant.retriever().search(query, k).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, r) in results.iter().enumerate() {
        println!(
            "{}. [{} - Page {}] distance={:.4}",
            i + 1,
            r.metadata.source.as_str().to_uppercase(),
            r.metadata.page,
            r.distance
        );
        println!("   {}", crate::prompt::ellipsize(&r.content.replace('\n', " "), 160));
    }
    Ok(())
}
