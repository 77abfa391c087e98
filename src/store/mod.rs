//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the only way the pipeline touches stored
//! documents. It holds exactly one corpus at a time: [`replace`](VectorIndex::replace)
//! swaps the whole corpus, never merges, and readers observe either the
//! previous corpus or the new one in full.
//!
//! Implementations:
//!
//! | Type | Backing | Use |
//! |------|---------|-----|
//! | [`SqliteIndex`] | SQLite file via sqlx | persistent default |
//! | [`InMemoryIndex`] | `Arc` snapshot behind a lock | tests, ephemeral runs |
//!
//! Both score with brute-force cosine distance.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{CorpusInfo, IndexedDocument, RetrievalResult};

pub use memory::InMemoryIndex;
pub use sqlite::SqliteIndex;

/// Similarity space every corpus is created with.
pub const SIMILARITY_SPACE: &str = "cosine";

/// What the indexer knows about a corpus before it is committed.
#[derive(Debug, Clone)]
pub struct CorpusStamp {
    pub fingerprint: String,
    pub indexed_at: DateTime<Utc>,
    /// Embedding model and vector length; every vector must match `dims`.
    pub model: String,
    pub dims: usize,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Drop the current corpus and every index structure, recreate an
    /// empty cosine corpus, and insert `documents` with their `vectors`,
    /// as one atomic unit. Returns the committed corpus info.
    ///
    /// `documents` and `vectors` must have the same length.
    async fn replace(
        &self,
        documents: &[IndexedDocument],
        vectors: &[Vec<f32>],
        stamp: &CorpusStamp,
    ) -> Result<CorpusInfo>;

    /// Number of documents in the current corpus.
    async fn count(&self) -> Result<usize>;

    /// Up to `k` documents closest to `vector`, ascending by cosine distance.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievalResult>>;

    /// The current corpus stamp, or `None` before the first commit.
    async fn info(&self) -> Result<Option<CorpusInfo>>;
}

/// Sort by ascending distance and keep the first `k`.
pub(crate) fn top_k(mut results: Vec<RetrievalResult>, k: usize) -> Vec<RetrievalResult> {
    results.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(k);
    results
}

pub(crate) fn check_lengths(
    documents: &[IndexedDocument],
    vectors: &[Vec<f32>],
    stamp: &CorpusStamp,
) -> Result<()> {
    if documents.len() != vectors.len() {
        anyhow::bail!(
            "vector count {} does not match document count {}",
            vectors.len(),
            documents.len()
        );
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != stamp.dims) {
        anyhow::bail!(
            "vector has {} dims but the corpus is stamped with {} ({})",
            bad.len(),
            stamp.dims,
            stamp.model
        );
    }
    Ok(())
}

/// A query vector must have the length of the stored ones.
pub(crate) fn check_query_dims(query: &[f32], stored: usize) -> Result<()> {
    if query.len() != stored {
        anyhow::bail!(
            "query vector has {} dims but the corpus was indexed with {}; re-upload the PDF",
            query.len(),
            stored
        );
    }
    Ok(())
}
