//! In-memory [`VectorIndex`] implementation for tests and ephemeral runs.
//!
//! The corpus is an immutable snapshot behind an `Arc`. Replacing it builds
//! the next snapshot off to the side and swaps the pointer, so a concurrent
//! query sees one snapshot or the other, never a mix.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::embedding::cosine_distance;
use crate::models::{CorpusInfo, IndexedDocument, RetrievalResult};

use super::{check_lengths, check_query_dims, top_k, CorpusStamp, VectorIndex, SIMILARITY_SPACE};

struct Snapshot {
    info: Option<CorpusInfo>,
    entries: Vec<(IndexedDocument, Vec<f32>)>,
}

pub struct InMemoryIndex {
    current: RwLock<Arc<Snapshot>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot {
                info: None,
                entries: Vec::new(),
            })),
        }
    }

    async fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().await.clone()
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn replace(
        &self,
        documents: &[IndexedDocument],
        vectors: &[Vec<f32>],
        stamp: &CorpusStamp,
    ) -> Result<CorpusInfo> {
        check_lengths(documents, vectors, stamp)?;

        let mut current = self.current.write().await;
        let generation = current.info.as_ref().map_or(0, |i| i.generation) + 1;
        let info = CorpusInfo {
            generation,
            fingerprint: stamp.fingerprint.clone(),
            document_count: documents.len(),
            indexed_at: stamp.indexed_at,
            space: SIMILARITY_SPACE.to_string(),
            embedding_model: stamp.model.clone(),
            dims: stamp.dims,
        };

        *current = Arc::new(Snapshot {
            info: Some(info.clone()),
            entries: documents.iter().cloned().zip(vectors.iter().cloned()).collect(),
        });
        Ok(info)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.snapshot().await.entries.len())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
        let snapshot = self.snapshot().await;
        if let Some(info) = snapshot.info.as_ref().filter(|i| i.document_count > 0) {
            check_query_dims(vector, info.dims)?;
        }
        let results = snapshot
            .entries
            .iter()
            .map(|(doc, v)| RetrievalResult {
                content: doc.content.clone(),
                metadata: doc.metadata.clone(),
                distance: cosine_distance(vector, v),
            })
            .collect();
        Ok(top_k(results, k))
    }

    async fn info(&self) -> Result<Option<CorpusInfo>> {
        Ok(self.snapshot().await.info.clone())
    }
}
