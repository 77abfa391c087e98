//! SQLite-backed [`VectorIndex`] implementation.
//!
//! Documents and their embedding BLOBs live in one `documents` table;
//! queries load every vector and rank by cosine distance in Rust.
//! Replacement runs inside a single transaction (SQLite DDL is
//! transactional), so a failed replace rolls back to the previous corpus
//! and other connections never see a half-written one.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use sqlx::{Row, SqlitePool};

use crate::db;
use crate::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use crate::migrate::{run_migrations, CREATE_DOCUMENTS, CREATE_DOCUMENTS_PAGE_INDEX};
use crate::models::{Channel, CorpusInfo, DocumentMetadata, IndexedDocument, RetrievalResult};

use super::{check_lengths, check_query_dims, top_k, CorpusStamp, VectorIndex, SIMILARITY_SPACE};

pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    /// Open the index at `path`, creating the file and schema if needed.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn replace(
        &self,
        documents: &[IndexedDocument],
        vectors: &[Vec<f32>],
        stamp: &CorpusStamp,
    ) -> Result<CorpusInfo> {
        check_lengths(documents, vectors, stamp)?;

        let mut tx = self.pool.begin().await?;

        let previous: Option<i64> =
            sqlx::query_scalar("SELECT generation FROM corpus_meta WHERE id = 1")
                .fetch_optional(&mut *tx)
                .await?;
        let generation = previous.unwrap_or(0) + 1;

        sqlx::query("DROP TABLE IF EXISTS documents")
            .execute(&mut *tx)
            .await?;
        sqlx::query(CREATE_DOCUMENTS).execute(&mut *tx).await?;
        sqlx::query(CREATE_DOCUMENTS_PAGE_INDEX)
            .execute(&mut *tx)
            .await?;

        for (doc, vector) in documents.iter().zip(vectors) {
            sqlx::query(
                r#"
                INSERT INTO documents (id, content, kind, page, source, local_id, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&doc.id)
            .bind(&doc.content)
            .bind(doc.metadata.kind.as_str())
            .bind(doc.metadata.page as i64)
            .bind(doc.metadata.source.as_str())
            .bind(&doc.metadata.local_id)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to insert document {}", doc.id))?;
        }

        sqlx::query(
            r#"
            INSERT INTO corpus_meta
                (id, generation, fingerprint, document_count, indexed_at, space, model, dims)
            VALUES (1, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                generation = excluded.generation,
                fingerprint = excluded.fingerprint,
                document_count = excluded.document_count,
                indexed_at = excluded.indexed_at,
                space = excluded.space,
                model = excluded.model,
                dims = excluded.dims
            "#,
        )
        .bind(generation)
        .bind(&stamp.fingerprint)
        .bind(documents.len() as i64)
        .bind(stamp.indexed_at.timestamp())
        .bind(SIMILARITY_SPACE)
        .bind(&stamp.model)
        .bind(stamp.dims as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(CorpusInfo {
            generation,
            fingerprint: stamp.fingerprint.clone(),
            document_count: documents.len(),
            // Stored at second precision; report what a later read returns.
            indexed_at: DateTime::from_timestamp(stamp.indexed_at.timestamp(), 0)
                .unwrap_or(stamp.indexed_at),
            space: SIMILARITY_SPACE.to_string(),
            embedding_model: stamp.model.clone(),
            dims: stamp.dims,
        })
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
        let rows = sqlx::query(
            "SELECT content, kind, page, source, local_id, embedding FROM documents",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.try_get("embedding")?;
            let kind: String = row.try_get("kind")?;
            let source: String = row.try_get("source")?;
            let page: i64 = row.try_get("page")?;
            let stored = blob_to_vec(&blob);
            check_query_dims(vector, stored.len())?;

            results.push(RetrievalResult {
                content: row.try_get("content")?,
                metadata: DocumentMetadata {
                    kind: kind.parse::<Channel>()?,
                    page: page as u32,
                    source: source.parse::<Channel>()?,
                    local_id: row.try_get("local_id")?,
                },
                distance: cosine_distance(vector, &stored),
            });
        }

        Ok(top_k(results, k))
    }

    async fn info(&self) -> Result<Option<CorpusInfo>> {
        let row = sqlx::query(
            "SELECT generation, fingerprint, document_count, indexed_at, space, model, dims
             FROM corpus_meta WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let indexed_at: i64 = row.try_get("indexed_at")?;
        let document_count: i64 = row.try_get("document_count")?;
        let dims: i64 = row.try_get("dims")?;
        Ok(Some(CorpusInfo {
            generation: row.try_get("generation")?,
            fingerprint: row.try_get("fingerprint")?,
            document_count: document_count as usize,
            indexed_at: DateTime::from_timestamp(indexed_at, 0)
                .ok_or_else(|| anyhow::anyhow!("invalid indexed_at timestamp: {}", indexed_at))?,
            space: row.try_get("space")?,
            embedding_model: row.try_get("model")?,
            dims: dims as usize,
        }))
    }
}
