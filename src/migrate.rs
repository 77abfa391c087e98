use anyhow::Result;
use sqlx::SqlitePool;

/// Documents of the current corpus. Dropped and recreated on every
/// corpus replacement, so it is also created inside that transaction.
pub(crate) const CREATE_DOCUMENTS: &str = r#"
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        content TEXT NOT NULL,
        kind TEXT NOT NULL,
        page INTEGER NOT NULL,
        source TEXT NOT NULL,
        local_id TEXT,
        embedding BLOB NOT NULL
    )
"#;

pub(crate) const CREATE_DOCUMENTS_PAGE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_documents_page ON documents(page)";

/// Single-row stamp of the committed corpus. Survives replacements so the
/// generation counter keeps increasing. `model`/`dims` record the embedding
/// space the stored vectors live in.
const CREATE_CORPUS_META: &str = r#"
    CREATE TABLE IF NOT EXISTS corpus_meta (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        generation INTEGER NOT NULL,
        fingerprint TEXT NOT NULL,
        document_count INTEGER NOT NULL,
        indexed_at INTEGER NOT NULL,
        space TEXT NOT NULL,
        model TEXT NOT NULL,
        dims INTEGER NOT NULL
    )
"#;

/// Create the schema if it does not exist yet. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(CREATE_DOCUMENTS).execute(pool).await?;
    sqlx::query(CREATE_DOCUMENTS_PAGE_INDEX).execute(pool).await?;
    sqlx::query(CREATE_CORPUS_META).execute(pool).await?;
    Ok(())
}
