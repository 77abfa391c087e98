//! Error taxonomy for the ingest and chat pipeline.
//!
//! Only failures that escape the pipeline get a variant here. Page
//! rendering, provider, and precondition failures are recovered where
//! they happen and never reach a caller as an error.

use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Fatal ingest failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The PDF could not be read for text or table extraction.
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// Embedding or vector storage failed while replacing the corpus.
    #[error("indexing failed: {0}")]
    Indexing(#[source] anyhow::Error),
}

/// Text/table extraction failure.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("PDF parser panicked: {0}")]
    Panicked(String),
}

/// Failure reported by a generative model provider.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProviderError(pub String);

impl From<anyhow::Error> for ProviderError {
    fn from(err: anyhow::Error) -> Self {
        ProviderError(format!("{:#}", err))
    }
}
