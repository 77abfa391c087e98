//! PDF content extraction.
//!
//! Walks a PDF page by page and produces three channels of
//! [`ContentRecord`]s: page text, tables detected in the page's positioned
//! layout, and one rendered image per page. Text and table extraction
//! failures are fatal; rendering failures are logged and leave the image
//! channel empty.

use std::path::Path;
use std::sync::Arc;

use base64::Engine;

use crate::config::Config;
use crate::error::ExtractionError;
use crate::layout::{read_pages, PageContent};
use crate::models::{Channel, ContentRecord, ExtractionResult, Payload};
use crate::render::{create_renderer, NoopRenderer, PageRenderer};
use crate::table::detect_tables;

pub struct Extractor {
    renderer: Arc<dyn PageRenderer>,
}

impl Extractor {
    pub fn new(renderer: Arc<dyn PageRenderer>) -> Self {
        Self { renderer }
    }

    /// An extractor that never renders page images.
    pub fn text_only() -> Self {
        Self::new(Arc::new(NoopRenderer))
    }

    pub async fn extract(&self, pdf: &[u8]) -> Result<ExtractionResult, ExtractionError> {
        let pages = extract_pages(pdf).await?;

        let mut result = ExtractionResult {
            page_count: pages.len(),
            ..Default::default()
        };

        for (page_index, page) in pages.iter().enumerate() {
            let (texts, tables) = records_for_page(page_index, page);
            result.texts.extend(texts);
            result.tables.extend(tables);
        }

        result.images = match self.renderer.render(pdf).await {
            Ok(rendered) => rendered
                .iter()
                .enumerate()
                .map(|(idx, page)| ContentRecord {
                    channel: Channel::Image,
                    content: format!("Image from page {}", page.page),
                    page: page.page,
                    local_id: Some(format!("image_{}", idx)),
                    payload: Some(Payload::Image {
                        png_base64: page.to_base64(),
                    }),
                })
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "page rendering failed, continuing without images");
                Vec::new()
            }
        };

        tracing::info!(
            pages = result.page_count,
            texts = result.texts.len(),
            tables = result.tables.len(),
            images = result.images.len(),
            "extracted PDF"
        );

        Ok(result)
    }
}

/// CLI entry point for `pdfchat extract`.
///
/// Prints channel counts and every detected table. With `images_out`,
/// rendered pages are written there as `page-<n>.png`.
pub async fn run_extract(
    config: &Config,
    pdf_path: &Path,
    images_out: Option<&Path>,
) -> anyhow::Result<()> {
    let bytes = std::fs::read(pdf_path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", pdf_path.display(), e))?;
    let extractor = Extractor::new(create_renderer(&config.extraction));
    let result = extractor.extract(&bytes).await?;

    println!("{}", pdf_path.display());
    println!("  pages:  {}", result.page_count);
    println!("  texts:  {}", result.texts.len());
    println!("  tables: {}", result.tables.len());
    println!("  images: {}", result.images.len());
    println!("  total:  {}", result.record_count());

    for table in &result.tables {
        println!();
        println!(
            "--- {} (page {}) ---",
            table.local_id.as_deref().unwrap_or("table"),
            table.page
        );
        println!("{}", table.content);
    }

    if let Some(dir) = images_out {
        std::fs::create_dir_all(dir)?;
        for image in &result.images {
            if let Some(Payload::Image { png_base64 }) = &image.payload {
                let png = base64::engine::general_purpose::STANDARD.decode(png_base64)?;
                let path = dir.join(format!("page-{}.png", image.page));
                std::fs::write(&path, png)?;
                println!("wrote {}", path.display());
            }
        }
    }

    Ok(())
}

/// Per-page text and layout, one entry per page in page order.
///
/// `pdf-extract` can panic on malformed input, so parsing runs on the
/// blocking pool and a panic surfaces as [`ExtractionError::Panicked`].
async fn extract_pages(pdf: &[u8]) -> Result<Vec<PageContent>, ExtractionError> {
    let bytes = pdf.to_vec();
    tokio::task::spawn_blocking(move || {
        read_pages(&bytes).map_err(|e| ExtractionError::Pdf(e.to_string()))
    })
    .await
    .map_err(|e| ExtractionError::Panicked(e.to_string()))?
}

/// Build the text record and table records for one page.
///
/// `page_index` is 0-based; records carry the 1-based page number and
/// tables are tagged `table_<page_index>_<idx>`.
fn records_for_page(
    page_index: usize,
    content: &PageContent,
) -> (Option<ContentRecord>, Vec<ContentRecord>) {
    let page = page_index as u32 + 1;

    let text_record = (!content.text.trim().is_empty()).then(|| ContentRecord {
        channel: Channel::Text,
        content: content.text.clone(),
        page,
        local_id: None,
        payload: None,
    });

    let tables = detect_tables(&content.layout)
        .into_iter()
        .enumerate()
        .map(|(idx, table)| ContentRecord {
            channel: Channel::Table,
            content: table.render(),
            page,
            local_id: Some(format!("table_{}_{}", page_index, idx)),
            payload: Some(Payload::Table {
                headers: table.headers.clone(),
                rows: table.records(),
            }),
        })
        .collect();

    (text_record, tables)
}
