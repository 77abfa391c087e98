//! Page rasterization.
//!
//! Every page of an uploaded PDF is rendered to a PNG and carried as a
//! base64 payload on an image record. Rendering is supplementary: callers
//! treat any error from a [`PageRenderer`] as "no images".
//!
//! The default backend shells out to poppler's `pdftoppm`, which writes
//! one `<prefix>-<n>.png` per page (zero-padded to the width of the page
//! count).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use std::path::Path;
use std::sync::Arc;

use crate::config::ExtractionConfig;

/// One rendered page.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    /// 1-based page number.
    pub page: u32,
    pub png: Vec<u8>,
}

impl RenderedPage {
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.png)
    }
}

#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Render every page of the PDF, in page order.
    async fn render(&self, pdf: &[u8]) -> Result<Vec<RenderedPage>>;
}

/// Renderer used when image rendering is turned off.
pub struct NoopRenderer;

#[async_trait]
impl PageRenderer for NoopRenderer {
    async fn render(&self, _pdf: &[u8]) -> Result<Vec<RenderedPage>> {
        Ok(Vec::new())
    }
}

/// Renders pages with the `pdftoppm` executable.
pub struct PdftoppmRenderer {
    program: String,
    dpi: u32,
}

impl PdftoppmRenderer {
    pub fn new(program: impl Into<String>, dpi: u32) -> Self {
        Self {
            program: program.into(),
            dpi,
        }
    }
}

#[async_trait]
impl PageRenderer for PdftoppmRenderer {
    async fn render(&self, pdf: &[u8]) -> Result<Vec<RenderedPage>> {
        let workdir = tempfile::TempDir::new().context("failed to create render directory")?;
        let input = workdir.path().join("input.pdf");
        tokio::fs::write(&input, pdf).await?;

        let output = tokio::process::Command::new(&self.program)
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(&input)
            .arg(workdir.path().join("page"))
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.program))?;

        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        collect_pages(workdir.path()).await
    }
}

/// The renderer selected by `[extraction]`.
pub fn create_renderer(config: &ExtractionConfig) -> Arc<dyn PageRenderer> {
    if !config.render_images || config.renderer == "none" {
        return Arc::new(NoopRenderer);
    }
    Arc::new(PdftoppmRenderer::new(config.renderer.clone(), config.dpi))
}

/// Read `page-<n>.png` files from `dir`, ordered by page number.
async fn collect_pages(dir: &Path) -> Result<Vec<RenderedPage>> {
    let mut numbered = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if let Some(page) = page_number(&name.to_string_lossy()) {
            numbered.push((page, entry.path()));
        }
    }
    numbered.sort_by_key(|(page, _)| *page);

    let mut pages = Vec::with_capacity(numbered.len());
    for (page, path) in numbered {
        let png = tokio::fs::read(&path).await?;
        pages.push(RenderedPage { page, png });
    }
    Ok(pages)
}

/// Parse the page number from a `page-07.png` style file name.
fn page_number(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix("page-")?
        .strip_suffix(".png")?
        .parse()
        .ok()
}
