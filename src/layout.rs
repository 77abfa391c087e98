//! Positioned page layout.
//!
//! `pdf-extract`'s plain-text output turns every horizontal gap into a
//! single space and separates rows with blank lines, so column boundaries
//! are gone by the time the text reaches [`crate::table`]. This module
//! listens to the same glyph stream through [`OutputDev`], keeps each
//! glyph's position, and rebuilds every page as one line per baseline with
//! a tab wherever two glyphs are at least [`CELL_GAP_EMS`] apart.

use pdf_extract::{Document, MediaBox, OutputDev, OutputError, PlainTextOutput, Transform};

/// Horizontal gap, in ems of the following glyph, that separates cells.
pub const CELL_GAP_EMS: f64 = 1.0;

/// Gaps wider than this (in ems) but narrower than a cell gap are a space.
const WORD_GAP_EMS: f64 = 0.1;

/// Glyphs whose baselines differ by less than this many ems share a line.
const LINE_TOLERANCE_EMS: f64 = 0.5;

/// One page as reading-order text and as tab-separated layout lines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageContent {
    pub text: String,
    pub layout: String,
}

/// A glyph in top-down page coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub x: f64,
    pub y: f64,
    /// Advance width in page units.
    pub width: f64,
    /// Rendered font size in page units.
    pub size: f64,
    pub text: String,
}

/// [`OutputDev`] that records glyph positions for a single page.
#[derive(Default)]
struct GlyphCollector {
    page_height: f64,
    glyphs: Vec<Glyph>,
}

impl OutputDev for GlyphCollector {
    fn begin_page(
        &mut self,
        _page_num: u32,
        media_box: &MediaBox,
        _art_box: Option<(f64, f64, f64, f64)>,
    ) -> Result<(), OutputError> {
        self.page_height = media_box.ury - media_box.lly;
        Ok(())
    }

    fn end_page(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn output_character(
        &mut self,
        trm: &Transform,
        width: f64,
        _spacing: f64,
        font_size: f64,
        char: &str,
    ) -> Result<(), OutputError> {
        // Side of the square with the area of the transformed em box.
        let size = (font_size * (trm.m11 + trm.m21) * font_size * (trm.m12 + trm.m22))
            .abs()
            .sqrt();
        self.glyphs.push(Glyph {
            x: trm.m31,
            y: self.page_height - trm.m32,
            width: width * size,
            size,
            text: char.to_string(),
        });
        Ok(())
    }

    fn begin_word(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn end_word(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn end_line(&mut self) -> Result<(), OutputError> {
        Ok(())
    }
}

/// Read every page of `pdf` in page order.
///
/// Runs synchronously and can panic inside `pdf-extract` on malformed
/// input; call it from a blocking task.
pub fn read_pages(pdf: &[u8]) -> Result<Vec<PageContent>, OutputError> {
    let mut doc = Document::load_mem(pdf)?;
    if doc.is_encrypted() {
        doc.decrypt("")?;
    }

    let mut pages = Vec::new();
    for page_num in doc.get_pages().into_keys() {
        let mut text = String::new();
        pdf_extract::output_doc_page(&doc, &mut PlainTextOutput::new(&mut text), page_num)?;

        let mut collector = GlyphCollector::default();
        pdf_extract::output_doc_page(&doc, &mut collector, page_num)?;

        pages.push(PageContent {
            text,
            layout: layout_lines(&collector.glyphs),
        });
    }
    Ok(pages)
}

/// Group glyphs into baselines (top to bottom) and join each baseline
/// left to right, inserting a space for word gaps and a tab for cell gaps.
pub fn layout_lines(glyphs: &[Glyph]) -> String {
    let mut visible: Vec<&Glyph> = glyphs.iter().filter(|g| !g.text.trim().is_empty()).collect();
    visible.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));

    let mut lines: Vec<Vec<&Glyph>> = Vec::new();
    for glyph in visible {
        match lines.last_mut() {
            Some(line) if same_baseline(line[0], glyph) => line.push(glyph),
            _ => lines.push(vec![glyph]),
        }
    }

    lines
        .iter_mut()
        .map(|line| join_line(line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn same_baseline(first: &Glyph, glyph: &Glyph) -> bool {
    (glyph.y - first.y).abs() < first.size.max(glyph.size) * LINE_TOLERANCE_EMS
}

fn join_line(line: &mut [&Glyph]) -> String {
    line.sort_by(|a, b| a.x.total_cmp(&b.x));

    let mut out = String::new();
    let mut last_end: Option<f64> = None;
    for glyph in line.iter() {
        if let Some(end) = last_end {
            let gap = glyph.x - end;
            if gap >= glyph.size * CELL_GAP_EMS {
                out.push('\t');
            } else if gap > glyph.size * WORD_GAP_EMS {
                out.push(' ');
            }
        }
        out.push_str(&glyph.text);
        let end = glyph.x + glyph.width;
        last_end = Some(last_end.map_or(end, |e| e.max(end)));
    }
    out
}
