//! Shared fixtures for integration tests: byte-built PDFs and deterministic
//! stand-ins for the embedding and generation providers.

#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use pdfchat::chat::Assistant;
use pdfchat::config::Config;
use pdfchat::embedding::Embedder;
use pdfchat::extract::Extractor;
use pdfchat::generation::GenerativeModel;
use pdfchat::store::VectorIndex;

/// A PDF with one page per entry; each page shows its lines top to bottom
/// in Helvetica. Offsets in the xref table are computed, so the output
/// parses with `pdf-extract`.
pub fn pdf_with_pages(pages: &[&[&str]]) -> Vec<u8> {
    let streams = pages
        .iter()
        .map(|lines| {
            let mut stream = String::from("BT /F1 12 Tf 72 720 Td\n");
            for (n, line) in lines.iter().enumerate() {
                if n > 0 {
                    stream.push_str("0 -14 Td\n");
                }
                stream.push_str(&format!("({}) Tj\n", escape(line)));
            }
            stream.push_str("ET");
            stream
        })
        .collect::<Vec<_>>();
    pdf_from_streams(&streams)
}

/// A one-page PDF with each string placed at its own `(x, y)` through a
/// text matrix, the way table generators lay out cells.
pub fn pdf_with_cells(cells: &[(f64, f64, &str)]) -> Vec<u8> {
    let mut stream = String::from("BT /F1 12 Tf\n");
    for (x, y, text) in cells {
        stream.push_str(&format!("1 0 0 1 {} {} Tm ({}) Tj\n", x, y, escape(text)));
    }
    stream.push_str("ET");
    pdf_from_streams(&[stream])
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

fn pdf_from_streams(streams: &[String]) -> Vec<u8> {
    let page_count = streams.len();
    // 1: catalog, 2: pages, 3: font, then (page, contents) pairs.
    let page_obj = |i: usize| 4 + 2 * i;
    let kids: Vec<String> = (0..page_count)
        .map(|i| format!("{} 0 R", page_obj(i)))
        .collect();

    let mut objects: Vec<Vec<u8>> = vec![
        b"<< /Type /Catalog /Pages 2 0 R >>".to_vec(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            page_count
        )
        .into_bytes(),
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_vec(),
    ];

    for (i, stream) in streams.iter().enumerate() {
        objects.push(
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R \
                 /Resources << /Font << /F1 3 0 R >> >> >>",
                page_obj(i) + 1
            )
            .into_bytes(),
        );
        let mut contents = format!("<< /Length {} >>\nstream\n", stream.len()).into_bytes();
        contents.extend_from_slice(stream.as_bytes());
        contents.extend_from_slice(b"\nendstream");
        objects.push(contents);
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}

/// Bag-of-words embedder: each lower-cased word bumps one of 64 buckets.
/// Texts sharing words land close together; calls are counted.
#[derive(Default)]
pub struct HashingEmbedder {
    pub calls: AtomicUsize,
}

impl HashingEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn hash_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 64];
    for word in text.split_whitespace() {
        let word: String = word
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        if word.is_empty() {
            continue;
        }
        let mut hasher = DefaultHasher::new();
        word.hash(&mut hasher);
        v[(hasher.finish() % 64) as usize] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hashing-test"
    }
    fn dims(&self) -> usize {
        64
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| hash_vector(t)).collect())
    }
}

/// Embedder whose provider is always down.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing-test"
    }
    fn dims(&self) -> usize {
        64
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        anyhow::bail!("embedding service unavailable")
    }
}

/// Generator that answers with a fixed text and records every prompt.
pub struct ScriptedGenerator {
    answer: String,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeModel for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted-test"
    }
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.answer.clone())
    }
}

/// Generator that always fails with `quota exceeded`.
pub struct FailingGenerator;

#[async_trait]
impl GenerativeModel for FailingGenerator {
    fn model_name(&self) -> &str {
        "failing-test"
    }
    async fn generate(&self, _prompt: &str) -> Result<String> {
        anyhow::bail!("quota exceeded")
    }
}

/// A text-only assistant over `index` with the given fakes.
pub fn assistant(
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn GenerativeModel>,
) -> Assistant {
    Assistant::new(
        Extractor::text_only(),
        index,
        embedder,
        generator,
        &Config::default(),
    )
}
