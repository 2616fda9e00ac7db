//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use anyhow::Result;
use askpdf::answer::AnswerEngine;
use askpdf::chunk::TextSplitter;
use askpdf::embedding::EmbeddingProvider;
use askpdf::generation::Generator;
use askpdf::index::IndexStore;
use askpdf::ingest::Ingestor;
use askpdf::session::{Inbound, SessionTransport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const DIMS: usize = 1024;

/// Deterministic bag-of-words embedder: each lowercase word is hashed into
/// one of [`DIMS`] buckets.
pub struct BagOfWordsEmbedder;

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

fn bucket(word: &str) -> usize {
    // FNV-1a
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in word.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % DIMS as u64) as usize
}

#[async_trait]
impl EmbeddingProvider for BagOfWordsEmbedder {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; DIMS];
                for w in words(text) {
                    v[bucket(&w)] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Answers with the last word of the context line sharing the most words
/// with the question. Counts its calls and keeps every prompt.
#[derive(Default)]
pub struct ExtractiveGenerator {
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl ExtractiveGenerator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn between<'a>(text: &'a str, start: &str, end: &str) -> &'a str {
    let from = text.find(start).map(|i| i + start.len()).unwrap_or(0);
    let rest = &text[from..];
    let to = rest.find(end).unwrap_or(rest.len());
    &rest[..to]
}

#[async_trait]
impl Generator for ExtractiveGenerator {
    fn model_name(&self) -> &str {
        "extractive"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        let context = between(prompt, "<context>", "</context>");
        let question: Vec<String> = words(between(prompt, "Question:", "\n")).collect();

        let mut best: Option<(usize, &str)> = None;
        for line in context.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let overlap = words(line).filter(|w| question.contains(w)).count();
            if best.map_or(true, |(score, _)| overlap > score) {
                best = Some((overlap, line));
            }
        }

        let answer = best
            .and_then(|(_, line)| line.split_whitespace().last())
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .unwrap_or_default();
        // Surrounding whitespace must not reach the client.
        Ok(format!("  {}\n", answer))
    }
}

pub struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    fn model_name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        anyhow::bail!("upstream unavailable")
    }
}

pub fn ingestor(store: Arc<dyn IndexStore>) -> Ingestor {
    Ingestor::new(store, Arc::new(BagOfWordsEmbedder), TextSplitter::new(4000, 200))
}

pub fn engine(store: Arc<dyn IndexStore>, generator: Arc<dyn Generator>) -> AnswerEngine {
    AnswerEngine::new(store, Arc::new(BagOfWordsEmbedder), generator)
}

/// Scripted in-memory transport.
#[derive(Default)]
pub struct MemoryTransport {
    pub inbound: VecDeque<Inbound>,
    pub sent: Vec<String>,
    pub closed: Option<(u16, String)>,
    pub recv_calls: usize,
}

impl MemoryTransport {
    pub fn with_texts(texts: &[&str]) -> Self {
        Self {
            inbound: texts.iter().map(|t| Inbound::Text(t.to_string())).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl SessionTransport for MemoryTransport {
    async fn recv(&mut self) -> Option<Inbound> {
        self.recv_calls += 1;
        self.inbound.pop_front()
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        self.sent.push(text);
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        self.closed = Some((code, reason.to_string()));
        Ok(())
    }
}

/// Single-page PDF showing `text` in Helvetica.
pub fn minimal_pdf_with_text(text: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", text);

    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

/// DOCX (ZIP) whose body has one paragraph per entry of `paragraphs`.
pub fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    use std::io::Write;
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

pub const CAPITALS: &str = "The capital of France is Paris.\n\n\
    The capital of Spain is Madrid.\n\n\
    The capital of Italy is Rome.\n\n\
    The capital of Germany is Berlin.\n\n\
    The capital of Portugal is Lisbon.\n\n\
    The capital of Austria is Vienna.";
