//! Ingestion and answering against real stores and in-test documents.

mod common;

use askpdf::chunk::TextSplitter;
use askpdf::error::{IngestError, QueryError};
use askpdf::extract::ExtractError;
use askpdf::index::fs::FsIndexStore;
use askpdf::index::memory::MemoryIndexStore;
use askpdf::index::IndexStore;
use askpdf::ingest::Ingestor;
use common::*;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_pdf_ingest_and_answer() {
    let tmp = TempDir::new().unwrap();
    let store: Arc<dyn IndexStore> = Arc::new(FsIndexStore::new(tmp.path().join("indexes")));
    let generator = Arc::new(ExtractiveGenerator::default());

    let report = ingestor(store.clone())
        .ingest("doc.pdf", minimal_pdf_with_text("The capital of France is Paris."))
        .await
        .unwrap();
    assert_eq!(report.document, "doc.pdf");
    assert!(report.chunks >= 1);
    assert_eq!(report.dims, DIMS);
    assert!(tmp.path().join("indexes/doc.pdf.index.json").exists());

    let answer = engine(store, generator.clone())
        .answer("doc.pdf", "What is the capital of France?")
        .await
        .unwrap();
    assert_eq!(answer, "Paris");
    assert!(generator.prompts.lock().unwrap()[0].contains("Paris"));
}

#[tokio::test]
async fn test_nearest_chunk_is_retrieved() {
    let store: Arc<dyn IndexStore> = Arc::new(MemoryIndexStore::new());
    Ingestor::new(store.clone(), Arc::new(BagOfWordsEmbedder), TextSplitter::new(40, 0))
        .ingest("capitals.txt", CAPITALS.as_bytes().to_vec())
        .await
        .unwrap();

    let index = store.load("capitals.txt").await.unwrap();
    assert_eq!(index.entries.len(), 6);
    assert!(index.entries.iter().all(|e| e.vector.len() == index.dims));

    let engine = engine(store, Arc::new(ExtractiveGenerator::default()));
    let chunks = engine
        .retrieve("capitals.txt", "What is the capital of Spain?")
        .await
        .unwrap();
    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks[0].text, "The capital of Spain is Madrid.");

    let answer = engine
        .answer("capitals.txt", "What is the capital of Italy?")
        .await
        .unwrap();
    assert_eq!(answer, "Rome");
}

#[tokio::test]
async fn test_docx_paragraphs_are_indexed() {
    let store: Arc<dyn IndexStore> = Arc::new(MemoryIndexStore::new());
    ingestor(store.clone())
        .ingest(
            "memo.docx",
            minimal_docx(&["The capital of Germany is Berlin.", "Unrelated closing remark."]),
        )
        .await
        .unwrap();

    let answer = engine(store, Arc::new(ExtractiveGenerator::default()))
        .answer("memo.docx", "What is the capital of Germany?")
        .await
        .unwrap();
    assert_eq!(answer, "Berlin");
}

#[tokio::test]
async fn test_missing_index_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let store: Arc<dyn IndexStore> = Arc::new(FsIndexStore::new(tmp.path()));
    let generator = Arc::new(ExtractiveGenerator::default());

    let err = engine(store, generator.clone())
        .answer("missing.pdf", "Anything?")
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::IndexNotFound(ref name) if name == "missing.pdf"));
    assert_eq!(err.tag(), "index_not_found");
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_corrupt_index_is_retrieval_error() {
    let store = Arc::new(MemoryIndexStore::new());
    store.insert_raw("doc.pdf", b"{\"format\": 1}".to_vec());

    let err = engine(store, Arc::new(ExtractiveGenerator::default()))
        .answer("doc.pdf", "q?")
        .await
        .unwrap_err();
    assert_eq!(err.tag(), "retrieval_failed");
}

#[tokio::test]
async fn test_generation_failure_is_reported() {
    let store: Arc<dyn IndexStore> = Arc::new(MemoryIndexStore::new());
    ingestor(store.clone())
        .ingest("capitals.txt", CAPITALS.as_bytes().to_vec())
        .await
        .unwrap();

    let err = engine(store, Arc::new(FailingGenerator))
        .answer("capitals.txt", "What is the capital of France?")
        .await
        .unwrap_err();
    assert_eq!(err.tag(), "generation_failed");
}

#[tokio::test]
async fn test_blank_document_is_rejected() {
    let store: Arc<dyn IndexStore> = Arc::new(MemoryIndexStore::new());
    let err = ingestor(store.clone())
        .ingest("blank.txt", b"   \n\n  ".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Extraction(ExtractError::Empty)));
    assert!(!store.exists("blank.txt").await.unwrap());
}

#[tokio::test]
async fn test_failed_reingest_keeps_previous_index() {
    let tmp = TempDir::new().unwrap();
    let store: Arc<dyn IndexStore> = Arc::new(FsIndexStore::new(tmp.path()));
    let ingestor = ingestor(store.clone());

    ingestor
        .ingest("notes.txt", b"The capital of Austria is Vienna.".to_vec())
        .await
        .unwrap();
    assert!(ingestor.ingest("notes.txt", vec![0xff, 0xfe, 0x00]).await.is_err());

    let answer = engine(store, Arc::new(ExtractiveGenerator::default()))
        .answer("notes.txt", "What is the capital of Austria?")
        .await
        .unwrap();
    assert_eq!(answer, "Vienna");
}

#[tokio::test]
async fn test_overlong_name_is_rejected_and_never_found() {
    let tmp = TempDir::new().unwrap();
    let store: Arc<dyn IndexStore> = Arc::new(FsIndexStore::new(tmp.path()));
    let name = format!("{}.pdf", "a".repeat(246));

    let err = ingestor(store.clone())
        .ingest(&name, b"The capital of Spain is Madrid.".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::InvalidName { .. }));

    let err = engine(store, Arc::new(ExtractiveGenerator::default()))
        .answer(&name, "What is the capital of Spain?")
        .await
        .unwrap_err();
    assert_eq!(err.tag(), "index_not_found");
}
