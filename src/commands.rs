//! CLI command implementations.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::metadata::MetadataStore;
use crate::server::AppState;

pub async fn run_init(config: &Config) -> Result<()> {
    let store = MetadataStore::open(&config.db.path).await?;
    store.close().await;
    std::fs::create_dir_all(config.storage.indexes_dir())?;
    std::fs::create_dir_all(config.storage.uploads_dir())?;
    println!("Database initialized successfully.");
    Ok(())
}

pub async fn run_ingest(config: &Config, path: &Path, name: Option<String>) -> Result<()> {
    let name = match name {
        Some(name) => name,
        None => path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("Cannot derive a document name from {}", path.display()))?,
    };
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let state = AppState::from_config(config).await?;
    let report = state.store_document(&name, bytes).await?;

    println!("ingest {}", report.document);
    println!("  chunks: {}", report.chunks);
    println!("  dims: {}", report.dims);
    Ok(())
}

pub async fn run_ask(config: &Config, document: &str, question: &str) -> Result<()> {
    if question.trim().is_empty() {
        bail!("question must not be empty");
    }

    let state = AppState::from_config(config).await?;
    let answer = state.engine.answer(document, question).await?;
    println!("{}", answer);

    if let Err(e) = state.metadata.add_question(document, question, &answer).await {
        tracing::warn!(document, error = %e, "failed to record question");
    }
    Ok(())
}

pub async fn run_questions(config: &Config, document: &str, delete: bool) -> Result<()> {
    let store = MetadataStore::open(&config.db.path).await?;
    if store.get_document(document).await?.is_none() {
        bail!("document not found: {}", document);
    }

    if delete {
        let deleted = store.delete_questions(document).await?;
        println!("Deleted {} questions for {}.", deleted, document);
    } else {
        let questions = store.list_questions(document).await?;
        if questions.is_empty() {
            println!("No questions.");
        }
        for q in questions {
            println!("[{}] {}", q.asked_at.format("%Y-%m-%d %H:%M"), q.question);
            println!("  {}", q.answer);
        }
    }

    store.close().await;
    Ok(())
}
