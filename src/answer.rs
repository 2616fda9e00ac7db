//! Retrieval and answer generation for one question about one document.
//!
//! Nothing is cached between questions: every call loads the document's
//! index from the store, embeds the question with the shared embedding
//! model, ranks chunks, composes a grounded prompt and asks the generator.

use std::sync::Arc;

use crate::embedding::{self, EmbeddingProvider};
use crate::error::QueryError;
use crate::generation::Generator;
use crate::index::IndexStore;
use crate::models::{Chunk, VectorIndex};
use crate::prompt::compose_prompt;
use crate::search;

pub const DEFAULT_TOP_K: usize = 4;
pub const DEFAULT_LANGUAGE: &str = "English";

pub struct AnswerEngine {
    store: Arc<dyn IndexStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn Generator>,
    top_k: usize,
    language: String,
}

impl AnswerEngine {
    pub fn new(
        store: Arc<dyn IndexStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            top_k: DEFAULT_TOP_K,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// The `top_k` chunks of `document` closest to `question`, best first.
    pub async fn retrieve(&self, document: &str, question: &str) -> Result<Vec<Chunk>, QueryError> {
        let index = self.store.load(document).await?;
        self.check_embedding_space(&index)?;

        let query = embedding::embed_query(self.embedder.as_ref(), question)
            .await
            .map_err(|e| QueryError::Embedding(format!("{:#}", e)))?;
        if query.len() != index.dims {
            return Err(QueryError::Embedding(format!(
                "question vector has {} dims, expected {}",
                query.len(),
                index.dims
            )));
        }

        let hits = search::top_k(&index, &query, self.top_k);
        tracing::debug!(
            document,
            chunks = hits.len(),
            best = hits.first().map(|h| h.score),
            "retrieved context"
        );
        Ok(hits.into_iter().map(|hit| hit.chunk.clone()).collect())
    }

    /// Answer `question` from the content of `document` only.
    ///
    /// Returns the generator's output with surrounding whitespace trimmed.
    pub async fn answer(&self, document: &str, question: &str) -> Result<String, QueryError> {
        let chunks = self.retrieve(document, question).await?;
        let context: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let prompt = compose_prompt(&context, question, &self.language);

        let output = self
            .generator
            .complete(&prompt)
            .await
            .map_err(|e| QueryError::Generation(format!("{:#}", e)))?;

        Ok(output.trim().to_string())
    }

    fn check_embedding_space(&self, index: &VectorIndex) -> Result<(), QueryError> {
        if index.model != self.embedder.model_name() || index.dims != self.embedder.dims() {
            return Err(QueryError::Retrieval {
                document: index.document.clone(),
                reason: format!(
                    "index was built with {} ({} dims) but the active model is {} ({} dims)",
                    index.model,
                    index.dims,
                    self.embedder.model_name(),
                    self.embedder.dims()
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::hash_text;
    use crate::index::memory::MemoryIndexStore;
    use crate::models::IndexedChunk;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    /// Maps texts mentioning "apple" to one axis and everything else to the other.
    struct AxisEmbedder {
        model: &'static str,
    }

    #[async_trait]
    impl EmbeddingProvider for AxisEmbedder {
        fn model_name(&self) -> &str {
            self.model
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.to_lowercase().contains("apple") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Generator for RecordingGenerator {
        fn model_name(&self) -> &str {
            "recording"
        }
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("  Green.\n".to_string())
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        fn model_name(&self) -> &str {
            "failing"
        }
        async fn complete(&self, _prompt: &str) -> Result<String> {
            anyhow::bail!("upstream timed out")
        }
    }

    fn entry(index: usize, text: &str, vector: [f32; 2]) -> IndexedChunk {
        IndexedChunk {
            chunk: Chunk {
                index,
                text: text.to_string(),
                hash: hash_text(text),
            },
            vector: vector.to_vec(),
        }
    }

    async fn store_with_fruit_index(model: &str) -> Arc<MemoryIndexStore> {
        let store = Arc::new(MemoryIndexStore::new());
        store
            .save(&VectorIndex {
                document: "fruit.txt".to_string(),
                model: model.to_string(),
                dims: 2,
                created_at: Utc::now(),
                entries: vec![
                    entry(0, "Bananas are yellow.", [0.0, 1.0]),
                    entry(1, "Apples are green.", [1.0, 0.0]),
                ],
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_answer_is_trimmed_and_prompt_grounded() {
        let store = store_with_fruit_index("axis").await;
        let generator = Arc::new(RecordingGenerator::default());
        let engine = AnswerEngine::new(store, Arc::new(AxisEmbedder { model: "axis" }), generator.clone())
            .with_top_k(1);

        let answer = engine.answer("fruit.txt", "What color is an apple?").await.unwrap();
        assert_eq!(answer, "Green.");

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("Apples are green."));
        assert!(!prompts[0].contains("Bananas"));
    }

    #[tokio::test]
    async fn test_missing_index() {
        let engine = AnswerEngine::new(
            Arc::new(MemoryIndexStore::new()),
            Arc::new(AxisEmbedder { model: "axis" }),
            Arc::new(RecordingGenerator::default()),
        );
        let err = engine.answer("nope.pdf", "q").await.unwrap_err();
        assert!(matches!(err, QueryError::IndexNotFound(name) if name == "nope.pdf"));
    }

    #[tokio::test]
    async fn test_model_mismatch_is_retrieval_error() {
        let store = store_with_fruit_index("other-model").await;
        let engine = AnswerEngine::new(
            store,
            Arc::new(AxisEmbedder { model: "axis" }),
            Arc::new(RecordingGenerator::default()),
        );
        let err = engine.answer("fruit.txt", "q").await.unwrap_err();
        assert_eq!(err.tag(), "retrieval_failed");
    }

    #[tokio::test]
    async fn test_generator_failure() {
        let store = store_with_fruit_index("axis").await;
        let engine = AnswerEngine::new(
            store,
            Arc::new(AxisEmbedder { model: "axis" }),
            Arc::new(FailingGenerator),
        );
        let err = engine.answer("fruit.txt", "apple?").await.unwrap_err();
        assert!(matches!(err, QueryError::Generation(_)));
    }

    #[tokio::test]
    async fn test_retrieve_ranks_best_first() {
        let store = store_with_fruit_index("axis").await;
        let engine = AnswerEngine::new(
            store,
            Arc::new(AxisEmbedder { model: "axis" }),
            Arc::new(RecordingGenerator::default()),
        );
        let chunks = engine.retrieve("fruit.txt", "banana color").await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Bananas are yellow.");
    }
}
