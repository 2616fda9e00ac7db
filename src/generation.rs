//! Text generation backends.
//!
//! A [`Generator`] turns a fully composed prompt into completion text. The
//! answer engine returns that text verbatim, so providers must not add
//! framing of their own. Requests are bounded by the configured timeout and
//! never retried.
//!
//! | Config Value | Backend | Endpoint |
//! |-------------|---------|----------|
//! | `"disabled"` | [`DisabledGenerator`] | none |
//! | `"openai"` | [`OpenAIGenerator`] | `POST /v1/chat/completions` |
//! | `"ollama"` | [`OllamaGenerator`] | `POST /api/generate` |
//! | `"huggingface"` | [`HuggingFaceGenerator`] | Inference API text-generation |

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;

const DEFAULT_HF_MODEL: &str = "mistralai/Mixtral-8x7B-Instruct-v0.1";

#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;
    /// Complete `prompt`, returning only the newly generated text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Sampling parameters shared by all HTTP backends.
#[derive(Debug, Clone, Copy)]
struct Sampling {
    temperature: f32,
    max_tokens: u32,
}

impl From<&GenerationConfig> for Sampling {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

fn http_client(config: &GenerationConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

async fn read_json(response: reqwest::Response, backend: &str) -> Result<serde_json::Value> {
    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("{} API error {}: {}", backend, status, body_text);
    }
    Ok(response.json().await?)
}

// ============ Disabled ============

pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _prompt: &str) -> Result<String> {
        bail!("Generation provider is disabled. Set [generation] provider in config.")
    }
}

// ============ OpenAI ============

/// Chat-completions backend. Requires `OPENAI_API_KEY`.
pub struct OpenAIGenerator {
    model: String,
    url: String,
    api_key: String,
    sampling: Sampling,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string());

        Ok(Self {
            model,
            url,
            api_key,
            sampling: config.into(),
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.sampling.temperature,
            "max_tokens": self.sampling.max_tokens,
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("OpenAI completion request failed")?;

        let json = read_json(response, "OpenAI").await?;
        parse_openai_completion(&json)
    }
}

fn parse_openai_completion(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

// ============ Ollama ============

/// Non-streaming `/api/generate` backend.
pub struct OllamaGenerator {
    model: String,
    url: String,
    sampling: Sampling,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            url,
            sampling: config.into(),
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.sampling.temperature,
                "num_predict": self.sampling.max_tokens,
            },
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Ollama connection error (is Ollama running at {}?)", self.url))?;

        let json = read_json(response, "Ollama").await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response"))
    }
}

// ============ Hugging Face ============

/// Hugging Face Inference API text-generation backend.
///
/// Requires `HUGGINGFACEHUB_API_TOKEN`. `return_full_text` is disabled so
/// the prompt is not echoed back into the answer.
pub struct HuggingFaceGenerator {
    model: String,
    url: String,
    token: String,
    sampling: Sampling,
    client: reqwest::Client,
}

impl HuggingFaceGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_HF_MODEL.to_string());
        let token = std::env::var("HUGGINGFACEHUB_API_TOKEN")
            .map_err(|_| anyhow::anyhow!("HUGGINGFACEHUB_API_TOKEN environment variable not set"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| format!("https://api-inference.huggingface.co/models/{}", model));

        Ok(Self {
            model,
            url,
            token,
            sampling: config.into(),
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl Generator for HuggingFaceGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "inputs": prompt,
            "parameters": {
                "temperature": self.sampling.temperature,
                "max_new_tokens": self.sampling.max_tokens,
                "return_full_text": false,
            },
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .context("Hugging Face inference request failed")?;

        let json = read_json(response, "Hugging Face").await?;
        parse_hf_completion(&json)
    }
}

/// The Inference API answers with either `[{generated_text}]` or `{generated_text}`.
fn parse_hf_completion(json: &serde_json::Value) -> Result<String> {
    json.pointer("/0/generated_text")
        .or_else(|| json.get("generated_text"))
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid Hugging Face response: missing generated_text"))
}

pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        "huggingface" => Ok(Arc::new(HuggingFaceGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_openai_completion() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "Paris" } }]
        });
        assert_eq!(parse_openai_completion(&json).unwrap(), "Paris");
    }

    #[test]
    fn test_parse_openai_completion_missing_content() {
        let json = serde_json::json!({ "choices": [] });
        assert!(parse_openai_completion(&json).is_err());
    }

    #[test]
    fn test_parse_hf_completion_both_shapes() {
        let list = serde_json::json!([{ "generated_text": " Paris" }]);
        let object = serde_json::json!({ "generated_text": "Paris" });
        assert_eq!(parse_hf_completion(&list).unwrap(), " Paris");
        assert_eq!(parse_hf_completion(&object).unwrap(), "Paris");
    }

    #[test]
    fn test_parse_hf_error_body() {
        let json = serde_json::json!({ "error": "Model is currently loading" });
        assert!(parse_hf_completion(&json).is_err());
    }

    #[tokio::test]
    async fn test_disabled_generator_errors() {
        assert!(DisabledGenerator.complete("prompt").await.is_err());
    }
}
