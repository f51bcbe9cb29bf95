//! Embedding provider implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use super::embedder::{EmbeddingProvider, ProviderError, TaskHint};
use super::retry::{is_transient_status, is_transient_transport};
use crate::config::Config;
use crate::error::{AppError, Result};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";
const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Build the provider named in the configuration
pub fn from_config(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let api_key = || {
        std::env::var(&config.embedding_api_key_env).map_err(|_| {
            AppError::Config(format!(
                "{} is required for the {} embedding provider",
                config.embedding_api_key_env, config.embedding_provider
            ))
        })
    };
    let client = || {
        reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(AppError::from)
    };

    match config.embedding_provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiEmbeddings::new(
            client()?,
            config.embedding_api_url.as_deref().unwrap_or(OPENAI_API_URL),
            &api_key()?,
            &config.embedding_model,
        ))),
        "gemini" => Ok(Arc::new(GeminiEmbeddings::new(
            client()?,
            config.embedding_api_url.as_deref().unwrap_or(GEMINI_API_URL),
            &api_key()?,
            &config.embedding_model,
        ))),
        "local" => Ok(Arc::new(LocalEmbeddings::new(&config.embedding_model)?)),
        other => Err(AppError::Config(format!(
            "Unknown embedding provider: {other}. Supported: openai, gemini, local"
        ))),
    }
}

fn classify_transport(err: &reqwest::Error) -> ProviderError {
    if is_transient_transport(err) {
        ProviderError::Transient(err.to_string())
    } else {
        ProviderError::Fatal(err.to_string())
    }
}

async fn classify_status(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = format!("provider returned {status}: {body}");
    if is_transient_status(status) {
        ProviderError::Transient(message)
    } else {
        ProviderError::Fatal(message)
    }
}

// =========================================================================
// OpenAI-compatible /embeddings
// =========================================================================

pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiItem>,
}

#[derive(Deserialize)]
struct OpenAiItem {
    embedding: Vec<f32>,
}

impl OpenAiEmbeddings {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str, _hint: TaskHint) -> std::result::Result<Vec<f32>, ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&OpenAiRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        if !response.status().is_success() {
            return Err(classify_status(response).await);
        }

        let parsed: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Fatal(format!("unexpected response body: {e}")))?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| ProviderError::Fatal("response contained no embedding".into()))
    }
}

// =========================================================================
// Gemini embedContent
// =========================================================================

pub struct GeminiEmbeddings {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    content: GeminiContent<'a>,
    task_type: &'static str,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: [GeminiPart<'a>; 1],
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GeminiResponse {
    embedding: GeminiValues,
}

#[derive(Deserialize)]
struct GeminiValues {
    values: Vec<f32>,
}

impl GeminiEmbeddings {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str, model: &str) -> Self {
        let model = model.trim_start_matches("models/");
        Self {
            client,
            endpoint: format!(
                "{}/models/{model}:embedContent",
                base_url.trim_end_matches('/')
            ),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    fn task_type(hint: TaskHint) -> &'static str {
        match hint {
            TaskHint::Document => "RETRIEVAL_DOCUMENT",
            TaskHint::Query => "RETRIEVAL_QUERY",
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddings {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str, hint: TaskHint) -> std::result::Result<Vec<f32>, ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&GeminiRequest {
                content: GeminiContent {
                    parts: [GeminiPart { text }],
                },
                task_type: Self::task_type(hint),
            })
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        if !response.status().is_success() {
            return Err(classify_status(response).await);
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Fatal(format!("unexpected response body: {e}")))?;
        Ok(parsed.embedding.values)
    }
}

// =========================================================================
// Local fastembed model
// =========================================================================

pub struct LocalEmbeddings {
    model: Arc<Mutex<fastembed::TextEmbedding>>,
    model_id: String,
    query_prefix: &'static str,
}

impl LocalEmbeddings {
    /// Load a local model (downloaded on first use)
    pub fn new(model_name: &str) -> Result<Self> {
        let (model_type, query_prefix) = Self::parse_model_name(model_name)?;
        let options = fastembed::TextInitOptions::new(model_type);
        let model = fastembed::TextEmbedding::try_new(options)
            .map_err(|e| AppError::Other(format!("Failed to load embedding model: {e}")))?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_id: model_name.to_lowercase(),
            query_prefix,
        })
    }

    /// Model type plus the instruction prefix the model expects on queries
    fn parse_model_name(name: &str) -> Result<(fastembed::EmbeddingModel, &'static str)> {
        const BGE_QUERY: &str = "Represent this sentence for searching relevant passages: ";
        match name.to_lowercase().as_str() {
            "all-minilm-l6-v2" | "minilm" => Ok((fastembed::EmbeddingModel::AllMiniLML6V2, "")),
            "bge-small-en-v1.5" | "bge-small" => {
                Ok((fastembed::EmbeddingModel::BGESmallENV15, BGE_QUERY))
            }
            "bge-base-en-v1.5" | "bge-base" => {
                Ok((fastembed::EmbeddingModel::BGEBaseENV15, BGE_QUERY))
            }
            _ => Err(AppError::Config(format!(
                "Unknown local embedding model: {name}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5"
            ))),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddings {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, text: &str, hint: TaskHint) -> std::result::Result<Vec<f32>, ProviderError> {
        let input = match hint {
            TaskHint::Query => format!("{}{text}", self.query_prefix),
            TaskHint::Document => text.to_string(),
        };
        let model = Arc::clone(&self.model);

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| ProviderError::Fatal(format!("Failed to lock model: {e}")))?;
            model
                .embed(vec![input.as_str()], None)
                .map_err(|e| ProviderError::Fatal(format!("Failed to generate embedding: {e}")))?
                .into_iter()
                .next()
                .ok_or_else(|| ProviderError::Fatal("No embedding generated".into()))
        })
        .await
        .map_err(|e| ProviderError::Fatal(format!("Embedding task failed: {e}")))?
    }
}
