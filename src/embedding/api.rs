//! API-based embedding provider (OpenAI-compatible).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ApiEmbeddingConfig;
use crate::error::{EmbeddingError, Result};

use super::EmbeddingProvider;

/// OpenAI-compatible API embedding provider.
///
/// Works against OpenAI, Voyage, Cohere, or any self-hosted endpoint
/// exposing the `/embeddings` contract.
pub struct ApiEmbeddingProvider {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    dimension: usize,
    max_batch_size: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl ApiEmbeddingProvider {
    /// Create a provider from configuration.
    ///
    /// The API key falls back to the `EMBEDDING_API_KEY` environment
    /// variable when not set in config.
    pub fn from_config(config: &ApiEmbeddingConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("EMBEDDING_API_KEY").ok())
            .ok_or_else(|| {
                EmbeddingError::Api(
                    "API key not provided and EMBEDDING_API_KEY env var not set".to_string(),
                )
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::Api(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            dimension: Self::model_dimension(&config.model),
            max_batch_size: config.batch_size,
        })
    }

    fn model_dimension(model: &str) -> usize {
        match model {
            "text-embedding-3-small" => 1536,
            "text-embedding-3-large" => 3072,
            "text-embedding-ada-002" => 1536,
            "embed-multilingual-v3.0" => 1024,
            "embed-multilingual-light-v3.0" => 384,
            "voyage-multilingual-2" => 1024,
            _ => 1536,
        }
    }

    async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            encoding_format: "float",
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Api("Request timed out".to_string())
                } else {
                    EmbeddingError::Api(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            let result: EmbeddingResponse = response
                .json()
                .await
                .map_err(|e| EmbeddingError::Api(format!("Failed to parse response: {}", e)))?;

            let mut data = result.data;
            data.sort_by_key(|d| d.index);
            Ok(data.into_iter().map(|d| d.embedding).collect())
        } else if status.as_u16() == 429 {
            Err(EmbeddingError::RateLimited.into())
        } else {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            Err(EmbeddingError::Api(format!("API error ({}): {}", status, message)).into())
        }
    }
}

#[async_trait]
impl EmbeddingProvider for ApiEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        if texts.len() > self.max_batch_size {
            return Err(EmbeddingError::BatchTooLarge(texts.len(), self.max_batch_size).into());
        }
        self.request_embeddings(texts).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}
