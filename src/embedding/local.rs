//! Local embedding provider using fastembed-rs.
//!
//! The default model is multilingual: job postings in this corpus mix
//! Spanish and English freely, and taxonomy labels exist in both languages,
//! so an English-only model would cripple the semantic layer.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{EmbeddingError, Result};

use super::EmbeddingProvider;

/// Default local model.
pub const DEFAULT_LOCAL_MODEL: &str = "intfloat/multilingual-e5-base";

/// Local ONNX embedding provider.
pub struct LocalEmbeddingProvider {
    model: Arc<Mutex<TextEmbedding>>,
    /// E5-family models expect a "query: " prefix on inputs.
    query_prefix: Option<&'static str>,
    dimension: usize,
    max_batch_size: usize,
}

impl LocalEmbeddingProvider {
    /// Create a new local embedding provider with the specified model.
    pub fn new(model_name: &str) -> Result<Self> {
        let model = Self::parse_model_name(model_name)?;
        let dimension = Self::model_dimension(model_name);
        let query_prefix = if model_name.contains("e5") {
            Some("query: ")
        } else {
            None
        };

        let options = InitOptions::new(model).with_show_download_progress(false);
        let text_model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::Model(format!("{}: {}", model_name, e)))?;

        Ok(Self {
            model: Arc::new(Mutex::new(text_model)),
            query_prefix,
            dimension,
            max_batch_size: 64,
        })
    }

    /// Create with the default multilingual model.
    pub fn default_model() -> Result<Self> {
        Self::new(DEFAULT_LOCAL_MODEL)
    }

    fn parse_model_name(model_name: &str) -> Result<EmbeddingModel> {
        match model_name {
            "intfloat/multilingual-e5-small" | "multilingual-e5-small" => {
                Ok(EmbeddingModel::MultilingualE5Small)
            }
            "intfloat/multilingual-e5-base" | "multilingual-e5-base" => {
                Ok(EmbeddingModel::MultilingualE5Base)
            }
            "intfloat/multilingual-e5-large" | "multilingual-e5-large" => {
                Ok(EmbeddingModel::MultilingualE5Large)
            }
            "BAAI/bge-small-en-v1.5" | "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
            "BAAI/bge-base-en-v1.5" | "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
            "sentence-transformers/all-MiniLM-L6-v2" | "all-MiniLM-L6-v2" => {
                Ok(EmbeddingModel::AllMiniLML6V2)
            }
            _ => Err(EmbeddingError::Model(format!(
                "Unknown model: {}. Supported: multilingual-e5-small/base/large, \
                 bge-small-en-v1.5, bge-base-en-v1.5, all-MiniLM-L6-v2",
                model_name
            ))
            .into()),
        }
    }

    fn model_dimension(model_name: &str) -> usize {
        match model_name {
            s if s.contains("multilingual-e5-small") => 384,
            s if s.contains("multilingual-e5-base") => 768,
            s if s.contains("multilingual-e5-large") => 1024,
            s if s.contains("bge-small") => 384,
            s if s.contains("bge-base") => 768,
            s if s.contains("MiniLM-L6") => 384,
            _ => 768,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        if texts.len() > self.max_batch_size {
            return Err(EmbeddingError::BatchTooLarge(texts.len(), self.max_batch_size).into());
        }

        let inputs: Vec<String> = match self.query_prefix {
            Some(prefix) => texts.iter().map(|t| format!("{prefix}{t}")).collect(),
            None => texts.to_vec(),
        };
        let model = self.model.clone();

        // fastembed is synchronous; keep it off the async runtime threads.
        let embeddings = tokio::task::spawn_blocking(move || {
            let mut model = model.blocking_lock();
            model.embed(inputs, None)
        })
        .await
        .map_err(|e| EmbeddingError::Model(format!("Task join error: {}", e)))?
        .map_err(|e| EmbeddingError::Model(format!("Embedding failed: {}", e)))?;

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}
