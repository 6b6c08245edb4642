//! Embedding providers for the semantic matching layer.
//!
//! The semantic layer treats the embedding model as an external
//! collaborator: taxonomy labels are embedded once at startup, mentions are
//! embedded in one batched call per partition, and a provider failure
//! degrades the affected mentions to emergent instead of aborting the run.
//!
//! # Providers
//!
//! - [`LocalEmbeddingProvider`]: ONNX models via fastembed-rs; the default
//!   is multilingual (Spanish/English job text).
//! - [`ApiEmbeddingProvider`]: OpenAI-compatible HTTP endpoint.
//!
//! [`BatchedEmbedder`] wraps either with chunking, rate limiting, and retry.

mod api;
mod batch;
mod local;
mod traits;

pub use api::ApiEmbeddingProvider;
pub use batch::{BatchedEmbedder, EmbedBatchConfig};
pub use local::{LocalEmbeddingProvider, DEFAULT_LOCAL_MODEL};
pub use traits::EmbeddingProvider;

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::error::Result;

/// Create an embedding provider from configuration, wrapped for batching.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    let batch_config = EmbedBatchConfig::default().with_batch_size(config.batch_size);
    match config.provider {
        EmbeddingProviderKind::Local => {
            let provider = LocalEmbeddingProvider::new(&config.model)?;
            Ok(Box::new(BatchedEmbedder::new(provider, batch_config)))
        }
        EmbeddingProviderKind::Api => {
            let provider = ApiEmbeddingProvider::from_config(&config.api)?;
            // API endpoints get a conservative rate limit unless configured.
            let batch_config = if config.api.requests_per_second == 0 {
                batch_config.with_rate_limit(10)
            } else {
                batch_config.with_rate_limit(config.api.requests_per_second)
            };
            Ok(Box::new(BatchedEmbedder::new(provider, batch_config)))
        }
    }
}
