//! Batched embedding with rate limiting and retries.
//!
//! The semantic layer issues one batched call per run partition covering
//! every mention that survived the exact and fuzzy layers, plus one large
//! call at startup for all taxonomy labels. This wrapper splits those into
//! provider-sized chunks and absorbs transient API failures.

use async_trait::async_trait;
use governor::{
    clock::DefaultClock, middleware::NoOpMiddleware, state::NotKeyed, Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::error::{AssayError, EmbeddingError, Result};

use super::EmbeddingProvider;

type DirectRateLimiter =
    RateLimiter<NotKeyed, governor::state::InMemoryState, DefaultClock, NoOpMiddleware>;

fn is_rate_limit_error(error: &AssayError) -> bool {
    matches!(error, AssayError::Embedding(EmbeddingError::RateLimited))
}

/// Configuration for batched embedding.
#[derive(Debug, Clone)]
pub struct EmbedBatchConfig {
    /// Maximum number of texts per upstream call.
    pub batch_size: usize,
    /// Requests per second limit (0 = no limit).
    pub requests_per_second: u32,
    /// Maximum number of retries per chunk.
    pub max_retries: usize,
    /// Base delay between retries; doubles per attempt on rate limiting.
    pub retry_delay: Duration,
}

impl Default for EmbedBatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            requests_per_second: 0,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl EmbedBatchConfig {
    /// Set the per-call batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Enable rate limiting.
    pub fn with_rate_limit(mut self, requests_per_second: u32) -> Self {
        self.requests_per_second = requests_per_second;
        self
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Wraps any [`EmbeddingProvider`] with chunking, rate limiting and retry.
pub struct BatchedEmbedder<P: EmbeddingProvider> {
    provider: Arc<P>,
    rate_limiter: Option<Arc<DirectRateLimiter>>,
    batch_size: usize,
    max_retries: usize,
    retry_delay: Duration,
}

impl<P: EmbeddingProvider + 'static> BatchedEmbedder<P> {
    /// Create a new batched embedder.
    pub fn new(provider: P, config: EmbedBatchConfig) -> Self {
        let rate_limiter = NonZeroU32::new(config.requests_per_second)
            .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));

        let batch_size = config.batch_size.min(provider.max_batch_size()).max(1);

        Self {
            provider: Arc::new(provider),
            rate_limiter,
            batch_size,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
        }
    }

    /// Create with default configuration.
    pub fn with_defaults(provider: P) -> Self {
        Self::new(provider, EmbedBatchConfig::default())
    }

    /// Embed an arbitrarily large input, chunking as needed.
    pub async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut all = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            all.extend(self.embed_with_retry(chunk).await?);
        }
        Ok(all)
    }

    async fn embed_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if let Some(limiter) = &self.rate_limiter {
                limiter.until_ready().await;
            }

            match self.provider.embed(texts).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(e) => {
                    if attempt < self.max_retries {
                        let delay = if is_rate_limit_error(&e) {
                            self.retry_delay * 2u32.pow(attempt as u32)
                        } else {
                            self.retry_delay
                        };
                        warn!(
                            attempt = attempt + 1,
                            max_retries = self.max_retries,
                            delay_ms = delay.as_millis(),
                            "embedding request failed, retrying: {}",
                            e
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            EmbeddingError::Api("embedding failed with no recorded error".to_string()).into()
        }))
    }

    /// Effective per-call batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Access the wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }
}

#[async_trait]
impl<P: EmbeddingProvider + 'static> EmbeddingProvider for BatchedEmbedder<P> {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_all(texts).await
    }

    fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    fn max_batch_size(&self) -> usize {
        // Chunking removes the upstream limit.
        usize::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockProvider {
        dimension: usize,
        call_count: AtomicUsize,
        fail_first: AtomicUsize,
    }

    impl MockProvider {
        fn new(dimension: usize) -> Self {
            Self {
                dimension,
                call_count: AtomicUsize::new(0),
                fail_first: AtomicUsize::new(0),
            }
        }

        fn failing_first(dimension: usize, failures: usize) -> Self {
            let p = Self::new(dimension);
            p.fail_first.store(failures, Ordering::SeqCst);
            p
        }

        fn calls(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingProvider for MockProvider {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if self
                .fail_first
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(EmbeddingError::Api("transient".to_string()).into());
            }
            Ok(texts.iter().map(|_| vec![0.5; self.dimension]).collect())
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn max_batch_size(&self) -> usize {
            10
        }
    }

    #[tokio::test]
    async fn test_chunking() {
        let embedder = BatchedEmbedder::new(
            MockProvider::new(8),
            EmbedBatchConfig::default().with_batch_size(5),
        );

        let texts: Vec<String> = (0..12).map(|i| format!("skill {i}")).collect();
        let embeddings = embedder.embed_all(&texts).await.unwrap();

        assert_eq!(embeddings.len(), 12);
        assert_eq!(embedder.provider().calls(), 3);
    }

    #[tokio::test]
    async fn test_respects_provider_max_batch() {
        let embedder = BatchedEmbedder::new(
            MockProvider::new(8),
            EmbedBatchConfig::default().with_batch_size(1000),
        );
        assert_eq!(embedder.batch_size(), 10);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let embedder = BatchedEmbedder::with_defaults(MockProvider::new(8));
        assert!(embedder.embed_all(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let mut config = EmbedBatchConfig::default().with_max_retries(2);
        config.retry_delay = Duration::from_millis(1);
        let embedder = BatchedEmbedder::new(MockProvider::failing_first(8, 1), config);

        let embeddings = embedder.embed_all(&["rust".to_string()]).await.unwrap();
        assert_eq!(embeddings.len(), 1);
        assert_eq!(embedder.provider().calls(), 2);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let mut config = EmbedBatchConfig::default().with_max_retries(1);
        config.retry_delay = Duration::from_millis(1);
        let embedder = BatchedEmbedder::new(MockProvider::failing_first(8, 5), config);

        assert!(embedder.embed_all(&["rust".to_string()]).await.is_err());
    }
}
