//! Embedding trait definitions.

use async_trait::async_trait;

/// Trait for embedding providers.
///
/// Implementations embed short skill phrases (mentions and taxonomy labels)
/// into a shared vector space. Vectors are expected to be comparable by
/// cosine similarity; providers that return unnormalized vectors are fine,
/// the semantic matcher normalizes on its side.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a batch of texts, one vector per input, in
    /// input order.
    async fn embed(&self, texts: &[String]) -> crate::error::Result<Vec<Vec<f32>>>;

    /// Return the embedding dimension.
    fn dimension(&self) -> usize;

    /// Return the maximum batch size a single `embed` call accepts.
    fn max_batch_size(&self) -> usize {
        100
    }
}
