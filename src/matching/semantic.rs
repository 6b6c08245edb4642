//! Semantic fallback matching by embedding cosine similarity.
//!
//! Invoked only for mentions that survived the exact and fuzzy layers.
//! Taxonomy label embeddings are computed once at build time (one centroid
//! per concept); mentions are embedded in batches. A provider failure
//! degrades the affected mentions to no-match instead of propagating; the
//! resolver then marks them emergent.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::taxonomy::{TaxonomyConcept, TaxonomyIndex};

use super::LayerMatch;

/// Default acceptance threshold for the semantic layer.
pub const DEFAULT_SEMANTIC_THRESHOLD: f64 = 0.87;

/// Semantic layer configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    /// Minimum cosine similarity; the boundary value is accepted.
    pub threshold: f64,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SEMANTIC_THRESHOLD,
        }
    }
}

/// Nearest-concept lookup in embedding space.
pub struct SemanticMatcher {
    embedder: Arc<dyn EmbeddingProvider>,
    /// Concepts in ascending id order, parallel to `centroids`.
    concepts: Vec<Arc<TaxonomyConcept>>,
    /// Unit-normalized label centroid per concept.
    centroids: Vec<Vec<f32>>,
    config: SemanticConfig,
}

impl SemanticMatcher {
    /// Build the matcher by embedding every taxonomy label once.
    ///
    /// Concepts with several labels get the mean of their label vectors,
    /// re-normalized to unit length. Fails only when the initial label
    /// embedding cannot be computed at all; that is a startup condition the
    /// caller may respond to by running without the semantic layer.
    pub async fn build(
        index: &TaxonomyIndex,
        embedder: Arc<dyn EmbeddingProvider>,
        config: SemanticConfig,
    ) -> Result<Self> {
        let mut concepts: Vec<Arc<TaxonomyConcept>> = Vec::new();
        let mut texts: Vec<String> = Vec::new();
        let mut spans: Vec<(usize, usize)> = Vec::new();

        for (label, concept) in index.all_labels() {
            if concepts.last().map(|c: &Arc<TaxonomyConcept>| c.id.as_str())
                != Some(concept.id.as_str())
            {
                concepts.push(concept.clone());
                spans.push((texts.len(), 0));
            }
            texts.push(label.to_string());
            if let Some(last) = spans.last_mut() {
                last.1 += 1;
            }
        }

        let vectors = embed_chunked(embedder.as_ref(), &texts).await?;

        let dimension = embedder.dimension();
        let centroids = spans
            .iter()
            .map(|&(start, count)| centroid(&vectors[start..start + count], dimension))
            .collect();

        info!(
            concepts = concepts.len(),
            labels = texts.len(),
            "semantic matcher built"
        );

        Ok(Self {
            embedder,
            concepts,
            centroids,
            config,
        })
    }

    /// Configured threshold.
    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    /// Match a single normalized mention.
    pub async fn match_semantic(&self, normalized: &str) -> Option<LayerMatch> {
        self.match_batch(std::slice::from_ref(&normalized.to_string()))
            .await
            .into_iter()
            .next()
            .flatten()
    }

    /// Match a batch of normalized mentions with one embedding call.
    ///
    /// An unreachable provider yields `None` for every mention in the batch
    /// (logged once); it never aborts the caller.
    pub async fn match_batch(&self, mentions: &[String]) -> Vec<Option<LayerMatch>> {
        if mentions.is_empty() {
            return Vec::new();
        }

        let vectors = match embed_chunked(self.embedder.as_ref(), mentions).await {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    mentions = mentions.len(),
                    "semantic layer unavailable, degrading batch to emergent: {}", e
                );
                return vec![None; mentions.len()];
            }
        };

        vectors.iter().map(|v| self.nearest(v)).collect()
    }

    /// Nearest concept by cosine similarity, accepted at the threshold.
    fn nearest(&self, vector: &[f32]) -> Option<LayerMatch> {
        let query = unit(vector)?;

        let mut best: Option<(usize, f64)> = None;
        for (i, centroid) in self.centroids.iter().enumerate() {
            let sim = dot(&query, centroid);
            // Strictly-greater keeps the smallest concept id on ties.
            if best.map_or(true, |(_, b)| sim > b) {
                best = Some((i, sim));
            }
        }

        best.filter(|&(_, sim)| sim >= self.config.threshold)
            .map(|(i, sim)| LayerMatch {
                concept: self.concepts[i].clone(),
                label: self.concepts[i].preferred_label().to_string(),
                score: sim,
            })
    }
}

async fn embed_chunked(
    embedder: &dyn EmbeddingProvider,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let chunk_size = embedder.max_batch_size().max(1);
    let mut out = Vec::with_capacity(texts.len());
    for chunk in texts.chunks(chunk_size) {
        out.extend(embedder.embed(chunk).await?);
    }
    Ok(out)
}

/// Mean of `vectors`, re-normalized to unit length.
fn centroid(vectors: &[Vec<f32>], dimension: usize) -> Vec<f32> {
    let mut mean = vec![0.0f32; dimension];
    if vectors.is_empty() {
        return mean;
    }
    for v in vectors {
        for (m, x) in mean.iter_mut().zip(v.iter()) {
            *m += x;
        }
    }
    let n = vectors.len() as f32;
    for m in mean.iter_mut() {
        *m /= n;
    }
    unit(&mean).unwrap_or(mean)
}

fn unit(v: &[f32]) -> Option<Vec<f32>> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return None;
    }
    Some(v.iter().map(|x| x / norm).collect())
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x * y) as f64).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::EmbeddingError;
    use crate::taxonomy::{TaxonomyRow, DEFAULT_MAX_NGRAM};

    /// Embeds known phrases to fixed 3-d vectors; unknown text maps to a
    /// distinct corner of the space.
    struct StubEmbedder {
        vectors: HashMap<String, Vec<f32>>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl StubEmbedder {
        fn new(entries: &[(&str, [f32; 3])]) -> Self {
            Self {
                vectors: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_vec()))
                    .collect(),
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                vectors: HashMap::new(),
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingProvider for StubEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EmbeddingError::Api("backend down".to_string()).into());
            }
            Ok(texts
                .iter()
                .map(|t| {
                    self.vectors
                        .get(t)
                        .cloned()
                        .unwrap_or_else(|| vec![0.0, 0.0, 1.0])
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    fn rows() -> Vec<TaxonomyRow> {
        ["cloud computing", "data analysis"]
            .iter()
            .enumerate()
            .map(|(i, label)| TaxonomyRow {
                concept_id: format!("c{}", i + 1),
                label: label.to_string(),
                language: None,
                description: None,
                category: None,
            })
            .collect()
    }

    async fn build_matcher(embedder: StubEmbedder, threshold: f64) -> SemanticMatcher {
        let index = TaxonomyIndex::build(rows(), DEFAULT_MAX_NGRAM).unwrap();
        SemanticMatcher::build(&index, Arc::new(embedder), SemanticConfig { threshold })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_nearest_concept_wins() {
        let embedder = StubEmbedder::new(&[
            ("cloud computing", [1.0, 0.0, 0.0]),
            ("data analysis", [0.0, 1.0, 0.0]),
            ("cloud infra", [0.95, 0.05, 0.0]),
        ]);
        let matcher = build_matcher(embedder, 0.8).await;

        let hit = matcher.match_semantic("cloud infra").await.unwrap();
        assert_eq!(hit.concept.id, "c1");
        assert!(hit.score >= 0.8);
    }

    #[tokio::test]
    async fn test_below_threshold_rejected() {
        let embedder = StubEmbedder::new(&[
            ("cloud computing", [1.0, 0.0, 0.0]),
            ("data analysis", [0.0, 1.0, 0.0]),
            ("typing speed", [0.5, 0.5, 0.7]),
        ]);
        let matcher = build_matcher(embedder, 0.9).await;

        assert!(matcher.match_semantic("typing speed").await.is_none());
    }

    #[tokio::test]
    async fn test_batch_is_single_embedding_call() {
        let embedder = Arc::new(StubEmbedder::new(&[
            ("cloud computing", [1.0, 0.0, 0.0]),
            ("data analysis", [0.0, 1.0, 0.0]),
        ]));
        let index = TaxonomyIndex::build(rows(), DEFAULT_MAX_NGRAM).unwrap();
        let matcher = SemanticMatcher::build(
            &index,
            embedder.clone(),
            SemanticConfig { threshold: 0.5 },
        )
        .await
        .unwrap();
        let calls_after_build = embedder.calls();

        let mentions: Vec<String> = (0..5).map(|i| format!("mention {i}")).collect();
        let results = matcher.match_batch(&mentions).await;
        assert_eq!(results.len(), 5);
        assert_eq!(embedder.calls(), calls_after_build + 1);
    }

    #[tokio::test]
    async fn test_provider_failure_degrades_batch() {
        let index = TaxonomyIndex::build(rows(), DEFAULT_MAX_NGRAM).unwrap();
        let good = StubEmbedder::new(&[
            ("cloud computing", [1.0, 0.0, 0.0]),
            ("data analysis", [0.0, 1.0, 0.0]),
        ]);
        let matcher = SemanticMatcher::build(&index, Arc::new(good), SemanticConfig::default())
            .await
            .unwrap();

        // Swap in a matcher whose provider fails at query time.
        let failing = SemanticMatcher {
            embedder: Arc::new(StubEmbedder::failing()),
            concepts: matcher.concepts.clone(),
            centroids: matcher.centroids.clone(),
            config: matcher.config,
        };

        let results = failing
            .match_batch(&["cloud infra".to_string(), "teamwork".to_string()])
            .await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_none()));
    }

    #[tokio::test]
    async fn test_build_fails_when_provider_down() {
        let index = TaxonomyIndex::build(rows(), DEFAULT_MAX_NGRAM).unwrap();
        let result = SemanticMatcher::build(
            &index,
            Arc::new(StubEmbedder::failing()),
            SemanticConfig::default(),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_centroid_of_multilingual_labels() {
        let rows = vec![
            TaxonomyRow {
                concept_id: "c1".into(),
                label: "databases".into(),
                language: Some("en".into()),
                description: None,
                category: None,
            },
            TaxonomyRow {
                concept_id: "c1".into(),
                label: "bases de datos".into(),
                language: Some("es".into()),
                description: None,
                category: None,
            },
        ];
        let embedder = StubEmbedder::new(&[
            ("databases", [1.0, 0.0, 0.0]),
            ("bases de datos", [0.0, 1.0, 0.0]),
            ("base de datos", [0.5, 0.5, 0.0]),
        ]);
        let index = TaxonomyIndex::build(rows, DEFAULT_MAX_NGRAM).unwrap();
        let matcher = SemanticMatcher::build(&index, Arc::new(embedder), SemanticConfig {
            threshold: 0.9,
        })
        .await
        .unwrap();

        // The centroid of the two label vectors is [0.5, 0.5, 0]-normalized,
        // which is colinear with the query vector.
        let hit = matcher.match_semantic("base de datos").await.unwrap();
        assert_eq!(hit.concept.id, "c1");
        assert!(hit.score > 0.99);
    }

    #[test]
    fn test_unit_of_zero_vector() {
        assert!(unit(&[0.0, 0.0]).is_none());
    }
}
