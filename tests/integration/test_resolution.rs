//! End-to-end resolution tests across all three layers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use assay::cache::{CacheConfig, ResolutionCache};
use assay::embedding::EmbeddingProvider;
use assay::matching::{FuzzyConfig, SemanticConfig, SemanticMatcher};
use assay::resolver::{MatchMethod, Resolver};
use assay::taxonomy::{TaxonomyIndex, TaxonomyRow, DEFAULT_MAX_NGRAM};

/// Deterministic stub embedder with hand-placed vectors.
struct StubEmbedder {
    vectors: HashMap<String, Vec<f32>>,
}

impl StubEmbedder {
    fn new(entries: &[(&str, [f32; 4])]) -> Self {
        Self {
            vectors: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_vec()))
                .collect(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    async fn embed(&self, texts: &[String]) -> assay::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                self.vectors
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| vec![0.0, 0.0, 0.0, 1.0])
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        4
    }
}

fn row(id: &str, label: &str) -> TaxonomyRow {
    TaxonomyRow {
        concept_id: id.to_string(),
        label: label.to_string(),
        language: None,
        description: None,
        category: None,
    }
}

fn taxonomy() -> Vec<TaxonomyRow> {
    vec![
        row("c1", "Python"),
        row("c2", "Docker"),
        row("c3", "cloud computing"),
        row("c4", "cloud infrastructure"),
        row("c5", "Jira"),
    ]
}

/// Build a resolver with the full three-layer pipeline over the fixture
/// taxonomy. The stub embedding space places "cloud compute" nearest to
/// "cloud computing" (scenario 5) and leaves "dcoker" in a corner no
/// concept occupies (scenario 2).
async fn full_resolver(semantic_threshold: f64) -> Resolver {
    let index = Arc::new(TaxonomyIndex::build(taxonomy(), DEFAULT_MAX_NGRAM).unwrap());
    let embedder = StubEmbedder::new(&[
        ("python", [1.0, 0.0, 0.0, 0.0]),
        ("docker", [0.0, 1.0, 0.0, 0.0]),
        ("cloud computing", [0.0, 0.0, 1.0, 0.0]),
        ("cloud infrastructure", [0.1, 0.0, 0.9, 0.0]),
        ("jira", [0.5, 0.5, 0.0, 0.0]),
        ("cloud compute", [0.02, 0.0, 0.99, 0.0]),
    ]);
    let semantic = SemanticMatcher::build(
        &index,
        Arc::new(embedder),
        SemanticConfig {
            threshold: semantic_threshold,
        },
    )
    .await
    .unwrap();

    Resolver::new(
        index,
        FuzzyConfig::default(),
        Some(semantic),
        ResolutionCache::new(&CacheConfig::default()),
    )
}

#[tokio::test]
async fn test_exact_layer_wins() {
    let resolver = full_resolver(0.87).await;
    let result = resolver.resolve("Python").await;
    assert_eq!(result.concept_id.as_deref(), Some("c1"));
    assert_eq!(result.method, MatchMethod::Exact);
    assert_eq!(result.confidence, 1.0);
}

#[tokio::test]
async fn test_typo_below_fuzzy_threshold_reaches_semantic() {
    // "Dcoker" scores ~0.67 against "docker", well below 0.85; its stub
    // vector is nowhere near any concept, so it ends emergent.
    let resolver = full_resolver(0.87).await;
    let result = resolver.resolve("Dcoker").await;
    assert_eq!(result.method, MatchMethod::Emergent);
    assert!(result.concept_id.is_none());
    assert_eq!(result.confidence, 0.0);
}

#[tokio::test]
async fn test_paraphrase_resolved_by_semantic_layer() {
    // "cloud compute" vs "cloud computing" is 3 edits over 15 chars = 0.80,
    // below the 0.85 fuzzy threshold; the semantic layer bridges the gap.
    let resolver = full_resolver(0.87).await;
    let result = resolver.resolve("cloud compute").await;
    assert!(result.is_matched());
    assert_eq!(result.concept_id.as_deref(), Some("c3"));
}

#[tokio::test]
async fn test_vocabulary_gap_resolved_semantically() {
    // "cloud infra" shares no close string with any label (fuzzy scores
    // stay below threshold) but its embedding is near "cloud computing".
    let index = Arc::new(TaxonomyIndex::build(taxonomy(), DEFAULT_MAX_NGRAM).unwrap());
    let embedder = StubEmbedder::new(&[
        ("cloud computing", [0.0, 0.0, 1.0, 0.0]),
        ("cloud infrastructure", [0.1, 0.0, 0.9, 0.0]),
        ("python", [1.0, 0.0, 0.0, 0.0]),
        ("docker", [0.0, 1.0, 0.0, 0.0]),
        ("jira", [0.5, 0.5, 0.0, 0.0]),
        ("cloud infra", [0.09, 0.0, 0.93, 0.0]),
    ]);
    let semantic = SemanticMatcher::build(
        &index,
        Arc::new(embedder),
        SemanticConfig { threshold: 0.9 },
    )
    .await
    .unwrap();
    let resolver = Resolver::new(
        index,
        FuzzyConfig::default(),
        Some(semantic),
        ResolutionCache::disabled(),
    );

    let result = resolver.resolve("cloud infra").await;
    assert_eq!(result.method, MatchMethod::Semantic);
    assert!(result.similarity.unwrap() >= 0.9);
    // The nearest centroid is cloud infrastructure's.
    assert_eq!(result.concept_id.as_deref(), Some("c4"));
}

#[tokio::test]
async fn test_ngram_scan_spots_label_inside_phrase() {
    let index = TaxonomyIndex::build(taxonomy(), DEFAULT_MAX_NGRAM).unwrap();
    let hits = index.scan_text("gestión de proyectos ágiles con Jira");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].gram, "jira");
    assert_eq!(hits[0].concepts[0].id, "c5");
}

#[tokio::test]
async fn test_batch_resolution_deduplicates_and_batches_semantic() {
    let resolver = full_resolver(0.87).await;
    let results = resolver
        .resolve_batch([
            "Python",
            "python",
            "cloud compute",
            "Dcoker",
            "CLOUD   Compute",
        ])
        .await;

    // Five inputs, three unique normalized texts.
    assert_eq!(results.len(), 3);
    assert_eq!(results["python"].method, MatchMethod::Exact);
    assert!(results["cloud compute"].is_matched());
    assert_eq!(results["dcoker"].method, MatchMethod::Emergent);
}

#[tokio::test]
async fn test_resolution_is_deterministic_across_runs() {
    let first: Vec<_> = {
        let resolver = full_resolver(0.87).await;
        resolver
            .resolve_batch(["Python", "cloud compute", "Dcoker", "Jira"])
            .await
            .into_iter()
            .collect()
    };
    let second: Vec<_> = {
        let resolver = full_resolver(0.87).await;
        resolver
            .resolve_batch(["Python", "cloud compute", "Dcoker", "Jira"])
            .await
            .into_iter()
            .collect()
    };
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_emergent_iff_null_concept_holds_end_to_end() {
    let resolver = full_resolver(0.87).await;
    for mention in ["Python", "Dcoker", "cloud compute", "zzzz", "Jira"] {
        let result = resolver.resolve(mention).await;
        assert_eq!(
            result.method == MatchMethod::Emergent,
            result.concept_id.is_none()
        );
        if let Some(id) = &result.concept_id {
            assert!(
                resolver.index().get(id).is_some(),
                "resolved concept must exist in the index"
            );
        }
    }
}
