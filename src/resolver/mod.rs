//! Resolution aggregator: exact → fuzzy → semantic → emergent.
//!
//! The layer order encodes a precedence policy. Exact matches are ground
//! truth. Fuzzy matches are preferred over semantic because they are
//! explainable and reproducible from the strings alone. Semantic is the
//! fallback for vocabulary gaps fuzzy matching cannot bridge ("cloud infra"
//! vs "cloud computing"). A mention no layer resolves is emergent: a
//! candidate for manual taxonomy review.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::ResolutionCache;
use crate::matching::{
    ExactMatcher, FuzzyConfig, FuzzyMatcher, LayerMatch, SemanticMatcher,
};
use crate::normalize::normalize;
use crate::taxonomy::TaxonomyIndex;

/// The matching layer that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Exact,
    Fuzzy,
    Semantic,
    Emergent,
}

/// The engine's output for one unique normalized mention.
///
/// Invariant: `method == Emergent` iff `concept_id == None`, and any
/// present `concept_id` exists in the taxonomy index the result was
/// computed against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Normalized mention text (the resolution key).
    pub mention: String,
    /// Resolved concept id, or `None` for emergent mentions.
    pub concept_id: Option<String>,
    /// The taxonomy label that participated in the winning comparison.
    pub matched_label: Option<String>,
    /// Layer that produced the match.
    pub method: MatchMethod,
    /// Confidence in [0, 1]; 1.0 for exact, 0.0 for emergent.
    pub confidence: f64,
    /// Raw similarity score for fuzzy/semantic matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

impl MatchResult {
    /// An unresolved mention.
    pub fn emergent(mention: impl Into<String>) -> Self {
        Self {
            mention: mention.into(),
            concept_id: None,
            matched_label: None,
            method: MatchMethod::Emergent,
            confidence: 0.0,
            similarity: None,
        }
    }

    fn from_layer(mention: String, method: MatchMethod, layer: LayerMatch) -> Self {
        let similarity = match method {
            MatchMethod::Exact | MatchMethod::Emergent => None,
            MatchMethod::Fuzzy | MatchMethod::Semantic => Some(layer.score),
        };
        Self {
            mention,
            concept_id: Some(layer.concept.id.clone()),
            matched_label: Some(layer.label),
            method,
            confidence: layer.score,
            similarity,
        }
    }

    /// True when the mention resolved to a concept.
    pub fn is_matched(&self) -> bool {
        self.concept_id.is_some()
    }
}

/// Aggregate counters over one batch of match results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusMatchStatistics {
    pub total_mentions: usize,
    pub matched: usize,
    pub emergent: usize,
    pub exact: usize,
    pub fuzzy: usize,
    pub semantic: usize,
    pub match_rate: f64,
    pub emergent_rate: f64,
}

impl CorpusMatchStatistics {
    /// Compute statistics over a set of results.
    pub fn from_results<'a, I>(results: I) -> Self
    where
        I: IntoIterator<Item = &'a MatchResult>,
    {
        let mut stats = Self::default();
        for result in results {
            stats.total_mentions += 1;
            match result.method {
                MatchMethod::Exact => stats.exact += 1,
                MatchMethod::Fuzzy => stats.fuzzy += 1,
                MatchMethod::Semantic => stats.semantic += 1,
                MatchMethod::Emergent => stats.emergent += 1,
            }
        }
        stats.matched = stats.exact + stats.fuzzy + stats.semantic;
        if stats.total_mentions > 0 {
            stats.match_rate = stats.matched as f64 / stats.total_mentions as f64;
            stats.emergent_rate = stats.emergent as f64 / stats.total_mentions as f64;
        }
        stats
    }

    /// Merge counters from another batch (used for per-partition rollup).
    pub fn merge(&mut self, other: &Self) {
        self.total_mentions += other.total_mentions;
        self.matched += other.matched;
        self.emergent += other.emergent;
        self.exact += other.exact;
        self.fuzzy += other.fuzzy;
        self.semantic += other.semantic;
        if self.total_mentions > 0 {
            self.match_rate = self.matched as f64 / self.total_mentions as f64;
            self.emergent_rate = self.emergent as f64 / self.total_mentions as f64;
        }
    }
}

/// Orchestrates the matching layers for single mentions and batches.
///
/// Stateless per call apart from the memoization cache; safe to share
/// (`Arc`) across concurrent workers.
pub struct Resolver {
    index: Arc<TaxonomyIndex>,
    exact: ExactMatcher,
    fuzzy: FuzzyMatcher,
    semantic: Option<SemanticMatcher>,
    cache: ResolutionCache,
}

impl Resolver {
    /// Create a resolver over a shared taxonomy index.
    ///
    /// `semantic` is optional: the engine runs exact + fuzzy only when the
    /// embedding collaborator is unavailable or disabled.
    pub fn new(
        index: Arc<TaxonomyIndex>,
        fuzzy_config: FuzzyConfig,
        semantic: Option<SemanticMatcher>,
        cache: ResolutionCache,
    ) -> Self {
        Self {
            exact: ExactMatcher::new(index.clone()),
            fuzzy: FuzzyMatcher::new(index.clone(), fuzzy_config),
            semantic,
            cache,
            index,
        }
    }

    /// Build a resolver from configuration and raw taxonomy rows.
    ///
    /// The semantic layer is best-effort: when the embedding provider
    /// cannot be created or the label embeddings cannot be computed, the
    /// resolver runs exact + fuzzy only and logs a warning, matching the
    /// degrade-to-emergent policy for an unreachable embedding backend.
    pub async fn from_config(
        config: &crate::config::Config,
        rows: Vec<crate::taxonomy::TaxonomyRow>,
    ) -> crate::error::Result<Self> {
        let index = Arc::new(TaxonomyIndex::build(rows, config.matching.max_ngram)?);

        let semantic = if config.matching.semantic_enabled {
            match crate::embedding::create_provider(&config.embedding) {
                Ok(provider) => {
                    match SemanticMatcher::build(&index, Arc::from(provider), config.matching.semantic)
                        .await
                    {
                        Ok(matcher) => Some(matcher),
                        Err(e) => {
                            tracing::warn!(
                                "semantic layer disabled, continuing with exact + fuzzy: {}",
                                e
                            );
                            None
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "embedding provider unavailable, continuing with exact + fuzzy: {}",
                        e
                    );
                    None
                }
            }
        } else {
            None
        };

        Ok(Self::new(
            index,
            config.matching.fuzzy,
            semantic,
            crate::cache::ResolutionCache::new(&config.cache),
        ))
    }

    /// The taxonomy index this resolver matches against.
    pub fn index(&self) -> &Arc<TaxonomyIndex> {
        &self.index
    }

    /// Memoization counters.
    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.stats()
    }

    /// Resolve a single raw mention.
    pub async fn resolve(&self, raw: &str) -> MatchResult {
        let normalized = normalize(raw);
        if normalized.is_empty() {
            return MatchResult::emergent(normalized);
        }

        if let Some(cached) = self.cache.get(&normalized).await {
            return (*cached).clone();
        }

        let result = match self.resolve_lexical(&normalized) {
            Some(result) => result,
            None => match &self.semantic {
                Some(semantic) => match semantic.match_semantic(&normalized).await {
                    Some(hit) => {
                        MatchResult::from_layer(normalized.clone(), MatchMethod::Semantic, hit)
                    }
                    None => MatchResult::emergent(normalized.clone()),
                },
                None => MatchResult::emergent(normalized.clone()),
            },
        };

        self.cache.insert(normalized, result.clone()).await;
        result
    }

    /// Resolve a batch of mentions, deduplicating first.
    ///
    /// Identical normalized texts are resolved once per run, both for
    /// performance and so identical mentions always receive identical
    /// results. All mentions that reach the semantic layer are embedded in
    /// one batched call.
    pub async fn resolve_batch<I, S>(&self, mentions: I) -> BTreeMap<String, MatchResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let unique: BTreeSet<String> = mentions
            .into_iter()
            .map(|m| normalize(m.as_ref()))
            .filter(|m| !m.is_empty())
            .collect();

        let mut results = BTreeMap::new();
        let mut pending: Vec<String> = Vec::new();

        for normalized in unique {
            if let Some(cached) = self.cache.get(&normalized).await {
                results.insert(normalized, (*cached).clone());
                continue;
            }
            match self.resolve_lexical(&normalized) {
                Some(result) => {
                    self.cache.insert(normalized.clone(), result.clone()).await;
                    results.insert(normalized, result);
                }
                None => pending.push(normalized),
            }
        }

        if !pending.is_empty() {
            let semantic_hits = match &self.semantic {
                Some(semantic) => semantic.match_batch(&pending).await,
                None => vec![None; pending.len()],
            };
            for (normalized, hit) in pending.into_iter().zip(semantic_hits) {
                let result = match hit {
                    Some(layer) => {
                        MatchResult::from_layer(normalized.clone(), MatchMethod::Semantic, layer)
                    }
                    None => MatchResult::emergent(normalized.clone()),
                };
                self.cache.insert(normalized.clone(), result.clone()).await;
                results.insert(normalized, result);
            }
        }

        debug!(unique = results.len(), "batch resolved");
        results
    }

    /// Compute corpus statistics over a set of results.
    pub fn stats<'a, I>(results: I) -> CorpusMatchStatistics
    where
        I: IntoIterator<Item = &'a MatchResult>,
    {
        CorpusMatchStatistics::from_results(results)
    }

    /// The synchronous layers: exact, then fuzzy.
    fn resolve_lexical(&self, normalized: &str) -> Option<MatchResult> {
        if let Some(hit) = self.exact.match_exact(normalized) {
            return Some(MatchResult::from_layer(
                normalized.to_string(),
                MatchMethod::Exact,
                hit,
            ));
        }
        if let Some(hit) = self.fuzzy.match_fuzzy(normalized) {
            return Some(MatchResult::from_layer(
                normalized.to_string(),
                MatchMethod::Fuzzy,
                hit,
            ));
        }
        None
    }
}
