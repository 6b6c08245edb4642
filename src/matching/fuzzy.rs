//! Fuzzy matching by normalized edit distance.
//!
//! One metric, applied to whole strings only: `1 - lev(a, b) / max(len)`.
//! Substring/partial scoring is deliberately absent: blending a partial
//! ratio into the primary score lets a short mention match an unrelated
//! long label that merely contains it as a fragment.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::taxonomy::{TaxonomyConcept, TaxonomyIndex};

use super::LayerMatch;

/// Default acceptance threshold for the fuzzy layer.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.85;

/// Fuzzy layer configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzyConfig {
    /// Minimum whole-string similarity; a score exactly at the threshold is
    /// accepted.
    pub threshold: f64,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }
}

/// Approximate matcher over all taxonomy labels.
pub struct FuzzyMatcher {
    index: Arc<TaxonomyIndex>,
    config: FuzzyConfig,
}

impl FuzzyMatcher {
    /// Create a fuzzy matcher over a shared index.
    pub fn new(index: Arc<TaxonomyIndex>, config: FuzzyConfig) -> Self {
        Self { index, config }
    }

    /// Configured threshold.
    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    /// Match an already-normalized mention against candidate labels.
    ///
    /// Candidates sharing at least one indexed token with the mention are
    /// scored first; when no label shares a token the full label set is
    /// scanned. Equal top scores break to the smallest concept id.
    pub fn match_fuzzy(&self, normalized: &str) -> Option<LayerMatch> {
        if normalized.is_empty() {
            return None;
        }

        let candidates = self.candidates(normalized);
        let best = if candidates.is_empty() {
            self.best_of(normalized, self.index.all_labels())
        } else {
            self.best_of(
                normalized,
                candidates.values().flat_map(|c| {
                    c.labels.iter().map(move |l| (l.normalized.as_str(), c))
                }),
            )
        };

        best.filter(|m| m.score >= self.config.threshold)
    }

    /// Concepts sharing at least one token with the mention, keyed by id so
    /// iteration order is deterministic.
    fn candidates(&self, normalized: &str) -> BTreeMap<String, Arc<TaxonomyConcept>> {
        let mut out = BTreeMap::new();
        for token in normalized.split(' ') {
            for concept in self.index.lookup_ngram(token) {
                out.entry(concept.id.clone()).or_insert(concept);
            }
        }
        out
    }

    fn best_of<'a, I>(&self, normalized: &str, labels: I) -> Option<LayerMatch>
    where
        I: Iterator<Item = (&'a str, &'a Arc<TaxonomyConcept>)>,
    {
        let mention_len = normalized.chars().count();
        let mut best: Option<LayerMatch> = None;

        for (label, concept) in labels {
            // Edit distance is bounded below by the length difference, so
            // labels too long or too short to reach the threshold are
            // skipped before the expensive comparison.
            let label_len = label.chars().count();
            let max_len = mention_len.max(label_len);
            if max_len == 0 {
                continue;
            }
            let diff = mention_len.abs_diff(label_len);
            let upper_bound = 1.0 - diff as f64 / max_len as f64;
            if upper_bound < self.config.threshold {
                continue;
            }

            let score = strsim::normalized_levenshtein(normalized, label);
            // Strictly-greater keeps the first (smallest-id) concept on ties.
            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(LayerMatch {
                    concept: concept.clone(),
                    label: label.to_string(),
                    score,
                });
            }
        }
        best
    }
}
