//! In-memory taxonomy index: exact label lookup and n-gram membership.
//!
//! The index is built once from all active taxonomy rows and is read-only
//! afterwards, so it can be shared (`Arc`) across concurrent matching
//! workers without locks.
//!
//! N-gram direction matters: grams are generated from the *mention/job
//! text* and probed against taxonomy labels, never the reverse. Probing
//! grams generated from taxonomy descriptions against free text matches
//! ordinary prose words and floods the results with noise.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, TaxonomyError};
use crate::normalize::normalize;

use super::{ConceptCategory, ConceptLabel, TaxonomyConcept, TaxonomyRow};

/// Default maximum n-gram length (in tokens).
pub const DEFAULT_MAX_NGRAM: usize = 4;

/// Single-token grams at or below this length are not indexed.
const MIN_UNIGRAM_CHARS: usize = 3;

/// Summary of one taxonomy load, reported after every build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxonomyLoadSummary {
    /// Raw rows seen.
    pub rows_seen: usize,
    /// Rows skipped as invalid (missing id or label).
    pub rows_skipped: usize,
    /// Rows merged into an existing (concept, label) pair.
    pub duplicates_merged: usize,
    /// Distinct concepts loaded.
    pub concepts: usize,
    /// Labels indexed across all concepts.
    pub labels: usize,
    /// Distinct n-grams in the index.
    pub ngrams: usize,
}

/// A taxonomy label found inside a piece of free text by n-gram probing.
#[derive(Debug, Clone)]
pub struct NgramHit {
    /// The normalized n-gram that matched a label exactly.
    pub gram: String,
    /// Concepts whose label equals the gram, in ascending id order.
    pub concepts: Vec<Arc<TaxonomyConcept>>,
}

/// Read-only index over all active taxonomy concepts.
pub struct TaxonomyIndex {
    /// Concepts in ascending id order.
    concepts: Vec<Arc<TaxonomyConcept>>,
    by_id: HashMap<String, usize>,
    /// Normalized label -> concepts sharing that exact label.
    exact: HashMap<String, Vec<usize>>,
    /// Label n-gram -> concepts whose label produced it.
    ngrams: HashMap<String, Vec<usize>>,
    max_ngram: usize,
    summary: TaxonomyLoadSummary,
}

impl TaxonomyIndex {
    /// Build the index from raw taxonomy rows.
    ///
    /// Invalid rows (empty id, or a label that normalizes to nothing) are
    /// skipped with a warning; duplicates are merged. An empty result is a
    /// fatal error: the engine refuses to run against no taxonomy rather
    /// than marking every mention emergent.
    pub fn build(rows: Vec<TaxonomyRow>, max_ngram: usize) -> Result<Self> {
        let max_ngram = max_ngram.max(1);
        let mut summary = TaxonomyLoadSummary {
            rows_seen: rows.len(),
            ..Default::default()
        };

        // Group rows per concept id; BTreeMap keeps concept order stable.
        let mut grouped: BTreeMap<String, (Vec<ConceptLabel>, Option<String>, ConceptCategory)> =
            BTreeMap::new();

        for row in rows {
            let id = row.concept_id.trim();
            let raw_label = row.label.trim();
            if id.is_empty() || raw_label.is_empty() {
                warn!(concept_id = %row.concept_id, label = %row.label, "skipping invalid taxonomy row");
                summary.rows_skipped += 1;
                continue;
            }
            let normalized = normalize(raw_label);
            if normalized.is_empty() {
                warn!(concept_id = %id, label = %raw_label, "skipping taxonomy row with empty normalized label");
                summary.rows_skipped += 1;
                continue;
            }

            let entry = grouped
                .entry(id.to_string())
                .or_insert_with(|| (Vec::new(), None, ConceptCategory::Unknown));

            if entry.0.iter().any(|l| l.normalized == normalized) {
                summary.duplicates_merged += 1;
                continue;
            }
            entry.0.push(ConceptLabel {
                text: raw_label.to_string(),
                normalized,
                language: row.language.clone(),
            });
            if entry.1.is_none() {
                entry.1 = row.description.clone();
            }
            if entry.2 == ConceptCategory::Unknown {
                if let Some(tag) = &row.category {
                    entry.2 = ConceptCategory::parse(tag);
                }
            }
        }

        if grouped.is_empty() {
            return Err(TaxonomyError::Empty.into());
        }

        let mut concepts = Vec::with_capacity(grouped.len());
        let mut by_id = HashMap::with_capacity(grouped.len());
        let mut exact: HashMap<String, Vec<usize>> = HashMap::new();
        let mut ngrams: HashMap<String, Vec<usize>> = HashMap::new();

        for (id, (labels, description, category)) in grouped {
            let idx = concepts.len();
            summary.labels += labels.len();

            for label in &labels {
                exact.entry(label.normalized.clone()).or_default().push(idx);

                let tokens: Vec<&str> = label.normalized.split(' ').collect();
                let mut seen: HashSet<String> = HashSet::new();
                for len in 1..=max_ngram.min(tokens.len()) {
                    for window in tokens.windows(len) {
                        if len == 1 && window[0].len() < MIN_UNIGRAM_CHARS {
                            continue;
                        }
                        let gram = window.join(" ");
                        if seen.insert(gram.clone()) {
                            let entry = ngrams.entry(gram).or_default();
                            if entry.last() != Some(&idx) {
                                entry.push(idx);
                            }
                        }
                    }
                }
            }

            by_id.insert(id.clone(), idx);
            concepts.push(Arc::new(TaxonomyConcept {
                id,
                labels,
                description,
                category,
            }));
        }

        // A label shared by several concepts produces repeated indices.
        for list in exact.values_mut() {
            list.dedup();
        }

        summary.concepts = concepts.len();
        summary.ngrams = ngrams.len();
        debug!(
            concepts = summary.concepts,
            labels = summary.labels,
            ngrams = summary.ngrams,
            skipped = summary.rows_skipped,
            "taxonomy index built"
        );

        Ok(Self {
            concepts,
            by_id,
            exact,
            ngrams,
            max_ngram,
            summary,
        })
    }

    /// Concepts whose normalized label equals `normalized` exactly.
    ///
    /// Returned in ascending concept-id order.
    pub fn lookup_exact(&self, normalized: &str) -> Vec<Arc<TaxonomyConcept>> {
        self.exact
            .get(normalized)
            .map(|ids| ids.iter().map(|&i| self.concepts[i].clone()).collect())
            .unwrap_or_default()
    }

    /// Concepts whose label contains `gram` as a contiguous word n-gram.
    ///
    /// Used for containment-style candidate generation; `gram` must already
    /// be normalized.
    pub fn lookup_ngram(&self, gram: &str) -> Vec<Arc<TaxonomyConcept>> {
        self.ngrams
            .get(gram)
            .map(|ids| ids.iter().map(|&i| self.concepts[i].clone()).collect())
            .unwrap_or_default()
    }

    /// Iterate all `(normalized_label, concept)` pairs for fuzzy scanning,
    /// in ascending concept-id order.
    pub fn all_labels(&self) -> impl Iterator<Item = (&str, &Arc<TaxonomyConcept>)> {
        self.concepts
            .iter()
            .flat_map(|c| c.labels.iter().map(move |l| (l.normalized.as_str(), c)))
    }

    /// Scan a piece of free text for embedded taxonomy labels.
    ///
    /// Generates word n-grams of length 1..=`max_ngram` from the normalized
    /// text (single tokens of fewer than 3 characters excluded) and probes
    /// each against the exact label map. Hits are returned left to right,
    /// longer grams first at equal start position, each gram reported once.
    pub fn scan_text(&self, text: &str) -> Vec<NgramHit> {
        let normalized = normalize(text);
        let tokens: Vec<&str> = normalized.split(' ').filter(|t| !t.is_empty()).collect();

        let mut hits = Vec::new();
        let mut reported: HashSet<String> = HashSet::new();

        for start in 0..tokens.len() {
            let longest = self.max_ngram.min(tokens.len() - start);
            for len in (1..=longest).rev() {
                if len == 1 && tokens[start].len() < MIN_UNIGRAM_CHARS {
                    continue;
                }
                let gram = tokens[start..start + len].join(" ");
                if reported.contains(&gram) {
                    continue;
                }
                let concepts = self.lookup_exact(&gram);
                if !concepts.is_empty() {
                    reported.insert(gram.clone());
                    hits.push(NgramHit { gram, concepts });
                }
            }
        }
        hits
    }

    /// Fetch a concept by id.
    pub fn get(&self, concept_id: &str) -> Option<Arc<TaxonomyConcept>> {
        self.by_id.get(concept_id).map(|&i| self.concepts[i].clone())
    }

    /// Number of concepts in the index.
    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    /// True when the index holds no concepts (never after a successful build).
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    /// Configured maximum n-gram length.
    pub fn max_ngram(&self) -> usize {
        self.max_ngram
    }

    /// Load summary for reporting.
    pub fn summary(&self) -> &TaxonomyLoadSummary {
        &self.summary
    }
}
