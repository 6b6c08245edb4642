//! Taxonomy concept types.

use serde::{Deserialize, Serialize};

/// One raw taxonomy row as produced by the taxonomy collaborator.
///
/// Rows arrive as `(concept_id, label[, language], description, category)`.
/// Several rows may share a `concept_id` (one per label/language); the index
/// merges them into a single [`TaxonomyConcept`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyRow {
    /// Stable external identifier, e.g. an ESCO skill URI.
    pub concept_id: String,
    /// Canonical label in one language.
    pub label: String,
    /// BCP-47-ish language tag ("es", "en"). Optional.
    #[serde(default)]
    pub language: Option<String>,
    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Category/type tag ("technical", "knowledge", ...). Optional.
    #[serde(default)]
    pub category: Option<String>,
}

/// Concept category, ordered by matching priority.
///
/// Technical ("hard") categories win ties against generic ones when several
/// concepts share an identical normalized label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConceptCategory {
    /// Tools, languages, frameworks: concrete technical skills.
    Technical,
    /// Knowledge domains ("statistics", "labor law").
    Knowledge,
    /// Natural languages.
    Language,
    /// Transversal/soft skills ("teamwork").
    Transversal,
    /// Attitudes and values.
    Attitude,
    /// Unrecognized or missing category tag.
    #[default]
    #[serde(other)]
    Unknown,
}

impl ConceptCategory {
    /// Parse a free-form category tag from a taxonomy row.
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "technical" | "skill" | "skill/competence" | "tool" | "ict" => Self::Technical,
            "knowledge" => Self::Knowledge,
            "language" => Self::Language,
            "transversal" | "soft" => Self::Transversal,
            "attitude" | "attitudes" | "values" => Self::Attitude,
            _ => Self::Unknown,
        }
    }

    /// Tie-break priority: lower wins.
    pub fn priority(self) -> u8 {
        match self {
            Self::Technical => 0,
            Self::Knowledge => 1,
            Self::Language => 2,
            Self::Transversal => 3,
            Self::Attitude => 4,
            Self::Unknown => 5,
        }
    }
}

/// One canonical label of a concept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptLabel {
    /// Original label text as loaded.
    pub text: String,
    /// Normalized form used for matching.
    pub normalized: String,
    /// Language tag, if the source provided one.
    pub language: Option<String>,
}

/// One canonical entry in the controlled skill vocabulary.
///
/// Immutable after load; owned by the [`super::TaxonomyIndex`] and shared
/// as `Arc` with every matcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyConcept {
    /// Stable external identifier.
    pub id: String,
    /// One or more canonical labels across supported languages.
    pub labels: Vec<ConceptLabel>,
    /// Free-text description.
    pub description: Option<String>,
    /// Category tag.
    pub category: ConceptCategory,
}

impl TaxonomyConcept {
    /// The preferred display label (first label loaded).
    pub fn preferred_label(&self) -> &str {
        self.labels.first().map(|l| l.text.as_str()).unwrap_or("")
    }
}
