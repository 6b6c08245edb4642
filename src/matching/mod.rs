//! Matching strategies of increasing tolerance: exact, fuzzy, semantic.
//!
//! Each layer is an independently testable type; the
//! [`crate::resolver::Resolver`] composes them in strict priority order.

mod exact;
mod fuzzy;
mod semantic;

pub use exact::ExactMatcher;
pub use fuzzy::{FuzzyConfig, FuzzyMatcher};
pub use semantic::{SemanticConfig, SemanticMatcher};

use std::sync::Arc;

use crate::taxonomy::TaxonomyConcept;

/// A successful match produced by one matching layer.
#[derive(Debug, Clone)]
pub struct LayerMatch {
    /// The winning concept.
    pub concept: Arc<TaxonomyConcept>,
    /// The taxonomy label that participated in the winning comparison.
    pub label: String,
    /// Raw similarity score in [0, 1] (1.0 for exact matches).
    pub score: f64,
}
