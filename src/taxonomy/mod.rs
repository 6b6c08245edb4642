//! Taxonomy concepts and the in-memory index built over them.
//!
//! The taxonomy is loaded once per process from the taxonomy collaborator
//! (see [`crate::storage::ResolutionRepository::load_taxonomy`]), indexed,
//! and then shared read-only across all matching workers.

mod concept;
mod index;

pub use concept::{ConceptCategory, ConceptLabel, TaxonomyConcept, TaxonomyRow};
pub use index::{NgramHit, TaxonomyIndex, TaxonomyLoadSummary, DEFAULT_MAX_NGRAM};
