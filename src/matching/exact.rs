//! Exact matching against the taxonomy index.

use std::sync::Arc;

use crate::normalize::normalize;
use crate::taxonomy::TaxonomyIndex;

use super::LayerMatch;

/// Authoritative O(1) lookup of a mention's normalized form.
///
/// Always attempted first: an exact label hit is ground truth and
/// short-circuits the fuzzier layers.
pub struct ExactMatcher {
    index: Arc<TaxonomyIndex>,
}

impl ExactMatcher {
    /// Create an exact matcher over a shared index.
    pub fn new(index: Arc<TaxonomyIndex>) -> Self {
        Self { index }
    }

    /// Match a raw mention exactly.
    ///
    /// When several concepts share the identical normalized label the tie
    /// is broken deterministically: technical/"hard" categories before
    /// generic ones, then lexicographically smallest concept id.
    pub fn match_exact(&self, mention: &str) -> Option<LayerMatch> {
        let normalized = normalize(mention);
        if normalized.is_empty() {
            return None;
        }

        self.index
            .lookup_exact(&normalized)
            .into_iter()
            .min_by(|a, b| {
                (a.category.priority(), &a.id).cmp(&(b.category.priority(), &b.id))
            })
            .map(|concept| LayerMatch {
                concept,
                label: normalized,
                score: 1.0,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{TaxonomyRow, DEFAULT_MAX_NGRAM};

    fn row(id: &str, label: &str, category: Option<&str>) -> TaxonomyRow {
        TaxonomyRow {
            concept_id: id.to_string(),
            label: label.to_string(),
            language: None,
            description: None,
            category: category.map(str::to_string),
        }
    }

    fn matcher(rows: Vec<TaxonomyRow>) -> ExactMatcher {
        ExactMatcher::new(Arc::new(TaxonomyIndex::build(rows, DEFAULT_MAX_NGRAM).unwrap()))
    }

    #[test]
    fn test_exact_hit_has_confidence_one() {
        let m = matcher(vec![row("c1", "Python", Some("technical"))]);
        let hit = m.match_exact("  PYTHON ").unwrap();
        assert_eq!(hit.concept.id, "c1");
        assert_eq!(hit.score, 1.0);
    }

    #[test]
    fn test_accented_mention_matches_plain_label() {
        let m = matcher(vec![row("c1", "gestion de proyectos", None)]);
        assert!(m.match_exact("Gestión de Proyectos").is_some());
    }

    #[test]
    fn test_miss_returns_none() {
        let m = matcher(vec![row("c1", "Python", None)]);
        assert!(m.match_exact("Pythonic").is_none());
        assert!(m.match_exact("  ").is_none());
    }

    #[test]
    fn test_tie_break_prefers_technical_category() {
        let m = matcher(vec![
            row("a-generic", "scrum", Some("transversal")),
            row("z-tech", "Scrum", Some("technical")),
        ]);
        assert_eq!(m.match_exact("scrum").unwrap().concept.id, "z-tech");
    }

    #[test]
    fn test_tie_break_same_category_smallest_id() {
        let m = matcher(vec![
            row("c2", "kanban", Some("technical")),
            row("c1", "Kanban", Some("technical")),
        ]);
        assert_eq!(m.match_exact("kanban").unwrap().concept.id, "c1");
    }
}
