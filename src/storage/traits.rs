//! Repository trait and persisted row types.
//!
//! The matching core has no knowledge of the storage engine: taxonomy rows,
//! mentions, and results cross this seam as typed values. LLM-extraction
//! JSON is parsed into [`SkillMention`] at this boundary; the core never
//! branches on loose JSON shapes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::resolver::MatchResult;
use crate::taxonomy::TaxonomyRow;

/// Provenance tag of the pipeline that extracted a mention.
///
/// Not validated beyond deserialization; unrecognized tags land on
/// [`ExtractionMethod::Unknown`] and are carried through for statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Pattern/NER-based extraction.
    Pattern,
    /// LLM-based extraction.
    Llm,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One occurrence of a candidate skill string in one job posting.
///
/// Produced by the out-of-scope extraction pipelines; consumed read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillMention {
    /// Owning job posting identifier.
    pub job_id: String,
    /// Raw extracted text.
    pub raw_text: String,
    /// Extraction pipeline that produced this mention.
    #[serde(default)]
    pub extraction_method: ExtractionMethod,
    /// Character span in the source text, when the extractor recorded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<(usize, usize)>,
}

impl SkillMention {
    /// Stable sort/upsert key: `(job_id, raw_text)`.
    pub fn key(&self) -> (&str, &str) {
        (&self.job_id, &self.raw_text)
    }
}

/// One persisted resolution row, upsert-keyed by `(job_id, raw_text)`.
///
/// Overwritten, not appended, when a mention is re-resolved under a new
/// taxonomy version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentionMatch {
    pub job_id: String,
    pub raw_text: String,
    pub extraction_method: ExtractionMethod,
    #[serde(flatten)]
    pub result: MatchResult,
}

/// A static, order-independent slice of the mention set.
///
/// Partitions are computed once from the total count before workers start.
/// They address positions in the repository's *stable ordering* by
/// `(job_id, raw_text)`, never a mutable field like a processing status,
/// which skips and duplicates work under concurrent writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionPartition {
    /// Zero-based partition index.
    pub index: usize,
    /// Offset into the stable mention ordering.
    pub offset: usize,
    /// Number of mentions in this partition.
    pub limit: usize,
}

impl MentionPartition {
    /// Split `total` mentions into at most `parts` contiguous ranges.
    ///
    /// Deterministic: the same inputs always yield the same ranges, so a
    /// crashed worker can safely re-run its partition.
    pub fn split(total: usize, parts: usize) -> Vec<MentionPartition> {
        let parts = parts.max(1);
        if total == 0 {
            return Vec::new();
        }
        let size = total.div_ceil(parts);
        (0..parts)
            .map(|index| {
                let offset = index * size;
                MentionPartition {
                    index,
                    offset,
                    limit: size.min(total.saturating_sub(offset)),
                }
            })
            .filter(|p| p.limit > 0)
            .collect()
    }
}

/// Narrow storage seam used by the batch runner.
#[async_trait]
pub trait ResolutionRepository: Send + Sync {
    /// Load all active taxonomy rows.
    async fn load_taxonomy(&self) -> crate::error::Result<Vec<TaxonomyRow>>;

    /// Total number of stored mentions.
    async fn count_mentions(&self) -> crate::error::Result<usize>;

    /// Load one partition of mentions.
    ///
    /// Implementations MUST order mentions by the stable key
    /// `(job_id, raw_text)` before slicing.
    async fn load_mentions(
        &self,
        partition: &MentionPartition,
    ) -> crate::error::Result<Vec<SkillMention>>;

    /// Upsert resolution rows, keyed by `(job_id, raw_text)`.
    ///
    /// Safe to call concurrently from workers on disjoint partitions, and
    /// idempotent: re-saving the same rows is a no-op.
    async fn save_results(&self, matches: &[MentionMatch]) -> crate::error::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_split_covers_all() {
        let parts = MentionPartition::split(10, 3);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], MentionPartition { index: 0, offset: 0, limit: 4 });
        assert_eq!(parts[1], MentionPartition { index: 1, offset: 4, limit: 4 });
        assert_eq!(parts[2], MentionPartition { index: 2, offset: 8, limit: 2 });
        let covered: usize = parts.iter().map(|p| p.limit).sum();
        assert_eq!(covered, 10);
    }

    #[test]
    fn test_partition_split_more_parts_than_items() {
        let parts = MentionPartition::split(2, 8);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts.iter().map(|p| p.limit).sum::<usize>(), 2);
    }

    #[test]
    fn test_partition_split_empty() {
        assert!(MentionPartition::split(0, 4).is_empty());
    }

    #[test]
    fn test_partition_split_deterministic() {
        assert_eq!(MentionPartition::split(1000, 7), MentionPartition::split(1000, 7));
    }

    #[test]
    fn test_extraction_method_unknown_fallback() {
        let m: ExtractionMethod = serde_json::from_str("\"regex_v2\"").unwrap();
        assert_eq!(m, ExtractionMethod::Unknown);
        let m: ExtractionMethod = serde_json::from_str("\"llm\"").unwrap();
        assert_eq!(m, ExtractionMethod::Llm);
    }
}
