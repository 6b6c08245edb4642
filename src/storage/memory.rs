//! In-memory repository for tests and ad hoc runs.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::taxonomy::TaxonomyRow;

use super::{MentionMatch, MentionPartition, ResolutionRepository, SkillMention};

/// Repository backed by process memory.
///
/// Mentions are kept sorted by the stable key `(job_id, raw_text)`; results
/// live in a map keyed the same way, so saving is a natural upsert.
pub struct MemoryRepository {
    taxonomy: Vec<TaxonomyRow>,
    mentions: Vec<SkillMention>,
    results: RwLock<BTreeMap<(String, String), MentionMatch>>,
}

impl MemoryRepository {
    /// Create a repository over fixture data.
    pub fn new(taxonomy: Vec<TaxonomyRow>, mut mentions: Vec<SkillMention>) -> Self {
        mentions.sort_by(|a, b| a.key().cmp(&b.key()));
        mentions.dedup_by(|a, b| a.key() == b.key());
        Self {
            taxonomy,
            mentions,
            results: RwLock::new(BTreeMap::new()),
        }
    }

    /// Snapshot of all saved results, in key order.
    pub fn saved_results(&self) -> Vec<MentionMatch> {
        self.results.read().values().cloned().collect()
    }

    /// Number of saved result rows.
    pub fn result_count(&self) -> usize {
        self.results.read().len()
    }
}

#[async_trait]
impl ResolutionRepository for MemoryRepository {
    async fn load_taxonomy(&self) -> Result<Vec<TaxonomyRow>> {
        Ok(self.taxonomy.clone())
    }

    async fn count_mentions(&self) -> Result<usize> {
        Ok(self.mentions.len())
    }

    async fn load_mentions(&self, partition: &MentionPartition) -> Result<Vec<SkillMention>> {
        let end = (partition.offset + partition.limit).min(self.mentions.len());
        let start = partition.offset.min(end);
        Ok(self.mentions[start..end].to_vec())
    }

    async fn save_results(&self, matches: &[MentionMatch]) -> Result<()> {
        let mut results = self.results.write();
        for m in matches {
            results.insert((m.job_id.clone(), m.raw_text.clone()), m.clone());
        }
        Ok(())
    }
}
