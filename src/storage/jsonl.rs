//! JSONL-file repository.
//!
//! Taxonomy and mention inputs are newline-delimited JSON, one row per
//! line, as handed over by the upstream extraction/import pipelines.
//! Results are rewritten atomically (temp file + rename) with upsert
//! semantics keyed by `(job_id, raw_text)`, so re-running a partition after
//! a crash converges to the same file.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{Result, StorageError};
use crate::taxonomy::TaxonomyRow;

use super::{MentionMatch, MentionPartition, ResolutionRepository, SkillMention};

/// Repository over three JSONL files: taxonomy, mentions, results.
pub struct JsonlRepository {
    taxonomy_path: PathBuf,
    mentions_path: PathBuf,
    results_path: PathBuf,
    /// Serializes result-file rewrites from concurrent workers.
    write_lock: Mutex<()>,
}

impl JsonlRepository {
    /// Create a repository over the given files.
    ///
    /// The taxonomy and mentions files must exist; the results file is
    /// created on first save.
    pub fn new(
        taxonomy_path: impl Into<PathBuf>,
        mentions_path: impl Into<PathBuf>,
        results_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let taxonomy_path = taxonomy_path.into();
        let mentions_path = mentions_path.into();
        for path in [&taxonomy_path, &mentions_path] {
            if !path.exists() {
                return Err(StorageError::PathNotFound(path.display().to_string()).into());
            }
        }
        Ok(Self {
            taxonomy_path,
            mentions_path,
            results_path: results_path.into(),
            write_lock: Mutex::new(()),
        })
    }

    /// Parse a JSONL file, skipping malformed lines with a warning.
    fn read_lines<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
        let file = fs::File::open(path)?;
        let reader = BufReader::new(file);
        let mut rows = Vec::new();
        let mut skipped = 0usize;

        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    skipped += 1;
                    warn!(
                        path = %path.display(),
                        line = number + 1,
                        "skipping malformed row: {}",
                        e
                    );
                }
            }
        }
        if skipped > 0 {
            warn!(path = %path.display(), skipped, "malformed rows skipped");
        }
        Ok(rows)
    }

    fn load_sorted_mentions(&self) -> Result<Vec<SkillMention>> {
        let mut mentions: Vec<SkillMention> = Self::read_lines(&self.mentions_path)?;
        mentions.sort_by(|a, b| a.key().cmp(&b.key()));
        mentions.dedup_by(|a, b| a.key() == b.key());
        Ok(mentions)
    }

    /// Load taxonomy rows from a standalone JSONL file.
    ///
    /// Used by CLI commands that need the taxonomy without a mention store.
    pub fn read_taxonomy(path: impl AsRef<Path>) -> Result<Vec<TaxonomyRow>> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StorageError::PathNotFound(path.display().to_string()).into());
        }
        Self::read_lines(path)
    }

    /// All persisted result rows, in key order.
    pub fn load_results(&self) -> Result<Vec<MentionMatch>> {
        if !self.results_path.exists() {
            return Ok(Vec::new());
        }
        Ok(Self::read_lines(&self.results_path)?)
    }
}

#[async_trait]
impl ResolutionRepository for JsonlRepository {
    async fn load_taxonomy(&self) -> Result<Vec<TaxonomyRow>> {
        Self::read_lines(&self.taxonomy_path)
    }

    async fn count_mentions(&self) -> Result<usize> {
        Ok(self.load_sorted_mentions()?.len())
    }

    async fn load_mentions(&self, partition: &MentionPartition) -> Result<Vec<SkillMention>> {
        let mentions = self.load_sorted_mentions()?;
        let end = (partition.offset + partition.limit).min(mentions.len());
        let start = partition.offset.min(end);
        Ok(mentions[start..end].to_vec())
    }

    async fn save_results(&self, matches: &[MentionMatch]) -> Result<()> {
        if matches.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock();

        // Merge into the existing rows, then rewrite atomically.
        let mut merged: BTreeMap<(String, String), MentionMatch> = BTreeMap::new();
        if self.results_path.exists() {
            for row in Self::read_lines::<MentionMatch>(&self.results_path)? {
                merged.insert((row.job_id.clone(), row.raw_text.clone()), row);
            }
        }
        for m in matches {
            merged.insert((m.job_id.clone(), m.raw_text.clone()), m.clone());
        }

        let tmp_path = self.results_path.with_extension("jsonl.tmp");
        {
            let mut tmp = fs::File::create(&tmp_path)?;
            for row in merged.values() {
                serde_json::to_writer(&mut tmp, row)?;
                tmp.write_all(b"\n")?;
            }
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.results_path)
            .map_err(|e| StorageError::Write(format!("rename failed: {}", e)))?;
        Ok(())
    }
}
