//! Batch runner: applies the resolver over a persisted mention corpus.
//!
//! Work is split into static offset/limit partitions over the repository's
//! stable mention ordering, computed once before any worker starts. Workers
//! share the read-only resolver and write results through idempotent
//! upserts, so a crashed worker is restarted by re-running the same
//! partition, never by inferring "what wasn't done yet" from status
//! fields, which the engine deliberately does not have.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::error::Result;
use crate::normalize::normalize;
use crate::resolver::{CorpusMatchStatistics, MatchResult, Resolver};
use crate::storage::{MentionMatch, MentionPartition, ResolutionRepository};

/// Batch runner configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Number of concurrent workers (and partitions).
    pub workers: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Progress event during a batch run.
#[derive(Debug, Clone)]
pub enum RunProgress {
    /// Partitioning finished; workers are starting.
    RunStarted {
        total_mentions: usize,
        partitions: usize,
    },
    /// A worker claimed its partition.
    PartitionStarted { partition: usize, mentions: usize },
    /// A partition finished successfully.
    PartitionComplete {
        partition: usize,
        mentions: usize,
        matched: usize,
    },
    /// A partition failed; the run continues.
    PartitionError { partition: usize, error: String },
    /// All partitions done.
    RunComplete { duration_ms: u64 },
}

/// Outcome of one partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionReport {
    pub partition: usize,
    /// Mention rows in the partition.
    pub mentions: usize,
    /// Unique normalized texts resolved.
    pub unique_mentions: usize,
    /// Result rows upserted.
    pub saved: usize,
    /// Load/save error, if the partition failed.
    pub error: Option<String>,
}

/// Final report of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    pub total_mentions: usize,
    pub partitions: Vec<PartitionReport>,
    pub partitions_succeeded: usize,
    pub partitions_failed: usize,
    /// Statistics over every persisted mention row.
    pub statistics: CorpusMatchStatistics,
    pub duration_ms: u64,
}

/// Drives the resolver over every stored mention and persists results.
pub struct BatchRunner {
    repository: Arc<dyn ResolutionRepository>,
    resolver: Arc<Resolver>,
    config: RunnerConfig,
    progress_tx: Option<mpsc::UnboundedSender<RunProgress>>,
}

impl BatchRunner {
    /// Create a runner.
    pub fn new(
        repository: Arc<dyn ResolutionRepository>,
        resolver: Arc<Resolver>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            repository,
            resolver,
            config,
            progress_tx: None,
        }
    }

    /// Get a progress receiver; events are emitted during [`Self::run`].
    pub fn progress_channel(&mut self) -> mpsc::UnboundedReceiver<RunProgress> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.progress_tx = Some(tx);
        rx
    }

    fn report(&self, progress: RunProgress) {
        log_progress(&progress);
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(progress);
        }
    }

    /// Resolve every stored mention and upsert the results.
    ///
    /// Partition failures are recorded in the report, not raised; the
    /// returned statistics cover the partitions that completed.
    pub async fn run(&self) -> Result<RunReport> {
        let started = Instant::now();
        let started_at = Utc::now();
        let total = self.repository.count_mentions().await?;
        let partitions = MentionPartition::split(total, self.config.workers);

        self.report(RunProgress::RunStarted {
            total_mentions: total,
            partitions: partitions.len(),
        });

        let mut handles = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let repository = self.repository.clone();
            let resolver = self.resolver.clone();
            let tx = self.progress_tx.clone();
            handles.push(tokio::spawn(async move {
                let outcome = process_partition(&*repository, &resolver, partition, &tx).await;
                (partition, outcome)
            }));
        }

        let mut reports = Vec::new();
        let mut statistics = CorpusMatchStatistics::default();
        for joined in join_all(handles).await {
            let (partition, outcome) = joined
                .map_err(|e| crate::error::AssayError::Run(format!("worker panicked: {e}")))?;
            match outcome {
                Ok((report, stats)) => {
                    self.report(RunProgress::PartitionComplete {
                        partition: report.partition,
                        mentions: report.mentions,
                        matched: stats.matched,
                    });
                    statistics.merge(&stats);
                    reports.push(report);
                }
                Err(e) => {
                    let message = e.to_string();
                    self.report(RunProgress::PartitionError {
                        partition: partition.index,
                        error: message.clone(),
                    });
                    reports.push(PartitionReport {
                        partition: partition.index,
                        mentions: partition.limit,
                        unique_mentions: 0,
                        saved: 0,
                        error: Some(message),
                    });
                }
            }
        }

        reports.sort_by_key(|r| r.partition);
        let duration_ms = started.elapsed().as_millis() as u64;
        self.report(RunProgress::RunComplete { duration_ms });

        let partitions_failed = reports.iter().filter(|r| r.error.is_some()).count();
        Ok(RunReport {
            started_at,
            total_mentions: total,
            partitions_succeeded: reports.len() - partitions_failed,
            partitions_failed,
            partitions: reports,
            statistics,
            duration_ms,
        })
    }
}

/// Resolve one partition and upsert its rows.
async fn process_partition(
    repository: &dyn ResolutionRepository,
    resolver: &Resolver,
    partition: MentionPartition,
    tx: &Option<mpsc::UnboundedSender<RunProgress>>,
) -> Result<(PartitionReport, CorpusMatchStatistics)> {
    let mentions = repository.load_mentions(&partition).await?;
    let progress = RunProgress::PartitionStarted {
        partition: partition.index,
        mentions: mentions.len(),
    };
    log_progress(&progress);
    if let Some(tx) = tx {
        let _ = tx.send(progress);
    }

    let results = resolver
        .resolve_batch(mentions.iter().map(|m| m.raw_text.as_str()))
        .await;

    // Expand unique resolutions back to one row per mention occurrence.
    let rows: Vec<MentionMatch> = mentions
        .iter()
        .map(|mention| {
            let normalized = normalize(&mention.raw_text);
            let result = results
                .get(&normalized)
                .cloned()
                .unwrap_or_else(|| MatchResult::emergent(normalized));
            MentionMatch {
                job_id: mention.job_id.clone(),
                raw_text: mention.raw_text.clone(),
                extraction_method: mention.extraction_method,
                result,
            }
        })
        .collect();

    repository.save_results(&rows).await?;

    let stats = CorpusMatchStatistics::from_results(rows.iter().map(|r| &r.result));
    Ok((
        PartitionReport {
            partition: partition.index,
            mentions: mentions.len(),
            unique_mentions: results.len(),
            saved: rows.len(),
            error: None,
        },
        stats,
    ))
}

fn log_progress(progress: &RunProgress) {
    match progress {
        RunProgress::RunStarted {
            total_mentions,
            partitions,
        } => info!(total_mentions, partitions, "batch run started"),
        RunProgress::PartitionStarted { partition, mentions } => {
            info!(partition, mentions, "partition started")
        }
        RunProgress::PartitionComplete {
            partition,
            mentions,
            matched,
        } => info!(partition, mentions, matched, "partition complete"),
        RunProgress::PartitionError { partition, error } => {
            error!(partition, error = %error, "partition failed")
        }
        RunProgress::RunComplete { duration_ms } => info!(duration_ms, "batch run complete"),
    }
}
