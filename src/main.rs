//! Assay CLI entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use assay::{
    BatchRunner, Config, JsonlRepository, Resolver, ResolutionRepository, RunnerConfig,
    TaxonomyIndex,
};

/// Assay: skill taxonomy resolution engine
#[derive(Parser, Debug)]
#[command(name = "assay")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve every stored mention against the taxonomy and persist results
    Run {
        /// Taxonomy rows (JSONL)
        #[arg(short, long)]
        taxonomy: PathBuf,
        /// Skill mentions (JSONL)
        #[arg(short, long)]
        mentions: PathBuf,
        /// Output file for match results (JSONL)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Number of concurrent workers
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Resolve one or more mentions ad hoc
    Match {
        /// Taxonomy rows (JSONL)
        #[arg(short, long)]
        taxonomy: PathBuf,
        /// Mention texts to resolve
        #[arg(required = true)]
        mentions: Vec<String>,
    },
    /// Scan free job text for embedded taxonomy labels
    Scan {
        /// Taxonomy rows (JSONL)
        #[arg(short, long)]
        taxonomy: PathBuf,
        /// Text to scan
        text: String,
    },
    /// Show the taxonomy load summary
    Taxonomy {
        /// Taxonomy rows (JSONL)
        #[arg(short, long)]
        taxonomy: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    match args.command {
        Command::Run {
            taxonomy,
            mentions,
            output,
            workers,
        } => run_batch(&config, taxonomy, mentions, output, workers, args.json).await,
        Command::Match { taxonomy, mentions } => {
            run_match(&config, taxonomy, mentions, args.json).await
        }
        Command::Scan { taxonomy, text } => run_scan(&config, taxonomy, &text, args.json),
        Command::Taxonomy { taxonomy } => run_taxonomy(&config, taxonomy, args.json),
    }
}

async fn run_batch(
    config: &Config,
    taxonomy: PathBuf,
    mentions: PathBuf,
    output: Option<PathBuf>,
    workers: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let output = match output {
        Some(path) => path,
        None => {
            let dir = config.results_dir();
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating results dir {}", dir.display()))?;
            dir.join("results.jsonl")
        }
    };

    let repository = Arc::new(JsonlRepository::new(taxonomy, mentions, output.clone())?);
    let rows = repository.load_taxonomy().await?;
    let resolver = Arc::new(Resolver::from_config(config, rows).await?);

    let runner_config = RunnerConfig {
        workers: workers.unwrap_or(config.runner.workers),
    };
    let runner = BatchRunner::new(repository, resolver, runner_config);
    let report = runner.run().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let stats = &report.statistics;
        println!("Batch run complete in {} ms", report.duration_ms);
        println!(
            "Partitions: {} ok, {} failed",
            report.partitions_succeeded, report.partitions_failed
        );
        for partition in &report.partitions {
            match &partition.error {
                Some(error) => println!(
                    "  [{}] {} mentions FAILED: {error}",
                    partition.partition, partition.mentions
                ),
                None => println!(
                    "  [{}] {} mentions, {} unique, {} saved",
                    partition.partition,
                    partition.mentions,
                    partition.unique_mentions,
                    partition.saved
                ),
            }
        }
        println!(
            "Mentions: {} total | {} matched ({:.1}%) | {} emergent ({:.1}%)",
            stats.total_mentions,
            stats.matched,
            stats.match_rate * 100.0,
            stats.emergent,
            stats.emergent_rate * 100.0
        );
        println!(
            "By method: exact {} | fuzzy {} | semantic {}",
            stats.exact, stats.fuzzy, stats.semantic
        );
        println!("Results written to {}", output.display());
    }
    Ok(())
}

async fn run_match(
    config: &Config,
    taxonomy: PathBuf,
    mentions: Vec<String>,
    json: bool,
) -> anyhow::Result<()> {
    let rows = JsonlRepository::read_taxonomy(taxonomy)?;
    let resolver = Resolver::from_config(config, rows).await?;

    let results = resolver.resolve_batch(mentions.iter().map(String::as_str)).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    for mention in &mentions {
        let normalized = assay::normalize(mention);
        match results.get(&normalized) {
            Some(result) if result.is_matched() => println!(
                "{mention} -> {} ({:?}, confidence {:.3}, label {:?})",
                result.concept_id.as_deref().unwrap_or(""),
                result.method,
                result.confidence,
                result.matched_label.as_deref().unwrap_or("")
            ),
            _ => println!("{mention} -> emergent (no taxonomy match)"),
        }
    }
    Ok(())
}

fn run_scan(config: &Config, taxonomy: PathBuf, text: &str, json: bool) -> anyhow::Result<()> {
    let rows = JsonlRepository::read_taxonomy(taxonomy)?;
    let index = TaxonomyIndex::build(rows, config.matching.max_ngram)?;

    let hits = index.scan_text(text);
    if json {
        let out: Vec<serde_json::Value> = hits
            .iter()
            .map(|hit| {
                serde_json::json!({
                    "gram": hit.gram,
                    "concepts": hit.concepts.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No taxonomy labels found");
    }
    for hit in hits {
        let ids: Vec<&str> = hit.concepts.iter().map(|c| c.id.as_str()).collect();
        println!("\"{}\" -> {}", hit.gram, ids.join(", "));
    }
    Ok(())
}

fn run_taxonomy(config: &Config, taxonomy: PathBuf, json: bool) -> anyhow::Result<()> {
    let rows = JsonlRepository::read_taxonomy(taxonomy)?;
    let index = TaxonomyIndex::build(rows, config.matching.max_ngram)?;
    let summary = index.summary();

    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!("Rows seen:         {}", summary.rows_seen);
        println!("Rows skipped:      {}", summary.rows_skipped);
        println!("Duplicates merged: {}", summary.duplicates_merged);
        println!("Concepts:          {}", summary.concepts);
        println!("Labels:            {}", summary.labels);
        println!("N-grams indexed:   {}", summary.ngrams);
    }
    Ok(())
}
