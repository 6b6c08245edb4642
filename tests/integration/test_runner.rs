//! Batch runner tests over durable JSONL storage.

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;

use assay::cache::{CacheConfig, ResolutionCache};
use assay::matching::FuzzyConfig;
use assay::resolver::{MatchMethod, Resolver};
use assay::storage::{JsonlRepository, MentionPartition, ResolutionRepository};
use assay::taxonomy::{TaxonomyIndex, DEFAULT_MAX_NGRAM};
use assay::{BatchRunner, RunnerConfig};

const TAXONOMY: &str = r#"{"concept_id":"c1","label":"Python","category":"technical"}
{"concept_id":"c2","label":"Docker","category":"technical"}
{"concept_id":"c3","label":"machine learning","category":"knowledge"}
{"concept_id":"c3","label":"aprendizaje automático","language":"es","category":"knowledge"}
"#;

const MENTIONS: &str = r#"{"job_id":"j01","raw_text":"Python","extraction_method":"pattern"}
{"job_id":"j01","raw_text":"Dcoker","extraction_method":"llm"}
{"job_id":"j02","raw_text":"python","extraction_method":"llm"}
{"job_id":"j02","raw_text":"aprendizaje automatico","extraction_method":"pattern"}
{"job_id":"j03","raw_text":"kubernets","extraction_method":"pattern"}
{"job_id":"j03","raw_text":"PYTHON","extraction_method":"pattern"}
"#;

fn setup(dir: &TempDir) -> Arc<JsonlRepository> {
    let taxonomy_path = dir.path().join("taxonomy.jsonl");
    let mentions_path = dir.path().join("mentions.jsonl");
    fs::write(&taxonomy_path, TAXONOMY).unwrap();
    fs::write(&mentions_path, MENTIONS).unwrap();
    Arc::new(
        JsonlRepository::new(taxonomy_path, mentions_path, dir.path().join("results.jsonl"))
            .unwrap(),
    )
}

async fn resolver_for(repo: &JsonlRepository) -> Arc<Resolver> {
    let rows = repo.load_taxonomy().await.unwrap();
    let index = Arc::new(TaxonomyIndex::build(rows, DEFAULT_MAX_NGRAM).unwrap());
    Arc::new(Resolver::new(
        index,
        FuzzyConfig::default(),
        None,
        ResolutionCache::new(&CacheConfig::default()),
    ))
}

#[tokio::test]
async fn test_full_run_persists_every_mention() {
    let dir = TempDir::new().unwrap();
    let repo = setup(&dir);
    let resolver = resolver_for(&repo).await;

    let runner = BatchRunner::new(repo.clone(), resolver, RunnerConfig { workers: 2 });
    let report = runner.run().await.unwrap();

    assert_eq!(report.total_mentions, 6);
    assert_eq!(report.partitions_failed, 0);
    assert_eq!(report.statistics.total_mentions, 6);

    let results = repo.load_results().unwrap();
    assert_eq!(results.len(), 6);

    // The accented multilingual label matches exactly after normalization.
    let ml = results
        .iter()
        .find(|r| r.raw_text == "aprendizaje automatico")
        .unwrap();
    assert_eq!(ml.result.concept_id.as_deref(), Some("c3"));
    assert_eq!(ml.result.method, MatchMethod::Exact);

    // "kubernets" has no taxonomy counterpart at all here.
    let kube = results.iter().find(|r| r.raw_text == "kubernets").unwrap();
    assert_eq!(kube.result.method, MatchMethod::Emergent);
}

#[tokio::test]
async fn test_provenance_is_preserved() {
    let dir = TempDir::new().unwrap();
    let repo = setup(&dir);
    let resolver = resolver_for(&repo).await;
    BatchRunner::new(repo.clone(), resolver, RunnerConfig { workers: 1 })
        .run()
        .await
        .unwrap();

    let results = repo.load_results().unwrap();
    let llm_rows = results
        .iter()
        .filter(|r| r.extraction_method == assay::ExtractionMethod::Llm)
        .count();
    assert_eq!(llm_rows, 2);
}

#[tokio::test]
async fn test_rerun_converges_to_identical_file() {
    let dir = TempDir::new().unwrap();
    let repo = setup(&dir);
    let resolver = resolver_for(&repo).await;
    let runner = BatchRunner::new(repo.clone(), resolver, RunnerConfig { workers: 3 });

    runner.run().await.unwrap();
    let first = fs::read_to_string(dir.path().join("results.jsonl")).unwrap();
    runner.run().await.unwrap();
    let second = fs::read_to_string(dir.path().join("results.jsonl")).unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_partition_replay_after_simulated_crash() {
    let dir = TempDir::new().unwrap();
    let repo = setup(&dir);
    let resolver = resolver_for(&repo).await;

    // Simulate a worker that wrote its partition, crashed, and was
    // restarted: replaying the same deterministic partition upserts the
    // same rows instead of duplicating them.
    let total = repo.count_mentions().await.unwrap();
    let partitions = MentionPartition::split(total, 2);
    let mentions = repo.load_mentions(&partitions[0]).await.unwrap();
    let results = resolver
        .resolve_batch(mentions.iter().map(|m| m.raw_text.as_str()))
        .await;
    let rows: Vec<assay::MentionMatch> = mentions
        .iter()
        .map(|m| assay::MentionMatch {
            job_id: m.job_id.clone(),
            raw_text: m.raw_text.clone(),
            extraction_method: m.extraction_method,
            result: results[&assay::normalize(&m.raw_text)].clone(),
        })
        .collect();

    repo.save_results(&rows).await.unwrap();
    repo.save_results(&rows).await.unwrap();

    let runner = BatchRunner::new(repo.clone(), resolver, RunnerConfig { workers: 2 });
    runner.run().await.unwrap();

    let saved = repo.load_results().unwrap();
    assert_eq!(saved.len(), 6, "replay must not duplicate rows");
}

#[tokio::test]
async fn test_worker_counts_agree_on_durable_output() {
    let mut outputs = Vec::new();
    for workers in [1, 2, 5] {
        let dir = TempDir::new().unwrap();
        let repo = setup(&dir);
        let resolver = resolver_for(&repo).await;
        BatchRunner::new(repo.clone(), resolver, RunnerConfig { workers })
            .run()
            .await
            .unwrap();
        outputs.push(fs::read_to_string(dir.path().join("results.jsonl")).unwrap());
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[1], outputs[2]);
}
