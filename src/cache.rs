//! Memoization of per-mention resolutions.
//!
//! Corpora repeat the same skill strings thousands of times ("python"
//! appears in most postings), so the resolver memoizes one [`MatchResult`]
//! per unique normalized mention. Entries are valid for the lifetime of the
//! taxonomy index they were computed against; a new run with a new index
//! starts with a fresh cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};

use crate::resolver::MatchResult;

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable memoization.
    pub enabled: bool,
    /// Maximum number of cached mention resolutions.
    pub max_entries: u64,
    /// TTL for cached entries in seconds.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 100_000,
            ttl_secs: 3600,
        }
    }
}

/// Counters for cache effectiveness reporting.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Per-process cache of normalized mention -> resolution.
pub struct ResolutionCache {
    results: Cache<String, Arc<MatchResult>>,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResolutionCache {
    /// Create a cache from configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            results: Cache::builder()
                .max_capacity(config.max_entries)
                .time_to_live(Duration::from_secs(config.ttl_secs))
                .build(),
            enabled: config.enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Create a disabled cache.
    pub fn disabled() -> Self {
        Self {
            results: Cache::builder().max_capacity(0).build(),
            enabled: false,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a normalized mention.
    pub async fn get(&self, normalized: &str) -> Option<Arc<MatchResult>> {
        if !self.enabled {
            return None;
        }
        let result = self.results.get(normalized).await;
        if result.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Store a resolution.
    pub async fn insert(&self, normalized: String, result: MatchResult) {
        if !self.enabled {
            return;
        }
        self.results.insert(normalized, Arc::new(result)).await;
    }

    /// Hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
