//! Analysis cache
//!
//! Architecture tags and weight statistics per LoRA path. Populated fields
//! are reused until a forced refresh or [`AnalysisCache::clear`].
//!
//! Computation runs outside the map's locks, so two callers missing the same
//! cold path may both compute it; the later write wins. Reads and writes of
//! one entry are atomic with respect to each other.

use dashmap::DashMap;
use loraplan_core::{ArchitectureTag, WeightStatistics};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Cached analysis of one file
#[derive(Debug, Clone, Default)]
pub struct CacheEntry {
    pub architecture: Option<ArchitectureTag>,
    pub statistics: Option<Arc<WeightStatistics>>,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that had to compute
    pub misses: u64,
    /// Cached paths
    pub entries: usize,
}

impl CacheStats {
    /// Hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Per-path analysis cache, shareable across threads
#[derive(Debug, Default)]
pub struct AnalysisCache {
    entries: DashMap<String, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AnalysisCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    fn key(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    fn record(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Cached architecture, computing it when absent or when `force` is set
    pub fn architecture_or_compute(
        &self,
        path: &Path,
        force: bool,
        compute: impl FnOnce() -> ArchitectureTag,
    ) -> ArchitectureTag {
        let key = Self::key(path);
        if !force {
            if let Some(arch) = self.entries.get(&key).and_then(|e| e.architecture) {
                self.record(true);
                return arch;
            }
        }

        self.record(false);
        let arch = compute();
        self.entries.entry(key).or_default().architecture = Some(arch);
        debug!(path = %path.display(), arch = %arch, force, "Cached architecture");
        arch
    }

    /// Cached statistics, computing them when absent or when `force` is set.
    ///
    /// A failed computation is not cached.
    pub fn statistics_or_compute(
        &self,
        path: &Path,
        force: bool,
        compute: impl FnOnce() -> Option<WeightStatistics>,
    ) -> Option<Arc<WeightStatistics>> {
        let key = Self::key(path);
        if !force {
            if let Some(stats) = self.entries.get(&key).and_then(|e| e.statistics.clone()) {
                self.record(true);
                return Some(stats);
            }
        }

        self.record(false);
        let stats = Arc::new(compute()?);
        self.entries.entry(key).or_default().statistics = Some(Arc::clone(&stats));
        debug!(path = %path.display(), blocks = stats.block_count(), force, "Cached statistics");
        Some(stats)
    }

    /// Snapshot of one entry
    pub fn get(&self, path: &Path) -> Option<CacheEntry> {
        self.entries.get(&Self::key(path)).map(|e| e.value().clone())
    }

    /// Drop every entry
    pub fn clear(&self) {
        let count = self.entries.len();
        self.entries.clear();
        debug!(entries = count, "Cleared analysis cache");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}
