//! LoRA engine
//!
//! Facade over the analysis and resolution parts: owns the file resolver,
//! tensor loader, classifier and the analysis cache, and exposes the
//! operations hosts call.

use crate::cache::{AnalysisCache, CacheStats};
use crate::config::EngineConfig;
use crate::lora::ActivationPlan;
use crate::scheduler::{AnalysisSource, Resolution, ScheduleResolver};
use loraplan_core::{ArchitectureTag, ScheduleEntry, WeightStatistics};
use loraplan_lora::{
    classify_sdxl_lineage, compute_stats, FileResolver, LoraInspector, SafetensorsLoader,
    SearchPathResolver, TensorLoader,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, span, Level};

/// Architecture and schedule engine.
///
/// Cloning is cheap and clones share the cache.
#[derive(Clone)]
pub struct LoraEngine {
    config: EngineConfig,
    files: Arc<dyn FileResolver>,
    loader: Arc<dyn TensorLoader>,
    cache: Arc<AnalysisCache>,
    inspector: LoraInspector,
}

impl LoraEngine {
    /// Create a new engine builder
    pub fn builder() -> LoraEngineBuilder {
        LoraEngineBuilder::new()
    }

    /// Engine with default collaborators for `config`
    pub fn new(config: EngineConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Architecture of a file, cached unless `force` is set
    pub fn detect_architecture(&self, path: &Path, force: bool) -> ArchitectureTag {
        self.cache
            .architecture_or_compute(path, force, || self.inspector.detect(path))
    }

    /// Architecture with a generic SDXL result refined into its lineage
    pub fn detect_lineage(&self, path: &Path, force: bool) -> ArchitectureTag {
        let arch = self.detect_architecture(path, force);
        if arch != ArchitectureTag::Sdxl {
            return arch;
        }

        match self.compute_statistics(path, force, arch) {
            Some(stats) => {
                let lineage = classify_sdxl_lineage(&stats);
                debug!(path = %path.display(), lineage = %lineage, "Refined SDXL lineage");
                lineage
            }
            None => arch,
        }
    }

    /// Weight statistics of a file, cached unless `force` is set.
    ///
    /// `None` when the file cannot be loaded; that outcome is not cached.
    pub fn compute_statistics(
        &self,
        path: &Path,
        force: bool,
        arch: ArchitectureTag,
    ) -> Option<Arc<WeightStatistics>> {
        self.cache
            .statistics_or_compute(path, force, || compute_stats(path, arch, self.loader.as_ref()))
    }

    /// [`compute_statistics`](Self::compute_statistics) on the blocking pool
    pub async fn compute_statistics_async(
        &self,
        path: PathBuf,
        force: bool,
        arch: ArchitectureTag,
    ) -> Option<Arc<WeightStatistics>> {
        let engine = self.clone();
        let task =
            tokio::task::spawn_blocking(move || engine.compute_statistics(&path, force, arch));
        match task.await {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "Statistics task failed");
                None
            }
        }
    }

    /// Combine the schedule sources into one plan, text and trigger list
    pub fn resolve_schedule(
        &self,
        entries: &[ScheduleEntry],
        text: Option<&str>,
        prior: Option<&ActivationPlan>,
    ) -> Resolution {
        let span = span!(Level::DEBUG, "resolve_schedule", entries = entries.len());
        let _enter = span.enter();

        ScheduleResolver::new(self.files.as_ref(), self.loader.as_ref(), self)
            .resolve(entries, text, prior)
    }

    /// Resolve a LoRA name against the search roots
    pub fn resolve_path(&self, name: &str) -> Option<PathBuf> {
        self.files.resolve(name)
    }

    /// Drop all cached analysis
    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("Analysis cache cleared");
    }

    /// Get cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Get the shared cache
    pub fn cache(&self) -> &Arc<AnalysisCache> {
        &self.cache
    }

    /// Get engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl AnalysisSource for LoraEngine {
    fn architecture(&self, path: &Path) -> ArchitectureTag {
        self.detect_architecture(path, false)
    }

    fn statistics(&self, path: &Path, arch: ArchitectureTag) -> Option<Arc<WeightStatistics>> {
        self.compute_statistics(path, false, arch)
    }
}

/// Engine builder
///
/// Collaborators left unset are derived from the configuration.
#[derive(Default)]
pub struct LoraEngineBuilder {
    config: EngineConfig,
    files: Option<Arc<dyn FileResolver>>,
    loader: Option<Arc<dyn TensorLoader>>,
    cache: Option<Arc<AnalysisCache>>,
}

impl LoraEngineBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a search root ahead of the configured ones
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config = self.config.with_root(root);
        self
    }

    /// Use a custom file resolver
    pub fn resolver(mut self, files: Arc<dyn FileResolver>) -> Self {
        self.files = Some(files);
        self
    }

    /// Use a custom tensor loader
    pub fn loader(mut self, loader: Arc<dyn TensorLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Share an existing cache
    pub fn cache(mut self, cache: Arc<AnalysisCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build the engine
    pub fn build(self) -> LoraEngine {
        let config = self.config;
        let files = self.files.unwrap_or_else(|| {
            Arc::new(
                SearchPathResolver::new(config.search_roots.iter().cloned())
                    .with_extensions(config.extensions.iter().cloned()),
            )
        });
        let loader = self
            .loader
            .unwrap_or_else(|| Arc::new(SafetensorsLoader::new(config.loader.clone())));

        debug!(roots = config.search_roots.len(), "Built LoRA engine");

        LoraEngine {
            files,
            loader,
            cache: self.cache.unwrap_or_default(),
            inspector: LoraInspector::new(),
            config,
        }
    }
}
