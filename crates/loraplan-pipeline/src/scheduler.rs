//! Schedule resolution
//!
//! Reconciles the three schedule sources (structured entries, DSL text and
//! a prior activation plan) into one [`Resolution`]:
//!
//! | entries | text | prior | mode |
//! |---|---|---|---|
//! | no  | yes | no  | [`ResolutionMode::ExternalText`] |
//! | no  | no  | yes | [`ResolutionMode::ExternalPrior`] |
//! | no  | yes | yes | [`ResolutionMode::Bridge`] |
//! | yes | yes | yes | [`ResolutionMode::Override`] |
//! | otherwise |  |  | [`ResolutionMode::Standard`] |

use crate::dsl;
use crate::lora::{ActivationPlan, Hook, Keyframe};
use loraplan_core::{ArchitectureTag, KeyPoint, ScheduleEntry, WeightStatistics};
use loraplan_lora::{
    apply_block_weights, preset_vectors, trigger_words, FileResolver, TensorLoader,
};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Offset of the zero-strength point inserted next to a curve's ends
pub const RAMP: f64 = 0.001;

/// How the schedule sources are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionMode {
    /// Structured entries drive the plan; a prior plan is prepended
    Standard,
    /// Structured entries drive the plan; text is kept as a prefix
    Override,
    /// Entries are parsed from the text
    ExternalText,
    /// The prior plan passes through
    ExternalPrior,
    /// Prior plan passes through; text is kept as a prefix
    Bridge,
}

impl ResolutionMode {
    /// Select the mode from which inputs are present
    pub fn select(has_entries: bool, has_text: bool, has_prior: bool) -> Self {
        match (has_entries, has_text, has_prior) {
            (false, true, false) => Self::ExternalText,
            (false, false, true) => Self::ExternalPrior,
            (false, true, true) => Self::Bridge,
            (true, true, true) => Self::Override,
            _ => Self::Standard,
        }
    }

    /// Input text is kept verbatim at the head of the output text
    pub fn keeps_text_prefix(&self) -> bool {
        matches!(self, Self::Override | Self::Bridge)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::Override => "OVERRIDE",
            Self::ExternalText => "EXTERNAL_TEXT",
            Self::ExternalPrior => "EXTERNAL_PRIOR",
            Self::Bridge => "BRIDGE",
        }
    }
}

impl fmt::Display for ResolutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one resolution
#[derive(Debug, Clone)]
pub struct Resolution {
    pub mode: ResolutionMode,
    /// Prior hooks first, then one hook per applied entry
    pub plan: ActivationPlan,
    /// Text prefix (if kept) followed by one canonical line per applied entry
    pub text: String,
    /// Sorted, deduplicated trigger words
    pub trigger_words: Vec<String>,
}

impl Resolution {
    /// Trigger words joined with `", "`
    pub fn trigger_text(&self) -> String {
        self.trigger_words.join(", ")
    }
}

/// Architecture and statistics lookups used during resolution
pub trait AnalysisSource: Send + Sync {
    fn architecture(&self, path: &Path) -> ArchitectureTag;

    fn statistics(&self, path: &Path, arch: ArchitectureTag) -> Option<Arc<WeightStatistics>>;
}

/// Pad a sorted curve so it starts at x=0 and ends at x=1.
///
/// A curve not flush with an end gets a zero-strength point at the end and
/// another [`RAMP`] away from its first/last point, giving a short linear
/// fade instead of a step.
pub fn pad_points(points: &[KeyPoint]) -> Vec<KeyPoint> {
    let Some((first, last)) = points.first().zip(points.last()) else {
        return Vec::new();
    };

    let mut padded = Vec::with_capacity(points.len() + 4);
    if first.x > 0.0 {
        padded.push(KeyPoint::new(0.0, 0.0));
        if first.x > RAMP {
            padded.push(KeyPoint::new((first.x - RAMP).max(0.0), 0.0));
        }
    }
    padded.extend_from_slice(points);
    if last.x < 1.0 {
        if last.x < 1.0 - RAMP {
            padded.push(KeyPoint::new((last.x + RAMP).min(1.0), 0.0));
        }
        padded.push(KeyPoint::new(1.0, 0.0));
    }
    padded
}

/// File stem of a LoRA name (`chars/ink.safetensors` -> `ink`)
fn display_name(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

/// Resolution state machine over injected collaborators
pub struct ScheduleResolver<'a> {
    files: &'a dyn FileResolver,
    loader: &'a dyn TensorLoader,
    analysis: &'a dyn AnalysisSource,
}

impl<'a> ScheduleResolver<'a> {
    pub fn new(
        files: &'a dyn FileResolver,
        loader: &'a dyn TensorLoader,
        analysis: &'a dyn AnalysisSource,
    ) -> Self {
        Self {
            files,
            loader,
            analysis,
        }
    }

    /// Resolve the schedule sources into one plan
    pub fn resolve(
        &self,
        entries: &[ScheduleEntry],
        text: Option<&str>,
        prior: Option<&ActivationPlan>,
    ) -> Resolution {
        let text = text.filter(|t| !t.trim().is_empty());
        let has_entries = entries.iter().any(|e| e.enabled);
        let mode = ResolutionMode::select(has_entries, text.is_some(), prior.is_some());

        let parsed;
        let active: &[ScheduleEntry] = match mode {
            ResolutionMode::Standard | ResolutionMode::Override => entries,
            ResolutionMode::ExternalText => {
                parsed = dsl::parse(text.unwrap_or_default());
                &parsed
            }
            ResolutionMode::ExternalPrior | ResolutionMode::Bridge => &[],
        };
        let prefix = text.filter(|_| mode.keeps_text_prefix());

        let mut triggers = BTreeSet::new();
        if let Some(prefix) = prefix {
            for item in dsl::parse(prefix) {
                if let Some(path) = self.files.resolve(&item.lora_name) {
                    triggers.extend(trigger_words(&path));
                }
            }
        }

        let mut hooks = Vec::new();
        let mut lines = Vec::new();
        for entry in active.iter().filter(|e| e.enabled) {
            if let Some((hook, line)) = self.apply_entry(entry, &mut triggers) {
                hooks.push(hook);
                lines.push(line);
            }
        }

        let plan = ActivationPlan::compose(prior, hooks);
        let text = [prefix.unwrap_or_default().to_string(), lines.join("\n")]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        info!(
            mode = %mode,
            hooks = plan.len(),
            lines = lines.len(),
            triggers = triggers.len(),
            "Resolved schedule"
        );

        Resolution {
            mode,
            plan,
            text,
            trigger_words: triggers.into_iter().collect(),
        }
    }

    /// Build the hook and canonical line for one entry, `None` when skipped
    fn apply_entry(
        &self,
        entry: &ScheduleEntry,
        triggers: &mut BTreeSet<String>,
    ) -> Option<(Hook, String)> {
        let Some(path) = self.files.resolve(&entry.lora_name) else {
            debug!(name = %entry.lora_name, "LoRA not found, skipping");
            return None;
        };

        triggers.extend(trigger_words(&path));

        let mut tensors = match self.loader.load(&path) {
            Ok(t) if !t.is_empty() => t,
            Ok(_) => {
                warn!(path = %path.display(), "LoRA holds no tensors, skipping");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load LoRA, skipping");
                return None;
            }
        };

        let arch = if entry.architecture.is_unknown() {
            self.analysis.architecture(&path)
        } else {
            entry.architecture
        };

        let mut vectors = entry.vectors.clone();
        if let Some(preset) = entry.preset.as_ref().filter(|p| !p.as_str().is_empty()) {
            if let Some(stats) = self.analysis.statistics(&path, arch) {
                let mut merged =
                    preset_vectors(arch, preset, stats.block_ids(), &stats.block_metadata);
                merged.extend(entry.vectors.iter().map(|(k, v)| (k.clone(), *v)));
                vectors = merged;
            }
        }

        apply_block_weights(&mut tensors, arch, &vectors);

        if entry.is_silent() {
            debug!(name = %entry.lora_name, "Zero strength, skipping");
            return None;
        }

        let mut points = entry.points.clone();
        points.sort_by(|a, b| a.x.total_cmp(&b.x));
        let points = pad_points(&points);

        let hook = Hook::new(
            entry.lora_name.clone(),
            Arc::new(tensors),
            entry.strength_model,
            entry.strength_clip,
        )
        .with_keyframes(points.iter().copied().map(Keyframe::from));

        let rendered = ScheduleEntry {
            lora_name: display_name(&entry.lora_name),
            points,
            architecture: arch,
            vectors,
            ..entry.clone()
        };

        debug!(name = %entry.lora_name, arch = %arch, "Applied schedule entry");
        Some((hook, dsl::serialize_entry(&rendered)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_lora;
    use loraplan_lora::{SafetensorsLoader, SearchPathResolver};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Fixed architecture, statistics computed on demand, calls counted
    struct FixedAnalysis {
        arch: ArchitectureTag,
        stats: Option<WeightStatistics>,
        calls: Mutex<Vec<PathBuf>>,
    }

    impl FixedAnalysis {
        fn new(arch: ArchitectureTag) -> Self {
            Self {
                arch,
                stats: None,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl AnalysisSource for FixedAnalysis {
        fn architecture(&self, path: &Path) -> ArchitectureTag {
            self.calls.lock().unwrap().push(path.to_path_buf());
            self.arch
        }

        fn statistics(
            &self,
            _path: &Path,
            _arch: ArchitectureTag,
        ) -> Option<Arc<WeightStatistics>> {
            self.stats.clone().map(Arc::new)
        }
    }

    struct Fixture {
        _dir: TempDir,
        files: SearchPathResolver,
        loader: SafetensorsLoader,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        write_lora(
            &dir.path().join("a.safetensors"),
            &[
                ("input_blocks.1.lora_up.weight", vec![1.0, 2.0]),
                ("output_blocks.8.lora_up.weight", vec![1.0]),
            ],
        );
        write_lora(
            &dir.path().join("b.safetensors"),
            &[("input_blocks.2.lora_up.weight", vec![4.0])],
        );
        std::fs::write(
            dir.path().join("a.json"),
            r#"{"trainedWords": ["zeta", "alpha"]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("b.metadata.json"),
            r#"{"civitai": {"trainedWords": ["alpha", "beta"]}}"#,
        )
        .unwrap();

        Fixture {
            files: SearchPathResolver::new([dir.path().to_path_buf()]),
            loader: SafetensorsLoader::default(),
            _dir: dir,
        }
    }

    fn prior_plan() -> ActivationPlan {
        ActivationPlan::from_hooks(vec![Hook::new("prior", Arc::new(Default::default()), 1.0, 1.0)])
    }

    #[test]
    fn test_mode_table() {
        use ResolutionMode::*;
        assert_eq!(ResolutionMode::select(false, true, false), ExternalText);
        assert_eq!(ResolutionMode::select(false, false, true), ExternalPrior);
        assert_eq!(ResolutionMode::select(false, true, true), Bridge);
        assert_eq!(ResolutionMode::select(true, true, true), Override);
        assert_eq!(ResolutionMode::select(true, true, false), Standard);
        assert_eq!(ResolutionMode::select(true, false, true), Standard);
        assert_eq!(ResolutionMode::select(true, false, false), Standard);
        assert_eq!(ResolutionMode::select(false, false, false), Standard);
    }

    #[test]
    fn test_pad_points() {
        assert!(pad_points(&[]).is_empty());

        let flush = [KeyPoint::new(0.0, 1.0), KeyPoint::new(1.0, 1.0)];
        assert_eq!(pad_points(&flush), flush.to_vec());

        let inner = [KeyPoint::new(0.2, 1.0), KeyPoint::new(0.6, 0.5)];
        let padded = pad_points(&inner);
        assert_eq!(padded.len(), 6);
        assert_eq!(padded[0], KeyPoint::new(0.0, 0.0));
        assert!((padded[1].x - 0.199).abs() < 1e-12 && padded[1].y == 0.0);
        assert!((padded[4].x - 0.601).abs() < 1e-12 && padded[4].y == 0.0);
        assert_eq!(padded[5], KeyPoint::new(1.0, 0.0));

        // Within one ramp of an end: no extra ramp point
        let near = [KeyPoint::new(0.0005, 1.0), KeyPoint::new(0.9995, 1.0)];
        let padded = pad_points(&near);
        assert_eq!(padded.len(), 4);
        assert_eq!(padded[0], KeyPoint::new(0.0, 0.0));
        assert_eq!(padded[3], KeyPoint::new(1.0, 0.0));
    }

    #[test]
    fn test_external_text() {
        let fx = fixture();
        let analysis = FixedAnalysis::new(ArchitectureTag::Sdxl);
        let resolver = ScheduleResolver::new(&fx.files, &fx.loader, &analysis);

        let res = resolver.resolve(&[], Some("<lora:a:0.5:1:0.25,1>\n<lora:missing:1:1>"), None);
        assert_eq!(res.mode, ResolutionMode::ExternalText);
        assert_eq!(res.plan.len(), 1);

        let hook = &res.plan.hooks()[0];
        assert_eq!(hook.strength_model, 0.5);
        assert_eq!(hook.keyframes.len(), 5);
        assert_eq!(res.text, "<lora:a:0.5:1:0,0;0.249,0;0.25,1;0.251,0;1,0>");
        assert_eq!(res.trigger_words, vec!["alpha".to_string(), "zeta".to_string()]);
        assert_eq!(res.trigger_text(), "alpha, zeta");
        assert_eq!(analysis.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_bridge() {
        let fx = fixture();
        let analysis = FixedAnalysis::new(ArchitectureTag::Sdxl);
        let resolver = ScheduleResolver::new(&fx.files, &fx.loader, &analysis);
        let prior = prior_plan();

        let res = resolver.resolve(&[], Some("<lora:a:1:1>"), Some(&prior));
        assert_eq!(res.mode, ResolutionMode::Bridge);
        assert!(res.text.starts_with("<lora:a:1:1>"));
        assert_eq!(res.text, "<lora:a:1:1>");
        assert_eq!(res.plan.len(), 1);
        assert_eq!(res.plan.hooks()[0].name, "prior");
        assert_eq!(res.trigger_words, vec!["alpha".to_string(), "zeta".to_string()]);
        assert!(analysis.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_override() {
        let fx = fixture();
        let analysis = FixedAnalysis::new(ArchitectureTag::Sdxl);
        let resolver = ScheduleResolver::new(&fx.files, &fx.loader, &analysis);
        let prior = prior_plan();
        let entries = vec![ScheduleEntry::new("b").with_architecture(ArchitectureTag::Sdxl)];

        let res = resolver.resolve(&entries, Some("<lora:a:1:1>"), Some(&prior));
        assert_eq!(res.mode, ResolutionMode::Override);
        let names: Vec<&str> = res.plan.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["prior", "b"]);
        assert_eq!(res.text, "<lora:a:1:1>\n<lora:b:1:1:0,1;1,1>");
        assert_eq!(
            res.trigger_words,
            vec!["alpha".to_string(), "beta".to_string(), "zeta".to_string()]
        );
        // Known architecture: no classification needed
        assert!(analysis.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_standard_ignores_text_without_prior() {
        let fx = fixture();
        let analysis = FixedAnalysis::new(ArchitectureTag::Sdxl);
        let resolver = ScheduleResolver::new(&fx.files, &fx.loader, &analysis);
        let entries = vec![ScheduleEntry::new("b.safetensors")];

        let res = resolver.resolve(&entries, Some("<lora:a:1:1>"), None);
        assert_eq!(res.mode, ResolutionMode::Standard);
        assert_eq!(res.text, "<lora:b:1:1:0,1;1,1>");
        assert_eq!(res.trigger_words, vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[test]
    fn test_external_prior_passes_through() {
        let fx = fixture();
        let analysis = FixedAnalysis::new(ArchitectureTag::Sdxl);
        let resolver = ScheduleResolver::new(&fx.files, &fx.loader, &analysis);
        let prior = prior_plan();

        let res = resolver.resolve(&[], Some("   "), Some(&prior));
        assert_eq!(res.mode, ResolutionMode::ExternalPrior);
        assert_eq!(res.plan.len(), 1);
        assert!(res.text.is_empty());
        assert!(res.trigger_words.is_empty());
    }

    #[test]
    fn test_zero_strength_entries_excluded() {
        let fx = fixture();
        let analysis = FixedAnalysis::new(ArchitectureTag::Sdxl);
        let resolver = ScheduleResolver::new(&fx.files, &fx.loader, &analysis);
        let entries = vec![
            ScheduleEntry::new("a").with_strengths(0.0, 0.0),
            ScheduleEntry::new("b").with_strengths(1e-7, -1e-7),
        ];

        let res = resolver.resolve(&entries, None, None);
        assert!(res.plan.is_empty());
        assert!(res.text.is_empty());
    }

    #[test]
    fn test_disabled_entries_skipped() {
        let fx = fixture();
        let analysis = FixedAnalysis::new(ArchitectureTag::Sdxl);
        let resolver = ScheduleResolver::new(&fx.files, &fx.loader, &analysis);
        let entries = vec![ScheduleEntry::new("a").disabled(), ScheduleEntry::new("b")];

        let res = resolver.resolve(&entries, None, None);
        assert_eq!(res.plan.len(), 1);
        assert_eq!(res.plan.hooks()[0].name, "b");
    }

    #[test]
    fn test_only_disabled_entries_count_as_absent() {
        let fx = fixture();
        let analysis = FixedAnalysis::new(ArchitectureTag::Sdxl);
        let resolver = ScheduleResolver::new(&fx.files, &fx.loader, &analysis);
        let entries = vec![ScheduleEntry::new("a").disabled()];

        let res = resolver.resolve(&entries, Some("<lora:b:1:1>"), None);
        assert_eq!(res.mode, ResolutionMode::ExternalText);
        assert_eq!(res.plan.len(), 1);
        assert_eq!(res.plan.hooks()[0].name, "b");
        assert_eq!(res.text, "<lora:b:1:1:0,1;1,1>");
    }

    #[test]
    fn test_preset_vectors_with_overrides() {
        let fx = fixture();
        let mut analysis = FixedAnalysis::new(ArchitectureTag::Sdxl);
        analysis.stats = Some(loraplan_lora::stats::statistics_from_norms(
            &[
                ("input_blocks.1.lora_up.weight".to_string(), 1.0),
                ("output_blocks.8.lora_up.weight".to_string(), 1.0),
            ],
            ArchitectureTag::Sdxl,
        ));
        let resolver = ScheduleResolver::new(&fx.files, &fx.loader, &analysis);
        let entries = vec![ScheduleEntry::new("a")
            .with_preset("STYLE_FOCUSED")
            .with_vector("output_8", 2.0)];

        let res = resolver.resolve(&entries, None, None);
        let hook = &res.plan.hooks()[0];
        // input_1: POSE 0.6; output_8: explicit 2.0 over DETAILS 1.6
        assert_eq!(hook.tensors["input_blocks.1.lora_up.weight"].values, vec![0.6, 1.2]);
        assert_eq!(hook.tensors["output_blocks.8.lora_up.weight"].values, vec![2.0]);
        assert_eq!(res.text, "<lora:a:1:1:0,1;1,1:preset=STYLE_FOCUSED>");
    }

    #[test]
    fn test_custom_preset_renders_vectors() {
        let fx = fixture();
        let analysis = FixedAnalysis::new(ArchitectureTag::Sdxl);
        let resolver = ScheduleResolver::new(&fx.files, &fx.loader, &analysis);
        let entries = vec![ScheduleEntry::new("a")
            .with_preset("CUSTOM")
            .with_vector("input_1", 0.5)];

        let res = resolver.resolve(&entries, None, None);
        assert_eq!(res.text, "<lora:a:1:1:0,1;1,1:vectors=input_1=0.5>");
        assert_eq!(
            res.plan.hooks()[0].tensors["input_blocks.1.lora_up.weight"].values,
            vec![0.5, 1.0]
        );
    }
}
