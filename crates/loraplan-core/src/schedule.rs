//! Schedule entries
//!
//! A schedule entry describes one LoRA activation: which file, at what
//! strength, over which part of the sampling process, with which per-block
//! multipliers. Entries come from a structured JSON config or from the
//! schedule DSL; both normalize to this type.

use crate::architecture::ArchitectureTag;
use crate::preset::PresetId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One keyframe of a strength curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyPoint {
    /// Fraction of the sampling process, 0..=1
    pub x: f64,
    /// Strength multiplier at `x`
    pub y: f64,
}

impl KeyPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Constant full-strength curve used when an entry gives no points
pub const FLAT_CURVE: [KeyPoint; 2] = [KeyPoint::new(0.0, 1.0), KeyPoint::new(1.0, 1.0)];

fn default_strength() -> f64 {
    1.0
}

fn default_enabled() -> bool {
    true
}

/// One scheduled LoRA activation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub lora_name: String,
    #[serde(default = "default_strength")]
    pub strength_model: f64,
    #[serde(default = "default_strength")]
    pub strength_clip: f64,
    /// Strength curve, ascending by `x`
    #[serde(default)]
    pub points: Vec<KeyPoint>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, rename = "arch")]
    pub architecture: ArchitectureTag,
    /// Block id -> multiplier
    #[serde(default)]
    pub vectors: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<PresetId>,
}

impl ScheduleEntry {
    /// Entry at full strength with no curve, vectors or preset
    pub fn new(lora_name: impl Into<String>) -> Self {
        Self {
            lora_name: lora_name.into(),
            strength_model: 1.0,
            strength_clip: 1.0,
            points: Vec::new(),
            enabled: true,
            architecture: ArchitectureTag::Unknown,
            vectors: BTreeMap::new(),
            preset: None,
        }
    }

    /// Set both strengths
    pub fn with_strengths(mut self, model: f64, clip: f64) -> Self {
        self.strength_model = model;
        self.strength_clip = clip;
        self
    }

    /// Set the curve (sorted by `x`)
    pub fn with_points(mut self, points: impl IntoIterator<Item = KeyPoint>) -> Self {
        self.points = points.into_iter().collect();
        self.sort_points();
        self
    }

    /// Set a block multiplier
    pub fn with_vector(mut self, block_id: impl Into<String>, value: f64) -> Self {
        self.vectors.insert(block_id.into(), value);
        self
    }

    /// Set the preset
    pub fn with_preset(mut self, preset: impl Into<PresetId>) -> Self {
        self.preset = Some(preset.into());
        self
    }

    /// Set the architecture
    pub fn with_architecture(mut self, architecture: ArchitectureTag) -> Self {
        self.architecture = architecture;
        self
    }

    /// Disable the entry
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Stable ascending sort by `x`
    pub fn sort_points(&mut self) {
        self.points.sort_by(|a, b| a.x.total_cmp(&b.x));
    }

    /// A preset that should be rendered by name rather than as vectors
    pub fn active_preset(&self) -> Option<&PresetId> {
        self.preset
            .as_ref()
            .filter(|p| !p.as_str().is_empty() && !p.is_custom())
    }

    /// Both strengths within 1e-6 of zero
    pub fn is_silent(&self) -> bool {
        self.strength_model.abs() < 1e-6 && self.strength_clip.abs() < 1e-6
    }
}
