//! Block-weight presets
//!
//! A preset is a multiplier per [`SemanticTag`]. Resolved against a file's
//! block metadata it yields a per-block multiplier map.

use crate::semantic::SemanticTag;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Id reserved for hand-edited block weights
pub const CUSTOM_PRESET: &str = "CUSTOM";

/// Named preset reference
///
/// Kept as free text so ids unknown to this build survive a parse/serialize
/// round trip; they simply resolve to no strategy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresetId(String);

impl PresetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hand-edited weights, rendered as explicit vectors
    pub fn is_custom(&self) -> bool {
        self.0 == CUSTOM_PRESET
    }

    /// Catalog entry for this id, if any
    pub fn strategy(&self) -> Option<&'static PresetStrategy> {
        PresetStrategy::lookup(&self.0)
    }
}

impl fmt::Display for PresetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PresetId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PresetId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Static preset definition
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PresetStrategy {
    pub id: &'static str,
    pub label: &'static str,
    pub desc: &'static str,
    /// Multipliers in [`SemanticTag::ALL`] order
    #[serde(skip)]
    weights: [f64; 6],
}

impl PresetStrategy {
    const fn new(
        id: &'static str,
        label: &'static str,
        desc: &'static str,
        weights: [f64; 6],
    ) -> Self {
        Self {
            id,
            label,
            desc,
            weights,
        }
    }

    /// Full catalog
    pub fn catalog() -> &'static [PresetStrategy] {
        &CATALOG
    }

    pub fn lookup(id: &str) -> Option<&'static PresetStrategy> {
        CATALOG.iter().find(|s| s.id == id)
    }

    /// Multiplier for a role
    pub fn weight(&self, tag: SemanticTag) -> f64 {
        let idx = SemanticTag::ALL
            .iter()
            .position(|t| *t == tag)
            .unwrap_or(SemanticTag::ALL.len() - 1);
        self.weights[idx]
    }

    /// (role, multiplier) pairs
    pub fn weights(&self) -> impl Iterator<Item = (SemanticTag, f64)> + '_ {
        SemanticTag::ALL.iter().copied().zip(self.weights.iter().copied())
    }
}

//                                   POSE  IDENT STYLE DETAIL CLIP OTHER
static CATALOG: [PresetStrategy; 5] = [
    PresetStrategy::new(
        "LINEAR",
        "Linear (Default)",
        "No modification. All blocks set to 1.0.",
        [1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
    ),
    PresetStrategy::new(
        "STYLE_FOCUSED",
        "Style Focused",
        "Reduces structural influence to let the LoRA's style bleed through.",
        [0.6, 1.0, 1.4, 1.6, 1.0, 1.0],
    ),
    PresetStrategy::new(
        "BALANCED",
        "Balanced Distribution",
        "Slight boost to style and details while keeping structure firm.",
        [0.9, 1.1, 1.1, 1.2, 1.0, 1.0],
    ),
    PresetStrategy::new(
        "HEAVY_STYLE",
        "Heavy Style Transfer",
        "Aggressive style transfer. May break anatomy.",
        [0.4, 1.2, 1.6, 1.8, 1.0, 1.0],
    ),
    PresetStrategy::new(
        "REALISM",
        "Realism Tweak",
        "Subtle boost to texture and lighting blocks.",
        [1.0, 1.0, 1.05, 1.1, 1.0, 1.0],
    ),
];
