//! Architecture-independent block roles
//!
//! Every block of every family is assigned a coarse semantic role. Presets
//! are expressed against these roles, so one preset works across families.
//!
//! Blocks are also sorted into UI groups ([`BlockGroup`]), which are purely a
//! presentation concern and independent from the semantic role.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse role of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SemanticTag {
    /// Composition and structure
    Pose,
    /// Subject likeness and concept
    Identity,
    /// Lighting and artistic style
    Style,
    /// Fine texture
    Details,
    /// Text encoder
    Clip,
    /// Embeddings and everything unclassified
    Other,
}

impl SemanticTag {
    pub const ALL: [SemanticTag; 6] = [
        Self::Pose,
        Self::Identity,
        Self::Style,
        Self::Details,
        Self::Clip,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pose => "POSE",
            Self::Identity => "IDENTITY",
            Self::Style => "STYLE",
            Self::Details => "DETAILS",
            Self::Clip => "CLIP",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for SemanticTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// UI grouping of block ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockGroup {
    Clip,
    Input,
    Middle,
    Output,
    Layers,
    Aux,
}

impl BlockGroup {
    /// Groups in matching order; the first group whose pattern matches wins.
    pub const ORDERED: [BlockGroup; 6] = [
        Self::Clip,
        Self::Input,
        Self::Middle,
        Self::Output,
        Self::Layers,
        Self::Aux,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Self::Clip => "clip",
            Self::Input => "input",
            Self::Middle => "middle",
            Self::Output => "output",
            Self::Layers => "layers",
            Self::Aux => "aux",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Clip => "Text Encoder / CLIP",
            Self::Input => "Structure / Input",
            Self::Middle => "Concept / Middle",
            Self::Output => "Style / Output",
            Self::Layers => "Transformer Layers",
            Self::Aux => "Embeddings / Aux",
        }
    }

    /// Case-insensitive regex patterns tested against a block id
    pub fn patterns(&self) -> &'static [&'static str] {
        match self {
            Self::Clip => &["^clip", "^te_", "^text_"],
            Self::Input => &["input", "down", "double"],
            Self::Middle => &["middle", "mid", "joint"],
            Self::Output => &["output", "up", "single"],
            Self::Layers => &["^layers"],
            Self::Aux => &[".*"],
        }
    }

    /// UI toggles offered for the group
    pub fn toggles(&self) -> &'static [&'static str] {
        match self {
            Self::Clip => &["split_mode"],
            _ => &[],
        }
    }
}
