//! Model architecture families
//!
//! Every LoRA targets one base-model family. The family decides how tensor
//! keys map onto blocks, so it is modeled as a closed enum: adding a family
//! is a compile-time checked change in every `match` that depends on it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Architecture family of a parameter-delta file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ArchitectureTag {
    /// FLUX.1 (double/single stream transformer)
    Flux1,
    /// FLUX.2
    Flux2,
    /// Stable Diffusion 1.x
    Sd15,
    /// Stable Diffusion 2.x
    Sd21,
    /// Stable Diffusion 3 (MMDiT joint blocks)
    Sd3,
    /// Generic SDXL
    Sdxl,
    /// SDXL lineage: Pony
    SdxlPony,
    /// SDXL lineage: Illustrious
    SdxlIllustrious,
    /// SDXL lineage: NoobAI
    SdxlNoobai,
    /// SDXL lineage: photoreal checkpoints
    SdxlRealism,
    /// Qwen image transformer
    Qwen,
    /// AuraFlow
    Aura,
    /// Lumina
    Lumina,
    /// Hunyuan video
    Hyvid,
    /// Chroma
    Chroma,
    /// HiDream
    Hidream,
    /// Z-Image Turbo
    ZimageTurbo,
    /// Not determined
    #[default]
    Unknown,
}

/// Block-layout family used by the block mapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockLayout {
    /// SDXL UNet (input / middle / output blocks)
    SdxlUnet,
    /// SD 1.x / 2.x UNet
    LegacyUnet,
    /// FLUX double / single stream blocks
    FluxStream,
    /// SD3 joint blocks
    JointBlocks,
    /// Plain numbered transformer layers
    NumberedLayers,
}

impl ArchitectureTag {
    /// All tags, in declaration order
    pub const ALL: [ArchitectureTag; 18] = [
        Self::Flux1,
        Self::Flux2,
        Self::Sd15,
        Self::Sd21,
        Self::Sd3,
        Self::Sdxl,
        Self::SdxlPony,
        Self::SdxlIllustrious,
        Self::SdxlNoobai,
        Self::SdxlRealism,
        Self::Qwen,
        Self::Aura,
        Self::Lumina,
        Self::Hyvid,
        Self::Chroma,
        Self::Hidream,
        Self::ZimageTurbo,
        Self::Unknown,
    ];

    /// Canonical tag name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flux1 => "FLUX.1",
            Self::Flux2 => "FLUX.2",
            Self::Sd15 => "SD15",
            Self::Sd21 => "SD21",
            Self::Sd3 => "SD3",
            Self::Sdxl => "SDXL",
            Self::SdxlPony => "SDXL_PONY",
            Self::SdxlIllustrious => "SDXL_ILLUSTRIOUS",
            Self::SdxlNoobai => "SDXL_NOOBAI",
            Self::SdxlRealism => "SDXL_REALISM",
            Self::Qwen => "QWEN",
            Self::Aura => "AURA",
            Self::Lumina => "LUMINA",
            Self::Hyvid => "HYVID",
            Self::Chroma => "CHROMA",
            Self::Hidream => "HIDREAM",
            Self::ZimageTurbo => "ZIMAGETURBO",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Which block layout the mapper should assume for this family.
    ///
    /// `Unknown` is treated as SDXL: most unlabeled community LoRAs are.
    pub fn block_layout(&self) -> BlockLayout {
        match self {
            Self::Sdxl
            | Self::SdxlPony
            | Self::SdxlIllustrious
            | Self::SdxlNoobai
            | Self::SdxlRealism
            | Self::Unknown => BlockLayout::SdxlUnet,
            Self::Flux1 | Self::Flux2 => BlockLayout::FluxStream,
            Self::Sd15 | Self::Sd21 => BlockLayout::LegacyUnet,
            Self::Sd3 => BlockLayout::JointBlocks,
            Self::Qwen
            | Self::Aura
            | Self::Lumina
            | Self::Hyvid
            | Self::Chroma
            | Self::Hidream
            | Self::ZimageTurbo => BlockLayout::NumberedLayers,
        }
    }

    /// SDXL or one of its lineage sub-tags
    pub fn is_sdxl_family(&self) -> bool {
        matches!(
            self,
            Self::Sdxl
                | Self::SdxlPony
                | Self::SdxlIllustrious
                | Self::SdxlNoobai
                | Self::SdxlRealism
        )
    }

    /// The bare SDXL tag, superseded by any more specific keyword match
    pub fn is_generic(&self) -> bool {
        matches!(self, Self::Sdxl)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Map free text (a base-model name, a tag, a version string) to a family.
    ///
    /// Case-insensitive substring match against a fixed priority list; the
    /// first matching rule wins.
    pub fn from_keyword(text: &str) -> Option<Self> {
        let t = text.to_lowercase();
        let has = |needle: &str| t.contains(needle);

        if has("flux.1") {
            return Some(Self::Flux1);
        }
        if has("flux.2") {
            return Some(Self::Flux2);
        }
        if has("flux") {
            return Some(Self::Flux1);
        }
        if has("zimageturbo") || has("z_image_turbo") {
            return Some(Self::ZimageTurbo);
        }
        if has("lumina") {
            return Some(Self::Lumina);
        }
        if has("hidream") {
            return Some(Self::Hidream);
        }
        if has("chroma") {
            return Some(Self::Chroma);
        }
        if has("qwen") {
            return Some(Self::Qwen);
        }
        if has("aura") {
            return Some(Self::Aura);
        }
        if has("hyvid") || has("hunyuan") {
            return Some(Self::Hyvid);
        }
        if has("pony") {
            return Some(Self::SdxlPony);
        }
        if has("illustrious") {
            return Some(Self::SdxlIllustrious);
        }
        if has("noob") {
            return Some(Self::SdxlNoobai);
        }
        if has("realism") || has("realvis") {
            return Some(Self::SdxlRealism);
        }
        if has("xl") {
            return Some(Self::Sdxl);
        }
        if has("v1") || has("1.5") || has("sd15") {
            return Some(Self::Sd15);
        }
        if has("v2") || has("2.1") {
            return Some(Self::Sd21);
        }
        if has("sd3") {
            return Some(Self::Sd3);
        }
        None
    }
}

impl fmt::Display for ArchitectureTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a canonical tag name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTagError(pub String);

impl fmt::Display for UnknownTagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown architecture tag: {}", self.0)
    }
}

impl std::error::Error for UnknownTagError {}

impl FromStr for ArchitectureTag {
    type Err = UnknownTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|tag| tag.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownTagError(s.to_string()))
    }
}

// Structured schedules come from a UI; unrecognized names degrade to Unknown.
impl From<String> for ArchitectureTag {
    fn from(value: String) -> Self {
        value.parse().unwrap_or(Self::Unknown)
    }
}

impl From<ArchitectureTag> for String {
    fn from(value: ArchitectureTag) -> Self {
        value.as_str().to_string()
    }
}
