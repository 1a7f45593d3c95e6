//! Tensor key -> block mapping
//!
//! Maps a raw tensor key to a standardized block id and a semantic role.
//! Pure and deterministic; matching is case-insensitive.
//!
//! Rules, first match wins:
//!
//! 1. text-encoder keys -> `clip_layer_<n>` / `clip_encoder`, CLIP
//! 2. time/label/guidance embeddings and final projections -> `specialized_embeds`, OTHER
//! 3. the family's own block naming (UNet input/middle/output, FLUX
//!    double/single, SD3 joint)
//! 4. any numbered `layers`/`blocks`/`h` key -> `layers_<n>`, role by the
//!    index's position within the file's layer count
//! 5. `misc`, OTHER

use loraplan_core::{ArchitectureTag, BlockGroup, BlockLayout, SemanticTag};
use once_cell::sync::Lazy;
use regex::Regex;

/// Layer count assumed when the caller has none
pub const DEFAULT_LAYER_COUNT: usize = 28;

const CLIP_MARKERS: [&str; 9] = [
    "te_",
    "text_model",
    "text_encoder",
    "clip_l",
    "clip_g",
    "t5",
    "encoder",
    "txt_proj",
    "logit_scale",
];

const SPECIALIZED_MARKERS: [&str; 8] = [
    "time_embed",
    "label_embed",
    "vector_in",
    "img_in",
    "guidance_in",
    "final_layer",
    "norm_out",
    "proj_out",
];

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static block pattern must compile")
}

static CLIP_LAYER: Lazy<Regex> = Lazy::new(|| regex(r"layers?[._](\d+)"));
static INPUT_BLOCK: Lazy<Regex> = Lazy::new(|| regex(r"input_blocks[._](\d+)"));
static OUTPUT_BLOCK: Lazy<Regex> = Lazy::new(|| regex(r"output_blocks[._](\d+)"));
static DOUBLE_BLOCK: Lazy<Regex> = Lazy::new(|| regex(r"double_blocks[._](\d+)"));
static SINGLE_BLOCK: Lazy<Regex> = Lazy::new(|| regex(r"single_blocks[._](\d+)"));
static JOINT_BLOCK: Lazy<Regex> = Lazy::new(|| regex(r"joint_blocks[._](\d+)"));
static LAYER_INDEX: Lazy<Regex> = Lazy::new(|| regex(r"(?i)(?:layers|blocks|h)[._](\d+)"));

static GROUP_PATTERNS: Lazy<Vec<(BlockGroup, Vec<Regex>)>> = Lazy::new(|| {
    BlockGroup::ORDERED
        .iter()
        .map(|g| {
            let patterns = g.patterns().iter().map(|p| regex(&format!("(?i){p}"))).collect();
            (*g, patterns)
        })
        .collect()
});

/// First captured index of `re` in `key`, 0 when absent
fn index_of(re: &Regex, key: &str) -> usize {
    re.captures(key)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Map a tensor key to `(block_id, role)`.
///
/// `total_layers` is the file-relative layer count (see [`layer_count`]);
/// zero means unknown and falls back to [`DEFAULT_LAYER_COUNT`].
pub fn block_info(key: &str, arch: ArchitectureTag, total_layers: usize) -> (String, SemanticTag) {
    let k = key.to_lowercase();

    if CLIP_MARKERS.iter().any(|m| k.contains(m)) {
        let name = match CLIP_LAYER.captures(&k).and_then(|c| c.get(1)) {
            Some(idx) => format!("clip_layer_{}", idx.as_str()),
            None => "clip_encoder".to_string(),
        };
        return (name, SemanticTag::Clip);
    }

    if SPECIALIZED_MARKERS.iter().any(|m| k.contains(m)) {
        return ("specialized_embeds".to_string(), SemanticTag::Other);
    }

    let family_match = match arch.block_layout() {
        BlockLayout::SdxlUnet => sdxl_unet(&k),
        BlockLayout::FluxStream => flux_stream(&k),
        BlockLayout::LegacyUnet => legacy_unet(&k),
        BlockLayout::JointBlocks => joint_blocks(&k),
        BlockLayout::NumberedLayers => None,
    };
    if let Some(hit) = family_match {
        return hit;
    }

    if let Some(idx) = LAYER_INDEX
        .captures(&k)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
    {
        let limit = if total_layers > 0 {
            total_layers
        } else {
            DEFAULT_LAYER_COUNT
        };
        let ratio = idx as f64 / limit as f64;
        let tag = if ratio < 0.30 {
            SemanticTag::Pose
        } else if ratio < 0.60 {
            SemanticTag::Identity
        } else if ratio < 0.80 {
            SemanticTag::Style
        } else {
            SemanticTag::Details
        };
        return (format!("layers_{idx}"), tag);
    }

    ("misc".to_string(), SemanticTag::Other)
}

fn sdxl_unet(k: &str) -> Option<(String, SemanticTag)> {
    if k.contains("input_block") {
        let idx = index_of(&INPUT_BLOCK, k);
        return Some((format!("input_{idx}"), SemanticTag::Pose));
    }
    if k.contains("middle_block") {
        return Some(("middle_0".to_string(), SemanticTag::Identity));
    }
    if k.contains("output_block") {
        let idx = index_of(&OUTPUT_BLOCK, k);
        let tag = match idx {
            0..=2 => SemanticTag::Identity,
            3..=5 => SemanticTag::Style,
            _ => SemanticTag::Details,
        };
        return Some((format!("output_{idx}"), tag));
    }
    None
}

fn legacy_unet(k: &str) -> Option<(String, SemanticTag)> {
    if k.contains("input_block") {
        let idx = index_of(&INPUT_BLOCK, k);
        let tag = if idx <= 8 {
            SemanticTag::Pose
        } else {
            SemanticTag::Identity
        };
        return Some((format!("input_{idx}"), tag));
    }
    if k.contains("middle_block") {
        return Some(("middle_0".to_string(), SemanticTag::Identity));
    }
    if k.contains("output_block") {
        let idx = index_of(&OUTPUT_BLOCK, k);
        let tag = match idx {
            0..=2 => SemanticTag::Identity,
            3..=8 => SemanticTag::Style,
            _ => SemanticTag::Details,
        };
        return Some((format!("output_{idx}"), tag));
    }
    None
}

fn flux_stream(k: &str) -> Option<(String, SemanticTag)> {
    if k.contains("double_block") {
        let idx = index_of(&DOUBLE_BLOCK, k);
        let tag = if idx <= 10 {
            SemanticTag::Pose
        } else {
            SemanticTag::Identity
        };
        return Some((format!("double_{idx}"), tag));
    }
    if k.contains("single_block") {
        let idx = index_of(&SINGLE_BLOCK, k);
        let tag = if idx <= 20 {
            SemanticTag::Style
        } else {
            SemanticTag::Details
        };
        return Some((format!("single_{idx}"), tag));
    }
    None
}

fn joint_blocks(k: &str) -> Option<(String, SemanticTag)> {
    if !k.contains("joint_block") {
        return None;
    }
    let idx = index_of(&JOINT_BLOCK, k);
    let tag = match idx {
        0..=5 => SemanticTag::Pose,
        6..=11 => SemanticTag::Identity,
        12..=17 => SemanticTag::Style,
        _ => SemanticTag::Details,
    };
    Some((format!("joint_{idx}"), tag))
}

/// UI group of a block id; unmatched ids land in [`BlockGroup::Aux`]
pub fn block_group(block_id: &str) -> BlockGroup {
    GROUP_PATTERNS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| p.is_match(block_id)))
        .map(|(group, _)| *group)
        .unwrap_or(BlockGroup::Aux)
}

/// File-relative layer count: highest numbered layer/block index + 1
pub fn layer_count<'a>(keys: impl IntoIterator<Item = &'a str>) -> usize {
    keys.into_iter()
        .filter_map(|k| {
            LAYER_INDEX
                .captures(k)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<usize>().ok())
        })
        .max()
        .unwrap_or(0)
        + 1
}
