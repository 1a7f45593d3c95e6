//! Per-block weighting
//!
//! Turns a preset into a block -> multiplier map and applies such a map to a
//! loaded tensor dictionary.

use crate::blocks::{block_info, layer_count};
use crate::loader::TensorDict;
use loraplan_core::{ArchitectureTag, BlockInfo, PresetId};
use std::collections::BTreeMap;
use tracing::debug;

/// Multipliers closer than this to 1.0 are left out of preset vectors
pub const NEUTRAL_TOLERANCE: f64 = 0.001;

/// Round to 4 decimal places
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Block multipliers a preset implies for the given blocks.
///
/// Each block's role comes from `metadata`, or from the block mapper when
/// unrecorded. Neutral multipliers are omitted; unknown presets yield an
/// empty map.
pub fn preset_vectors<'a>(
    arch: ArchitectureTag,
    preset: &PresetId,
    blocks: impl IntoIterator<Item = &'a str>,
    metadata: &BTreeMap<String, BlockInfo>,
) -> BTreeMap<String, f64> {
    let Some(strategy) = preset.strategy() else {
        return BTreeMap::new();
    };

    blocks
        .into_iter()
        .filter_map(|block_id| {
            let tag = match metadata.get(block_id) {
                Some(info) => info.tag,
                None => block_info(block_id, arch, 0).1,
            };
            let value = round4(strategy.weight(tag));
            ((value - 1.0).abs() > NEUTRAL_TOLERANCE).then(|| (block_id.to_string(), value))
        })
        .collect()
}

/// Scale every tensor by its block's multiplier (1.0 when unmapped).
///
/// No-op for an empty map.
pub fn apply_block_weights(
    tensors: &mut TensorDict,
    arch: ArchitectureTag,
    vectors: &BTreeMap<String, f64>,
) {
    if vectors.is_empty() {
        return;
    }

    let total_layers = layer_count(tensors.keys().map(String::as_str));
    let mut scaled = 0usize;
    for (key, tensor) in tensors.iter_mut() {
        let (block_id, _) = block_info(key, arch, total_layers);
        if let Some(&factor) = vectors.get(&block_id) {
            tensor.scale(factor as f32);
            scaled += 1;
        }
    }
    debug!(arch = %arch, blocks = vectors.len(), tensors = scaled, "Applied block weights");
}
