//! Weight statistics
//!
//! One scan over a file's tensors produces a per-block energy map (sum of
//! tensor norms), a Gini sparsity and an energy-weighted balance.

use crate::blocks::{block_group, block_info, layer_count};
use crate::loader::TensorLoader;
use loraplan_core::{ArchitectureTag, BLOCK_ORDER, BlockInfo, WeightStatistics};
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, error};

/// Norm credited to scalars and tensors that fail to decode
pub const NOMINAL_NORM: f64 = 0.01;

static FIRST_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+").expect("static number pattern must compile"));

/// Scan a file and summarize its weight energy.
///
/// Returns `None` (after logging) when the file cannot be loaded at all.
pub fn compute_stats(
    path: &Path,
    arch: ArchitectureTag,
    loader: &dyn TensorLoader,
) -> Option<WeightStatistics> {
    let mut norms: Vec<(String, f64)> = Vec::new();

    let scan = loader.visit(path, &mut |name, tensor| {
        let norm = match tensor {
            Ok(t) if t.rank() >= 1 => t.norm(),
            Ok(_) => NOMINAL_NORM,
            Err(e) => {
                debug!(tensor = name, error = %e, "Using nominal norm");
                NOMINAL_NORM
            }
        };
        norms.push((name.to_string(), norm));
    });

    if let Err(e) = scan {
        error!(path = %path.display(), error = %e, "Analysis failed");
        return None;
    }

    let stats = statistics_from_norms(&norms, arch);
    debug!(
        path = %path.display(),
        arch = %arch,
        blocks = stats.block_count(),
        sparsity = stats.sparsity,
        balance = stats.balance,
        "Computed weight statistics"
    );
    Some(stats)
}

/// Build statistics from `(tensor key, norm)` pairs in scan order
pub fn statistics_from_norms(norms: &[(String, f64)], arch: ArchitectureTag) -> WeightStatistics {
    let total_layers = layer_count(norms.iter().map(|(k, _)| k.as_str()));

    let mut stats = WeightStatistics::default();
    for (key, norm) in norms {
        stats.total_energy += norm;

        let (block_id, tag) = block_info(key, arch, total_layers);
        *stats
            .energy_distribution
            .entry(block_id.clone())
            .or_insert(0.0) += norm;
        stats.block_metadata.entry(block_id).or_insert_with_key(|id| BlockInfo {
            tag,
            group: block_group(id),
        });
    }

    let energies: Vec<f64> = stats.energy_distribution.values().copied().collect();
    stats.sparsity = gini(&energies);
    stats.balance = balance(&stats.energy_distribution);
    stats
}

/// Gini coefficient of absolute values.
///
/// Zero for fewer than two values and for a zero total.
pub fn gini(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let mut sorted: Vec<f64> = values.iter().map(|v| v.abs()).collect();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len() as f64;
    let total: f64 = sorted.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }

    let weighted: f64 = sorted
        .iter()
        .enumerate()
        .map(|(i, v)| (2.0 * (i + 1) as f64 - n - 1.0) * v)
        .sum();
    weighted / (n * total)
}

/// Canonical position of a block id: `(order rank, first number)`.
///
/// Prefixes missing from [`BLOCK_ORDER`] rank last.
fn order_key(block_id: &str) -> (usize, u64) {
    let prefix = block_id.split('_').next().unwrap_or("").to_lowercase();
    let rank = BLOCK_ORDER
        .iter()
        .position(|p| *p == prefix)
        .unwrap_or(99);
    let index = FIRST_NUMBER
        .find(block_id)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    (rank, index)
}

/// Energy-weighted bipolar position of the blocks, in `[-1, 1]`.
///
/// Blocks are laid out in canonical order and spread evenly from -1 to 1.
pub fn balance(energy: &BTreeMap<String, f64>) -> f64 {
    let n = energy.len();
    if n < 2 {
        return 0.0;
    }
    let total: f64 = energy.values().sum();
    if total == 0.0 {
        return 0.0;
    }

    let mut ids: Vec<&String> = energy.keys().collect();
    ids.sort_by(|a, b| match order_key(a).cmp(&order_key(b)) {
        Ordering::Equal => a.cmp(b),
        other => other,
    });

    let weighted: f64 = ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let position = (i as f64 / (n - 1) as f64) * 2.0 - 1.0;
            energy[*id] * position
        })
        .sum();
    weighted / total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::SafetensorsLoader;
    use crate::loader::test_support::{RawTensor, write_safetensors};
    use loraplan_core::{BlockGroup, SemanticTag};
    use tempfile::TempDir;

    fn norms(pairs: &[(&str, f64)]) -> Vec<(String, f64)> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_gini() {
        assert_eq!(gini(&[]), 0.0);
        assert_eq!(gini(&[5.0]), 0.0);
        assert!(gini(&[2.0, 2.0, 2.0]).abs() < 1e-12);
        assert_eq!(gini(&[0.0, 0.0]), 0.0);
        // [0, 1]: (-1*0 + 1*1) / (2 * 1)
        assert!((gini(&[1.0, 0.0]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_balance() {
        let mut energy = BTreeMap::new();
        energy.insert("output_2".to_string(), 3.0);
        energy.insert("input_1".to_string(), 1.0);
        // input at -1, output at +1
        assert!((balance(&energy) - 0.5).abs() < 1e-12);

        energy.insert("middle_0".to_string(), 0.0);
        assert!((balance(&energy) - 0.5).abs() < 1e-12);

        let single: BTreeMap<String, f64> = [("input_1".to_string(), 4.0)].into();
        assert_eq!(balance(&single), 0.0);
    }

    #[test]
    fn test_balance_orders_numerically() {
        let mut energy = BTreeMap::new();
        energy.insert("input_10".to_string(), 1.0);
        energy.insert("input_2".to_string(), 0.0);
        // input_2 sorts before input_10, so input_10 sits at +1.
        assert!((balance(&energy) - 1.0).abs() < 1e-12);

        energy.insert("zzz_0".to_string(), 1.0);
        // Unknown prefix ranks last: positions -1, 0, 1
        assert!((balance(&energy) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_statistics_from_norms() {
        let stats = statistics_from_norms(
            &norms(&[
                ("lora_unet_input_blocks_4_1.lora_down.weight", 1.0),
                ("lora_unet_input_blocks_4_1.lora_up.weight", 2.0),
                ("lora_unet_output_blocks_7_1.lora_down.weight", 3.0),
                ("lora_te1_text_model_encoder_layers_0_mlp.weight", 0.5),
            ]),
            ArchitectureTag::Sdxl,
        );

        assert!((stats.total_energy - 6.5).abs() < 1e-12);
        assert_eq!(stats.energy_distribution["input_4"], 3.0);
        assert_eq!(stats.energy_distribution["output_7"], 3.0);
        assert_eq!(stats.block_metadata["output_7"].tag, SemanticTag::Details);
        assert_eq!(stats.block_metadata["output_7"].group, BlockGroup::Output);
        assert_eq!(stats.block_metadata["clip_layer_0"].group, BlockGroup::Clip);
        assert!(stats.sparsity > 0.0);

        let ids: Vec<&str> = stats.block_metadata.keys().map(String::as_str).collect();
        assert_eq!(ids, stats.block_ids().collect::<Vec<_>>());
    }

    #[test]
    fn test_layer_ratio_is_file_relative() {
        let stats = statistics_from_norms(
            &norms(&[("layers.0.w", 1.0), ("layers.3.w", 1.0)]),
            ArchitectureTag::Qwen,
        );
        // Four layers: index 3 -> ratio 0.75
        assert_eq!(stats.block_metadata["layers_3"].tag, SemanticTag::Style);
    }

    #[test]
    fn test_compute_stats_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.safetensors");
        write_safetensors(
            &path,
            &[
                RawTensor::f32("input_blocks.1.lora_down.weight", vec![2], &[3.0, 4.0]),
                RawTensor::f32("input_blocks.1.alpha", vec![], &[8.0]),
                RawTensor {
                    name: "output_blocks.3.ids",
                    dtype: "I64",
                    shape: vec![1],
                    bytes: 1i64.to_le_bytes().to_vec(),
                },
            ],
            &[],
        );

        let stats =
            compute_stats(&path, ArchitectureTag::Sdxl, &SafetensorsLoader::default()).unwrap();
        assert!((stats.energy_distribution["input_1"] - 5.01).abs() < 1e-9);
        assert!((stats.energy_distribution["output_3"] - NOMINAL_NORM).abs() < 1e-12);
        assert!((stats.total_energy - 5.02).abs() < 1e-9);
    }

    #[test]
    fn test_compute_stats_unloadable() {
        let temp_dir = TempDir::new().unwrap();
        let loader = SafetensorsLoader::default();
        let missing = temp_dir.path().join("x.safetensors");
        assert!(compute_stats(&missing, ArchitectureTag::Sdxl, &loader).is_none());

        let bad = temp_dir.path().join("bad.safetensors");
        std::fs::write(&bad, b"garbage").unwrap();
        assert!(compute_stats(&bad, ArchitectureTag::Sdxl, &loader).is_none());
    }
}
