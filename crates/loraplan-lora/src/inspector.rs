//! Architecture classification
//!
//! Detection order, first hit wins:
//!
//! 1. sidecar metadata next to the file
//! 2. the safetensors header: `ss_base_model_version`, then tensor-name
//!    fingerprints, then projection shapes
//! 3. [`ArchitectureTag::Unknown`]
//!
//! Nothing here fails: unreadable files and headers are logged and
//! classified as unknown.

use crate::header::ContainerHeader;
use crate::loader::is_safetensors;
use crate::sidecar::sidecar_architecture;
use loraplan_core::{ArchitectureTag, WeightStatistics};
use std::path::Path;
use tracing::{debug, warn};

/// Metadata field written by common LoRA trainers
pub const BASE_MODEL_VERSION_KEY: &str = "ss_base_model_version";

/// Lineage thresholds for generic SDXL files
pub mod lineage {
    pub const PONY_OUTPUT_SHARE: f64 = 0.55;
    pub const PONY_SPARSITY: f64 = 0.18;
    pub const NOOBAI_MID_SHARE: f64 = 0.40;
    pub const ILLUSTRIOUS_INPUT_MID_SHARE: f64 = 0.55;
    pub const ILLUSTRIOUS_SPARSITY: f64 = 0.15;
    pub const REALISM_BALANCE: f64 = 0.2;
    pub const REALISM_SPARSITY: f64 = 0.12;
}

/// Architecture classifier for LoRA files
#[derive(Debug, Clone, Copy, Default)]
pub struct LoraInspector;

impl LoraInspector {
    /// Create a new inspector
    pub fn new() -> Self {
        Self
    }

    /// Detect the architecture family of a file
    pub fn detect(&self, path: &Path) -> ArchitectureTag {
        if !path.exists() {
            debug!(path = %path.display(), "LoRA file missing");
            return ArchitectureTag::Unknown;
        }

        if let Some(arch) = sidecar_architecture(path) {
            debug!(path = %path.display(), arch = %arch, "Architecture from sidecar");
            return arch;
        }

        if !is_safetensors(path) {
            return ArchitectureTag::Unknown;
        }

        match ContainerHeader::read(path) {
            Ok(header) => {
                let arch = classify_header(&header).unwrap_or_default();
                debug!(path = %path.display(), arch = %arch, "Architecture from header");
                arch
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Header analysis failed");
                ArchitectureTag::Unknown
            }
        }
    }
}

/// Classify a parsed header, `None` when nothing matches
pub fn classify_header(header: &ContainerHeader) -> Option<ArchitectureTag> {
    if let Some(arch) = header
        .metadata_str(BASE_MODEL_VERSION_KEY)
        .and_then(ArchitectureTag::from_keyword)
    {
        return Some(arch);
    }

    let has = |needle: &str| header.has_key_containing(needle);

    if has("double_blocks") || has("img_in") {
        return Some(ArchitectureTag::Flux1);
    }
    if has("joint_blocks") {
        return Some(ArchitectureTag::Sd3);
    }
    if has("input_blocks") {
        return Some(ArchitectureTag::Sdxl);
    }
    if has("down_blocks") {
        return Some(ArchitectureTag::Sd15);
    }
    if has("layers.0") {
        if has("final_layer") {
            return Some(ArchitectureTag::Aura);
        }
        if has("visual") {
            return Some(ArchitectureTag::Lumina);
        }
        return Some(ArchitectureTag::Qwen);
    }
    if has("h.0") {
        return Some(ArchitectureTag::Hyvid);
    }

    classify_by_shape(header)
}

/// Last resort: inner dimension of a down projection
fn classify_by_shape(header: &ContainerHeader) -> Option<ArchitectureTag> {
    for (name, tensor) in &header.tensors {
        if !(name.contains("to_k") || name.contains("linear")) || !name.contains("down") {
            continue;
        }
        match tensor.shape.last() {
            Some(320) => return Some(ArchitectureTag::Sd15),
            Some(768 | 1024 | 1280) => return Some(ArchitectureTag::Sd21),
            Some(640) => return Some(ArchitectureTag::Sdxl),
            _ => {}
        }
    }
    None
}

/// Refine a generic SDXL file into a lineage from its statistics.
///
/// Total: always one of `Sdxl`, `SdxlPony`, `SdxlNoobai`,
/// `SdxlIllustrious`, `SdxlRealism`.
pub fn classify_sdxl_lineage(stats: &WeightStatistics) -> ArchitectureTag {
    use lineage::*;

    let output = stats.output_share();
    let mid = stats.mid_share();
    let input = stats.input_share();
    let sparsity = stats.sparsity;

    if output > PONY_OUTPUT_SHARE && sparsity > PONY_SPARSITY {
        ArchitectureTag::SdxlPony
    } else if mid > NOOBAI_MID_SHARE {
        ArchitectureTag::SdxlNoobai
    } else if input + mid > ILLUSTRIOUS_INPUT_MID_SHARE && sparsity < ILLUSTRIOUS_SPARSITY {
        ArchitectureTag::SdxlIllustrious
    } else if stats.balance.abs() < REALISM_BALANCE && sparsity < REALISM_SPARSITY {
        ArchitectureTag::SdxlRealism
    } else {
        ArchitectureTag::Sdxl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::TensorHeader;
    use crate::loader::test_support::{RawTensor, write_safetensors};
    use loraplan_core::{BlockGroup, BlockInfo, SemanticTag};
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn shaped(name: &str, shape: Vec<usize>) -> ContainerHeader {
        let mut h = ContainerHeader::default();
        h.tensors.insert(
            name.to_string(),
            TensorHeader {
                dtype: "F16".to_string(),
                shape,
            },
        );
        h
    }

    fn header(keys: &[&str]) -> ContainerHeader {
        let mut h = ContainerHeader::default();
        for name in keys {
            h.tensors.insert(name.to_string(), TensorHeader::default());
        }
        h
    }

    fn stats(blocks: &[(&str, f64)], sparsity: f64, balance: f64) -> WeightStatistics {
        let mut s = WeightStatistics {
            sparsity,
            balance,
            ..Default::default()
        };
        for (id, energy) in blocks {
            s.energy_distribution.insert(id.to_string(), *energy);
            s.block_metadata.insert(
                id.to_string(),
                BlockInfo {
                    tag: SemanticTag::Other,
                    group: BlockGroup::Aux,
                },
            );
            s.total_energy += energy;
        }
        s
    }

    #[test]
    fn test_fingerprints() {
        let cases = [
            (vec!["input_blocks.0.weight"], ArchitectureTag::Sdxl),
            (vec!["lora_unet_double_blocks_0_x"], ArchitectureTag::Flux1),
            (vec!["img_in.lora_A", "input_blocks.1"], ArchitectureTag::Flux1),
            (vec!["joint_blocks.3.attn"], ArchitectureTag::Sd3),
            (vec!["unet.down_blocks.1.x"], ArchitectureTag::Sd15),
            (vec!["layers.0.attn", "final_layer.linear"], ArchitectureTag::Aura),
            (vec!["model.layers.0.x", "visual.proj"], ArchitectureTag::Lumina),
            (vec!["transformer.layers.0.mlp"], ArchitectureTag::Qwen),
            (vec!["h.0.attn"], ArchitectureTag::Hyvid),
        ];
        for (keys, expected) in cases {
            assert_eq!(classify_header(&header(&keys)), Some(expected), "{keys:?}");
        }
        assert_eq!(classify_header(&header(&["unrelated"])), None);
    }

    #[test]
    fn test_shape_fallback() {
        assert_eq!(
            classify_header(&shaped("attn_to_k.lora_down.weight", vec![4, 320])),
            Some(ArchitectureTag::Sd15)
        );
        assert_eq!(
            classify_header(&shaped("proj_linear.lora_down.weight", vec![4, 1024])),
            Some(ArchitectureTag::Sd21)
        );
        assert_eq!(
            classify_header(&shaped("attn_to_k.lora_down.weight", vec![4, 640])),
            Some(ArchitectureTag::Sdxl)
        );
        assert_eq!(
            classify_header(&shaped("attn_to_k.lora_up.weight", vec![320, 4])),
            None
        );
    }

    #[test]
    fn test_metadata_version_first() {
        let mut h = header(&["input_blocks.0.weight"]);
        h.metadata.insert(
            BASE_MODEL_VERSION_KEY.to_string(),
            serde_json::Value::from("flux1-dev"),
        );
        assert_eq!(classify_header(&h), Some(ArchitectureTag::Flux1));

        // Unmapped version text falls through to fingerprints.
        h.metadata.insert(
            BASE_MODEL_VERSION_KEY.to_string(),
            serde_json::Value::from("custom"),
        );
        assert_eq!(classify_header(&h), Some(ArchitectureTag::Sdxl));
    }

    #[test]
    fn test_detect_from_header() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.safetensors");
        write_safetensors(&path, &[RawTensor::f32("input_blocks.0.weight", vec![1], &[1.0])], &[]);

        assert_eq!(LoraInspector::new().detect(&path), ArchitectureTag::Sdxl);
    }

    #[test]
    fn test_sidecar_beats_header() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("b.safetensors");
        write_safetensors(
            &path,
            &[RawTensor::f32("lora_unet_down_blocks_0.weight", vec![1], &[1.0])],
            &[],
        );
        std::fs::write(temp_dir.path().join("b.json"), r#"{"baseModel": "fooXL"}"#).unwrap();

        assert_eq!(LoraInspector::new().detect(&path), ArchitectureTag::Sdxl);
    }

    #[test]
    fn test_detect_degrades_to_unknown() {
        let temp_dir = TempDir::new().unwrap();
        let inspector = LoraInspector::new();

        assert_eq!(
            inspector.detect(&temp_dir.path().join("missing.safetensors")),
            ArchitectureTag::Unknown
        );

        let broken = temp_dir.path().join("broken.safetensors");
        std::fs::write(&broken, [9u8, 0, 0, 0, 0, 0, 0, 0, b'{']).unwrap();
        assert_eq!(inspector.detect(&broken), ArchitectureTag::Unknown);

        let pt = temp_dir.path().join("old.pt");
        std::fs::write(&pt, b"pickle").unwrap();
        assert_eq!(inspector.detect(&pt), ArchitectureTag::Unknown);

        let plain = temp_dir.path().join("plain.safetensors");
        write_safetensors(&plain, &[RawTensor::f32("foo", vec![1], &[1.0])], &[]);
        assert_eq!(inspector.detect(&plain), ArchitectureTag::Unknown);
    }

    #[test]
    fn test_lineage_thresholds() {
        let pony = stats(&[("output_1", 6.0), ("input_1", 4.0)], 0.2, 0.5);
        assert_eq!(classify_sdxl_lineage(&pony), ArchitectureTag::SdxlPony);

        let noob = stats(&[("middle_0", 5.0), ("output_1", 5.0)], 0.3, 0.5);
        assert_eq!(classify_sdxl_lineage(&noob), ArchitectureTag::SdxlNoobai);

        let illustrious = stats(
            &[("input_1", 4.0), ("middle_0", 2.0), ("output_1", 4.0)],
            0.1,
            0.5,
        );
        assert_eq!(classify_sdxl_lineage(&illustrious), ArchitectureTag::SdxlIllustrious);

        let realism = stats(&[("input_1", 5.0), ("output_1", 5.0)], 0.1, 0.0);
        assert_eq!(classify_sdxl_lineage(&realism), ArchitectureTag::SdxlRealism);

        assert_eq!(
            classify_sdxl_lineage(&WeightStatistics::default()),
            ArchitectureTag::SdxlRealism
        );
        let plain = stats(&[("input_1", 5.0), ("output_1", 5.0)], 0.3, 0.5);
        assert_eq!(classify_sdxl_lineage(&plain), ArchitectureTag::Sdxl);
    }

    proptest! {
        #[test]
        fn lineage_is_total(
            input in 0.0f64..10.0,
            mid in 0.0f64..10.0,
            output in 0.0f64..10.0,
            sparsity in 0.0f64..1.0,
            balance in -1.0f64..1.0,
        ) {
            let energies = [("input_1", input), ("middle_0", mid), ("output_1", output)];
            let s = stats(&energies, sparsity, balance);
            let tag = classify_sdxl_lineage(&s);
            prop_assert!(tag.is_sdxl_family());
            prop_assert_eq!(tag, classify_sdxl_lineage(&s));
        }
    }
}
