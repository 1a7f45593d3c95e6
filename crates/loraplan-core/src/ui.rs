//! Front-end configuration document
//!
//! The block editor and analysis panel are driven by this static document;
//! it is served as JSON and never mutated at runtime.

use crate::preset::PresetStrategy;
use crate::semantic::BlockGroup;
use serde::Serialize;
use std::collections::BTreeMap;

pub const CONFIG_VERSION: &str = "1.2.2";

/// Canonical early-to-late ordering of block-id prefixes
pub const BLOCK_ORDER: [&str; 12] = [
    "clip",
    "input",
    "down",
    "double",
    "middle",
    "mid",
    "joint",
    "layers",
    "single",
    "up",
    "output",
    "specialized",
];

/// Architecture name prefixes for which presets are offered
pub const PRESET_COMPATIBLE_ARCHS: [&str; 6] = ["SDXL", "SD1", "SD2", "1.5", "FLUX", "SD3"];

#[derive(Debug, Clone, Serialize)]
pub struct GroupDoc {
    pub id: &'static str,
    pub label: &'static str,
    pub patterns: &'static [&'static str],
    #[serde(skip_serializing_if = "no_toggles")]
    pub toggles: &'static [&'static str],
}

fn no_toggles(toggles: &&[&str]) -> bool {
    toggles.is_empty()
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategyDoc {
    pub label: &'static str,
    pub desc: &'static str,
    pub weights: BTreeMap<&'static str, f64>,
}

/// Human-readable description of what each role covers in one family
#[derive(Debug, Clone, Serialize)]
pub struct RoleMapDoc {
    pub pose: &'static str,
    pub identity: &'static str,
    pub style: &'static str,
    pub details: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct UiConfig {
    #[serde(rename = "config_version")]
    pub config_version: &'static str,
    pub block_order: &'static [&'static str],
    pub block_groups: Vec<GroupDoc>,
    pub preset_compatible_archs: &'static [&'static str],
    pub preset_strategies: BTreeMap<&'static str, StrategyDoc>,
    pub arch_block_mappings: BTreeMap<&'static str, RoleMapDoc>,
}

/// Build the document
pub fn ui_config() -> UiConfig {
    let block_groups = BlockGroup::ORDERED
        .iter()
        .map(|g| GroupDoc {
            id: g.id(),
            label: g.label(),
            patterns: g.patterns(),
            toggles: g.toggles(),
        })
        .collect();

    let preset_strategies = PresetStrategy::catalog()
        .iter()
        .map(|s| {
            let weights = s.weights().map(|(tag, w)| (tag.as_str(), w)).collect();
            (
                s.id,
                StrategyDoc {
                    label: s.label,
                    desc: s.desc,
                    weights,
                },
            )
        })
        .collect();

    UiConfig {
        config_version: CONFIG_VERSION,
        block_order: &BLOCK_ORDER,
        block_groups,
        preset_compatible_archs: &PRESET_COMPATIBLE_ARCHS,
        preset_strategies,
        arch_block_mappings: arch_block_mappings(),
    }
}

fn arch_block_mappings() -> BTreeMap<&'static str, RoleMapDoc> {
    let mut m = BTreeMap::new();
    m.insert(
        "FLUX",
        RoleMapDoc {
            pose: "Double Blocks (0-10)\nStructure & Composition",
            identity: "Double Blocks (11+)\nSubject Likeness",
            style: "Single Blocks (0-20)\nArtistic Flow",
            details: "Single Blocks (21+)\nFine Texture",
        },
    );
    m.insert(
        "SD15",
        RoleMapDoc {
            pose: "Input (0-8)\nCoarse Structure",
            identity: "Input(9+) / Mid / Output(0-2)\nMain Subject",
            style: "Output (3-8)\nLighting & Style",
            details: "Output (9+)\nPixel Details",
        },
    );
    m.insert(
        "SD3",
        RoleMapDoc {
            pose: "Joint Blocks (Early)\nSpatial Structure",
            identity: "Joint Blocks (Mid)\nSubject Features",
            style: "Joint Blocks (Late)\nArtistic Rendering",
            details: "Joint Blocks (Final)\nOutput Refinement",
        },
    );
    m.insert(
        "LINEAR",
        RoleMapDoc {
            pose: "Layers (0-30%)\nEarly Processing",
            identity: "Layers (30-60%)\nMiddle Processing",
            style: "Layers (60-80%)\nLate Processing",
            details: "Layers (80-100%)\nFinal Refinement",
        },
    );
    m.insert(
        "SDXL",
        RoleMapDoc {
            pose: "Input Blocks\nComposition & Structure",
            identity: "Middle & Output(0-2)\nEntity & Concept",
            style: "Output Blocks (3-5)\nLighting & Art Style",
            details: "Output Blocks (6-8)\nTexture & Details",
        },
    );
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_shape() {
        let doc = serde_json::to_value(ui_config()).unwrap();
        assert_eq!(doc["config_version"], "1.2.2");
        assert_eq!(doc["BLOCK_ORDER"][0], "clip");
        assert_eq!(doc["BLOCK_GROUPS"][0]["id"], "clip");
        assert_eq!(doc["BLOCK_GROUPS"][0]["toggles"][0], "split_mode");
        assert!(doc["BLOCK_GROUPS"][1].get("toggles").is_none());
        assert_eq!(
            doc["PRESET_STRATEGIES"]["STYLE_FOCUSED"]["weights"]["POSE"],
            0.6
        );
        assert!(doc["ARCH_BLOCK_MAPPINGS"]["SDXL"]["pose"].is_string());
    }
}
