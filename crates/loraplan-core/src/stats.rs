//! Per-block weight statistics

use crate::semantic::{BlockGroup, SemanticTag};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Role and UI group recorded for a block the first time it is seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub tag: SemanticTag,
    pub group: BlockGroup,
}

/// Weight-energy summary of one LoRA file
///
/// `energy_distribution` and `block_metadata` always share the same key set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightStatistics {
    /// Sum of all tensor norms
    pub total_energy: f64,
    /// Block id -> summed tensor norm
    pub energy_distribution: BTreeMap<String, f64>,
    /// Block id -> role and group
    pub block_metadata: BTreeMap<String, BlockInfo>,
    /// Gini coefficient of block energies
    pub sparsity: f64,
    /// Energy-weighted position, -1 (early blocks) to 1 (late blocks)
    pub balance: f64,
}

impl WeightStatistics {
    /// Block ids in key order
    pub fn block_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.energy_distribution.keys().map(String::as_str)
    }

    /// Number of blocks that received energy
    pub fn block_count(&self) -> usize {
        self.energy_distribution.len()
    }

    /// Summed energy over all blocks
    pub fn distributed_energy(&self) -> f64 {
        self.energy_distribution.values().sum()
    }

    /// Fraction of block energy held by blocks whose id starts with one of
    /// `prefixes` followed by `_`. Zero when no energy was recorded.
    pub fn region_share(&self, prefixes: &[&str]) -> f64 {
        let total = self.distributed_energy();
        if total <= 0.0 {
            return 0.0;
        }
        let region: f64 = self
            .energy_distribution
            .iter()
            .filter(|(id, _)| {
                let head = id.split('_').next().unwrap_or("");
                prefixes.iter().any(|p| head.eq_ignore_ascii_case(p))
            })
            .map(|(_, energy)| energy)
            .sum();
        region / total
    }

    /// Share of the UNet input blocks
    pub fn input_share(&self) -> f64 {
        self.region_share(&["input"])
    }

    /// Share of the UNet middle block
    pub fn mid_share(&self) -> f64 {
        self.region_share(&["middle", "mid"])
    }

    /// Share of the UNet output blocks
    pub fn output_share(&self) -> f64 {
        self.region_share(&["output"])
    }

    /// Summed energy per semantic role
    pub fn energy_by_tag(&self) -> BTreeMap<SemanticTag, f64> {
        let mut out = BTreeMap::new();
        for (id, energy) in &self.energy_distribution {
            let tag = self
                .block_metadata
                .get(id)
                .map(|info| info.tag)
                .unwrap_or(SemanticTag::Other);
            *out.entry(tag).or_insert(0.0) += energy;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(blocks: &[(&str, f64, SemanticTag)]) -> WeightStatistics {
        let mut s = WeightStatistics::default();
        for (id, energy, tag) in blocks {
            s.energy_distribution.insert(id.to_string(), *energy);
            s.block_metadata.insert(
                id.to_string(),
                BlockInfo {
                    tag: *tag,
                    group: BlockGroup::Aux,
                },
            );
            s.total_energy += energy;
        }
        s
    }

    #[test]
    fn test_region_shares() {
        let s = stats(&[
            ("input_1", 1.0, SemanticTag::Pose),
            ("middle_0", 1.0, SemanticTag::Identity),
            ("output_3", 2.0, SemanticTag::Style),
        ]);
        assert!((s.input_share() - 0.25).abs() < 1e-9);
        assert!((s.mid_share() - 0.25).abs() < 1e-9);
        assert!((s.output_share() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_shares_empty() {
        let s = WeightStatistics::default();
        assert_eq!(s.output_share(), 0.0);
        assert_eq!(s.block_count(), 0);
    }

    #[test]
    fn test_energy_by_tag() {
        let s = stats(&[
            ("output_3", 2.0, SemanticTag::Style),
            ("output_4", 1.0, SemanticTag::Style),
            ("misc", 0.5, SemanticTag::Other),
        ]);
        let by_tag = s.energy_by_tag();
        assert_eq!(by_tag[&SemanticTag::Style], 3.0);
        assert_eq!(by_tag[&SemanticTag::Other], 0.5);
    }
}
