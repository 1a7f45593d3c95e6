//! loraplan pipeline - schedule resolution
//!
//! Turns schedule sources into an activation plan:
//!
//! ```text
//! structured config ─┐
//! DSL text ──────────┼─▶ ScheduleResolver ─▶ ActivationPlan ─▶ sink
//! prior plan ────────┘         │
//!                              └─▶ canonical DSL text + trigger words
//! ```
//!
//! [`LoraEngine`] wires the resolver to a file resolver, a tensor loader and
//! an [`AnalysisCache`] shared by every caller of the engine.

pub mod cache;
pub mod config;
pub mod dsl;
pub mod engine;
pub mod lora;
pub mod scheduler;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use cache::{AnalysisCache, CacheEntry, CacheStats};
pub use config::{ConfigError, EngineConfig, ScheduleConfig};
pub use engine::{LoraEngine, LoraEngineBuilder};
pub use lora::{ActivationPlan, Hook, Keyframe, PatchTarget, WeightPatch, WeightPatchSink};
pub use scheduler::{AnalysisSource, Resolution, ResolutionMode, ScheduleResolver};
