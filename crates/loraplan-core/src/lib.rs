//! loraplan core - shared types for LoRA analysis and scheduling
//!
//! A LoRA (parameter-delta file) is analyzed once to learn which model
//! family it targets and how its weight energy spreads across the model's
//! blocks. Schedules then describe when, how strongly and with which
//! per-block multipliers each LoRA is applied during sampling.
//!
//! ```text
//! file ─▶ ArchitectureTag ─▶ block mapping ─▶ WeightStatistics
//!                                                   │
//! DSL text / JSON ─▶ ScheduleEntry ─▶ preset vectors ◀┘ ─▶ activation plan
//! ```
//!
//! This crate holds only data and static catalogs; file access lives in
//! `loraplan-lora`, resolution in `loraplan-pipeline`.

pub mod architecture;
pub mod preset;
pub mod schedule;
pub mod semantic;
pub mod stats;
pub mod ui;

// Re-export commonly used types
pub use architecture::{ArchitectureTag, BlockLayout, UnknownTagError};
pub use preset::{CUSTOM_PRESET, PresetId, PresetStrategy};
pub use schedule::{FLAT_CURVE, KeyPoint, ScheduleEntry};
pub use semantic::{BlockGroup, SemanticTag};
pub use stats::{BlockInfo, WeightStatistics};
pub use ui::{BLOCK_ORDER, UiConfig, ui_config};
