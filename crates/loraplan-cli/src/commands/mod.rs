//! Subcommand implementations

pub mod detect;
pub mod parse;
pub mod presets;
pub mod resolve;
pub mod stats;
