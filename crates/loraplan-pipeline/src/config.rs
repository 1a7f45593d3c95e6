//! Configuration
//!
//! - [`EngineConfig`]: search roots, extensions and loader limits
//! - [`ScheduleConfig`]: the structured schedule input, either a bare entry
//!   array or a profile document

use loraplan_core::ScheduleEntry;
use loraplan_lora::LoaderConfig;
use loraplan_lora::resolver::{DEFAULT_EXTENSIONS, default_roots};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directories searched for LoRA files, in order
    pub search_roots: Vec<PathBuf>,
    /// Accepted file extensions
    pub extensions: Vec<String>,
    /// Tensor loader limits
    pub loader: LoaderConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            search_roots: default_roots(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            loader: LoaderConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Add a search root in front of the configured ones
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.search_roots.insert(0, root.into());
        self
    }
}

/// Profile used when a document names none
pub const DEFAULT_PROFILE: &str = "Default";

/// Structured schedule input
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleConfig {
    /// Enabled entries in document order
    pub entries: Vec<ScheduleEntry>,
}

impl ScheduleConfig {
    /// Parse a schedule document.
    ///
    /// Accepts a bare array of entries or
    /// `{"active_profile": .., "profiles": {name: {"loras": [..]} | [..]}}`.
    /// Undecodable entries are skipped, disabled ones dropped; a malformed
    /// document yields an empty schedule.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() || text == "[]" {
            return Self::default();
        }

        match serde_json::from_str::<Value>(text) {
            Ok(doc) => Self::from_value(doc),
            Err(e) => {
                warn!(error = %e, "Ignoring malformed schedule config");
                Self::default()
            }
        }
    }

    /// Read and parse a schedule file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Interpret an already-parsed document
    pub fn from_value(doc: Value) -> Self {
        let raw = match doc {
            Value::Array(items) => items,
            Value::Object(mut root) => {
                let active = root
                    .get("active_profile")
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_PROFILE)
                    .to_string();
                let profile = root
                    .get_mut("profiles")
                    .and_then(Value::as_object_mut)
                    .and_then(|profiles| profiles.remove(&active));
                match profile {
                    Some(Value::Object(mut p)) => match p.remove("loras") {
                        Some(Value::Array(items)) => items,
                        _ => Vec::new(),
                    },
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                }
            }
            _ => Vec::new(),
        };

        let entries = entries_from_values(raw)
            .into_iter()
            .filter(|e| e.enabled)
            .collect();
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Decode entries one by one, skipping the ones that fail
pub fn entries_from_values(items: Vec<Value>) -> Vec<ScheduleEntry> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value::<ScheduleEntry>(item) {
            Ok(mut entry) => {
                entry.sort_points();
                Some(entry)
            }
            Err(e) => {
                warn!(index, error = %e, "Skipping undecodable schedule entry");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use loraplan_core::ArchitectureTag;
    use tempfile::TempDir;

    #[test]
    fn test_bare_array() {
        let config = ScheduleConfig::parse(
            r#"[
                {
                    "lora_name": "a",
                    "strength_model": 0.5,
                    "points": [{"x": 1, "y": 0}, {"x": 0, "y": 1}]
                },
                {"lora_name": "b", "enabled": false},
                {"strength_model": 2}
            ]"#,
        );
        assert_eq!(config.entries.len(), 1);
        let entry = &config.entries[0];
        assert_eq!(entry.lora_name, "a");
        assert_eq!(entry.strength_model, 0.5);
        assert_eq!(entry.strength_clip, 1.0);
        assert_eq!(entry.points[0].x, 0.0);
        assert_eq!(entry.architecture, ArchitectureTag::Unknown);
    }

    #[test]
    fn test_profiles() {
        let doc = r#"{
            "active_profile": "Night",
            "profiles": {
                "Default": [{"lora_name": "day"}],
                "Night": {"loras": [
                    {"lora_name": "moon", "arch": "SDXL_PONY", "preset": "BALANCED"}
                ]}
            }
        }"#;
        let config = ScheduleConfig::parse(doc);
        assert_eq!(config.entries.len(), 1);
        assert_eq!(config.entries[0].lora_name, "moon");
        assert_eq!(config.entries[0].architecture, ArchitectureTag::SdxlPony);
        assert_eq!(config.entries[0].preset.as_ref().unwrap().as_str(), "BALANCED");

        let config = ScheduleConfig::parse(r#"{"profiles": {"Default": [{"lora_name": "day"}]}}"#);
        assert_eq!(config.entries[0].lora_name, "day");

        let config = ScheduleConfig::parse(r#"{"active_profile": "Gone", "profiles": {}}"#);
        assert!(config.is_empty());
    }

    #[test]
    fn test_malformed() {
        assert!(ScheduleConfig::parse("").is_empty());
        assert!(ScheduleConfig::parse("[]").is_empty());
        assert!(ScheduleConfig::parse("{oops").is_empty());
        assert!(ScheduleConfig::parse("42").is_empty());
    }

    #[test]
    fn test_engine_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("engine.json");
        std::fs::write(
            &path,
            r#"{"search_roots": ["/srv/loras"], "loader": {"max_file_size": 1024}}"#,
        )
        .unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.search_roots, vec![PathBuf::from("/srv/loras")]);
        assert_eq!(config.loader.max_file_size, 1024);
        assert_eq!(config.extensions.len(), DEFAULT_EXTENSIONS.len());

        std::fs::write(&path, "nope").unwrap();
        assert!(matches!(EngineConfig::from_file(&path), Err(ConfigError::Parse(_))));
        assert!(matches!(
            EngineConfig::from_file(&temp_dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_with_root_goes_first() {
        let config = EngineConfig::default().with_root("/tmp/extra");
        assert_eq!(config.search_roots[0], PathBuf::from("/tmp/extra"));
        assert_eq!(config.search_roots.len(), 3);
    }
}
