//! Sidecar metadata files
//!
//! Model managers drop a JSON file next to each LoRA, either
//! `<stem>.metadata.json` or `<stem>.json`. Both are optional and both may be
//! partially filled, so every field is read leniently.

use loraplan_core::ArchitectureTag;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Sidecar errors
#[derive(Debug, Error)]
pub enum SidecarError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Model-provider section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderInfo {
    #[serde(default)]
    pub tags: Option<Value>,
    #[serde(rename = "baseModel", default)]
    pub base_model: Option<Value>,
    #[serde(rename = "trainedWords", default)]
    pub trained_words: Option<Value>,
}

/// Sidecar document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SidecarMetadata {
    #[serde(rename = "trainedWords", default)]
    pub trained_words: Option<Value>,
    #[serde(rename = "baseModel", default)]
    pub base_model: Option<Value>,
    #[serde(rename = "base_model", default)]
    pub base_model_snake: Option<Value>,
    #[serde(default)]
    pub sd_version: Option<Value>,
    #[serde(rename = "modelspec.architecture", default)]
    pub modelspec_architecture: Option<Value>,
    #[serde(default)]
    pub civitai: Option<ProviderInfo>,
}

impl SidecarMetadata {
    /// Read one sidecar file
    pub fn read(path: &Path) -> Result<Self, SidecarError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Read every sidecar of a LoRA that exists and parses
    pub fn read_all(lora_path: &Path) -> Vec<Self> {
        candidates(lora_path)
            .iter()
            .filter(|p| p.exists())
            .filter_map(|p| match Self::read(p) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    debug!(path = %p.display(), error = %e, "Ignoring unreadable sidecar");
                    None
                }
            })
            .collect()
    }

    fn provider(&self) -> Option<&ProviderInfo> {
        self.civitai.as_ref()
    }

    /// Architecture named by this sidecar.
    ///
    /// Provider tags are checked first and win on any specific match. Then
    /// the single-value fields are checked in order; a bare SDXL match is
    /// remembered but yields to a more specific one found later.
    pub fn architecture(&self) -> Option<ArchitectureTag> {
        if let Some(Value::Array(tags)) = self.provider().and_then(|p| p.tags.as_ref()) {
            for tag in tags.iter().filter_map(scalar_text) {
                if let Some(arch) = ArchitectureTag::from_keyword(&tag) {
                    if !arch.is_generic() {
                        return Some(arch);
                    }
                }
            }
        }

        let sources = [
            self.base_model.as_ref(),
            self.base_model_snake.as_ref(),
            self.sd_version.as_ref(),
            self.modelspec_architecture.as_ref(),
            self.provider().and_then(|p| p.base_model.as_ref()),
        ];

        let mut generic = None;
        for text in sources.into_iter().flatten().filter_map(scalar_text) {
            if let Some(arch) = ArchitectureTag::from_keyword(&text) {
                if !arch.is_generic() {
                    return Some(arch);
                }
                generic = Some(arch);
            }
        }
        generic
    }

    /// Trigger words: top-level list, else the provider's list
    pub fn trained_words(&self) -> Vec<String> {
        let words = self
            .trained_words
            .as_ref()
            .filter(|v| is_truthy(v))
            .or_else(|| self.provider().and_then(|p| p.trained_words.as_ref()));

        match words {
            Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
            _ => Vec::new(),
        }
    }
}

/// Sidecar paths for a LoRA, in lookup order
pub fn candidates(lora_path: &Path) -> [PathBuf; 2] {
    let stem = lora_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    [
        lora_path.with_file_name(format!("{stem}.metadata.json")),
        lora_path.with_file_name(format!("{stem}.json")),
    ]
}

/// Architecture from the first sidecar that names one
pub fn sidecar_architecture(lora_path: &Path) -> Option<ArchitectureTag> {
    SidecarMetadata::read_all(lora_path)
        .iter()
        .find_map(SidecarMetadata::architecture)
}

/// Trigger words gathered from all sidecars of a LoRA
pub fn trigger_words(lora_path: &Path) -> Vec<String> {
    SidecarMetadata::read_all(lora_path)
        .iter()
        .flat_map(SidecarMetadata::trained_words)
        .collect()
}

/// Non-empty string or number rendered as text
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(_) => true,
    }
}
