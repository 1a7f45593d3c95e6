//! Safetensors header reading
//!
//! Layout: an 8-byte little-endian header length, then that many bytes of
//! UTF-8 JSON mapping tensor names to `{dtype, shape, data_offsets}`, plus an
//! optional `__metadata__` string map. Only the header is read; tensor data
//! is never touched.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// Reserved header key holding free-form string metadata
pub const METADATA_KEY: &str = "__metadata__";

/// Headers above this size are treated as corrupt
pub const MAX_HEADER_LEN: u64 = 100_000_000;

/// Header errors
#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Truncated header: expected {expected} bytes")]
    Truncated { expected: u64 },

    #[error("Header too large: {0} bytes")]
    TooLarge(u64),

    #[error("Malformed header JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Header is not a JSON object")]
    NotAnObject,
}

/// Per-tensor header record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TensorHeader {
    pub dtype: String,
    pub shape: Vec<usize>,
}

/// Parsed container header
#[derive(Debug, Clone, Default)]
pub struct ContainerHeader {
    /// `__metadata__` contents
    pub metadata: Map<String, Value>,
    /// Tensor name -> record
    pub tensors: BTreeMap<String, TensorHeader>,
}

impl ContainerHeader {
    /// Read the header of a file
    pub fn read(path: &Path) -> Result<Self, HeaderError> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();

        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes)
            .map_err(|_| HeaderError::Truncated { expected: 8 })?;
        let header_len = u64::from_le_bytes(len_bytes);

        if header_len > MAX_HEADER_LEN {
            return Err(HeaderError::TooLarge(header_len));
        }
        if header_len > file_len.saturating_sub(8) {
            return Err(HeaderError::Truncated {
                expected: header_len,
            });
        }

        let mut header_bytes = vec![0u8; header_len as usize];
        file.read_exact(&mut header_bytes)?;

        Self::parse(&header_bytes)
    }

    /// Parse header JSON
    pub fn parse(bytes: &[u8]) -> Result<Self, HeaderError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let Value::Object(entries) = value else {
            return Err(HeaderError::NotAnObject);
        };

        let mut header = ContainerHeader::default();
        for (name, entry) in entries {
            if name == METADATA_KEY {
                if let Value::Object(meta) = entry {
                    header.metadata = meta;
                }
                continue;
            }
            header.tensors.insert(name, tensor_header(&entry));
        }
        Ok(header)
    }

    /// A metadata value, if it is a string
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Any tensor name contains `needle`
    pub fn has_key_containing(&self, needle: &str) -> bool {
        self.tensors.keys().any(|k| k.contains(needle))
    }
}

fn tensor_header(entry: &Value) -> TensorHeader {
    let dtype = entry
        .get("dtype")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let shape = entry
        .get("shape")
        .and_then(Value::as_array)
        .map(|dims| {
            dims.iter()
                .filter_map(Value::as_u64)
                .map(|d| d as usize)
                .collect()
        })
        .unwrap_or_default();
    TensorHeader { dtype, shape }
}
