//! Tensor loading from disk
//!
//! LoRA files are read into a name -> [`Tensor`] dictionary. Decoding happens
//! per tensor, so one tensor with an unsupported dtype does not spoil the
//! rest of the file.

use half::{bf16, f16};
use safetensors::{Dtype, SafeTensors};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Loader errors
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("File too large: {size} > {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("Unsupported container format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Unsupported dtype {dtype} for tensor {name}")]
    UnsupportedDtype { name: String, dtype: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Loader configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Maximum file size in bytes
    pub max_file_size: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_file_size: 2 * 1024 * 1024 * 1024, // 2GB
        }
    }
}

/// Dense f32 tensor
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl Tensor {
    /// Create a tensor
    pub fn new(shape: Vec<usize>, values: Vec<f32>) -> Self {
        Self { shape, values }
    }

    /// Number of dimensions
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Euclidean (Frobenius) norm, accumulated in f64
    pub fn norm(&self) -> f64 {
        self.values
            .iter()
            .map(|&v| {
                let d = v as f64;
                d * d
            })
            .sum::<f64>()
            .sqrt()
    }

    /// Multiply every element by `factor`
    pub fn scale(&mut self, factor: f32) {
        for v in &mut self.values {
            *v *= factor;
        }
    }
}

/// Tensor name -> tensor
pub type TensorDict = BTreeMap<String, Tensor>;

/// Source of tensor dictionaries
pub trait TensorLoader: Send + Sync {
    /// Visit every tensor of a file in name order.
    ///
    /// File-level failures are returned; per-tensor decode failures are
    /// passed to the visitor and do not stop the scan.
    fn visit(
        &self,
        path: &Path,
        visitor: &mut dyn FnMut(&str, Result<Tensor, LoaderError>),
    ) -> Result<(), LoaderError>;

    /// Load a whole file, skipping tensors that fail to decode
    fn load(&self, path: &Path) -> Result<TensorDict, LoaderError> {
        let mut tensors = TensorDict::new();
        self.visit(path, &mut |name, tensor| match tensor {
            Ok(t) => {
                tensors.insert(name.to_string(), t);
            }
            Err(e) => warn!(tensor = name, error = %e, "Skipping undecodable tensor"),
        })?;
        Ok(tensors)
    }
}

/// Loader for the safetensors container
pub struct SafetensorsLoader {
    config: LoaderConfig,
}

impl SafetensorsLoader {
    /// Create a new loader
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Get configuration
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Read the raw file after existence, format and size checks
    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, LoaderError> {
        if !path.exists() {
            return Err(LoaderError::NotFound(path.to_path_buf()));
        }

        if !is_safetensors(path) {
            return Err(LoaderError::UnsupportedFormat(path.to_path_buf()));
        }

        let metadata = std::fs::metadata(path)?;
        if metadata.len() > self.config.max_file_size {
            return Err(LoaderError::TooLarge {
                size: metadata.len(),
                limit: self.config.max_file_size,
            });
        }

        Ok(std::fs::read(path)?)
    }
}

impl Default for SafetensorsLoader {
    fn default() -> Self {
        Self::new(LoaderConfig::default())
    }
}

impl TensorLoader for SafetensorsLoader {
    fn visit(
        &self,
        path: &Path,
        visitor: &mut dyn FnMut(&str, Result<Tensor, LoaderError>),
    ) -> Result<(), LoaderError> {
        let buffer = self.read_bytes(path)?;
        let st = SafeTensors::deserialize(&buffer).map_err(|e| LoaderError::Parse(e.to_string()))?;

        let mut tensors = st.tensors();
        tensors.sort_by(|a, b| a.0.cmp(&b.0));
        debug!(path = %path.display(), tensors = tensors.len(), "Scanning tensors");

        for (name, view) in tensors {
            let decoded = decode(&name, view.dtype(), view.shape(), view.data());
            visitor(&name, decoded);
        }

        Ok(())
    }
}

/// Whether the path carries the safetensors extension
pub fn is_safetensors(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("safetensors"))
        .unwrap_or(false)
}

/// Decode raw little-endian tensor bytes into f32
fn decode(name: &str, dtype: Dtype, shape: &[usize], data: &[u8]) -> Result<Tensor, LoaderError> {
    let values: Vec<f32> = match dtype {
        Dtype::F32 => data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        Dtype::F16 => data
            .chunks_exact(2)
            .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        Dtype::BF16 => data
            .chunks_exact(2)
            .map(|c| bf16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        Dtype::F64 => data
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32)
            .collect(),
        other => {
            return Err(LoaderError::UnsupportedDtype {
                name: name.to_string(),
                dtype: format!("{other:?}"),
            });
        }
    };

    let expected: usize = shape.iter().product();
    if values.len() != expected {
        return Err(LoaderError::Parse(format!(
            "tensor {name}: {} values for shape {shape:?}",
            values.len()
        )));
    }

    Ok(Tensor::new(shape.to_vec(), values))
}
