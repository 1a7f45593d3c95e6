//! loraplan LoRA - file-level analysis
//!
//! Everything that looks at a LoRA file on disk:
//!
//! - tensor loading from the safetensors container
//! - sidecar metadata (architecture hints, trigger words)
//! - architecture detection from sidecars and container headers
//! - tensor key -> block mapping and per-block weight statistics
//! - preset vectors and block-weight application
//! - name -> path resolution over search roots
//!
//! Every analysis entry point degrades instead of failing: a file that
//! cannot be read is `Unknown` to the classifier and has no statistics.

pub mod blocks;
pub mod header;
pub mod inspector;
pub mod loader;
pub mod resolver;
pub mod sidecar;
pub mod stats;
pub mod weighting;

pub use blocks::{block_group, block_info, layer_count};
pub use header::{ContainerHeader, HeaderError};
pub use inspector::{LoraInspector, classify_header, classify_sdxl_lineage};
pub use loader::{LoaderConfig, LoaderError, SafetensorsLoader, Tensor, TensorDict, TensorLoader};
pub use resolver::{FileResolver, ResolverError, SearchPathResolver};
pub use sidecar::{SidecarMetadata, trigger_words};
pub use stats::compute_stats;
pub use weighting::{apply_block_weights, preset_vectors};
