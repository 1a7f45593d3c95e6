//! LoRA file resolution
//!
//! Schedules name LoRAs by a human-readable name (`style`, `chars/ink.safetensors`);
//! a [`FileResolver`] turns that into a concrete path.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Resolver errors
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("Search root is not a directory: {0}")]
    InvalidRoot(PathBuf),
}

/// Name -> file lookup
pub trait FileResolver: Send + Sync {
    /// Best match for `name`, if any
    fn resolve(&self, name: &str) -> Option<PathBuf>;
}

/// Extensions recognized as LoRA files
pub const DEFAULT_EXTENSIONS: [&str; 5] = ["safetensors", "pt", "pth", "ckpt", "bin"];

/// `loras/` under the working directory and the per-user data directory
pub fn default_roots() -> Vec<PathBuf> {
    vec![
        PathBuf::from("loras"),
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("loraplan")
            .join("loras"),
    ]
}

const EXACT_NAME_SCORE: u32 = 100;
const STEM_SCORE: u32 = 50;
const PATH_FRAGMENT_BONUS: u32 = 25;

/// Best-match search over a list of root directories
#[derive(Debug, Clone)]
pub struct SearchPathResolver {
    roots: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl SearchPathResolver {
    /// Create a resolver over `roots`, accepting the default extensions
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Replace the accepted extensions
    pub fn with_extensions(mut self, extensions: impl IntoIterator<Item = String>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    /// Add a search root; it must be an existing directory
    pub fn add_root(&mut self, path: impl Into<PathBuf>) -> Result<(), ResolverError> {
        let path = path.into();
        if !path.is_dir() {
            return Err(ResolverError::InvalidRoot(path));
        }
        self.roots.push(path);
        Ok(())
    }

    /// Get search roots
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_lowercase();
                self.extensions.iter().any(|x| *x == e)
            })
            .unwrap_or(false)
    }

    /// Every accepted file under the roots as `(relative path, absolute path)`,
    /// roots in order and files sorted by name within each root
    fn candidates(&self) -> impl Iterator<Item = (PathBuf, PathBuf)> + '_ {
        self.roots.iter().flat_map(move |root| {
            WalkDir::new(root)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
                .filter(move |e| e.file_type().is_file() && self.accepts(e.path()))
                .filter_map(move |e| {
                    let rel = e.path().strip_prefix(root).ok()?.to_path_buf();
                    Some((rel, e.path().to_path_buf()))
                })
        })
    }
}

impl Default for SearchPathResolver {
    fn default() -> Self {
        Self::new(default_roots())
    }
}

impl FileResolver for SearchPathResolver {
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() {
            return None;
        }
        if !stays_inside_root(name) {
            warn!(name, "Rejecting LoRA name that leaves the search roots");
            return None;
        }

        if let Some(direct) = self
            .roots
            .iter()
            .map(|root| root.join(name))
            .find(|p| p.is_file())
        {
            return Some(direct);
        }

        let query = Path::new(name);
        let target_name = query.file_name()?.to_string_lossy().to_lowercase();
        let target_stem = query
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let query_norm = normalize(name);

        let mut best: Option<(u32, PathBuf)> = None;
        for (rel, abs) in self.candidates() {
            let file_name = rel
                .file_name()
                .map(|s| s.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            let stem = rel
                .file_stem()
                .map(|s| s.to_string_lossy().to_lowercase())
                .unwrap_or_default();

            let mut score = if file_name == target_name {
                EXACT_NAME_SCORE
            } else if stem == target_stem {
                STEM_SCORE
            } else {
                continue;
            };

            if query_norm.contains('/') && normalize(&rel.to_string_lossy()).contains(&query_norm) {
                score += PATH_FRAGMENT_BONUS;
            }

            if best.as_ref().map_or(true, |(s, _)| score > *s) {
                best = Some((score, abs));
            }
        }

        match best {
            Some((score, path)) => {
                debug!(name, score, path = %path.display(), "Resolved LoRA");
                Some(path)
            }
            None => {
                debug!(name, "No LoRA file matched");
                None
            }
        }
    }
}

/// Relative path made only of plain components (no root, prefix or `..`)
fn stays_inside_root(name: &str) -> bool {
    Path::new(name)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn test_direct_join() {
        let temp_dir = TempDir::new().unwrap();
        let file = touch(temp_dir.path(), "chars/ink.safetensors");
        let resolver = SearchPathResolver::new([temp_dir.path().to_path_buf()]);

        assert_eq!(resolver.resolve("chars/ink.safetensors"), Some(file));
    }

    #[test]
    fn test_stem_and_case_insensitive_name() {
        let temp_dir = TempDir::new().unwrap();
        let file = touch(temp_dir.path(), "styles/MyStyle.safetensors");
        touch(temp_dir.path(), "styles/notes.txt");
        let resolver = SearchPathResolver::new([temp_dir.path().to_path_buf()]);

        assert_eq!(resolver.resolve("mystyle"), Some(file.clone()));
        assert_eq!(resolver.resolve("MYSTYLE.safetensors"), Some(file));
        assert_eq!(resolver.resolve("notes"), None);
        assert_eq!(resolver.resolve(""), None);
    }

    #[test]
    fn test_exact_name_beats_stem() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "a/ink.pt");
        let exact = touch(temp_dir.path(), "b/ink.safetensors");
        let resolver = SearchPathResolver::new([temp_dir.path().to_path_buf()]);

        assert_eq!(resolver.resolve("x/INK.safetensors"), Some(exact));
    }

    #[test]
    fn test_path_fragment_bonus() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "a/ink.safetensors");
        let wanted = touch(temp_dir.path(), "b/sub/ink.safetensors");
        let resolver = SearchPathResolver::new([temp_dir.path().to_path_buf()]);

        // Without a separator the first candidate in sorted order wins.
        assert!(resolver.resolve("ink").unwrap().ends_with("a/ink.safetensors"));
        assert_eq!(resolver.resolve("SUB/ink.safetensors"), Some(wanted));
    }

    #[test]
    fn test_names_cannot_leave_roots() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("root");
        touch(&root, "inside.safetensors");
        let outside = touch(temp_dir.path(), "secret.safetensors");
        let resolver = SearchPathResolver::new([root]);

        assert_eq!(resolver.resolve("../secret.safetensors"), None);
        assert_eq!(resolver.resolve("sub/../../secret.safetensors"), None);
        assert_eq!(resolver.resolve(&outside.to_string_lossy()), None);
        assert!(resolver.resolve("./inside.safetensors").is_some());
    }

    #[test]
    fn test_extension_filter() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "x/ink.bin");
        let resolver = SearchPathResolver::new([temp_dir.path().to_path_buf()])
            .with_extensions(vec![".safetensors".to_string()]);

        assert_eq!(resolver.resolve("ink"), None);
    }

    #[test]
    fn test_add_root() {
        let temp_dir = TempDir::new().unwrap();
        let mut resolver = SearchPathResolver::new([]);
        assert!(resolver.add_root(temp_dir.path()).is_ok());
        assert!(matches!(
            resolver.add_root(temp_dir.path().join("missing")),
            Err(ResolverError::InvalidRoot(_))
        ));
        assert_eq!(resolver.roots().len(), 1);
    }
}
