//! Detect command

use loraplan_pipeline::LoraEngine;
use std::path::Path;

/// `target` is a file path or a LoRA name looked up in the search roots
pub fn run(engine: &LoraEngine, target: &str, force: bool, lineage: bool) {
    let path = if Path::new(target).is_file() {
        Path::new(target).to_path_buf()
    } else {
        match engine.resolve_path(target) {
            Some(path) => path,
            None => {
                println!("LoRA '{}' not found.", target);
                println!("Use '--root <dir>' to add a search root.");
                return;
            }
        }
    };

    let arch = if lineage {
        engine.detect_lineage(&path, force)
    } else {
        engine.detect_architecture(&path, force)
    };

    println!("{}: {}", path.display(), arch);
}
