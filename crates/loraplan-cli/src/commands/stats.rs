//! Stats command

use loraplan_core::ArchitectureTag;
use loraplan_pipeline::LoraEngine;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

pub async fn run(
    engine: &LoraEngine,
    paths: Vec<PathBuf>,
    arch: Option<ArchitectureTag>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Analyzing {} file(s)", paths.len());

    let handles: Vec<_> = paths
        .into_iter()
        .map(move |path| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let arch = match arch {
                    Some(arch) => arch,
                    None => {
                        let (engine, path) = (engine.clone(), path.clone());
                        let detect = move || engine.detect_architecture(&path, false);
                        tokio::task::spawn_blocking(detect).await.unwrap_or_default()
                    }
                };
                let stats = engine.compute_statistics_async(path.clone(), false, arch).await;
                (path, arch, stats)
            })
        })
        .collect();

    let mut report = Vec::with_capacity(handles.len());
    for handle in handles {
        let (path, arch, stats) = handle.await?;
        report.push(json!({
            "path": path.display().to_string(),
            "architecture": arch,
            "energy_by_tag": stats.as_ref().map(|s| s.energy_by_tag()),
            "statistics": stats.as_deref(),
        }));
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
