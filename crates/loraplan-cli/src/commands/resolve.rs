//! Resolve command

use loraplan_pipeline::{LoraEngine, ScheduleConfig};
use std::path::Path;

pub fn run(
    engine: &LoraEngine,
    schedule: Option<&Path>,
    text: Option<&str>,
    prior: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = match schedule {
        Some(path) => ScheduleConfig::from_file(path)?,
        None => ScheduleConfig::default(),
    };

    let prior = prior.map(|p| engine.resolve_schedule(&[], Some(p), None).plan);
    let resolution = engine.resolve_schedule(&config.entries, text, prior.as_ref());

    println!("Mode: {}", resolution.mode);
    println!();

    if resolution.plan.is_empty() {
        println!("No hooks.");
    } else {
        println!("Hooks ({}):", resolution.plan.len());
        for hook in resolution.plan.iter() {
            println!(
                "  - {} (model {}, clip {}, {} tensors, {} keyframes)",
                hook.name,
                hook.strength_model,
                hook.strength_clip,
                hook.tensors.len(),
                hook.keyframes.len()
            );
        }
    }

    println!();
    println!("Text:");
    println!("{}", resolution.text);
    println!();
    println!("Trigger words: {}", resolution.trigger_text());

    let stats = engine.cache_stats();
    println!();
    println!(
        "Cache: {} entries, {} hits, {} misses ({:.0}% hit rate)",
        stats.entries,
        stats.hits,
        stats.misses,
        stats.hit_rate() * 100.0
    );

    Ok(())
}
