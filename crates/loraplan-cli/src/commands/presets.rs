//! Presets command

use loraplan_core::ui_config;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(&ui_config())?);
    Ok(())
}
