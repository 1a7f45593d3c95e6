//! Parse command

use loraplan_pipeline::dsl;
use std::io::Read;

pub fn run(input: &str) -> Result<(), Box<dyn std::error::Error>> {
    let text = if input == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        input.to_string()
    };

    let entries = dsl::parse(&text);
    if entries.is_empty() {
        println!("No schedule entries found.");
        return Ok(());
    }

    println!("Entries:");
    println!("{}", serde_json::to_string_pretty(&entries)?);
    println!();
    println!("Canonical:");
    println!("{}", dsl::serialize(&entries));

    Ok(())
}
