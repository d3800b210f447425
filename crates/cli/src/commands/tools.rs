//! `cortex tools` — List the merged tool catalog.

use super::{load_config, start_dispatcher};
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let dispatcher = start_dispatcher(&config).await?;

    println!("Sessions:");
    for (id, state) in dispatcher.session_states() {
        println!("  {id:<16} {state}");
    }
    for failure in dispatcher.init_failures() {
        println!("  {failure}");
    }

    println!();
    println!("Tools:");
    for tool in dispatcher.list_tools() {
        println!("  {}", tool.signature());
        if !tool.usage.is_empty() {
            println!("      {}", tool.usage);
        }
    }

    dispatcher.shutdown().await;
    Ok(())
}
