//! `cortex call` — Dispatch one tool call, bypassing the planner.
//!
//! Values are parsed exactly like planner output, so `input.int_list=[1,2]`
//! goes through the same coercion a `FUNCTION_CALL:` line would.

use super::{load_config, split_pairs, start_dispatcher};
use cortex_agent::parse_value;
use cortex_core::tool::ToolArguments;
use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    tool: &str,
    args: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let arguments = split_pairs(args)?
        .into_iter()
        .fold(ToolArguments::new(), |arguments, (k, v)| {
            arguments.with(k, parse_value(v))
        });

    let dispatcher = start_dispatcher(&config).await?;
    let outcome = dispatcher.invoke(tool, &arguments).await;
    dispatcher.shutdown().await;

    let result = outcome?;
    println!("{}", result.payload);
    if result.is_ok() {
        Ok(())
    } else {
        Err(format!("{tool} reported an error").into())
    }
}
