//! `cortex run` — Run one task through the agent loop.

use super::{context_from_pairs, load_config, start_dispatcher};
use cortex_agent::{AgentLoop, Planner};
use cortex_config::AppConfig;
use cortex_core::task::{TaskContext, TerminalState};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub async fn run(
    config_path: Option<&Path>,
    message: &str,
    steps: Option<u32>,
    set: &[String],
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let overrides = context_from_pairs(set)?;

    // Check for an API key early, with a clear error
    if !config.has_api_key() && config.provider.api_url.is_none() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    GEMINI_API_KEY   (provider.kind = \"gemini\")");
        eprintln!("    OPENAI_API_KEY   (provider.kind = \"openai\")");
        eprintln!("    CORTEX_API_KEY   (either)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let completion = cortex_providers::build_from_config(&config.provider)?;
    let planner = Planner::new(completion)
        .with_timeout(Duration::from_secs(config.agent.planner_timeout_secs));
    let dispatcher = start_dispatcher(&config).await?;

    let defaults = config
        .context
        .iter()
        .fold(TaskContext::new(), |context, (k, v)| context.with(k, v));
    let agent = AgentLoop::new(Arc::new(planner), dispatcher.clone())
        .with_summary_chars(config.agent.result_summary_chars)
        .with_memory_capacity(config.agent.memory_capacity)
        .with_context(defaults);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let budget = steps.unwrap_or(config.agent.step_budget);
    let outcome = agent
        .run_with_cancel(message, budget, Some(&overrides), cancel)
        .await;
    dispatcher.shutdown().await;
    let outcome = outcome?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!("{}", outcome.answer);
    match outcome.terminal_state {
        TerminalState::Answered => {}
        TerminalState::Exhausted => {
            eprintln!("  (step budget of {budget} exhausted after {} steps)", outcome.steps)
        }
        state => eprintln!(
            "  ({state}: {})",
            outcome.failure.as_deref().unwrap_or("no reason given")
        ),
    }
    Ok(())
}
