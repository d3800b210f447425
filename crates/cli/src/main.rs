//! Cortex CLI — the main entry point.
//!
//! Commands:
//! - `run`     — Run one task through the agent loop
//! - `tools`   — Start the configured tool servers and list the catalog
//! - `call`    — Dispatch a single tool call directly
//! - `config`  — Print the default configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "cortex",
    about = "Cortex — an autonomous task agent over tool servers",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.cortex/config.toml)
    #[arg(short, long, global = true, env = "CORTEX_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task to completion and print the answer
    Run {
        /// The request to work on
        #[arg(short, long)]
        message: String,

        /// Step budget (overrides `agent.step_budget`)
        #[arg(short, long)]
        steps: Option<u32>,

        /// Context override, e.g. `--set user_email=a@b.c` or `--set intent=math`
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Print the full outcome, memory transcript included, as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the merged tool catalog
    Tools,

    /// Call one tool directly, e.g. `cortex call add a=5 b=3`
    Call {
        tool: String,

        #[arg(value_name = "KEY=VALUE")]
        args: Vec<String>,
    },

    /// Print the default configuration file
    Config {
        /// Print the config file path instead
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries answers only
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Run {
            message,
            steps,
            set,
            json,
        } => commands::run::run(config_path, &message, steps, &set, json).await?,
        Commands::Tools => commands::tools::run(config_path).await?,
        Commands::Call { tool, args } => commands::call::run(config_path, &tool, &args).await?,
        Commands::Config { path } => {
            if path {
                commands::config_cmd::path(config_path)
            } else {
                commands::config_cmd::show()
            }
        }
    }

    Ok(())
}
