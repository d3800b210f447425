//! Subcommand implementations and the setup they share.

pub mod call;
pub mod config_cmd;
pub mod run;
pub mod tools;

use cortex_config::{AppConfig, ConfigError};
use cortex_core::error::InitError;
use cortex_core::task::TaskContext;
use cortex_dispatcher::{DefaultConnector, Dispatcher, DispatcherSettings};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Load the config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let Some(path) = path else {
        return AppConfig::load();
    };
    let mut config = AppConfig::load_from(path)?;
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

/// A connector that knows every built-in server.
pub fn connector() -> DefaultConnector {
    cortex_tools::builtin_servers()
        .into_iter()
        .fold(DefaultConnector::new(), |connector, (name, factory)| {
            connector.with_builtin(name, factory)
        })
}

/// Start every enabled server in `config`.
pub async fn start_dispatcher(config: &AppConfig) -> Result<Arc<Dispatcher>, InitError> {
    let dispatcher = Dispatcher::with_settings(
        Arc::new(connector()),
        DispatcherSettings::from(&config.dispatcher),
    );
    dispatcher.initialize(&config.servers).await?;
    for failure in dispatcher.init_failures() {
        warn!(error = %failure, "Tool server unavailable");
    }
    Ok(Arc::new(dispatcher))
}

/// Split `KEY=VALUE` pairs.
pub fn split_pairs(pairs: &[String]) -> Result<Vec<(&str, &str)>, String> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| format!("expected KEY=VALUE, got '{pair}'"))
        })
        .collect()
}

/// Build task context overrides from `--set` pairs.
pub fn context_from_pairs(pairs: &[String]) -> Result<TaskContext, String> {
    Ok(split_pairs(pairs)?
        .into_iter()
        .fold(TaskContext::new(), |context, (k, v)| context.with(k, v)))
}
