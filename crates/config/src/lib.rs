//! Configuration loading, validation, and management for Cortex.
//!
//! Loads configuration from `~/.cortex/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use cortex_core::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.cortex/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Completion service used by the planner
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Tool dispatcher settings
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Tool servers, in catalog order
    #[serde(default = "default_servers")]
    pub servers: Vec<SessionConfig>,

    /// Default context overrides applied to every task
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

/// Which completion API the planner talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Gemini,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => f.write_str("openai"),
            Self::Gemini => f.write_str("gemini"),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_kind")]
    pub kind: ProviderKind,

    /// Base URL; the provider's public endpoint when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_provider_kind() -> ProviderKind {
    ProviderKind::Gemini
}
fn default_model() -> String {
    "gemini-2.0-flash".into()
}
fn default_temperature() -> f32 {
    0.2
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            api_url: None,
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum loop iterations per task
    #[serde(default = "default_step_budget")]
    pub step_budget: u32,

    #[serde(default = "default_planner_timeout")]
    pub planner_timeout_secs: u64,

    /// Tool results longer than this are truncated in memory
    #[serde(default = "default_summary_chars")]
    pub result_summary_chars: usize,

    /// Memory items one task may write
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,
}

fn default_step_budget() -> u32 {
    3
}
fn default_planner_timeout() -> u64 {
    60
}
fn default_summary_chars() -> usize {
    2000
}
fn default_memory_capacity() -> usize {
    256
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            step_budget: default_step_budget(),
            planner_timeout_secs: default_planner_timeout(),
            result_summary_chars: default_summary_chars(),
            memory_capacity: default_memory_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Per-call timeout, also bounding each session's handshake
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Sessions opened in parallel at startup
    #[serde(default = "default_init_concurrency")]
    pub init_concurrency: usize,
}

fn default_call_timeout() -> u64 {
    120
}
fn default_init_concurrency() -> usize {
    4
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout(),
            init_concurrency: default_init_concurrency(),
        }
    }
}

fn default_servers() -> Vec<SessionConfig> {
    let mut math = SessionConfig::new("math", "builtin:math");
    math.description = Some("Built-in arithmetic and list tools".into());
    vec![math]
}

impl AppConfig {
    /// Load configuration from the default path (~/.cortex/config.toml).
    ///
    /// Environment overrides:
    /// - `CORTEX_API_KEY` (highest priority), then `GEMINI_API_KEY` or
    ///   `OPENAI_API_KEY` depending on `provider.kind`
    /// - `CORTEX_MODEL`
    /// - `CORTEX_STEP_BUDGET`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider_key = match self.provider.kind {
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
        };
        if let Some(key) = lookup("CORTEX_API_KEY") {
            self.provider.api_key = Some(key);
        } else if self.provider.api_key.is_none() {
            self.provider.api_key = lookup(provider_key);
        }

        if let Some(model) = lookup("CORTEX_MODEL") {
            self.provider.model = model;
        }

        if let Some(budget) = lookup("CORTEX_STEP_BUDGET") {
            self.agent.step_budget = budget.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("CORTEX_STEP_BUDGET is not a number: {budget}"))
            })?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".cortex")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.into()));

        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return invalid("provider.temperature must be between 0.0 and 2.0");
        }
        if self.agent.step_budget == 0 {
            return invalid("agent.step_budget must be at least 1");
        }
        if self.agent.planner_timeout_secs == 0 {
            return invalid("agent.planner_timeout_secs must be > 0");
        }
        if self.agent.result_summary_chars == 0 {
            return invalid("agent.result_summary_chars must be > 0");
        }
        if self.agent.memory_capacity == 0 {
            return invalid("agent.memory_capacity must be > 0");
        }
        if self.dispatcher.call_timeout_secs == 0 {
            return invalid("dispatcher.call_timeout_secs must be > 0");
        }
        if self.dispatcher.init_concurrency == 0 {
            return invalid("dispatcher.init_concurrency must be > 0");
        }

        let mut seen = HashSet::new();
        for server in &self.servers {
            if server.id.trim().is_empty() {
                return invalid("servers[].id must not be empty");
            }
            if server.command.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "server '{}' has an empty command",
                    server.id
                )));
            }
            if !seen.insert(server.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate server id '{}'",
                    server.id
                )));
            }
        }

        Ok(())
    }

    /// Servers that will be started.
    pub fn enabled_servers(&self) -> impl Iterator<Item = &SessionConfig> {
        self.servers.iter().filter(|s| s.enabled)
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            agent: AgentConfig::default(),
            dispatcher: DispatcherConfig::default(),
            servers: default_servers(),
            context: BTreeMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.step_budget, 3);
        assert_eq!(config.dispatcher.call_timeout_secs, 120);
        assert_eq!(config.dispatcher.init_concurrency, 4);
        assert_eq!(config.servers[0].command, "builtin:math");
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.provider.kind, config.provider.kind);
        assert_eq!(parsed.servers, config.servers);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.provider.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_budget_and_timeouts_rejected() {
        let mut config = AppConfig::default();
        config.agent.step_budget = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.dispatcher.call_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.dispatcher.init_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_server_ids_rejected() {
        let mut config = AppConfig::default();
        config.servers.push(SessionConfig::new("math", "python"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate server id 'math'"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.provider.kind, ProviderKind::Gemini);
    }

    #[test]
    fn config_file_is_parsed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[provider]
kind = "openai"
api_url = "http://localhost:11434/v1"
model = "llama3"

[agent]
step_budget = 5

[[servers]]
id = "gmail"
command = "python"
args = ["mcp_servers/gmail_server.py"]
env = {{ GMAIL_TOKEN = "token.json" }}

[[servers]]
id = "search"
command = "python"
args = ["mcp_servers/search_server.py"]
enabled = false

[context]
user_email = "me@example.com"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.provider.kind, ProviderKind::OpenAi);
        assert_eq!(config.agent.step_budget, 5);
        assert_eq!(config.agent.planner_timeout_secs, 60);
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.servers[0].env["GMAIL_TOKEN"], "token.json");
        assert_eq!(config.enabled_servers().count(), 1);
        assert_eq!(config.context["user_email"], "me@example.com");
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[agent\nstep_budget = ").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_api_key_by_priority() {
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(env(&[("GEMINI_API_KEY", "g"), ("OPENAI_API_KEY", "o")]))
            .unwrap();
        assert_eq!(config.provider.api_key.as_deref(), Some("g"));

        config
            .apply_env_overrides(env(&[("CORTEX_API_KEY", "c"), ("GEMINI_API_KEY", "g")]))
            .unwrap();
        assert_eq!(config.provider.api_key.as_deref(), Some("c"));
    }

    #[test]
    fn env_overrides_model_and_budget() {
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(env(&[("CORTEX_MODEL", "gemini-pro"), ("CORTEX_STEP_BUDGET", "7")]))
            .unwrap();
        assert_eq!(config.provider.model, "gemini-pro");
        assert_eq!(config.agent.step_budget, 7);

        let err = config
            .apply_env_overrides(env(&[("CORTEX_STEP_BUDGET", "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn api_key_is_redacted_in_debug() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("step_budget = 3"));
        assert!(toml_str.contains("builtin:math"));
    }
}
