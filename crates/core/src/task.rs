//! Task-level types: terminal states, caller overrides, and the outcome.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use crate::memory::MemoryItem;
use crate::perception::{ENTITIES_KEY, INTENT_KEY, TOOL_HINT_KEY};

/// State of one agent task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Running,
    Answered,
    Exhausted,
    Failed,
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Answered => "answered",
            Self::Exhausted => "exhausted",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Optional key/value overrides supplied with a request.
///
/// `intent`, `tool_hint` and `entities` override the perception; every other
/// key (e.g. `user_email`) is shown to the planner as a context fact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskContext(BTreeMap<String, String>);

impl TaskContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Layer `other` on top of `self`; keys in `other` win.
    pub fn merged(mut self, other: &TaskContext) -> Self {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
        self
    }

    /// Keys that are not perception overrides, in key order.
    pub fn facts(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), INTENT_KEY | TOOL_HINT_KEY | ENTITIES_KEY))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, String>> for TaskContext {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

/// What the caller gets back from one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub answer: String,
    pub terminal_state: TerminalState,

    /// Iterations executed
    pub steps: u32,

    /// Reason for a `failed` outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,

    /// Memory transcript in insertion order
    #[serde(default)]
    pub memory: Vec<MemoryItem>,
}

impl TaskOutcome {
    pub fn is_answered(&self) -> bool {
        self.terminal_state == TerminalState::Answered
    }
}
