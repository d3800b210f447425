//! The append-only log of facts a task accumulates step by step.
//!
//! Every completed step of the agent loop records one [`MemoryItem`]. Items
//! are never mutated or removed, and insertion order is the only read order.
//! A store belongs to exactly one task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use crate::error::MemoryError;
use crate::tool::ToolArguments;

/// Where a memory item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    ToolResult,
    Error,
    Note,
}

impl fmt::Display for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ToolResult => "tool_result",
            Self::Error => "error",
            Self::Note => "note",
        };
        f.write_str(s)
    }
}

/// Structured record of the invocation a memory item describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryPayload {
    pub tool: String,

    /// Arguments as the planner wrote them
    pub arguments: ToolArguments,

    /// Arguments after schema coercion, as sent to the tool; `None` when
    /// they never passed validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepared: Option<Value>,

    /// Result summary; `None` when the call never produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// One recorded fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Monotonic sequence index, assigned at insertion
    pub index: u64,

    /// Short fact string shown to the planner
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<MemoryPayload>,

    pub source: MemorySource,

    pub created_at: DateTime<Utc>,
}

impl MemoryItem {
    /// Whether this item records an invocation (successful or not).
    pub fn is_invocation(&self) -> bool {
        self.payload.is_some() && self.source != MemorySource::Note
    }
}

/// An append-only memory log.
///
/// Implementations: bounded in-memory store (`cortex-memory`).
pub trait MemoryStore: Send {
    /// The backend name (e.g., "in_memory").
    fn name(&self) -> &str;

    /// Append one fact and return its sequence index.
    fn append(
        &mut self,
        source: MemorySource,
        content: String,
        payload: Option<MemoryPayload>,
    ) -> std::result::Result<u64, MemoryError>;

    /// All items in insertion order.
    fn items(&self) -> &[MemoryItem];

    fn len(&self) -> usize {
        self.items().len()
    }

    fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// The `n` most recent invocation items, newest first.
    fn recent_invocations(&self, n: usize) -> Vec<&MemoryItem> {
        self.items()
            .iter()
            .rev()
            .filter(|item| item.is_invocation())
            .take(n)
            .collect()
    }

    /// The most recent successful tool result summary.
    fn last_tool_result(&self) -> Option<&str> {
        self.items()
            .iter()
            .rev()
            .filter(|item| item.source == MemorySource::ToolResult)
            .find_map(|item| item.payload.as_ref().and_then(|p| p.result.as_deref()))
    }
}
