//! Structured view of a user request.
//!
//! Produced by an external collaborator (intent/entity extraction) and
//! consumed by the planner when it builds its prompt.

use serde::{Deserialize, Serialize};
use crate::task::TaskContext;

/// Context keys that override perception fields instead of becoming facts.
pub const INTENT_KEY: &str = "intent";
pub const TOOL_HINT_KEY: &str = "tool_hint";
pub const ENTITIES_KEY: &str = "entities";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Perception {
    pub user_input: String,

    #[serde(default)]
    pub intent: String,

    #[serde(default)]
    pub entities: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_hint: Option<String>,
}

impl Perception {
    /// A perception with only the raw input filled in.
    pub fn from_input(user_input: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            intent: String::new(),
            entities: Vec::new(),
            tool_hint: None,
        }
    }

    /// Apply the `intent`, `tool_hint` and `entities` overrides from a task
    /// context. `entities` is a comma-separated list.
    pub fn apply_overrides(mut self, context: &TaskContext) -> Self {
        if let Some(intent) = context.get(INTENT_KEY) {
            self.intent = intent.to_string();
        }
        if let Some(hint) = context.get(TOOL_HINT_KEY) {
            self.tool_hint = Some(hint.to_string()).filter(|h| !h.trim().is_empty());
        }
        if let Some(entities) = context.get(ENTITIES_KEY) {
            self.entities = entities
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(String::from)
                .collect();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_fields() {
        let context = TaskContext::new()
            .with("intent", "arithmetic")
            .with("entities", "5, 3,")
            .with("tool_hint", "add")
            .with("user_email", "someone@example.com");
        let perception = Perception::from_input("add 5 and 3").apply_overrides(&context);
        assert_eq!(perception.intent, "arithmetic");
        assert_eq!(perception.entities, vec!["5", "3"]);
        assert_eq!(perception.tool_hint.as_deref(), Some("add"));
    }

    #[test]
    fn no_overrides_keeps_defaults() {
        let perception = Perception::from_input("hi").apply_overrides(&TaskContext::new());
        assert!(perception.intent.is_empty());
        assert!(perception.tool_hint.is_none());
    }
}
