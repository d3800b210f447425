//! The planner's single decision per step.

use serde::{Deserialize, Serialize};
use std::fmt;
use crate::tool::ToolArguments;

/// The safe default answer when nothing better is available.
pub const UNKNOWN_ANSWER: &str = "unknown";

/// Exactly one of: invoke a tool, or finish with an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Directive {
    Invoke {
        tool_name: String,
        arguments: ToolArguments,
    },
    Finalize {
        answer: String,
    },
}

impl Directive {
    pub fn invoke(tool_name: impl Into<String>, arguments: ToolArguments) -> Self {
        Self::Invoke {
            tool_name: tool_name.into(),
            arguments,
        }
    }

    pub fn finalize(answer: impl Into<String>) -> Self {
        Self::Finalize {
            answer: answer.into(),
        }
    }

    /// `Finalize{"unknown"}`, the planner's fallback.
    pub fn unknown() -> Self {
        Self::finalize(UNKNOWN_ANSWER)
    }

    pub fn is_finalize(&self) -> bool {
        matches!(self, Self::Finalize { .. })
    }
}

/// Renders back into the single-line grammar the planner parses.
impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invoke { tool_name, arguments } if arguments.is_empty() => {
                write!(f, "FUNCTION_CALL: {tool_name}")
            }
            Self::Invoke { tool_name, arguments } => {
                write!(f, "FUNCTION_CALL: {tool_name}|{arguments}")
            }
            Self::Finalize { answer } => write!(f, "FINAL_ANSWER: [{answer}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ArgValue;

    #[test]
    fn display_uses_grammar() {
        let call = Directive::invoke(
            "add",
            ToolArguments::new()
                .with("a", ArgValue::text("5"))
                .with("b", ArgValue::text("3")),
        );
        assert_eq!(call.to_string(), "FUNCTION_CALL: add|a=5|b=3");
        assert_eq!(Directive::invoke("get_updates", ToolArguments::new()).to_string(), "FUNCTION_CALL: get_updates");
        assert_eq!(Directive::unknown().to_string(), "FINAL_ANSWER: [unknown]");
    }
}
