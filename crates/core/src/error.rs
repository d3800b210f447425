//! Error types for the Cortex domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] wraps them all.

use thiserror::Error;

/// The top-level error type for all Cortex operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Initialization error: {0}")]
    Init(#[from] InitError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures while bringing tool-server sessions up.
///
/// `Conflict` and `NoSessions` are fatal configuration errors; a single
/// `SessionUnreachable` is only fatal when every session fails.
#[derive(Debug, Clone, Error)]
pub enum InitError {
    #[error("Tool '{tool}' is advertised by both '{first}' and '{second}'")]
    Conflict {
        tool: String,
        first: String,
        second: String,
    },

    #[error("Session '{session}' is unreachable: {reason}")]
    SessionUnreachable { session: String, reason: String },

    #[error("No tool-server session could be initialized ({} failed)", failures.len())]
    NoSessions { failures: Vec<InitError> },

    #[error("Dispatcher has already been initialized")]
    AlreadyInitialized,
}

/// Failures while routing a single tool call. All of these are recoverable
/// from the agent loop's point of view.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Tool {tool} timed out after {timeout_secs}s")]
    Timeout { tool: String, timeout_secs: u64 },

    #[error("Session '{session}' is down: {reason}")]
    SessionDown { session: String, reason: String },

    #[error("Dispatcher is not ready: {0}")]
    NotReady(String),
}

/// Failures on a session's transport channel.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Failed to start session '{session}': {reason}")]
    Spawn { session: String, reason: String },

    #[error("I/O failure: {0}")]
    Io(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Remote error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Channel closed")]
    Closed,
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Failures raised by an in-process tool implementation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Failures of the text-completion service.
#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Completion timed out after {0}s")]
    Timeout(u64),

    #[error("Malformed completion response: {0}")]
    Malformed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Completion service not configured: {0}")]
    NotConfigured(String),
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Memory store is full ({capacity} items)")]
    Exhausted { capacity: usize },

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Errors that escape the agent loop instead of being recorded in memory.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("Dispatcher unavailable: {0}")]
    DispatcherUnavailable(String),

    #[error("Step budget must be at least 1")]
    InvalidBudget,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_error_displays_correctly() {
        let err = Error::Dispatch(DispatchError::Timeout {
            tool: "search".into(),
            timeout_secs: 120,
        });
        assert!(err.to_string().contains("search"));
        assert!(err.to_string().contains("120s"));
    }

    #[test]
    fn no_sessions_counts_failures() {
        let err = InitError::NoSessions {
            failures: vec![
                InitError::SessionUnreachable {
                    session: "gmail".into(),
                    reason: "spawn failed".into(),
                },
                InitError::SessionUnreachable {
                    session: "gdrive".into(),
                    reason: "handshake failed".into(),
                },
            ],
        };
        assert!(err.to_string().contains("2 failed"));
    }

    #[test]
    fn conflict_names_both_sessions() {
        let err = InitError::Conflict {
            tool: "search".into(),
            first: "web".into(),
            second: "docs".into(),
        };
        let text = err.to_string();
        assert!(text.contains("search"));
        assert!(text.contains("web"));
        assert!(text.contains("docs"));
    }
}
