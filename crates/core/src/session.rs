//! Tool-server session protocol.
//!
//! A session is one live connection to one tool server. The transport is
//! opaque (child-process pipe, in-process registry, socket); only the
//! `initialize → catalog` and `{tool_name, arguments} → {status, payload}`
//! contract matters to the dispatcher.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use crate::error::TransportError;
use crate::tool::{ToolDescriptor, ToolResult};

/// Connection state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Ready,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// How to start or reach one tool server.
///
/// Maps to a `[[servers]]` entry in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session id (e.g. "gmail", "math")
    pub id: String,

    /// Executable to spawn, or `builtin:<name>` for an in-process server
    pub command: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_true() -> bool {
    true
}

impl SessionConfig {
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            enabled: true,
            description: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// The in-process server name, if the command is `builtin:<name>`.
    pub fn builtin_name(&self) -> Option<&str> {
        self.command.strip_prefix("builtin:")
    }
}

/// One connection to a tool server.
///
/// Methods take `&mut self`: a session speaks one request at a time and the
/// dispatcher serializes access to it.
#[async_trait]
pub trait ToolSession: Send {
    /// Handshake; returns the tools this session owns.
    async fn initialize(&mut self) -> std::result::Result<Vec<ToolDescriptor>, TransportError>;

    /// Forward one call. A tool-level failure is `Ok` with an error status;
    /// `Err` means the channel itself failed.
    async fn call(
        &mut self,
        tool: &str,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, TransportError>;

    /// Release the channel. Must be safe to call more than once.
    async fn close(&mut self);
}

/// Opens sessions from their configuration.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(
        &self,
        config: &SessionConfig,
    ) -> std::result::Result<Box<dyn ToolSession>, TransportError>;
}
