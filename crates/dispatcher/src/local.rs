//! In-process sessions over a [`ToolRegistry`].

use async_trait::async_trait;
use cortex_core::error::{ToolError, TransportError};
use cortex_core::session::ToolSession;
use cortex_core::tool::{ToolDescriptor, ToolRegistry, ToolResult};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// A tool server living in this process. There is no channel to break, so
/// the only transport failure is a call after [`close`](ToolSession::close).
pub struct LocalSession {
    registry: Arc<ToolRegistry>,
    open: bool,
}

impl LocalSession {
    pub fn new(registry: impl Into<Arc<ToolRegistry>>) -> Self {
        Self {
            registry: registry.into(),
            open: true,
        }
    }
}

#[async_trait]
impl ToolSession for LocalSession {
    async fn initialize(&mut self) -> Result<Vec<ToolDescriptor>, TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        Ok(self.registry.descriptors())
    }

    async fn call(&mut self, tool: &str, arguments: Value) -> Result<ToolResult, TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        match self.registry.execute(tool, arguments).await {
            Ok(result) => Ok(result),
            Err(e @ (ToolError::NotFound(_) | ToolError::InvalidArguments(_))) => {
                Ok(ToolResult::error(e.to_string()))
            }
            Err(ToolError::ExecutionFailed { tool_name, reason }) => {
                debug!(tool = %tool_name, reason = %reason, "Local tool failed");
                Ok(ToolResult::error(reason))
            }
        }
    }

    async fn close(&mut self) {
        self.open = false;
    }
}
