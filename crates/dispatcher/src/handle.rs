//! One registered session plus its lifecycle state.

use cortex_core::error::TransportError;
use cortex_core::session::{SessionState, ToolSession};
use cortex_core::tool::{ToolDescriptor, ToolResult};
use serde_json::Value;
use std::sync::{OnceLock, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A session as the dispatcher sees it.
///
/// The channel sits behind an async mutex, so calls routed to the same
/// session are serialized while calls to different sessions run in
/// parallel. The catalog is fixed once the handshake succeeds.
pub struct SessionHandle {
    id: String,
    status: RwLock<Status>,
    tools: OnceLock<Vec<ToolDescriptor>>,
    channel: Mutex<Option<Box<dyn ToolSession>>>,
}

#[derive(Debug, Clone)]
struct Status {
    state: SessionState,
    closed_reason: Option<String>,
}

impl SessionHandle {
    pub fn new(id: impl Into<String>, session: Box<dyn ToolSession>) -> Self {
        Self {
            id: id.into(),
            status: RwLock::new(Status {
                state: SessionState::Uninitialized,
                closed_reason: None,
            }),
            tools: OnceLock::new(),
            channel: Mutex::new(Some(session)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.status.read().unwrap_or_else(PoisonError::into_inner).state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    pub fn closed_reason(&self) -> Option<String> {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .closed_reason
            .clone()
    }

    /// The catalog advertised during the handshake (empty before it).
    pub fn tools(&self) -> &[ToolDescriptor] {
        self.tools.get().map(Vec::as_slice).unwrap_or_default()
    }

    /// Run the session handshake and record its catalog.
    pub async fn handshake(&self) -> Result<&[ToolDescriptor], TransportError> {
        let tools = {
            let mut channel = self.channel.lock().await;
            let session = channel.as_mut().ok_or(TransportError::Closed)?;
            session.initialize().await?
        };
        debug!(session = %self.id, tools = tools.len(), "Session handshake complete");

        let tools = self.tools.get_or_init(|| tools);
        self.set_state(SessionState::Ready, None);
        Ok(tools.as_slice())
    }

    /// Forward one call over the channel. Waits for any in-flight call on
    /// the same session.
    pub async fn call(&self, tool: &str, arguments: Value) -> Result<ToolResult, TransportError> {
        let mut channel = self.channel.lock().await;
        if self.state() == SessionState::Closed {
            return Err(TransportError::Closed);
        }
        let session = channel.as_mut().ok_or(TransportError::Closed)?;
        session.call(tool, arguments).await
    }

    /// Mark the session closed and release its channel. Idempotent; the
    /// first reason wins.
    pub async fn close(&self, reason: &str) {
        {
            let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
            if status.state != SessionState::Closed {
                status.state = SessionState::Closed;
                status.closed_reason = Some(reason.to_string());
                warn!(session = %self.id, reason, "Session closed");
            }
        }

        let session = self.channel.lock().await.take();
        if let Some(mut session) = session {
            session.close().await;
        }
    }

    fn set_state(&self, state: SessionState, reason: Option<String>) {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        if status.state != SessionState::Closed {
            status.state = state;
            status.closed_reason = reason;
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("tools", &self.tools().len())
            .finish()
    }
}
