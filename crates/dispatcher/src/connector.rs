//! Session connector that understands both process and built-in servers.

use crate::local::LocalSession;
use crate::stdio::ProcessConnector;
use async_trait::async_trait;
use cortex_core::error::TransportError;
use cortex_core::session::{SessionConfig, SessionConnector, ToolSession};
use cortex_core::tool::ToolRegistry;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a fresh registry for one in-process session.
pub type BuiltinFactory = Arc<dyn Fn() -> ToolRegistry + Send + Sync>;

/// Routes `builtin:<name>` commands to registered in-process servers and
/// spawns everything else as a child process.
#[derive(Default, Clone)]
pub struct DefaultConnector {
    builtins: HashMap<String, BuiltinFactory>,
    process: ProcessConnector,
}

impl DefaultConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> ToolRegistry + Send + Sync + 'static,
    {
        self.builtins.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn builtin_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.builtins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl SessionConnector for DefaultConnector {
    async fn connect(&self, config: &SessionConfig) -> Result<Box<dyn ToolSession>, TransportError> {
        match config.builtin_name() {
            Some(name) => {
                let factory = self.builtins.get(name).ok_or_else(|| TransportError::Spawn {
                    session: config.id.clone(),
                    reason: format!("no built-in server named '{name}'"),
                })?;
                Ok(Box::new(LocalSession::new(factory())))
            }
            None => self.process.connect(config).await,
        }
    }
}

impl std::fmt::Debug for DefaultConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultConnector")
            .field("builtins", &self.builtin_names())
            .finish()
    }
}
