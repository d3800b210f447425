//! One flat tool namespace over many sessions.

use crate::coerce::coerce_arguments;
use crate::handle::SessionHandle;
use chrono::Utc;
use cortex_config::DispatcherConfig;
use cortex_core::error::{DispatchError, InitError, TransportError};
use cortex_core::event::{DomainEvent, EventBus};
use cortex_core::session::{SessionConfig, SessionConnector, SessionState};
use cortex_core::tool::{ToolArguments, ToolDescriptor, ToolResult};
use futures::StreamExt;
use futures::future::join_all;
use futures::stream;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Runtime knobs for a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Bound on one tool call, and on one session's connect + handshake
    pub call_timeout: Duration,

    /// Sessions opened in parallel during initialization
    pub init_concurrency: usize,

    /// Owned by a single task; torn down when that task is cancelled
    pub task_scoped: bool,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(120),
            init_concurrency: 4,
            task_scoped: false,
        }
    }
}

impl From<&DispatcherConfig> for DispatcherSettings {
    fn from(config: &DispatcherConfig) -> Self {
        Self {
            call_timeout: Duration::from_secs(config.call_timeout_secs),
            init_concurrency: config.init_concurrency,
            task_scoped: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Fresh,
    Initializing,
    Ready,
    Poisoned(String),
    ShutDown,
}

struct Registry {
    sessions: Vec<Arc<SessionHandle>>,
    routes: HashMap<String, usize>,
    failures: Vec<InitError>,
}

impl Registry {
    /// The handle owning `tool`, if that session is still ready.
    fn route(&self, tool: &str) -> Option<&Arc<SessionHandle>> {
        self.routes
            .get(tool)
            .map(|&index| &self.sessions[index])
            .filter(|handle| handle.is_ready())
    }
}

/// Routes tool calls to the session that advertised them.
///
/// Initialized once; afterwards shareable across concurrent tasks behind an
/// `Arc`. Calls to one session are serialized by its [`SessionHandle`];
/// calls to different sessions proceed in parallel.
pub struct Dispatcher {
    connector: Arc<dyn SessionConnector>,
    settings: DispatcherSettings,
    phase: RwLock<Phase>,
    registry: OnceLock<Registry>,
    events: Option<Arc<EventBus>>,
}

impl Dispatcher {
    pub fn new(connector: Arc<dyn SessionConnector>) -> Self {
        Self::with_settings(connector, DispatcherSettings::default())
    }

    pub fn with_settings(connector: Arc<dyn SessionConnector>, settings: DispatcherSettings) -> Self {
        Self {
            connector,
            settings,
            phase: RwLock::new(Phase::Fresh),
            registry: OnceLock::new(),
            events: None,
        }
    }

    /// Publish dispatch and session events to `bus`.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    /// Connect every enabled session, run its handshake, and merge the
    /// catalogs.
    ///
    /// Unreachable sessions are skipped unless none succeed. A tool name
    /// advertised twice, by two sessions or by one, is fatal: every opened session is closed
    /// and later calls are refused.
    pub async fn initialize(&self, configs: &[SessionConfig]) -> Result<(), InitError> {
        {
            let mut phase = self.phase.write().unwrap_or_else(PoisonError::into_inner);
            if *phase != Phase::Fresh {
                return Err(InitError::AlreadyInitialized);
            }
            *phase = Phase::Initializing;
        }

        let enabled: Vec<&SessionConfig> = configs.iter().filter(|c| c.enabled).collect();
        info!(
            sessions = enabled.len(),
            concurrency = self.settings.init_concurrency,
            "Initializing tool sessions"
        );

        let opened: Vec<Result<Arc<SessionHandle>, InitError>> = stream::iter(enabled)
            .map(|config| self.open_session(config))
            .buffered(self.settings.init_concurrency.max(1))
            .collect()
            .await;

        let mut sessions = Vec::new();
        let mut failures = Vec::new();
        for outcome in opened {
            match outcome {
                Ok(handle) => sessions.push(handle),
                Err(e) => {
                    warn!(error = %e, "Session skipped");
                    failures.push(e);
                }
            }
        }

        if sessions.is_empty() {
            let err = InitError::NoSessions { failures };
            self.set_phase(Phase::Poisoned(err.to_string()));
            return Err(err);
        }

        let mut routes: HashMap<String, usize> = HashMap::new();
        let mut conflict = None;
        'merge: for (index, handle) in sessions.iter().enumerate() {
            for tool in handle.tools() {
                // A session listing the same name twice conflicts with itself
                if let Some(previous) = routes.insert(tool.name.clone(), index) {
                    conflict = Some(InitError::Conflict {
                        tool: tool.name.clone(),
                        first: sessions[previous].id().to_string(),
                        second: handle.id().to_string(),
                    });
                    break 'merge;
                }
            }
        }

        if let Some(err) = conflict {
            let reason = err.to_string();
            join_all(sessions.iter().map(|handle| handle.close(&reason))).await;
            self.set_phase(Phase::Poisoned(reason));
            return Err(err);
        }

        info!(
            sessions = sessions.len(),
            tools = routes.len(),
            failed = failures.len(),
            "Dispatcher ready"
        );
        let registry = Registry {
            sessions,
            routes,
            failures,
        };
        if self.registry.set(registry).is_err() {
            return Err(InitError::AlreadyInitialized);
        }
        self.set_phase(Phase::Ready);
        Ok(())
    }

    async fn open_session(&self, config: &SessionConfig) -> Result<Arc<SessionHandle>, InitError> {
        let unreachable = |reason: String| InitError::SessionUnreachable {
            session: config.id.clone(),
            reason,
        };

        let opened = tokio::time::timeout(self.settings.call_timeout, async {
            let session = self.connector.connect(config).await?;
            let handle = SessionHandle::new(&config.id, session);
            let handshake = handle.handshake().await.map(|tools| tools.len());
            match handshake {
                Ok(tools) => {
                    info!(session = %config.id, tools, "Session ready");
                    Ok::<SessionHandle, TransportError>(handle)
                }
                Err(e) => {
                    handle.close(&e.to_string()).await;
                    Err(e)
                }
            }
        })
        .await;

        match opened {
            Ok(Ok(handle)) => Ok(Arc::new(handle)),
            Ok(Err(e)) => Err(unreachable(e.to_string())),
            Err(_) => Err(unreachable(format!(
                "handshake timed out after {}s",
                self.settings.call_timeout.as_secs()
            ))),
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.phase.read().unwrap_or_else(PoisonError::into_inner) == Phase::Ready
    }

    /// Merged catalog of every ready session, in configuration order.
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        let Ok(registry) = self.ready_registry() else {
            return Vec::new();
        };
        registry
            .sessions
            .iter()
            .filter(|handle| handle.is_ready())
            .flat_map(|handle| handle.tools().iter().cloned())
            .collect()
    }

    pub fn descriptor(&self, name: &str) -> Option<ToolDescriptor> {
        let registry = self.ready_registry().ok()?;
        registry
            .route(name)?
            .tools()
            .iter()
            .find(|tool| tool.name == name)
            .cloned()
    }

    /// Per-session lifecycle state, in configuration order.
    pub fn session_states(&self) -> Vec<(String, SessionState)> {
        self.registry
            .get()
            .map(|registry| {
                registry
                    .sessions
                    .iter()
                    .map(|handle| (handle.id().to_string(), handle.state()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Sessions that could not be opened during initialization.
    pub fn init_failures(&self) -> Vec<InitError> {
        self.registry
            .get()
            .map(|registry| registry.failures.clone())
            .unwrap_or_default()
    }

    /// Validate planner arguments against the tool's schema.
    pub fn prepare(&self, name: &str, args: &ToolArguments) -> Result<Value, DispatchError> {
        self.ready_registry()?;
        let descriptor = self
            .descriptor(name)
            .ok_or_else(|| DispatchError::UnknownTool(name.to_string()))?;
        coerce_arguments(&descriptor, args).map_err(|e| DispatchError::InvalidArguments {
            tool: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Forward a call to the owning session, bounded by the call timeout.
    ///
    /// A transport failure closes the session; its tools disappear from
    /// [`list_tools`](Self::list_tools) and other sessions are unaffected.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult, DispatchError> {
        let registry = self.ready_registry()?;
        let handle = registry
            .route(name)
            .ok_or_else(|| DispatchError::UnknownTool(name.to_string()))?
            .clone();

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.settings.call_timeout, handle.call(name, arguments)).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(Ok(result)) => {
                debug!(tool = name, session = handle.id(), status = ?result.status, duration_ms, "Tool call finished");
                self.publish_dispatch(name, handle.id(), result.is_ok(), duration_ms);
                Ok(result)
            }
            Ok(Err(e)) => {
                let reason = e.to_string();
                warn!(tool = name, session = handle.id(), error = %reason, "Session transport failed");
                handle.close(&reason).await;
                self.publish_dispatch(name, handle.id(), false, duration_ms);
                self.publish(DomainEvent::SessionClosed {
                    session: handle.id().to_string(),
                    reason: reason.clone(),
                    timestamp: Utc::now(),
                });
                Err(DispatchError::SessionDown {
                    session: handle.id().to_string(),
                    reason,
                })
            }
            Err(_) => {
                let timeout_secs = self.settings.call_timeout.as_secs();
                warn!(tool = name, session = handle.id(), timeout_secs, "Tool call timed out");
                self.publish_dispatch(name, handle.id(), false, duration_ms);
                Err(DispatchError::Timeout {
                    tool: name.to_string(),
                    timeout_secs,
                })
            }
        }
    }

    /// [`prepare`](Self::prepare) then [`call_tool`](Self::call_tool).
    pub async fn invoke(&self, name: &str, args: &ToolArguments) -> Result<ToolResult, DispatchError> {
        let arguments = self.prepare(name, args)?;
        self.call_tool(name, arguments).await
    }

    /// Close every session. Idempotent.
    pub async fn shutdown(&self) {
        {
            let mut phase = self.phase.write().unwrap_or_else(PoisonError::into_inner);
            if *phase == Phase::ShutDown {
                return;
            }
            *phase = Phase::ShutDown;
        }

        if let Some(registry) = self.registry.get() {
            let open: Vec<&Arc<SessionHandle>> = registry
                .sessions
                .iter()
                .filter(|handle| handle.state() != SessionState::Closed)
                .collect();
            join_all(open.iter().map(|handle| handle.close("dispatcher shut down"))).await;
            for handle in open {
                self.publish(DomainEvent::SessionClosed {
                    session: handle.id().to_string(),
                    reason: "dispatcher shut down".into(),
                    timestamp: Utc::now(),
                });
            }
            info!(sessions = registry.sessions.len(), "Dispatcher shut down");
        }
    }

    /// Called when the task using this dispatcher is cancelled. Shared
    /// dispatchers stay up for other tasks.
    pub async fn release_for_cancelled_task(&self) {
        if self.settings.task_scoped {
            self.shutdown().await;
        }
    }

    fn ready_registry(&self) -> Result<&Registry, DispatchError> {
        let phase = self.phase.read().unwrap_or_else(PoisonError::into_inner).clone();
        match phase {
            Phase::Ready => self
                .registry
                .get()
                .ok_or_else(|| DispatchError::NotReady("registry missing".into())),
            Phase::Fresh | Phase::Initializing => Err(DispatchError::NotReady("not initialized".into())),
            Phase::Poisoned(reason) => Err(DispatchError::NotReady(reason)),
            Phase::ShutDown => Err(DispatchError::NotReady("shut down".into())),
        }
    }

    fn set_phase(&self, next: Phase) {
        *self.phase.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn publish_dispatch(&self, tool: &str, session: &str, success: bool, duration_ms: u64) {
        self.publish(DomainEvent::ToolDispatched {
            tool_name: tool.to_string(),
            session: session.to_string(),
            success,
            duration_ms,
            timestamp: Utc::now(),
        });
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("settings", &self.settings)
            .field("sessions", &self.session_states())
            .finish()
    }
}
