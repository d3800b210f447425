//! The bounded agent loop.

use crate::planner::{DirectivePlanner, PlanRequest};
use chrono::Utc;
use cortex_core::directive::{Directive, UNKNOWN_ANSWER};
use cortex_core::error::AgentError;
use cortex_core::event::{DomainEvent, EventBus};
use cortex_core::memory::{MemoryPayload, MemorySource, MemoryStore};
use cortex_core::perception::Perception;
use cortex_core::task::{TaskContext, TaskOutcome, TerminalState};
use cortex_core::tool::ToolArguments;
use cortex_dispatcher::Dispatcher;
use cortex_memory::{InMemoryStore, summarize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How many recent invocations a new call is checked against.
const REPEAT_WINDOW: usize = 2;

/// Runs one task at a time against a shared dispatcher.
///
/// Each iteration asks the planner for one directive: an answer ends the
/// task, a tool call is validated, dispatched, and recorded in memory.
/// Failed calls become `error` memory items and the loop goes on until the
/// step budget runs out.
pub struct AgentLoop {
    planner: Arc<dyn DirectivePlanner>,
    dispatcher: Arc<Dispatcher>,
    summary_chars: usize,
    memory_capacity: usize,
    context: TaskContext,
    event_bus: Option<Arc<EventBus>>,
}

/// How the loop ended, before the outcome is assembled.
enum Exit {
    Answered(String),
    Exhausted,
    Failed(String),
}

impl AgentLoop {
    pub fn new(planner: Arc<dyn DirectivePlanner>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            planner,
            dispatcher,
            summary_chars: 2000,
            memory_capacity: cortex_memory::in_memory::DEFAULT_CAPACITY,
            context: TaskContext::new(),
            event_bus: None,
        }
    }

    /// Tool results longer than this are truncated in memory.
    pub fn with_summary_chars(mut self, chars: usize) -> Self {
        self.summary_chars = chars;
        self
    }

    pub fn with_memory_capacity(mut self, capacity: usize) -> Self {
        self.memory_capacity = capacity;
        self
    }

    /// Default context; per-run overrides are layered on top.
    pub fn with_context(mut self, context: TaskContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Run a task to completion.
    pub async fn run(
        &self,
        request: &str,
        step_budget: u32,
        overrides: Option<&TaskContext>,
    ) -> Result<TaskOutcome, AgentError> {
        self.run_with_cancel(request, step_budget, overrides, CancellationToken::new())
            .await
    }

    /// Run a task that may be cancelled. Cancellation is checked before
    /// every step and raced against the planner and the dispatcher; a
    /// cancelled task ends `failed`.
    ///
    /// Every iteration consumes one step, including calls rejected for an
    /// unknown tool or invalid arguments, so a planner stuck on a bad call
    /// still runs out of budget.
    pub async fn run_with_cancel(
        &self,
        request: &str,
        step_budget: u32,
        overrides: Option<&TaskContext>,
        cancel: CancellationToken,
    ) -> Result<TaskOutcome, AgentError> {
        if step_budget == 0 {
            return Err(AgentError::InvalidBudget);
        }
        if !self.dispatcher.is_ready() {
            return Err(AgentError::DispatcherUnavailable(
                "dispatcher is not initialized".into(),
            ));
        }

        let task_id = uuid::Uuid::new_v4().to_string();
        let context = match overrides {
            Some(overrides) => self.context.clone().merged(overrides),
            None => self.context.clone(),
        };
        let perception = Perception::from_input(request).apply_overrides(&context);
        let facts: Vec<(String, String)> = context
            .facts()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut memory = InMemoryStore::with_capacity(self.memory_capacity);

        info!(task_id = %task_id, step_budget, "Task started");
        self.publish(DomainEvent::TaskStarted {
            task_id: task_id.clone(),
            request_preview: preview(request),
            step_budget,
            timestamp: Utc::now(),
        });

        let mut step: u32 = 0;
        let mut must_finalize = false;

        let exit = loop {
            if cancel.is_cancelled() {
                break Exit::Failed("cancelled".into());
            }
            if step >= step_budget {
                break Exit::Exhausted;
            }

            let tools = self.dispatcher.list_tools();
            let plan = PlanRequest {
                perception: &perception,
                tools: &tools,
                memory: memory.items(),
                facts: &facts,
                step: step + 1,
                step_budget,
                must_finalize,
            };
            let Some(directive) = race(&cancel, self.planner.next_directive(&plan)).await else {
                break Exit::Failed("cancelled".into());
            };

            let directive = match directive {
                Directive::Invoke { tool_name, .. } if must_finalize => {
                    warn!(task_id = %task_id, tool = %tool_name, "Ignoring call after forced finalization");
                    Directive::finalize(memory.last_tool_result().unwrap_or(UNKNOWN_ANSWER))
                }
                other => other,
            };

            let (tool_name, arguments) = match directive {
                Directive::Finalize { answer } => {
                    step += 1;
                    break Exit::Answered(answer);
                }
                Directive::Invoke { tool_name, arguments } => (tool_name, arguments),
            };

            if tool_name.trim().is_empty() {
                step += 1;
                break Exit::Failed("planner returned a call without a tool name".into());
            }

            let label = call_label(&tool_name, &arguments);
            let record = match self.dispatcher.prepare(&tool_name, &arguments) {
                Err(e) => {
                    warn!(task_id = %task_id, tool = %tool_name, error = %e, "Call rejected");
                    Record::new(MemorySource::Error, format!("{label} failed: {e}"), &tool_name, &arguments, None)
                }
                Ok(prepared) => match repeated_result(&memory, &tool_name, &prepared) {
                    Some(previous) => {
                        debug!(task_id = %task_id, call = %label, "Skipping repeated call");
                        must_finalize = true;
                        let content = format!("{label} already returned: {previous}; answer now instead of repeating it");
                        Record::new(MemorySource::Note, content, &tool_name, &arguments, Some(prepared))
                    }
                    None => {
                        let call = self.dispatcher.call_tool(&tool_name, prepared.clone());
                        let Some(outcome) = race(&cancel, call).await else {
                            step += 1;
                            break Exit::Failed("cancelled".into());
                        };
                        match outcome {
                            Ok(result) if result.is_ok() => {
                                let summary = summarize(&result.payload, self.summary_chars);
                                let content = format!("{label} returned: {summary}");
                                Record::new(MemorySource::ToolResult, content, &tool_name, &arguments, Some(prepared))
                                    .with_result(summary)
                            }
                            Ok(result) => {
                                let reason = summarize(&result.payload, self.summary_chars);
                                warn!(task_id = %task_id, tool = %tool_name, reason = %reason, "Tool reported an error");
                                let content = format!("{label} failed: {reason}");
                                Record::new(MemorySource::Error, content, &tool_name, &arguments, Some(prepared))
                            }
                            Err(e) => {
                                warn!(task_id = %task_id, tool = %tool_name, error = %e, "Call not completed");
                                let content = format!("{label} failed: {e}");
                                Record::new(MemorySource::Error, content, &tool_name, &arguments, Some(prepared))
                            }
                        }
                    }
                },
            };

            step += 1;
            let source = record.source;
            if let Err(e) = memory.append(record.source, record.content, Some(record.payload)) {
                break Exit::Failed(format!("memory write failed: {e}"));
            }
            debug!(task_id = %task_id, step, source = %source, "Step completed");
            self.publish(DomainEvent::StepCompleted {
                task_id: task_id.clone(),
                step,
                source,
                timestamp: Utc::now(),
            });
        };

        let (answer, terminal_state, failure) = match exit {
            Exit::Answered(answer) => (answer, TerminalState::Answered, None),
            Exit::Exhausted => {
                let answer = memory.last_tool_result().unwrap_or(UNKNOWN_ANSWER).to_string();
                (answer, TerminalState::Exhausted, None)
            }
            Exit::Failed(reason) => {
                if cancel.is_cancelled() {
                    self.dispatcher.release_for_cancelled_task().await;
                }
                warn!(task_id = %task_id, reason = %reason, "Task failed");
                (UNKNOWN_ANSWER.to_string(), TerminalState::Failed, Some(reason))
            }
        };

        info!(task_id = %task_id, state = %terminal_state, steps = step, "Task finished");
        self.publish(DomainEvent::TaskFinished {
            task_id,
            state: terminal_state,
            steps: step,
            timestamp: Utc::now(),
        });

        Ok(TaskOutcome {
            answer,
            terminal_state,
            steps: step,
            failure,
            memory: memory.into_items(),
        })
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

/// One memory item about to be written.
struct Record {
    source: MemorySource,
    content: String,
    payload: MemoryPayload,
}

impl Record {
    fn new(
        source: MemorySource,
        content: String,
        tool: &str,
        arguments: &ToolArguments,
        prepared: Option<Value>,
    ) -> Self {
        Self {
            source,
            content,
            payload: MemoryPayload {
                tool: tool.to_string(),
                arguments: arguments.clone(),
                prepared,
                result: None,
            },
        }
    }

    fn with_result(mut self, result: String) -> Self {
        self.payload.result = Some(result);
        self
    }
}

/// The prior non-empty result of an identical call among the most recent
/// invocations, if any. Calls are compared after coercion, so key order and
/// quoting in the planner's text do not matter.
fn repeated_result<'m>(memory: &'m InMemoryStore, tool: &str, prepared: &Value) -> Option<&'m str> {
    memory
        .recent_invocations(REPEAT_WINDOW)
        .into_iter()
        .filter_map(|item| item.payload.as_ref())
        .find(|payload| payload.tool == tool && payload.prepared.as_ref() == Some(prepared))
        .and_then(|payload| payload.result.as_deref())
        .filter(|result| !is_empty_result(result))
}

fn is_empty_result(result: &str) -> bool {
    matches!(result.trim(), "" | "[]" | "{}" | "null")
}

fn call_label(tool: &str, arguments: &ToolArguments) -> String {
    if arguments.is_empty() {
        tool.to_string()
    } else {
        format!("{tool}|{arguments}")
    }
}

fn preview(request: &str) -> String {
    const LIMIT: usize = 80;
    match request.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}…", &request[..cut]),
        None => request.to_string(),
    }
}

async fn race<F: Future>(cancel: &CancellationToken, future: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = future => Some(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cortex_core::error::TransportError;
    use cortex_core::session::{SessionConfig, SessionConnector, ToolSession};
    use cortex_core::tool::{ArgValue, ParamSpec, ParamType, ToolDescriptor, ToolResult};
    use cortex_dispatcher::DispatcherSettings;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Returns scripted directives in order, then `Finalize{"unknown"}`.
    struct ScriptedPlanner {
        script: Mutex<Vec<Directive>>,
        forced: Mutex<Vec<bool>>,
    }

    impl ScriptedPlanner {
        fn new(script: Vec<Directive>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                forced: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl DirectivePlanner for ScriptedPlanner {
        async fn next_directive(&self, request: &PlanRequest<'_>) -> Directive {
            self.forced.lock().unwrap().push(request.must_finalize);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Directive::unknown()
            } else {
                script.remove(0)
            }
        }
    }

    /// Always returns the same call with a fresh argument value.
    struct CountingPlanner(AtomicUsize);

    #[async_trait]
    impl DirectivePlanner for CountingPlanner {
        async fn next_directive(&self, _request: &PlanRequest<'_>) -> Directive {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            add(&n.to_string(), "1")
        }
    }

    /// Never answers.
    struct StuckPlanner;

    #[async_trait]
    impl DirectivePlanner for StuckPlanner {
        async fn next_directive(&self, _request: &PlanRequest<'_>) -> Directive {
            std::future::pending().await
        }
    }

    struct AddSession {
        calls: Arc<AtomicUsize>,
        hang: bool,
    }

    #[async_trait]
    impl ToolSession for AddSession {
        async fn initialize(&mut self) -> Result<Vec<ToolDescriptor>, TransportError> {
            Ok(vec![
                ToolDescriptor::new("add", "Add two numbers. Usage: add|a=5|b=3")
                    .with_param(ParamSpec::required("a", ParamType::Integer))
                    .with_param(ParamSpec::required("b", ParamType::Integer)),
            ])
        }

        async fn call(&mut self, _tool: &str, arguments: Value) -> Result<ToolResult, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            let sum = arguments["a"].as_i64().unwrap_or(0) + arguments["b"].as_i64().unwrap_or(0);
            Ok(ToolResult::ok(sum.to_string()))
        }

        async fn close(&mut self) {}
    }

    struct AddConnector {
        calls: Arc<AtomicUsize>,
        hang: bool,
    }

    #[async_trait]
    impl SessionConnector for AddConnector {
        async fn connect(&self, _config: &SessionConfig) -> Result<Box<dyn ToolSession>, TransportError> {
            Ok(Box::new(AddSession {
                calls: self.calls.clone(),
                hang: self.hang,
            }))
        }
    }

    async fn dispatcher(hang: bool) -> (Arc<Dispatcher>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let connector = AddConnector {
            calls: calls.clone(),
            hang,
        };
        let settings = DispatcherSettings {
            call_timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let dispatcher = Dispatcher::with_settings(Arc::new(connector), settings);
        dispatcher
            .initialize(&[SessionConfig::new("math", "mock")])
            .await
            .unwrap();
        (Arc::new(dispatcher), calls)
    }

    fn add(a: &str, b: &str) -> Directive {
        Directive::invoke(
            "add",
            ToolArguments::new()
                .with("a", ArgValue::text(a))
                .with("b", ArgValue::text(b)),
        )
    }

    #[tokio::test]
    async fn immediate_answer_takes_one_step() {
        let (dispatcher, calls) = dispatcher(false).await;
        let agent = AgentLoop::new(ScriptedPlanner::new(vec![Directive::finalize("hello")]), dispatcher);

        let outcome = agent.run("say hello", 3, None).await.unwrap();
        assert_eq!(outcome.answer, "hello");
        assert_eq!(outcome.terminal_state, TerminalState::Answered);
        assert_eq!(outcome.steps, 1);
        assert!(outcome.memory.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn add_then_answer() {
        let (dispatcher, _) = dispatcher(false).await;
        let planner = ScriptedPlanner::new(vec![add("5", "3"), Directive::finalize("8")]);
        let agent = AgentLoop::new(planner, dispatcher);

        let outcome = agent.run("add 5 and 3", 3, None).await.unwrap();
        assert_eq!(outcome.answer, "8");
        assert!(outcome.is_answered());
        assert_eq!(outcome.steps, 2);
        assert_eq!(outcome.memory.len(), 1);
        assert_eq!(outcome.memory[0].source, MemorySource::ToolResult);
        assert_eq!(outcome.memory[0].content, "add|a=5|b=3 returned: 8");
    }

    #[tokio::test]
    async fn distinct_calls_exhaust_the_budget() {
        let (dispatcher, calls) = dispatcher(false).await;
        let agent = AgentLoop::new(Arc::new(CountingPlanner(AtomicUsize::new(0))), dispatcher);

        let outcome = agent.run("keep adding", 4, None).await.unwrap();
        assert_eq!(outcome.terminal_state, TerminalState::Exhausted);
        assert_eq!(outcome.steps, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // Latest successful result: 3 + 1
        assert_eq!(outcome.answer, "4");
    }

    #[tokio::test]
    async fn repeated_call_is_not_dispatched_again() {
        let (dispatcher, calls) = dispatcher(false).await;
        let planner = ScriptedPlanner::new(vec![add("5", "3"), add("5", "3"), add("5", "3")]);
        let agent = AgentLoop::new(planner.clone(), dispatcher);

        let outcome = agent.run("add 5 and 3", 5, None).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.memory[1].source, MemorySource::Note);
        // Third call arrives while finalization is forced and is replaced
        assert_eq!(outcome.terminal_state, TerminalState::Answered);
        assert_eq!(outcome.answer, "8");
        assert_eq!(outcome.steps, 3);
        assert_eq!(*planner.forced.lock().unwrap(), [false, false, true]);
    }

    #[tokio::test]
    async fn reordered_or_quoted_arguments_still_count_as_repeats() {
        let reordered = Directive::invoke(
            "add",
            ToolArguments::new()
                .with("b", ArgValue::text("3"))
                .with("a", ArgValue::text("5")),
        );
        let quoted = Directive::invoke(
            "add",
            ToolArguments::new()
                .with("a", ArgValue::quoted("5"))
                .with("b", ArgValue::text(" 3")),
        );

        for variant in [reordered, quoted] {
            let (dispatcher, calls) = dispatcher(false).await;
            let planner = ScriptedPlanner::new(vec![add("5", "3"), variant, add("5", "3")]);
            let outcome = AgentLoop::new(planner, dispatcher).run("add 5 and 3", 5, None).await.unwrap();

            assert_eq!(calls.load(Ordering::SeqCst), 1);
            assert_eq!(outcome.memory.len(), 2);
            assert_eq!(outcome.memory[1].source, MemorySource::Note);
            assert_eq!(outcome.answer, "8");
        }
    }

    #[tokio::test]
    async fn recorded_payload_keeps_coerced_arguments() {
        let (dispatcher, _) = dispatcher(false).await;
        let planner = ScriptedPlanner::new(vec![
            add("5", "3"),
            Directive::invoke("add", ToolArguments::new().with("a", ArgValue::text("x"))),
        ]);
        let outcome = AgentLoop::new(planner, dispatcher).run("add", 3, None).await.unwrap();

        let ok = outcome.memory[0].payload.as_ref().unwrap();
        assert_eq!(ok.prepared, Some(serde_json::json!({"a": 5, "b": 3})));
        let rejected = outcome.memory[1].payload.as_ref().unwrap();
        assert_eq!(rejected.prepared, None);
        assert_eq!(outcome.memory[1].source, MemorySource::Error);
    }

    #[tokio::test]
    async fn unknown_tool_is_recorded_and_loop_continues() {
        let (dispatcher, _) = dispatcher(false).await;
        let planner = ScriptedPlanner::new(vec![
            Directive::invoke("subtract", ToolArguments::new()),
            add("1", "x"),
            Directive::finalize("gave up"),
        ]);
        let agent = AgentLoop::new(planner, dispatcher);

        let outcome = agent.run("subtract", 3, None).await.unwrap();
        assert_eq!(outcome.steps, 3);
        assert_eq!(outcome.memory[0].source, MemorySource::Error);
        assert!(outcome.memory[0].content.contains("Unknown tool: subtract"));
        assert_eq!(outcome.memory[1].source, MemorySource::Error);
        assert!(outcome.memory[1].content.contains("Invalid arguments"));
        assert_eq!(outcome.answer, "gave up");
    }

    #[tokio::test]
    async fn timeouts_exhaust_with_unknown() {
        let (dispatcher, _) = dispatcher(true).await;
        let agent = AgentLoop::new(Arc::new(CountingPlanner(AtomicUsize::new(0))), dispatcher);

        let outcome = agent.run("slow", 3, None).await.unwrap();
        assert_eq!(outcome.terminal_state, TerminalState::Exhausted);
        assert_eq!(outcome.steps, 3);
        assert_eq!(outcome.answer, UNKNOWN_ANSWER);
        assert!(outcome.memory.iter().all(|m| m.source == MemorySource::Error));
    }

    #[tokio::test]
    async fn memory_exhaustion_fails_the_task() {
        let (dispatcher, _) = dispatcher(false).await;
        let agent = AgentLoop::new(Arc::new(CountingPlanner(AtomicUsize::new(0))), dispatcher)
            .with_memory_capacity(1);

        let outcome = agent.run("fill memory", 5, None).await.unwrap();
        assert_eq!(outcome.terminal_state, TerminalState::Failed);
        assert!(outcome.failure.unwrap().contains("memory"));
        assert_eq!(outcome.memory.len(), 1);
    }

    #[tokio::test]
    async fn nameless_call_is_a_contract_violation() {
        let (dispatcher, _) = dispatcher(false).await;
        let planner = ScriptedPlanner::new(vec![Directive::invoke(" ", ToolArguments::new())]);
        let outcome = AgentLoop::new(planner, dispatcher).run("x", 3, None).await.unwrap();
        assert_eq!(outcome.terminal_state, TerminalState::Failed);
    }

    #[tokio::test]
    async fn zero_budget_and_unready_dispatcher_are_errors() {
        let (dispatcher, _) = dispatcher(false).await;
        let agent = AgentLoop::new(ScriptedPlanner::new(vec![]), dispatcher.clone());
        assert!(matches!(agent.run("x", 0, None).await, Err(AgentError::InvalidBudget)));

        dispatcher.shutdown().await;
        assert!(matches!(
            agent.run("x", 1, None).await,
            Err(AgentError::DispatcherUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn cancellation_fails_the_task_and_keeps_shared_dispatcher() {
        let (dispatcher, _) = dispatcher(false).await;
        let agent = AgentLoop::new(Arc::new(StuckPlanner), dispatcher.clone());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let outcome = agent.run_with_cancel("wait", 3, None, cancel).await.unwrap();
        assert_eq!(outcome.terminal_state, TerminalState::Failed);
        assert_eq!(outcome.failure.as_deref(), Some("cancelled"));
        assert!(dispatcher.is_ready());
    }

    #[tokio::test]
    async fn events_bracket_the_task() {
        let (dispatcher, _) = dispatcher(false).await;
        let bus = Arc::new(EventBus::new(32));
        let mut rx = bus.subscribe();
        let planner = ScriptedPlanner::new(vec![add("1", "2"), Directive::finalize("3")]);
        let agent = AgentLoop::new(planner, dispatcher).with_events(bus);

        agent.run("add", 3, None).await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event.as_ref() {
                DomainEvent::TaskStarted { .. } => "started",
                DomainEvent::StepCompleted { .. } => "step",
                DomainEvent::TaskFinished { .. } => "finished",
                _ => "other",
            });
        }
        assert_eq!(kinds, ["started", "step", "finished"]);
    }

    #[test]
    fn preview_truncates_long_requests() {
        let long = "x".repeat(200);
        assert_eq!(preview(&long).chars().count(), 81);
        assert_eq!(preview("short"), "short");
    }
}
