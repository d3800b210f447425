//! The planner turns task state into one [`Directive`] per step.
//!
//! The completion service is opaque and may be non-deterministic; only the
//! directive grammar in [`parser`] is relied on. Completion failures,
//! timeouts, and unparseable output all fall back to
//! `Finalize{"unknown"}`, so planning never fails past this boundary.

pub mod parser;
pub mod prompt;

use async_trait::async_trait;
use cortex_core::completion::CompletionService;
use cortex_core::directive::Directive;
use cortex_core::memory::MemoryItem;
use cortex_core::perception::Perception;
use cortex_core::tool::ToolDescriptor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub use parser::{parse_directive, parse_value};
pub use prompt::build_prompt;

/// Everything the planner sees for one step.
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub perception: &'a Perception,
    pub tools: &'a [ToolDescriptor],
    pub memory: &'a [MemoryItem],

    /// Extra context facts (`user_email` and the like)
    pub facts: &'a [(String, String)],

    /// 1-based index of the step being planned
    pub step: u32,
    pub step_budget: u32,

    /// The previous call was a repeat; only an answer is acceptable now
    pub must_finalize: bool,
}

/// Chooses the next directive.
#[async_trait]
pub trait DirectivePlanner: Send + Sync {
    async fn next_directive(&self, request: &PlanRequest<'_>) -> Directive;
}

/// Completion-backed planner.
pub struct Planner {
    completion: Arc<dyn CompletionService>,
    timeout: Duration,
}

impl Planner {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self {
            completion,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl DirectivePlanner for Planner {
    async fn next_directive(&self, request: &PlanRequest<'_>) -> Directive {
        let prompt = build_prompt(request);
        let completion = tokio::time::timeout(self.timeout, self.completion.complete(&prompt)).await;

        let text = match completion {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(service = self.completion.name(), error = %e, "Planning failed");
                return Directive::unknown();
            }
            Err(_) => {
                warn!(
                    service = self.completion.name(),
                    timeout_secs = self.timeout.as_secs(),
                    "Planning timed out"
                );
                return Directive::unknown();
            }
        };

        match parse_directive(&text) {
            Some(directive) => {
                debug!(step = request.step, %directive, "Planned");
                directive
            }
            None => {
                warn!(step = request.step, output = %text.trim(), "No directive in completion");
                Directive::unknown()
            }
        }
    }
}
