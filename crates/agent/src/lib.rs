//! The Cortex agent: planner and bounded loop.
//!
//! Each task runs a **Plan → Act → Record** cycle:
//!
//! 1. **Perceive** the request (plus any caller overrides)
//! 2. **Plan** one directive from the request, the tool catalog and memory
//! 3. **If a call**: validate, dispatch, record the result or error in memory
//! 4. **If an answer**: stop and return it
//!
//! The loop stops on an answer, on a failure, or when the step budget runs
//! out; in the last case the most recent successful tool result is returned.

pub mod loop_runner;
pub mod planner;

pub use loop_runner::AgentLoop;
pub use planner::{DirectivePlanner, PlanRequest, Planner, build_prompt, parse_directive, parse_value};
