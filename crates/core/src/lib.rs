//! # Cortex Core
//!
//! Domain types, traits, and error definitions for the Cortex task-execution
//! agent. Every other crate in the workspace depends inward on this one.
//!
//! The pieces defined here:
//! - [`tool`]: tool descriptors, parameter schemas, planner arguments, and the
//!   in-process [`Tool`] trait
//! - [`session`]: the tool-server session protocol and session configuration
//! - [`memory`]: the append-only per-task memory log
//! - [`directive`]: the planner's per-step decision
//! - [`completion`]: the opaque text-completion service
//! - [`perception`]: the structured view of a user request
//! - [`task`]: terminal states and the task outcome
//! - [`event`]: domain events broadcast while tasks run

pub mod completion;
pub mod directive;
pub mod error;
pub mod event;
pub mod memory;
pub mod perception;
pub mod session;
pub mod task;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use completion::CompletionService;
pub use directive::Directive;
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use memory::{MemoryItem, MemoryPayload, MemorySource, MemoryStore};
pub use perception::Perception;
pub use session::{SessionConfig, SessionConnector, SessionState, ToolSession};
pub use task::{TaskContext, TaskOutcome, TerminalState};
pub use tool::{
    ArgValue, ParamSpec, ParamType, Tool, ToolArguments, ToolDescriptor, ToolRegistry,
    ToolResult, ToolStatus,
};
