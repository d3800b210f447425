//! Completion services for Cortex.
//!
//! All services implement `cortex_core::CompletionService`. The router
//! builds the one selected by configuration.

pub mod gemini;
pub mod openai_compat;
pub mod router;

pub use gemini::GeminiCompletion;
pub use openai_compat::OpenAiCompatCompletion;
pub use router::build_from_config;
