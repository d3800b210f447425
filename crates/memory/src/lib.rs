//! Memory store implementations for Cortex.

pub mod in_memory;
pub mod summary;

pub use in_memory::InMemoryStore;
pub use summary::summarize;
