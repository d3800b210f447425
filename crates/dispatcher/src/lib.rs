//! Tool registry and dispatcher for Cortex.
//!
//! Aggregates the catalogs of N independently-managed tool-server sessions
//! into one flat namespace and routes `(tool_name, arguments)` calls to the
//! owning session:
//!
//! - [`Dispatcher`]: bounded-concurrency initialization, conflict detection,
//!   per-session call serialization, timeouts, partial-failure isolation
//! - [`coerce`]: reconciling planner arguments (dotted keys, lists, quoted
//!   values) with a tool's declared parameter schema
//! - [`stdio`]: child-process sessions speaking JSON-RPC over stdin/stdout
//! - [`local`]: in-process sessions backed by a [`cortex_core::ToolRegistry`]
//! - [`connector`]: picks a session kind from a [`cortex_core::SessionConfig`]

pub mod coerce;
pub mod connector;
pub mod dispatcher;
pub mod handle;
pub mod local;
pub mod schema;
pub mod stdio;

pub use coerce::{CoercionError, coerce_arguments};
pub use connector::{BuiltinFactory, DefaultConnector};
pub use dispatcher::{Dispatcher, DispatcherSettings};
pub use handle::SessionHandle;
pub use local::LocalSession;
pub use stdio::{ProcessConnector, StdioSession};
