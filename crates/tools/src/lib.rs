//! Built-in tool servers for Cortex.
//!
//! Each server is a [`ToolRegistry`] of in-process tools, exposed to the
//! dispatcher as one session through a `builtin:<name>` command.

pub mod expr;
pub mod math;

use cortex_core::tool::ToolRegistry;

pub use math::math_registry;

/// Built-in server names and their registry factories.
pub fn builtin_servers() -> Vec<(&'static str, fn() -> ToolRegistry)> {
    vec![("math", math_registry as fn() -> ToolRegistry)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn math_server_is_registered() {
        let servers = builtin_servers();
        assert_eq!(servers[0].0, "math");
        assert_eq!((servers[0].1)().len(), 8);
    }
}
