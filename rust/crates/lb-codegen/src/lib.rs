//! Command generator: turns a workflow step's declarative template into a concrete, shell-lex
//! validated command string plus the hashes the planner uses to decide staleness.

pub mod context;
pub mod generator;
pub mod params;
pub mod shell;
pub mod template;

pub use context::build_base_context;
pub use generator::{generate_for_node, Hashes, ResolvedCommand};
