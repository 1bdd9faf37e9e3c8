//! Core primitives shared across the build orchestrator crates: configuration parsing, the error
//! taxonomy, the logger sink contract, and time/hash helpers.

pub mod config;
pub mod error;
pub mod hash;
pub mod logger;
pub mod logging;
pub mod time;

pub use config::Config;
pub use error::{BuildError, Result};
pub use logger::{FileLogger, Logger, TracingLogger};
