//! The logger sink contract the engine writes to. The engine only calls this trait; how lines
//! are rendered is entirely up to the collaborator that implements it.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Sink for build output. Implementations must serialize whole-line writes (no interleaving
/// within a line) but make no ordering guarantee across concurrently running steps.
pub trait Logger: Send + Sync {
    fn log(&self, line: &str);
    fn debug(&self, line: &str);

    /// Kept for interface parity with the original collaborator contract, which returned an
    /// initializer/args pair for a worker process. The async-task execution model here has no
    /// separate worker process to reinitialize, so the default is `None`.
    fn worker_init_info(&self) -> Option<(String, Vec<String>)> {
        None
    }
}

/// Logs to stdout via `tracing`, matching the rest of the workspace's logging convention.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, line: &str) {
        tracing::info!("{line}");
    }

    fn debug(&self, line: &str) {
        tracing::debug!("{line}");
    }
}

/// Logs to a plain file, for parity with the original's file-tailing GUI collaborator.
pub struct FileLogger {
    inner: Arc<Mutex<std::fs::File>>,
}

impl FileLogger {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(file)),
        })
    }

    fn write_line(&self, line: &str) {
        let mut file = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = writeln!(file, "{line}");
    }
}

impl Logger for FileLogger {
    fn log(&self, line: &str) {
        self.write_line(line);
    }

    fn debug(&self, line: &str) {
        self.write_line(line);
    }
}
