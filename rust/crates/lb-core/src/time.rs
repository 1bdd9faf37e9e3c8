//! mtime helpers and the staleness-check settle delay.

use std::path::Path;
use std::time::Duration;

/// Delay observed before reading input mtimes during staleness checks, to tolerate filesystems
/// that lag briefly after a file is closed. See DESIGN.md Open Question resolutions.
pub const STALENESS_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Modification time of `path`, as floating-point seconds since the Unix epoch — matches the
/// representation persisted in the build state file.
pub fn mtime_secs(path: &Path) -> std::io::Result<f64> {
    let meta = std::fs::metadata(path)?;
    let modified = meta.modified()?;
    let secs = modified
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    Ok(secs)
}

pub fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
