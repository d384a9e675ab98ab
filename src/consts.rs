//! Project-wide constants and defaults.

use std::path::PathBuf;
use std::time::Duration;

pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");
pub const HOMEPAGE: &str = env!("CARGO_PKG_HOMEPAGE");
pub const REPO: &str = env!("CARGO_PKG_REPOSITORY");

/// Maximum accepted problem size in bytes (64 KiB).
pub const DEFAULT_MAX_INPUT_BYTES: usize = 64 * 1024;

/// Hard cap on how much of a request body the HTTP layer will buffer.
/// Bodies between the input limit and this cap still get a readable 400.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 8 * 1024 * 1024;

/// Wall-clock budget for a single solver run, in seconds.
pub const DEFAULT_SOLVER_TIMEOUT_SECS: u64 = 10;

/// Solver processes allowed to run at the same time.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Default listen address.
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";

/// Largest accepted grid side (N and M).
pub const MAX_GRID_DIM: i64 = 1000;

/// Cap on solver output copied into log lines.
pub const LOG_OUTPUT_BYTES: usize = 2_000;

/// Default solver binary, relative to the working directory.
pub fn default_solver_path() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("bin").join("solver.exe")
    } else {
        PathBuf::from("bin").join("solver")
    }
}

pub fn default_solver_timeout() -> Duration {
    Duration::from_secs(DEFAULT_SOLVER_TIMEOUT_SECS)
}

/// Format a number with comma separators (e.g. 1,234,567).
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i).is_multiple_of(3) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// Render a timeout the way error messages quote it: `10s`, `250ms`.
pub fn format_duration(d: Duration) -> String {
    if d.subsec_nanos() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}
