pub mod mock;
pub mod process;

use async_trait::async_trait;
use std::time::Duration;

/// How one solver invocation ended. Every variant is terminal; nothing is
/// retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverResult {
    /// Exit code 0. Carries the full, uninterpreted stdout.
    Completed(Vec<u8>),
    /// Non-zero exit (or death by signal, reported as `-signal`).
    CrashedNonZero { code: i32, stderr: String },
    /// Killed after running past `limit`.
    TimedOut { limit: Duration },
    /// The solver could not be started or talked to at all.
    ProcessError(String),
}

impl SolverResult {
    /// Short label for log fields.
    pub fn label(&self) -> &'static str {
        match self {
            SolverResult::Completed(_) => "completed",
            SolverResult::CrashedNonZero { .. } => "crashed",
            SolverResult::TimedOut { .. } => "timed_out",
            SolverResult::ProcessError(_) => "process_error",
        }
    }
}

/// Something that turns validated problem text into a [`SolverResult`].
/// The real one is [`process::ProcessSolver`]; tests use [`mock::MockSolver`].
#[async_trait]
pub trait Solver: Send + Sync {
    fn name(&self) -> &str;

    /// Cheap check made before an execution slot is taken. `Err` carries
    /// the client-facing reason the solver cannot run right now.
    fn ensure_ready(&self) -> Result<(), String> {
        Ok(())
    }

    async fn solve(&self, input: &str) -> SolverResult;
}

/// Cut `output` down to at most `max_bytes` on a UTF-8 boundary, noting how
/// much was dropped.
pub fn truncate_output(output: &str, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output.to_string();
    }
    let mut end = max_bytes;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}\n\n[truncated: showing {}/{} bytes]",
        &output[..end],
        end,
        output.len()
    )
}
