use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, warn};

use super::{Solver, SolverResult};

/// Environment variables passed through to the solver. Everything else is stripped.
const SAFE_ENV_VARS: &[&str] = &["PATH", "HOME", "USER", "LANG", "LC_ALL", "TZ"];

/// Runs the external solver binary, one child process per call.
///
/// The program path comes from configuration only and is executed directly,
/// never through a shell.
pub struct ProcessSolver {
    program: PathBuf,
    timeout: Duration,
}

/// Everything collected from a child that exited on its own.
struct Exchange {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl ProcessSolver {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn filtered_env() -> Vec<(String, String)> {
        SAFE_ENV_VARS
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|val| (key.to_string(), val)))
            .collect()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .envs(Self::filtered_env())
            .kill_on_drop(true);
        cmd
    }

    /// Feed stdin while draining both output pipes, so neither side can
    /// stall on a full pipe buffer, then collect the exit status.
    async fn exchange(child: &mut Child, input: &[u8]) -> io::Result<Exchange> {
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (fed, stdout, stderr, status) =
            tokio::join!(feed(stdin, input), drain(stdout), drain(stderr), child.wait());
        fed?;
        Ok(Exchange {
            status: status?,
            stdout: stdout?,
            stderr: stderr?,
        })
    }
}

async fn feed(stdin: Option<ChildStdin>, input: &[u8]) -> io::Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    match stdin.write_all(input).await {
        // The solver quit without reading everything; its exit status says why.
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
    // stdin dropped here, signalling EOF
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

#[async_trait]
impl Solver for ProcessSolver {
    fn name(&self) -> &str {
        "process"
    }

    fn ensure_ready(&self) -> Result<(), String> {
        if self.program.is_file() {
            Ok(())
        } else {
            Err(format!(
                "Solver not found at {}. Please compile the solver first.",
                self.program.display()
            ))
        }
    }

    async fn solve(&self, input: &str) -> SolverResult {
        let mut child = match self.command().spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(program = %self.program.display(), error = %e, "solver failed to start");
                return SolverResult::ProcessError(format!(
                    "failed to start {}: {}",
                    self.program.display(),
                    e
                ));
            }
        };
        let started = Instant::now();
        debug!(pid = ?child.id(), input_bytes = input.len(), "solver spawned");

        let outcome =
            tokio::time::timeout(self.timeout, Self::exchange(&mut child, input.as_bytes())).await;

        match outcome {
            Ok(Ok(exchange)) => {
                debug!(
                    status = %exchange.status,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    stdout_bytes = exchange.stdout.len(),
                    "solver exited"
                );
                if exchange.status.success() {
                    SolverResult::Completed(exchange.stdout)
                } else {
                    SolverResult::CrashedNonZero {
                        code: exit_code(exchange.status),
                        stderr: String::from_utf8_lossy(&exchange.stderr).into_owned(),
                    }
                }
            }
            Ok(Err(e)) => {
                if let Err(kill_err) = child.kill().await {
                    debug!(error = %kill_err, "kill after I/O failure");
                }
                SolverResult::ProcessError(format!("solver I/O failed: {}", e))
            }
            Err(_) => {
                // kill() also reaps, so nothing is left behind.
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill timed-out solver");
                }
                warn!(
                    limit_ms = self.timeout.as_millis() as u64,
                    "solver timed out and was killed"
                );
                SolverResult::TimedOut {
                    limit: self.timeout,
                }
            }
        }
    }
}
