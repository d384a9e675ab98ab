//! Per-request orchestration: decode, size check, grammar, admission,
//! solver run, response mapping.
//!
//! Failures are classified where they happen ([`GrammarError`] in the
//! validator, [`SolverResult`] in the supervisor). This module only maps
//! them onto [`GatewayError`], whose variants each know their status code
//! and JSON body.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{Instrument, Span, debug, field, info, warn};

use crate::config::GatewayConfig;
use crate::consts::{LOG_OUTPUT_BYTES, format_duration};
use crate::grammar::{self, GrammarError};
use crate::limiter::ExecutionLimiter;
use crate::solver::process::ProcessSolver;
use crate::solver::{Solver, SolverResult, truncate_output};

/// Every way a request can fail, with the client-facing message as `Display`.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid UTF-8 encoding in request body")]
    InvalidEncoding,
    #[error("Input size exceeds maximum of {max} bytes")]
    PayloadTooLarge { max: usize },
    #[error("Invalid input format: {0}")]
    InvalidInput(#[from] GrammarError),
    #[error("{0}")]
    SolverMissing(String),
    #[error("Solver could not be invoked: {0}")]
    SolverUnavailable(String),
    #[error("Solver execution failed")]
    SolverFailed { code: i32, stderr: String },
    #[error("Solver output is not valid JSON")]
    MalformedOutput { stdout: String, parse_error: String },
    #[error("Solver execution timeout (>{})", timeout_label(.limit))]
    TimedOut { limit: Duration },
    #[error("Unexpected error: {0}")]
    Internal(String),
}

fn timeout_label(limit: &Duration) -> String {
    format_duration(*limit)
}

impl GatewayError {
    pub fn status(&self) -> u16 {
        match self {
            GatewayError::InvalidEncoding
            | GatewayError::PayloadTooLarge { .. }
            | GatewayError::InvalidInput(_) => 400,
            GatewayError::TimedOut { .. } => 504,
            GatewayError::SolverMissing(_)
            | GatewayError::SolverUnavailable(_)
            | GatewayError::SolverFailed { .. }
            | GatewayError::MalformedOutput { .. }
            | GatewayError::Internal(_) => 500,
        }
    }

    /// `{"error": ...}` plus whatever diagnostics the variant carries.
    pub fn body(&self) -> Value {
        let error = self.to_string();
        match self {
            GatewayError::SolverFailed { code, stderr } => json!({
                "error": error,
                "stderr": stderr,
                "returncode": code,
            }),
            GatewayError::MalformedOutput {
                stdout,
                parse_error,
            } => json!({
                "error": error,
                "stdout": stdout,
                "parse_error": parse_error,
            }),
            _ => json!({ "error": error }),
        }
    }
}

/// What goes back to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Solver JSON, byte-for-byte.
    Passthrough(Vec<u8>),
    Json(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub status: u16,
    pub body: ResponseBody,
}

impl ResponseEnvelope {
    pub fn passthrough(stdout: Vec<u8>) -> Self {
        Self {
            status: 200,
            body: ResponseBody::Passthrough(stdout),
        }
    }

    /// Body bytes as sent on the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        match &self.body {
            ResponseBody::Passthrough(bytes) => bytes.clone(),
            ResponseBody::Json(value) => value.to_string().into_bytes(),
        }
    }

    /// Parsed body, convenient for assertions and logging.
    pub fn json(&self) -> serde_json::Result<Value> {
        match &self.body {
            ResponseBody::Passthrough(bytes) => serde_json::from_slice(bytes),
            ResponseBody::Json(value) => Ok(value.clone()),
        }
    }
}

impl From<GatewayError> for ResponseEnvelope {
    fn from(err: GatewayError) -> Self {
        Self {
            status: err.status(),
            body: ResponseBody::Json(err.body()),
        }
    }
}

/// Best-effort text for a caught panic payload.
pub(crate) fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Running totals of responses by class.
#[derive(Debug, Default)]
pub struct RequestStats {
    served: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StatsSnapshot {
    /// 200 responses.
    pub served: u64,
    /// 4xx responses.
    pub rejected: u64,
    /// 5xx responses.
    pub failed: u64,
}

impl StatsSnapshot {
    pub fn total(&self) -> u64 {
        self.served + self.rejected + self.failed
    }
}

impl RequestStats {
    fn record(&self, status: u16) {
        let counter = match status {
            200..=299 => &self.served,
            400..=499 => &self.rejected,
            _ => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            served: self.served.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Composition root for one deployment: the solver, the shared slot pool,
/// and the input limit.
pub struct Gateway {
    solver: Arc<dyn Solver>,
    limiter: ExecutionLimiter,
    max_input_bytes: usize,
    stats: RequestStats,
}

impl Gateway {
    pub fn new(solver: Arc<dyn Solver>, limiter: ExecutionLimiter, max_input_bytes: usize) -> Self {
        Self {
            solver,
            limiter,
            max_input_bytes,
            stats: RequestStats::default(),
        }
    }

    /// Wire the real process solver and a limiter sized from `config`.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let solver = ProcessSolver::new(config.solver_path.clone(), config.solver_timeout);
        Self::new(
            Arc::new(solver),
            ExecutionLimiter::new(config.max_concurrent),
            config.max_input_bytes,
        )
    }

    pub fn limiter(&self) -> &ExecutionLimiter {
        &self.limiter
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn max_input_bytes(&self) -> usize {
        self.max_input_bytes
    }

    /// Handle one raw request body. Always produces a response; panics
    /// below this point become a 500.
    pub async fn handle(&self, body: &[u8]) -> ResponseEnvelope {
        let started = Instant::now();
        let span = tracing::info_span!(
            "solver_run",
            solver = self.solver.name(),
            input_bytes = body.len(),
            status = field::Empty,
            outcome = field::Empty,
            latency_ms = field::Empty,
        );

        let result = AssertUnwindSafe(self.process(body))
            .catch_unwind()
            .instrument(span.clone())
            .await
            .unwrap_or_else(|panic| Err(GatewayError::Internal(describe_panic(panic.as_ref()))));

        let latency_ms = started.elapsed().as_millis() as u64;
        let _entered = span.enter();
        span.record("latency_ms", latency_ms);
        let envelope = match result {
            Ok(stdout) => {
                info!(status = 200, latency_ms, "request served");
                ResponseEnvelope::passthrough(stdout)
            }
            Err(err) => {
                log_failure(&err, latency_ms);
                err.into()
            }
        };
        span.record("status", envelope.status);
        self.stats.record(envelope.status);
        envelope
    }

    /// Answer a request whose body was turned away before it could be
    /// handed to [`Gateway::handle`], counting it like any other response.
    pub fn reject(&self, err: GatewayError) -> ResponseEnvelope {
        log_failure(&err, 0);
        let envelope = ResponseEnvelope::from(err);
        self.stats.record(envelope.status);
        envelope
    }

    async fn process(&self, body: &[u8]) -> Result<Vec<u8>, GatewayError> {
        let input = std::str::from_utf8(body).map_err(|_| GatewayError::InvalidEncoding)?;
        if body.len() > self.max_input_bytes {
            return Err(GatewayError::PayloadTooLarge {
                max: self.max_input_bytes,
            });
        }
        let problem = grammar::validate(input)?;
        debug!(
            rows = problem.rows,
            cols = problem.cols,
            stations = problem.stations.len(),
            "input validated"
        );

        self.solver
            .ensure_ready()
            .map_err(GatewayError::SolverMissing)?;

        let wait = Instant::now();
        let slot = self
            .limiter
            .acquire()
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        debug!(
            waited_ms = wait.elapsed().as_millis() as u64,
            in_flight = self.limiter.in_flight(),
            "execution slot acquired"
        );
        let result = self.solver.solve(input).await;
        drop(slot);
        Span::current().record("outcome", result.label());

        interpret(result)
    }
}

fn interpret(result: SolverResult) -> Result<Vec<u8>, GatewayError> {
    match result {
        SolverResult::Completed(stdout) => match serde_json::from_slice::<Value>(&stdout) {
            Ok(Value::Object(_)) => Ok(stdout),
            Ok(_) => Err(GatewayError::MalformedOutput {
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                parse_error: "expected a JSON object".to_string(),
            }),
            Err(e) => Err(GatewayError::MalformedOutput {
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                parse_error: e.to_string(),
            }),
        },
        SolverResult::CrashedNonZero { code, stderr } => {
            Err(GatewayError::SolverFailed { code, stderr })
        }
        SolverResult::TimedOut { limit } => Err(GatewayError::TimedOut { limit }),
        SolverResult::ProcessError(cause) => Err(GatewayError::SolverUnavailable(cause)),
    }
}

fn log_failure(err: &GatewayError, latency_ms: u64) {
    let status = err.status();
    match err {
        GatewayError::SolverFailed { code, stderr } => warn!(
            status,
            latency_ms,
            returncode = code,
            stderr = %truncate_output(stderr, LOG_OUTPUT_BYTES),
            "solver crashed"
        ),
        GatewayError::MalformedOutput {
            stdout,
            parse_error,
        } => warn!(
            status,
            latency_ms,
            parse_error = %parse_error,
            stdout = %truncate_output(stdout, LOG_OUTPUT_BYTES),
            "solver produced unusable output"
        ),
        _ if status >= 500 => warn!(status, latency_ms, error = %err, "request failed"),
        _ => info!(status, latency_ms, error = %err, "request rejected"),
    }
}
